use std::{path::PathBuf, time::Duration};

use chromiumoxide::{
    Browser, BrowserConfig, Page,
    cdp::browser_protocol::{
        emulation::SetDeviceMetricsOverrideParams, page::CaptureScreenshotFormat,
    },
    page::ScreenshotParams,
};
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CONTAINER_ID, Surface};
use crate::{
    document::AnimationDocument,
    foundation::{
        core::{Canvas, FrameIndex},
        error::{ThumbError, ThumbResult},
    },
    frame::EngineSignal,
    locator::EngineScript,
    strategy::StrategyKind,
};

const KIND: StrategyKind = StrategyKind::BrowserScreenshot;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Flags for a throwaway headless browser on hosts with no sandbox support, GPU, or
/// writable shared memory.
pub const HARDENED_FLAGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-software-rasterizer",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--disable-default-apps",
    "--no-first-run",
    "--no-default-browser-check",
    "--single-process",
    "--no-zygote",
];

#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub executable: PathBuf,
    pub canvas: Canvas,
    pub launch_timeout: Duration,
    pub engine: EngineScript,
}

fn cdp_err(what: &str) -> impl FnOnce(chromiumoxide::error::CdpError) -> ThumbError + '_ {
    move |e| ThumbError::render(KIND, format!("{what}: {e}"))
}

/// A headless browser process with one page sized to the output canvas.
#[derive(Debug)]
pub struct BrowserSurface {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    profile: Option<tempfile::TempDir>,
    canvas: Canvas,
    engine: EngineScript,
}

impl BrowserSurface {
    #[tracing::instrument(skip_all, fields(executable = %opts.executable.display()))]
    pub async fn launch(opts: LaunchOptions) -> ThumbResult<Self> {
        let profile = tempfile::Builder::new()
            .prefix("lottie_thumb_profile_")
            .tempdir()
            .map_err(|e| ThumbError::render(KIND, format!("create profile dir: {e}")))?;

        let config = BrowserConfig::builder()
            .chrome_executable(&opts.executable)
            .user_data_dir(profile.path())
            .window_size(opts.canvas.width, opts.canvas.height)
            .launch_timeout(opts.launch_timeout)
            .no_sandbox()
            .args(HARDENED_FLAGS.iter().copied())
            .build()
            .map_err(|e| ThumbError::render(KIND, format!("browser config: {e}")))?;

        let (browser, mut handler) =
            tokio::time::timeout(opts.launch_timeout, Browser::launch(config))
                .await
                .map_err(|_| ThumbError::StrategyTimeout {
                    strategy: KIND,
                    after: opts.launch_timeout,
                })?
                .map_err(cdp_err("launch"))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        info!("browser launched");

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
            page: None,
            profile: Some(profile),
            canvas: opts.canvas,
            engine: opts.engine,
        })
    }

    fn page(&self) -> ThumbResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ThumbError::render(KIND, "no page; inject first"))
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, expr: &str) -> ThumbResult<T> {
        self.page()?
            .evaluate(expr)
            .await
            .map_err(cdp_err("evaluate"))?
            .into_value::<T>()
            .map_err(|e| ThumbError::render(KIND, format!("evaluate result: {e}")))
    }
}

impl Surface for BrowserSurface {
    async fn inject(&mut self, doc: &AnimationDocument) -> ThumbResult<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ThumbError::render(KIND, "browser already disposed"))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(cdp_err("new page"))?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.canvas.width),
            i64::from(self.canvas.height),
            1.0,
            false,
        ))
        .await
        .map_err(cdp_err("set viewport"))?;

        let html = driver_html(&self.engine.content, &doc.to_json(), self.canvas);
        page.set_content(html)
            .await
            .map_err(cdp_err("set content"))?;
        debug!(bytes = doc.to_json().len(), "animation injected");
        self.page = Some(page);
        Ok(())
    }

    async fn wait_for_signal(&mut self) -> ThumbResult<EngineSignal> {
        loop {
            let state: String = self
                .eval("String(window.__thumbState || 'pending')")
                .await?;
            match state.as_str() {
                "loaded" => {
                    let total_frames: f64 = self
                        .eval("Number(window.__thumbAnim.totalFrames) || 0")
                        .await?;
                    return Ok(EngineSignal::Loaded { total_frames });
                }
                "error" => {
                    let reason: String = self
                        .eval("String(window.__thumbError || 'data_failed')")
                        .await?;
                    return Ok(EngineSignal::DataFailed(reason));
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    async fn go_to_and_stop(&mut self, frame: FrameIndex) -> ThumbResult<()> {
        let _: bool = self
            .eval(&format!(
                "(window.__thumbAnim.goToAndStop({}, true), true)",
                frame.0
            ))
            .await?;
        Ok(())
    }

    async fn capture_raster(&mut self) -> ThumbResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .omit_background(true)
            .build();
        self.page()?
            .screenshot(params)
            .await
            .map_err(cdp_err("screenshot"))
    }

    async fn dispose(&mut self) -> ThumbResult<()> {
        let mut problems = Vec::new();
        self.page = None;

        if let Some(mut browser) = self.browser.take() {
            let answered = match close_within(EXIT_GRACE, browser.close()).await {
                Shutdown::Closed => true,
                Shutdown::CloseFailed(e) => {
                    problems.push(format!("close browser: {e}"));
                    true
                }
                Shutdown::Unresponsive => {
                    warn!("browser did not answer close");
                    false
                }
            };
            let exited = answered
                && matches!(
                    tokio::time::timeout(EXIT_GRACE, browser.wait()).await,
                    Ok(Ok(_))
                );
            if !exited {
                warn!("browser still running, killing");
                if let Some(Err(e)) = browser.kill().await {
                    problems.push(format!("kill browser: {e}"));
                }
            }
        }
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                problems.push(format!("remove profile '{}': {e}", path.display()));
            }
        }

        if problems.is_empty() {
            debug!("browser disposed");
            Ok(())
        } else {
            Err(ThumbError::cleanup(problems.join("; ")))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Shutdown {
    Closed,
    CloseFailed(String),
    Unresponsive,
}

/// A hung browser never answers `Browser.close`; give up on it after `grace`.
async fn close_within<T, E: std::fmt::Display>(
    grace: Duration,
    close: impl Future<Output = Result<T, E>>,
) -> Shutdown {
    match tokio::time::timeout(grace, close).await {
        Ok(Ok(_)) => Shutdown::Closed,
        Ok(Err(e)) => Shutdown::CloseFailed(e.to_string()),
        Err(_) => Shutdown::Unresponsive,
    }
}

impl Drop for BrowserSurface {
    fn drop(&mut self) {
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }
}

/// Page that loads the engine, hands it the animation, and publishes its state on `window`.
pub fn driver_html(engine: &str, animation_json: &str, canvas: Canvas) -> String {
    let engine = engine.replace("</script", "<\\/script");
    let data = animation_json.replace("</", "<\\/");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
html, body {{ margin: 0; padding: 0; background: transparent; overflow: hidden; }}
#{id} {{ width: {w}px; height: {h}px; }}
</style>
</head>
<body>
<div id="{id}"></div>
<script>{engine}</script>
<script>
window.__thumbState = 'pending';
(function () {{
  try {{
    var anim = lottie.loadAnimation({{
      container: document.getElementById('{id}'),
      renderer: 'svg',
      loop: false,
      autoplay: false,
      animationData: {data}
    }});
    window.__thumbAnim = anim;
    anim.addEventListener('DOMLoaded', function () {{ window.__thumbState = 'loaded'; }});
    anim.addEventListener('data_failed', function () {{
      window.__thumbError = 'data_failed';
      window.__thumbState = 'error';
    }});
  }} catch (e) {{
    window.__thumbError = String(e);
    window.__thumbState = 'error';
  }}
}})();
</script>
</body>
</html>
"#,
        id = CONTAINER_ID,
        w = canvas.width,
        h = canvas.height,
    )
}
