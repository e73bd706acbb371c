use std::{fmt, path::PathBuf, time::Duration};

use tracing::debug;

use crate::{
    bridge::{Surface, emulated::EmulatedSurface},
    capture,
    composite::CompositeStrategy,
    config::ThumbnailConfig,
    foundation::error::ThumbResult,
    frame,
    locator::{self, EngineScript},
    placeholder::PlaceholderStrategy,
    request::RenderRequest,
};

/// Identifier of the strategy that produced a thumbnail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BrowserScreenshot,
    EmulatedDomCanvas,
    StaticComposite,
    Placeholder,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BrowserScreenshot => "browser_screenshot",
            Self::EmulatedDomCanvas => "emulated_dom_canvas",
            Self::StaticComposite => "static_composite",
            Self::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host can render with.
///
/// The cascade is built from this set alone, so a fixed set always yields the same ordered
/// strategy list.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    pub browser: Option<PathBuf>,
    pub engine_script: Option<EngineScript>,
    pub emulated_dom: bool,
    pub raster: bool,
}

impl Capabilities {
    /// Every rendering dependency unavailable.
    pub fn none() -> Self {
        Self::default()
    }

    /// Raster drawing and the emulated DOM, no browser.
    pub fn in_process() -> Self {
        Self {
            browser: None,
            engine_script: None,
            emulated_dom: true,
            raster: true,
        }
    }

    pub fn detect(cfg: &ThumbnailConfig) -> Self {
        let browser = if cfg.disable_browser || !cfg!(feature = "browser") {
            None
        } else {
            locator::locate_browser_executable(cfg.browser_path.as_deref())
        };
        let engine_script = if browser.is_some() {
            locator::locate_render_engine(cfg.engine_script.as_deref())
        } else {
            None
        };
        Self {
            browser,
            engine_script,
            emulated_dom: !cfg.disable_emulated,
            raster: !cfg.disable_raster,
        }
    }

    /// Ordered strategy list, most faithful first. Always ends with the placeholder.
    pub fn build_strategies(&self, cfg: &ThumbnailConfig) -> Vec<RenderStrategy> {
        let mut out = Vec::with_capacity(4);

        #[cfg(feature = "browser")]
        if let (Some(executable), Some(engine)) = (&self.browser, &self.engine_script) {
            out.push(RenderStrategy::BrowserScreenshot(BrowserStrategy::new(
                executable.clone(),
                engine.clone(),
                cfg,
            )));
        }
        if self.emulated_dom && self.raster {
            out.push(RenderStrategy::EmulatedDomCanvas(EmulatedStrategy::new(cfg)));
        }
        if self.raster {
            out.push(RenderStrategy::StaticComposite(CompositeStrategy::new(
                cfg.timeouts.static_composite(),
            )));
        }
        out.push(RenderStrategy::Placeholder(PlaceholderStrategy::new(
            self.raster,
        )));
        out
    }

    /// Kinds in cascade order, for diagnostics.
    pub fn plan(&self, cfg: &ThumbnailConfig) -> Vec<StrategyKind> {
        self.build_strategies(cfg)
            .iter()
            .map(RenderStrategy::kind)
            .collect()
    }
}

/// One rendering approach. Each variant exclusively owns what it allocates during an attempt.
#[derive(Debug)]
pub enum RenderStrategy {
    #[cfg(feature = "browser")]
    BrowserScreenshot(BrowserStrategy),
    EmulatedDomCanvas(EmulatedStrategy),
    StaticComposite(CompositeStrategy),
    Placeholder(PlaceholderStrategy),
}

impl RenderStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            #[cfg(feature = "browser")]
            Self::BrowserScreenshot(_) => StrategyKind::BrowserScreenshot,
            Self::EmulatedDomCanvas(_) => StrategyKind::EmulatedDomCanvas,
            Self::StaticComposite(_) => StrategyKind::StaticComposite,
            Self::Placeholder(_) => StrategyKind::Placeholder,
        }
    }

    /// Time budget for one attempt. `None` for the placeholder, which never waits on anything.
    pub fn budget(&self) -> Option<Duration> {
        match self {
            #[cfg(feature = "browser")]
            Self::BrowserScreenshot(s) => Some(s.budget),
            Self::EmulatedDomCanvas(s) => Some(s.budget),
            Self::StaticComposite(s) => Some(s.budget()),
            Self::Placeholder(_) => None,
        }
    }

    pub async fn try_render(&mut self, req: &RenderRequest) -> ThumbResult<Vec<u8>> {
        match self {
            #[cfg(feature = "browser")]
            Self::BrowserScreenshot(s) => s.try_render(req).await,
            Self::EmulatedDomCanvas(s) => s.try_render(req).await,
            Self::StaticComposite(s) => s.try_render(req).await,
            Self::Placeholder(s) => Ok(s.render(req)),
        }
    }

    /// Release whatever the last attempt left behind. Safe to call more than once.
    pub async fn release(&mut self) -> ThumbResult<()> {
        match self {
            #[cfg(feature = "browser")]
            Self::BrowserScreenshot(s) => s.release().await,
            Self::EmulatedDomCanvas(s) => s.release().await,
            Self::StaticComposite(_) | Self::Placeholder(_) => Ok(()),
        }
    }
}

/// Inject, wait for the engine, stop at the middle frame, capture.
async fn render_on_surface<S: Surface>(
    surface: &mut S,
    kind: StrategyKind,
    req: &RenderRequest,
    signal_timeout: Duration,
    settle: Duration,
) -> ThumbResult<Vec<u8>> {
    surface.inject(&req.document).await?;
    let frame = frame::drive_to_middle_frame(surface, kind, signal_timeout).await?;
    debug!(strategy = %kind, frame = frame.0, "frame selected");
    capture::capture(surface, kind, settle).await
}

#[cfg(feature = "browser")]
pub use browser_strategy::BrowserStrategy;

#[cfg(feature = "browser")]
mod browser_strategy {
    use super::*;
    use crate::bridge::browser::{BrowserSurface, LaunchOptions};

    #[derive(Debug)]
    pub struct BrowserStrategy {
        executable: PathBuf,
        engine: EngineScript,
        pub(super) budget: Duration,
        launch_timeout: Duration,
        signal_timeout: Duration,
        settle: Duration,
        session: Option<BrowserSurface>,
    }

    impl BrowserStrategy {
        pub fn new(executable: PathBuf, engine: EngineScript, cfg: &ThumbnailConfig) -> Self {
            Self {
                executable,
                engine,
                budget: cfg.timeouts.browser(),
                launch_timeout: cfg.timeouts.browser_launch(),
                signal_timeout: cfg.timeouts.signal(),
                settle: Duration::from_millis(cfg.settle.browser_ms),
                session: None,
            }
        }

        pub(super) async fn try_render(&mut self, req: &RenderRequest) -> ThumbResult<Vec<u8>> {
            let opts = LaunchOptions {
                executable: self.executable.clone(),
                canvas: req.canvas,
                launch_timeout: self.launch_timeout,
                engine: self.engine.clone(),
            };
            // Stored before any further await so a timeout still leaves it reachable for release.
            let surface = self.session.insert(BrowserSurface::launch(opts).await?);
            render_on_surface(
                surface,
                StrategyKind::BrowserScreenshot,
                req,
                self.signal_timeout,
                self.settle,
            )
            .await
        }

        pub(super) async fn release(&mut self) -> ThumbResult<()> {
            match self.session.take() {
                Some(mut surface) => surface.dispose().await,
                None => Ok(()),
            }
        }
    }
}

#[derive(Debug)]
pub struct EmulatedStrategy {
    budget: Duration,
    signal_timeout: Duration,
    settle: Duration,
    session: Option<EmulatedSurface>,
}

impl EmulatedStrategy {
    pub fn new(cfg: &ThumbnailConfig) -> Self {
        Self {
            budget: cfg.timeouts.emulated(),
            signal_timeout: cfg.timeouts.signal(),
            settle: Duration::from_millis(cfg.settle.emulated_ms),
            session: None,
        }
    }

    async fn try_render(&mut self, req: &RenderRequest) -> ThumbResult<Vec<u8>> {
        let surface = self.session.insert(EmulatedSurface::create(req.canvas).await?);
        render_on_surface(
            surface,
            StrategyKind::EmulatedDomCanvas,
            req,
            self.signal_timeout,
            self.settle,
        )
        .await
    }

    async fn release(&mut self) -> ThumbResult<()> {
        match self.session.take() {
            Some(mut surface) => surface.dispose().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(StrategyKind::EmulatedDomCanvas.to_string(), "emulated_dom_canvas");
        assert_eq!(
            serde_json::to_value(StrategyKind::BrowserScreenshot).unwrap(),
            serde_json::json!("browser_screenshot")
        );
    }

    #[test]
    fn nothing_available_leaves_only_the_placeholder() {
        let cfg = ThumbnailConfig::default();
        assert_eq!(
            Capabilities::none().plan(&cfg),
            vec![StrategyKind::Placeholder]
        );
    }

    #[test]
    fn in_process_order() {
        let cfg = ThumbnailConfig::default();
        assert_eq!(
            Capabilities::in_process().plan(&cfg),
            vec![
                StrategyKind::EmulatedDomCanvas,
                StrategyKind::StaticComposite,
                StrategyKind::Placeholder,
            ]
        );
    }

    #[test]
    fn browser_needs_an_engine_script() {
        let cfg = ThumbnailConfig::default();
        let caps = Capabilities {
            browser: Some(PathBuf::from("/usr/bin/chromium")),
            ..Capabilities::in_process()
        };
        assert_eq!(caps.plan(&cfg)[0], StrategyKind::EmulatedDomCanvas);
    }

    #[cfg(feature = "browser")]
    #[test]
    fn browser_goes_first_when_complete() {
        let cfg = ThumbnailConfig::default();
        let caps = Capabilities {
            browser: Some(PathBuf::from("/usr/bin/chromium")),
            engine_script: Some(EngineScript::from_source("engine.js", "/* */")),
            ..Capabilities::in_process()
        };
        let plan = caps.plan(&cfg);
        assert_eq!(plan[0], StrategyKind::BrowserScreenshot);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn budgets_follow_config() {
        let cfg = ThumbnailConfig::default();
        let strategies = Capabilities::in_process().build_strategies(&cfg);
        assert_eq!(strategies[0].budget(), Some(cfg.timeouts.emulated()));
        assert_eq!(strategies[1].budget(), Some(cfg.timeouts.static_composite()));
        assert_eq!(strategies[2].budget(), None);
    }
}
