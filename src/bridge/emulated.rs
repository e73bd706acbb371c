//! In-process stand-in for a browser page.
//!
//! The engine in [`crate::engine`] is written against a browser-like environment: it looks up
//! the current `document` from process-global bindings, finds its container element, and asks
//! the document for a `<canvas>`. Here the document is a tiny element tree and the canvas is a
//! CPU raster surface.
//!
//! The global bindings are shared by the whole process, so installing them is guarded by
//! [`EnvironmentLease`]: one holder at a time, and the bindings are removed when the lease is
//! released or dropped.

use std::{
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    time::Duration,
};

use tracing::{debug, warn};

use super::{CONTAINER_ID, Surface};
use crate::{
    capture,
    document::AnimationDocument,
    engine::Player,
    foundation::{
        core::{Canvas, FrameIndex},
        error::{ThumbError, ThumbResult},
    },
    frame::EngineSignal,
    strategy::StrategyKind,
};

pub type SharedDocument = Arc<Mutex<Document>>;
pub type CanvasHandle = Arc<Mutex<RasterCanvas>>;

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Objects the engine expects to find in global scope.
#[derive(Clone, Debug)]
pub struct GlobalBindings {
    pub document: SharedDocument,
    pub navigator: Navigator,
}

#[derive(Clone, Debug)]
pub struct Navigator {
    pub user_agent: String,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            user_agent: concat!("lottie-thumb/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

static GLOBALS: Mutex<Option<GlobalBindings>> = Mutex::new(None);

fn environment_lock() -> &'static tokio::sync::Mutex<()> {
    static LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| tokio::sync::Mutex::new(()))
}

/// `true` while some attempt has the emulated environment installed.
pub fn globals_installed() -> bool {
    lock(&GLOBALS).is_some()
}

/// The `document` binding, as the engine resolves it.
pub fn current_document() -> Option<SharedDocument> {
    lock(&GLOBALS).as_ref().map(|g| g.document.clone())
}

/// Remove whatever bindings are installed, bypassing their lease. The holder's release then
/// reports a cleanup failure. Returns `false` if nothing was installed.
pub fn uninstall_globals() -> bool {
    lock(&GLOBALS).take().is_some()
}

pub fn current_navigator() -> Option<Navigator> {
    lock(&GLOBALS).as_ref().map(|g| g.navigator.clone())
}

/// Exclusive, scoped ownership of the process-global bindings.
#[derive(Debug)]
pub struct EnvironmentLease {
    _exclusive: tokio::sync::MutexGuard<'static, ()>,
    installed: bool,
}

impl EnvironmentLease {
    /// Wait for any other holder to finish, then install `bindings`.
    pub async fn acquire(bindings: GlobalBindings) -> Self {
        let exclusive = environment_lock().lock().await;
        let previous = lock(&GLOBALS).replace(bindings);
        if previous.is_some() {
            warn!("stale emulated globals replaced");
        }
        debug!("emulated globals installed");
        Self {
            _exclusive: exclusive,
            installed: true,
        }
    }

    /// Remove the bindings now. Reports an error if something else already removed them.
    pub fn release(mut self) -> ThumbResult<()> {
        self.uninstall()
    }

    fn uninstall(&mut self) -> ThumbResult<()> {
        if !std::mem::take(&mut self.installed) {
            return Ok(());
        }
        match lock(&GLOBALS).take() {
            Some(_) => {
                debug!("emulated globals removed");
                Ok(())
            }
            None => Err(ThumbError::cleanup(
                "emulated globals were removed by someone else",
            )),
        }
    }
}

impl Drop for EnvironmentLease {
    fn drop(&mut self) {
        if let Err(e) = self.uninstall() {
            warn!(error = %e, "emulated globals cleanup");
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

#[derive(Debug)]
struct Element {
    tag: String,
    id: Option<String>,
    children: Vec<ElementId>,
    canvas: Option<CanvasHandle>,
}

/// Minimal document: a `<body>` holding the container `<div>`.
#[derive(Debug)]
pub struct Document {
    elements: Vec<Element>,
    surface: CanvasHandle,
}

impl Document {
    /// Every `<canvas>` created in this document is backed by `surface`.
    pub fn new(container_id: &str, surface: CanvasHandle) -> Self {
        let body = Element {
            tag: "body".to_string(),
            id: None,
            children: vec![ElementId(1)],
            canvas: None,
        };
        let container = Element {
            tag: "div".to_string(),
            id: Some(container_id.to_string()),
            children: Vec::new(),
            canvas: None,
        };
        Self {
            elements: vec![body, container],
            surface,
        }
    }

    pub fn body(&self) -> ElementId {
        ElementId(0)
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|e| e.id.as_deref() == Some(id))
            .map(ElementId)
    }

    pub fn create_element(&mut self, tag: &str) -> ElementId {
        let tag = tag.to_ascii_lowercase();
        let canvas = (tag == "canvas").then(|| self.surface.clone());
        self.elements.push(Element {
            tag,
            id: None,
            children: Vec::new(),
            canvas,
        });
        ElementId(self.elements.len() - 1)
    }

    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> ThumbResult<()> {
        if child.0 >= self.elements.len() || parent == child {
            return Err(ThumbError::render(
                StrategyKind::EmulatedDomCanvas,
                "appendChild: invalid element",
            ));
        }
        let Some(p) = self.elements.get_mut(parent.0) else {
            return Err(ThumbError::render(
                StrategyKind::EmulatedDomCanvas,
                "appendChild: unknown parent",
            ));
        };
        p.children.push(child);
        Ok(())
    }

    pub fn children(&self, el: ElementId) -> &[ElementId] {
        self.elements
            .get(el.0)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn tag_name(&self, el: ElementId) -> Option<&str> {
        self.elements.get(el.0).map(|e| e.tag.as_str())
    }

    /// The drawing surface behind a `<canvas>` element.
    pub fn canvas(&self, el: ElementId) -> Option<CanvasHandle> {
        self.elements.get(el.0).and_then(|e| e.canvas.clone())
    }
}

/// CPU raster surface standing in for a canvas element.
pub struct RasterCanvas {
    width: u16,
    height: u16,
    pixmap: vello_cpu::Pixmap,
}

impl std::fmt::Debug for RasterCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterCanvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl RasterCanvas {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixmap: vello_cpu::Pixmap::new(width, height),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Clear the surface and draw one frame with `draw`.
    pub fn paint(&mut self, draw: impl FnOnce(&mut vello_cpu::RenderContext)) {
        let mut ctx = vello_cpu::RenderContext::new(self.width, self.height);
        draw(&mut ctx);
        ctx.flush();
        self.pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        ctx.render_to_pixmap(&mut self.pixmap);
    }

    pub fn pixmap(&self) -> &vello_cpu::Pixmap {
        &self.pixmap
    }

    pub fn to_png(&self) -> ThumbResult<Vec<u8>> {
        capture::pixmap_to_png(&self.pixmap)
    }
}

/// Emulated page: an installed environment lease, its canvas, and the engine once injected.
#[derive(Debug)]
pub struct EmulatedSurface {
    lease: Option<EnvironmentLease>,
    canvas: CanvasHandle,
    player: Option<Player>,
}

impl EmulatedSurface {
    pub async fn create(canvas: Canvas) -> ThumbResult<Self> {
        let (w, h) = canvas.as_u16()?;
        let surface: CanvasHandle = Arc::new(Mutex::new(RasterCanvas::new(w, h)));
        let document = Document::new(CONTAINER_ID, surface.clone());
        let lease = EnvironmentLease::acquire(GlobalBindings {
            document: Arc::new(Mutex::new(document)),
            navigator: Navigator::default(),
        })
        .await;
        Ok(Self {
            lease: Some(lease),
            canvas: surface,
            player: None,
        })
    }

    fn player(&mut self) -> ThumbResult<&mut Player> {
        self.player.as_mut().ok_or_else(not_loaded)
    }
}

fn not_loaded() -> ThumbError {
    ThumbError::render(StrategyKind::EmulatedDomCanvas, "engine not loaded")
}

/// Run engine work on the blocking pool, so a budget racing this future is not held up by
/// scene building or rasterization.
async fn off_runtime<T, F>(work: F) -> ThumbResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| {
            ThumbError::render(StrategyKind::EmulatedDomCanvas, format!("engine task: {e}"))
        })
}

impl Surface for EmulatedSurface {
    async fn inject(&mut self, doc: &AnimationDocument) -> ThumbResult<()> {
        let data = doc.raw().clone();
        let player = off_runtime(move || Player::load(CONTAINER_ID, &data)).await??;
        self.player = Some(player);
        Ok(())
    }

    async fn wait_for_signal(&mut self) -> ThumbResult<EngineSignal> {
        loop {
            if let Some(signal) = self.player()?.poll_signal() {
                return Ok(signal);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn go_to_and_stop(&mut self, frame: FrameIndex) -> ThumbResult<()> {
        // If the wait is cut short the player stays with the abandoned task.
        let mut player = self.player.take().ok_or_else(not_loaded)?;
        let (player, painted) = off_runtime(move || {
            let painted = player.go_to_and_stop(frame.0 as f64, true);
            (player, painted)
        })
        .await?;
        self.player = Some(player);
        painted
    }

    async fn capture_raster(&mut self) -> ThumbResult<Vec<u8>> {
        lock(&self.canvas).to_png()
    }

    async fn dispose(&mut self) -> ThumbResult<()> {
        self.player = None;
        match self.lease.take() {
            Some(lease) => lease.release(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> CanvasHandle {
        Arc::new(Mutex::new(RasterCanvas::new(4, 4)))
    }

    #[test]
    fn canvas_elements_share_the_substituted_surface() {
        let s = surface();
        let mut doc = Document::new("lottie", s.clone());
        let container = doc.get_element_by_id("lottie").unwrap();
        let c = doc.create_element("CANVAS");
        doc.append_child(container, c).unwrap();
        assert_eq!(doc.tag_name(c), Some("canvas"));
        assert_eq!(doc.children(container), &[c]);
        assert!(Arc::ptr_eq(&doc.canvas(c).unwrap(), &s));

        let div = doc.create_element("div");
        assert!(doc.canvas(div).is_none());
        assert!(doc.append_child(div, div).is_err());
        assert_eq!(doc.children(doc.body()), &[container]);
    }

    #[test]
    fn paint_replaces_previous_contents() {
        let mut canvas = RasterCanvas::new(2, 2);
        canvas.paint(|ctx| {
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 0, 0, 255));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, 2.0, 2.0));
        });
        assert_eq!(&canvas.pixmap().data_as_u8_slice()[..4], &[255, 0, 0, 255]);
        canvas.paint(|_| {});
        assert!(canvas.pixmap().data_as_u8_slice().iter().all(|b| *b == 0));
    }
}
