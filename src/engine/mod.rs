//! In-process Lottie player.
//!
//! The player is written against the browser-like globals of [`crate::bridge::emulated`]: it
//! finds the `document`, looks up its container element and asks for a `<canvas>` to draw
//! into. Loading reports back through a signal queue, the way a web player fires its
//! `DOMLoaded` and `data_failed` events.
//!
//! Coverage is the subset that makes a recognisable still: shape layers (groups, rects,
//! ellipses, paths, stars and polygons with solid fills and strokes), solid layers, image
//! layers with embedded assets, null parenting and precompositions. Masks, mattes, effects,
//! gradients, trim paths and text are not drawn.

pub mod anim;
pub mod ease;
pub mod model;
pub mod paint;
pub mod scene;

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, instrument};

use self::{
    model::Composition,
    scene::{ImageAssets, SceneBuilder},
};
use crate::{
    bridge::emulated::{CanvasHandle, current_document, lock},
    decode::decode_data_uri_image,
    foundation::error::{ThumbError, ThumbResult},
    frame::EngineSignal,
    strategy::StrategyKind,
};

fn engine_error(reason: impl Into<String>) -> ThumbError {
    ThumbError::render(StrategyKind::EmulatedDomCanvas, reason)
}

#[derive(Debug)]
pub struct Player {
    canvas: CanvasHandle,
    comp: Option<Composition>,
    images: ImageAssets,
    signals: VecDeque<EngineSignal>,
    current_frame: Option<f64>,
}

impl Player {
    /// Mount into the element with id `container_id` of the current global document.
    ///
    /// Environment problems (no document, no container) are errors. Animation data the
    /// player cannot read is not: it is reported as [`EngineSignal::DataFailed`].
    #[instrument(level = "debug", skip(data))]
    pub fn load(container_id: &str, data: &Value) -> ThumbResult<Self> {
        let document = current_document().ok_or_else(|| engine_error("document is not defined"))?;
        let canvas = {
            let mut doc = lock(&document);
            let container = doc
                .get_element_by_id(container_id)
                .ok_or_else(|| engine_error(format!("container '#{container_id}' not found")))?;
            let el = doc.create_element("canvas");
            doc.append_child(container, el)?;
            doc.canvas(el)
                .ok_or_else(|| engine_error("canvas has no drawing surface"))?
        };

        let mut signals = VecDeque::new();
        let (comp, images) = match Composition::from_value(data) {
            Ok(comp) => {
                let images = decode_images(&comp);
                signals.push_back(EngineSignal::Loaded {
                    total_frames: comp.total_frames(),
                });
                (Some(comp), images)
            }
            Err(reason) => {
                debug!(%reason, "animation data rejected");
                signals.push_back(EngineSignal::DataFailed(reason));
                (None, ImageAssets::new())
            }
        };

        Ok(Self {
            canvas,
            comp,
            images,
            signals,
            current_frame: None,
        })
    }

    pub fn poll_signal(&mut self) -> Option<EngineSignal> {
        self.signals.pop_front()
    }

    pub fn current_frame(&self) -> Option<f64> {
        self.current_frame
    }

    /// Seek and stop. `value` counts frames from the in-point when `is_frame`, seconds
    /// otherwise.
    pub fn go_to_and_stop(&mut self, value: f64, is_frame: bool) -> ThumbResult<()> {
        let comp = self
            .comp
            .as_ref()
            .ok_or_else(|| engine_error("no animation loaded"))?;
        let offset = if is_frame { value } else { value * comp.fr };
        let frame = comp.ip + offset;

        let ops = SceneBuilder::new(comp, &self.images).build(frame);
        let mut canvas = lock(&self.canvas);
        let view = paint::fit_transform(
            comp.w,
            comp.h,
            f64::from(canvas.width()),
            f64::from(canvas.height()),
        );
        canvas.paint(|ctx| paint::paint_ops(ctx, &ops, view));
        debug!(frame, ops = ops.len(), "frame painted");

        self.current_frame = Some(frame);
        Ok(())
    }
}

/// Embedded image assets. Assets that are not data URIs, or that fail to decode, are left out
/// and their layers draw nothing.
fn decode_images(comp: &Composition) -> ImageAssets {
    let mut out = ImageAssets::new();
    for asset in &comp.assets {
        let Some(p) = asset.p.as_deref().filter(|p| p.starts_with("data:")) else {
            continue;
        };
        match decode_data_uri_image(p) {
            Ok(img) => {
                out.insert(asset.id.clone(), std::sync::Arc::new(img));
            }
            Err(e) => debug!(asset = %asset.id, error = %e, "image asset not decoded"),
        }
    }
    out
}
