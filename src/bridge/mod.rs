//! Execution contexts that host an animation engine.
//!
//! Both contexts expose the same surface: inject the animation, wait for the engine's signal,
//! stop on a frame, read the raster back, and tear everything down.

#[cfg(feature = "browser")]
pub mod browser;
pub mod emulated;

use crate::{
    document::AnimationDocument,
    foundation::{core::FrameIndex, error::ThumbResult},
    frame::EngineSignal,
};

/// Id of the element the engine renders into, in both contexts.
pub const CONTAINER_ID: &str = "lottie";

pub(crate) trait Surface {
    /// Load the engine and a serialized copy of `doc` into the context.
    async fn inject(&mut self, doc: &AnimationDocument) -> ThumbResult<()>;

    /// Resolve once the engine reports loaded or data-failed. Callers bound this with a timeout.
    async fn wait_for_signal(&mut self) -> ThumbResult<EngineSignal>;

    /// Stop on `frame` with a forced redraw, so the engine paints before this returns.
    async fn go_to_and_stop(&mut self, frame: FrameIndex) -> ThumbResult<()>;

    /// PNG bytes of the current surface contents.
    async fn capture_raster(&mut self) -> ThumbResult<Vec<u8>>;

    /// Release every resource the surface holds. Must be idempotent.
    async fn dispose(&mut self) -> ThumbResult<()>;
}
