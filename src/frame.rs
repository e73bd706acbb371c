use std::time::Duration;

use crate::{
    bridge::Surface,
    foundation::{
        core::FrameIndex,
        error::{ThumbError, ThumbResult},
    },
    strategy::StrategyKind,
};

/// Representative frame of an animation: `floor(total_frames / 2)`.
///
/// Frames are counted from the animation's in-point, the way the engines' stop-at-frame
/// command counts them. Empty or nonsensical ranges select frame 0.
pub fn select_middle_frame(total_frames: f64) -> FrameIndex {
    if !total_frames.is_finite() || total_frames <= 0.0 {
        return FrameIndex(0);
    }
    FrameIndex((total_frames / 2.0).floor() as u64)
}

/// What an engine reports once it has consumed the animation data.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineSignal {
    Loaded { total_frames: f64 },
    DataFailed(String),
}

/// Wait for the engine's load signal, then stop it on the middle frame with a forced redraw.
///
/// A data-failed signal comes back as [`ThumbError::EngineDataFailed`] so the cascade can
/// log it apart from a timeout.
pub(crate) async fn drive_to_middle_frame<S: Surface>(
    surface: &mut S,
    strategy: StrategyKind,
    signal_timeout: Duration,
) -> ThumbResult<FrameIndex> {
    let signal = tokio::time::timeout(signal_timeout, surface.wait_for_signal())
        .await
        .map_err(|_| ThumbError::StrategyTimeout {
            strategy,
            after: signal_timeout,
        })??;

    match signal {
        EngineSignal::Loaded { total_frames } => {
            let frame = select_middle_frame(total_frames);
            surface.go_to_and_stop(frame).await?;
            Ok(frame)
        }
        EngineSignal::DataFailed(reason) => Err(ThumbError::data_failed(reason)),
    }
}
