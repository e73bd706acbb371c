//! Ordered fallback over [`RenderStrategy`].
//!
//! Each attempt races its strategy's budget. Whatever happens (success, error, timeout) the
//! strategy is released before the loop moves on, so the next attempt never sees resources
//! or global bindings from the previous one.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::{
    capture::is_png,
    foundation::error::{ThumbError, ThumbResult},
    placeholder::MINIMAL_PNG,
    request::RenderRequest,
    strategy::{RenderStrategy, StrategyKind},
};

/// One strategy attempt, for diagnostics.
#[derive(Clone, Debug)]
pub struct Attempt {
    pub strategy: StrategyKind,
    pub elapsed_ms: u128,
    /// `None` when the attempt produced the output.
    pub failure: Option<String>,
    /// Set when releasing the strategy's resources failed afterwards.
    pub cleanup: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CascadeOutcome {
    pub png: Vec<u8>,
    pub strategy: StrategyKind,
    pub attempts: Vec<Attempt>,
}

/// Try each strategy in order until one yields a PNG.
///
/// Always returns output: the placeholder cannot fail, and if the list is somehow missing
/// it the minimal PNG is returned under the placeholder tag.
#[instrument(skip_all, fields(width = req.width(), height = req.height()))]
pub async fn run_cascade(strategies: &mut [RenderStrategy], req: &RenderRequest) -> CascadeOutcome {
    let mut attempts = Vec::with_capacity(strategies.len());

    for strategy in strategies.iter_mut() {
        let kind = strategy.kind();
        let started = Instant::now();
        debug!(strategy = %kind, "attempt started");

        let result = attempt(strategy, req).await;
        let cleanup = match strategy.release().await {
            Ok(()) => None,
            Err(e) => {
                warn!(strategy = %kind, error = %e, "cleanup failed, continuing");
                Some(e.to_string())
            }
        };
        let elapsed_ms = started.elapsed().as_millis();

        match result {
            Ok(png) => {
                info!(strategy = %kind, elapsed_ms, bytes = png.len(), "thumbnail rendered");
                attempts.push(Attempt {
                    strategy: kind,
                    elapsed_ms,
                    failure: None,
                    cleanup,
                });
                return CascadeOutcome {
                    png,
                    strategy: kind,
                    attempts,
                };
            }
            Err(e) => {
                match &e {
                    ThumbError::StrategyTimeout { after, .. } => {
                        warn!(strategy = %kind, elapsed_ms, budget_ms = after.as_millis(), "strategy timed out");
                    }
                    ThumbError::EngineDataFailed(reason) => {
                        warn!(strategy = %kind, elapsed_ms, %reason, "engine could not load the animation data");
                    }
                    other => {
                        warn!(strategy = %kind, elapsed_ms, error = %other, "strategy failed");
                    }
                }
                attempts.push(Attempt {
                    strategy: kind,
                    elapsed_ms,
                    failure: Some(e.to_string()),
                    cleanup,
                });
            }
        }
    }

    warn!("no strategy produced output, using minimal png");
    CascadeOutcome {
        png: MINIMAL_PNG.to_vec(),
        strategy: StrategyKind::Placeholder,
        attempts,
    }
}

/// Run one attempt under its budget and check the output looks like a PNG.
async fn attempt(strategy: &mut RenderStrategy, req: &RenderRequest) -> ThumbResult<Vec<u8>> {
    let kind = strategy.kind();
    let png = match strategy.budget() {
        Some(budget) => tokio::time::timeout(budget, strategy.try_render(req))
            .await
            .map_err(|_| ThumbError::StrategyTimeout {
                strategy: kind,
                after: budget,
            })??,
        None => strategy.try_render(req).await?,
    };
    if png.is_empty() || !is_png(&png) {
        return Err(ThumbError::render(kind, "output is not a PNG"));
    }
    Ok(png)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        config::ThumbnailConfig,
        document::AnimationDocument,
        foundation::core::Canvas,
        strategy::Capabilities,
    };

    fn req(doc: serde_json::Value) -> RenderRequest {
        let doc = AnimationDocument::from_value(doc).unwrap();
        RenderRequest::with_canvas(&doc, Canvas::new(16, 16).unwrap())
    }

    #[tokio::test]
    async fn no_capabilities_is_the_minimal_png() {
        let cfg = ThumbnailConfig::default();
        let mut strategies = Capabilities::none().build_strategies(&cfg);
        let out = run_cascade(&mut strategies, &req(json!({"layers": []}))).await;
        assert_eq!(out.strategy, StrategyKind::Placeholder);
        assert_eq!(out.png, MINIMAL_PNG.to_vec());
        assert_eq!(out.attempts.len(), 1);
    }

    #[tokio::test]
    async fn emulated_render_wins_for_readable_data() {
        let mut cfg = ThumbnailConfig::default();
        cfg.settle.emulated_ms = 0;
        let mut strategies = Capabilities::in_process().build_strategies(&cfg);
        let out = run_cascade(
            &mut strategies,
            &req(json!({"w": 16, "h": 16, "ip": 0, "op": 10, "layers": [
                {"ty": 1, "sw": 16, "sh": 16, "sc": "#00ff00"}
            ]})),
        )
        .await;
        assert_eq!(out.strategy, StrategyKind::EmulatedDomCanvas);
        let img = image::load_from_memory(&out.png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(8, 8).0, [0, 255, 0, 255]);
    }

    #[tokio::test]
    async fn data_failure_falls_through_to_the_static_composite() {
        let mut cfg = ThumbnailConfig::default();
        cfg.settle.emulated_ms = 0;
        let mut strategies = Capabilities::in_process().build_strategies(&cfg);
        let out = run_cascade(
            &mut strategies,
            &req(json!({"v": "5.7.4", "assets": [], "layers": 5})),
        )
        .await;
        assert_eq!(out.strategy, StrategyKind::StaticComposite);
        let failure = out.attempts[0].failure.as_deref().unwrap();
        assert!(failure.contains("engine data failed"), "{failure}");
    }

    #[tokio::test]
    async fn timeouts_advance_the_cascade() {
        let mut cfg = ThumbnailConfig::default();
        cfg.timeouts.emulated_ms = 0;
        let mut strategies = Capabilities::in_process().build_strategies(&cfg);
        let out = run_cascade(&mut strategies, &req(json!({"layers": []}))).await;
        assert_eq!(out.strategy, StrategyKind::StaticComposite);
        assert_eq!(out.attempts[0].strategy, StrategyKind::EmulatedDomCanvas);
        assert!(
            out.attempts[0]
                .failure
                .as_deref()
                .unwrap()
                .contains("strategy timeout")
        );
    }

    #[tokio::test]
    async fn budget_cuts_off_slow_engine_painting() {
        let mut cfg = ThumbnailConfig::default();
        cfg.timeouts.emulated_ms = 20;
        cfg.settle.emulated_ms = 0;
        // Translucent full-canvas stars, stacked: seconds of rasterization, not milliseconds.
        let layers: Vec<_> = (0..16)
            .map(|i| {
                json!({"ty": 4, "ip": 0, "op": 10, "shapes": [
                    {"ty": "sr", "p": {"k": [500, 500]}, "pt": {"k": 2048},
                     "or": {"k": 700}, "ir": {"k": 450}, "r": {"k": i}, "sy": 1},
                    {"ty": "fl", "c": {"k": [0.2, 0.4, 0.6, 1]}, "o": {"k": 50}}
                ]})
            })
            .collect();
        let doc = AnimationDocument::from_value(
            json!({"w": 1000, "h": 1000, "ip": 0, "op": 10, "layers": layers}),
        )
        .unwrap();
        let req = RenderRequest::with_canvas(&doc, Canvas::new(1000, 1000).unwrap());
        let mut strategies = Capabilities::in_process().build_strategies(&cfg);

        let started = Instant::now();
        let err = attempt(&mut strategies[0], &req).await.unwrap_err();
        let elapsed = started.elapsed();
        strategies[0].release().await.unwrap();

        assert!(
            matches!(
                err,
                ThumbError::StrategyTimeout {
                    strategy: StrategyKind::EmulatedDomCanvas,
                    ..
                }
            ),
            "{err}"
        );
        assert!(elapsed < Duration::from_millis(1_000), "{elapsed:?}");
    }
}
