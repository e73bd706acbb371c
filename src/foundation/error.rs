use std::time::Duration;

use crate::strategy::StrategyKind;

pub type ThumbResult<T> = Result<T, ThumbError>;

#[derive(thiserror::Error, Debug)]
pub enum ThumbError {
    #[error("invalid input format: {0}")]
    InvalidInputFormat(String),

    #[error("asset resolution failure: {0}")]
    AssetResolution(String),

    #[error("asset resolution failure: zip is {size} bytes, limit is {limit} bytes")]
    ZipTooLarge { size: u64, limit: u64 },

    #[error("strategy timeout: {strategy} exceeded {}ms", .after.as_millis())]
    StrategyTimeout {
        strategy: StrategyKind,
        after: Duration,
    },

    #[error("strategy render error: {strategy}: {reason}")]
    StrategyRender {
        strategy: StrategyKind,
        reason: String,
    },

    #[error("engine data failed: {0}")]
    EngineDataFailed(String),

    #[error("resource cleanup failure: {0}")]
    ResourceCleanup(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ThumbError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInputFormat(msg.into())
    }

    pub fn asset_resolution(msg: impl Into<String>) -> Self {
        Self::AssetResolution(msg.into())
    }

    pub fn render(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self::StrategyRender {
            strategy,
            reason: reason.into(),
        }
    }

    pub fn data_failed(msg: impl Into<String>) -> Self {
        Self::EngineDataFailed(msg.into())
    }

    pub fn cleanup(msg: impl Into<String>) -> Self {
        Self::ResourceCleanup(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors with no fallback: the input is not an animation we can read at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidInputFormat(_)
                | Self::AssetResolution(_)
                | Self::ZipTooLarge { .. }
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ThumbError::invalid_input("x")
                .to_string()
                .contains("invalid input format:")
        );
        assert!(
            ThumbError::asset_resolution("x")
                .to_string()
                .contains("asset resolution failure:")
        );
        assert!(
            ThumbError::ZipTooLarge {
                size: 25,
                limit: 20
            }
            .to_string()
            .contains("asset resolution failure:")
        );
        assert!(
            ThumbError::data_failed("x")
                .to_string()
                .contains("engine data failed:")
        );
        assert!(
            ThumbError::cleanup("x")
                .to_string()
                .contains("resource cleanup failure:")
        );
    }

    #[test]
    fn timeout_reports_strategy_and_budget() {
        let err = ThumbError::StrategyTimeout {
            strategy: StrategyKind::EmulatedDomCanvas,
            after: Duration::from_millis(8000),
        };
        let s = err.to_string();
        assert!(s.contains("emulated_dom_canvas"));
        assert!(s.contains("8000ms"));
    }

    #[test]
    fn only_input_errors_are_fatal() {
        assert!(ThumbError::invalid_input("x").is_fatal());
        assert!(ThumbError::asset_resolution("x").is_fatal());
        assert!(ThumbError::ZipTooLarge { size: 2, limit: 1 }.is_fatal());
        assert!(!ThumbError::data_failed("x").is_fatal());
        assert!(!ThumbError::render(StrategyKind::BrowserScreenshot, "x").is_fatal());
        assert!(!ThumbError::cleanup("x").is_fatal());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ThumbError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
