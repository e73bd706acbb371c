use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::foundation::error::{ThumbError, ThumbResult};

pub const DEFAULT_SMALL_SIZE_THRESHOLD: u32 = 250;
pub const DEFAULT_MAX_ZIP_BYTES: u64 = 20 * 1024 * 1024;

/// Per-strategy time budgets in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Whole browser attempt, launch included.
    pub browser_ms: u64,
    pub browser_launch_ms: u64,
    /// How long to wait for the engine's loaded/failed signal.
    pub signal_ms: u64,
    pub emulated_ms: u64,
    pub static_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            browser_ms: 20_000,
            browser_launch_ms: 8_000,
            signal_ms: 3_000,
            emulated_ms: 8_000,
            static_ms: 5_000,
        }
    }
}

impl Timeouts {
    pub fn browser(&self) -> Duration {
        Duration::from_millis(self.browser_ms)
    }

    pub fn browser_launch(&self) -> Duration {
        Duration::from_millis(self.browser_launch_ms)
    }

    pub fn signal(&self) -> Duration {
        Duration::from_millis(self.signal_ms)
    }

    pub fn emulated(&self) -> Duration {
        Duration::from_millis(self.emulated_ms)
    }

    pub fn static_composite(&self) -> Duration {
        Duration::from_millis(self.static_ms)
    }
}

/// Settle delays applied before capture.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    pub browser_ms: u64,
    pub emulated_ms: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            browser_ms: 300,
            emulated_ms: 200,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Both declared dimensions must be below this for the small-size upscale to apply.
    pub small_size_threshold: u32,
    pub small_size_scale: u32,
    pub max_zip_bytes: u64,
    /// Cap on the total uncompressed size of a bundle.
    pub max_unpacked_bytes: u64,
    pub timeouts: Timeouts,
    pub settle: SettleDelays,
    pub browser_path: Option<PathBuf>,
    pub engine_script: Option<PathBuf>,
    pub disable_browser: bool,
    pub disable_emulated: bool,
    pub disable_raster: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            small_size_threshold: DEFAULT_SMALL_SIZE_THRESHOLD,
            small_size_scale: 2,
            max_zip_bytes: DEFAULT_MAX_ZIP_BYTES,
            max_unpacked_bytes: 200 * 1024 * 1024,
            timeouts: Timeouts::default(),
            settle: SettleDelays::default(),
            browser_path: None,
            engine_script: None,
            disable_browser: false,
            disable_emulated: false,
            disable_raster: false,
        }
    }
}

impl ThumbnailConfig {
    pub fn from_json_file(path: &Path) -> ThumbResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .map_err(|e| ThumbError::config(format!("parse '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay `LOTTIE_THUMB_*` environment variables. Unparsable values are ignored.
    pub fn apply_env(mut self) -> Self {
        self.apply_env_from(|k| std::env::var(k).ok());
        self
    }

    pub(crate) fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(p) = var("LOTTIE_THUMB_BROWSER").filter(|v| !v.is_empty()) {
            self.browser_path = Some(PathBuf::from(p));
        }
        if let Some(p) = var("LOTTIE_THUMB_ENGINE_SCRIPT").filter(|v| !v.is_empty()) {
            self.engine_script = Some(PathBuf::from(p));
        }
        if let Some(b) = var("LOTTIE_THUMB_DISABLE_BROWSER").and_then(|v| parse_flag(&v)) {
            self.disable_browser = b;
        }
        if let Some(b) = var("LOTTIE_THUMB_DISABLE_EMULATED").and_then(|v| parse_flag(&v)) {
            self.disable_emulated = b;
        }
        if let Some(ms) = var("LOTTIE_THUMB_SETTLE_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.settle.browser_ms = ms;
            self.settle.emulated_ms = ms;
        }
    }

    pub fn validate(&self) -> ThumbResult<()> {
        if self.small_size_threshold == 0 {
            return Err(ThumbError::config("small_size_threshold must be > 0"));
        }
        if self.small_size_scale == 0 {
            return Err(ThumbError::config("small_size_scale must be > 0"));
        }
        if self.max_zip_bytes == 0 || self.max_unpacked_bytes == 0 {
            return Err(ThumbError::config("zip size limits must be > 0"));
        }
        Ok(())
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
