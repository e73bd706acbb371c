use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use tracing::{debug, warn};

/// Relative location of the engine bundle inside a `lottie-web` package.
const ENGINE_PACKAGE_PATH: &str = "lottie-web/build/player/lottie.min.js";

/// A located render-engine script and its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineScript {
    pub path: PathBuf,
    pub content: Arc<str>,
}

impl EngineScript {
    pub fn from_source(path: impl Into<PathBuf>, content: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    fn read(path: &Path) -> Option<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => Some(Self::from_source(path, text)),
            Ok(_) => {
                warn!(path = %path.display(), "engine script is empty, skipping");
                None
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "engine script unreadable");
                None
            }
        }
    }
}

/// Find the render engine script.
///
/// An explicit path wins. Otherwise a short list of locations relative to the executable and
/// the working directory is tried, then every `NODE_PATH` entry. The search result is cached
/// for the life of the process.
pub fn locate_render_engine(explicit: Option<&Path>) -> Option<EngineScript> {
    if let Some(p) = explicit {
        return EngineScript::read(p);
    }
    static FOUND: OnceLock<Option<EngineScript>> = OnceLock::new();
    FOUND
        .get_or_init(|| {
            let node_path = std::env::var_os("NODE_PATH");
            let mut candidates = engine_candidates(exe_dir().as_deref(), cwd().as_deref());
            if let Some(np) = node_path {
                candidates.extend(std::env::split_paths(&np).map(|d| d.join(ENGINE_PACKAGE_PATH)));
            }
            let found = candidates
                .iter()
                .filter(|p| p.is_file())
                .find_map(|p| EngineScript::read(p));
            match &found {
                Some(s) => debug!(path = %s.path.display(), "render engine located"),
                None => debug!("no render engine script found"),
            }
            found
        })
        .clone()
}

fn engine_candidates(exe_dir: Option<&Path>, cwd: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for base in exe_dir.into_iter().chain(cwd) {
        out.push(base.join("lottie.min.js"));
        out.push(base.join("vendor").join("lottie.min.js"));
        out.push(base.join("node_modules").join(ENGINE_PACKAGE_PATH));
        out.push(base.join("..").join("node_modules").join(ENGINE_PACKAGE_PATH));
        out.push(base.join("../..").join("node_modules").join(ENGINE_PACKAGE_PATH));
    }
    out
}

/// Find a local Chromium-family browser. Absence is not an error.
pub fn locate_browser_executable(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        if p.is_file() {
            return Some(p.to_path_buf());
        }
        warn!(path = %p.display(), "configured browser does not exist, searching defaults");
    }
    static FOUND: OnceLock<Option<PathBuf>> = OnceLock::new();
    FOUND
        .get_or_init(|| {
            let candidates = browser_candidates(std::env::consts::OS, dirs::home_dir().as_deref());
            let found = first_existing(&candidates);
            match &found {
                Some(p) => debug!(path = %p.display(), "browser located"),
                None => debug!(os = std::env::consts::OS, "no local browser found"),
            }
            found
        })
        .clone()
}

/// Well-known install locations, in priority order.
pub fn browser_candidates(os: &str, home: Option<&Path>) -> Vec<PathBuf> {
    let user = |rel: &str| home.map(|h| h.join(rel));
    match os {
        "windows" => [
            Some(PathBuf::from(
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            )),
            Some(PathBuf::from(
                r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
            )),
            user(r"AppData\Local\Microsoft\Edge\Application\msedge.exe"),
            Some(PathBuf::from(
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            )),
            Some(PathBuf::from(
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            )),
            user(r"AppData\Local\Google\Chrome\Application\chrome.exe"),
        ]
        .into_iter()
        .flatten()
        .collect(),
        "macos" => [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect(),
        "linux" => [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/bin/microsoft-edge",
            "/usr/bin/microsoft-edge-stable",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect(),
        _ => Vec::new(),
    }
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
}

fn cwd() -> Option<PathBuf> {
    std::env::current_dir().ok()
}
