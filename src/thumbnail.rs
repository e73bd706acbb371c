use std::{
    io::{Read as _, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use tracing::{info, instrument, warn};

use crate::{
    bundle::{ExtractedBundle, ZIP_MAGIC, check_zip_size, has_zip_magic},
    cascade::{CascadeOutcome, run_cascade},
    config::ThumbnailConfig,
    document::AnimationDocument,
    foundation::error::{ThumbError, ThumbResult},
    request::{RenderRequest, ThumbnailMetadata, ThumbnailResult},
    strategy::Capabilities,
};

/// Where to read the animation and where to write its thumbnail.
#[derive(Clone, Debug)]
pub struct ThumbnailJob {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl ThumbnailJob {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Receives the metadata record once the thumbnail file is in place.
pub trait MetadataSink {
    fn record(&mut self, metadata: &ThumbnailMetadata);
}

impl MetadataSink for Option<ThumbnailMetadata> {
    fn record(&mut self, metadata: &ThumbnailMetadata) {
        *self = Some(metadata.clone());
    }
}

impl MetadataSink for Vec<ThumbnailMetadata> {
    fn record(&mut self, metadata: &ThumbnailMetadata) {
        self.push(metadata.clone());
    }
}

/// Render `req` through the strategies `caps` allows.
pub async fn render_request(
    req: &RenderRequest,
    caps: &Capabilities,
    cfg: &ThumbnailConfig,
) -> CascadeOutcome {
    let mut strategies = caps.build_strategies(cfg);
    run_cascade(&mut strategies, req).await
}

/// Document in, PNG and metadata out. Always produces an image.
pub async fn render_pipeline(
    doc: &AnimationDocument,
    name: &str,
    is_zip: bool,
    caps: &Capabilities,
    cfg: &ThumbnailConfig,
) -> ThumbnailResult {
    let req = RenderRequest::new(doc, cfg);
    let outcome = render_request(&req, caps, cfg).await;
    let metadata = ThumbnailMetadata::describe(
        doc,
        &req,
        name.to_string(),
        is_zip,
        outcome.strategy,
    );
    ThumbnailResult {
        png: outcome.png,
        metadata,
    }
}

/// Read the animation at `job.source`, write its thumbnail to `job.destination`.
///
/// Fails only when the input is not a usable animation (or the output cannot be written);
/// rendering problems are absorbed by the cascade. The destination is replaced atomically,
/// and the extraction directory of a bundle is gone by the time this returns.
#[instrument(skip_all, fields(source = %job.source.display()))]
pub async fn generate_thumbnail(
    job: &ThumbnailJob,
    sink: &mut dyn MetadataSink,
    cfg: &ThumbnailConfig,
    caps: &Capabilities,
) -> ThumbResult<ThumbnailMetadata> {
    let is_zip = sniff_zip(&job.source)?;
    let fallback_name = file_stem(&job.source);

    let doc = if is_zip {
        // Size alone decides, before any extraction work.
        check_zip_size(&job.source, cfg.max_zip_bytes)?;
        let source = job.source.clone();
        let (max_zip, max_unpacked) = (cfg.max_zip_bytes, cfg.max_unpacked_bytes);
        let bundle = tokio::task::spawn_blocking(move || {
            ExtractedBundle::extract(&source, max_zip, max_unpacked)
        })
        .await
        .map_err(|e| ThumbError::asset_resolution(format!("extraction task failed: {e}")))??;

        let resolved = bundle.find_lottie_json().and_then(|found| {
            info!(entry = %found.entry, "lottie document found in bundle");
            bundle.inline_assets(&found.document, &found.base_dir)
        });
        if let Err(e) = bundle.close() {
            warn!(error = %e, "extraction directory cleanup");
        }
        resolved?
    } else {
        let bytes = tokio::fs::read(&job.source)
            .await
            .with_context(|| format!("read '{}'", job.source.display()))?;
        AnimationDocument::parse(&bytes)?
    };

    let name = doc.name().map(str::to_string).unwrap_or(fallback_name);
    let result = render_pipeline(&doc, &name, is_zip, caps, cfg).await;

    let destination = job.destination.clone();
    let png = result.png;
    let written = tokio::task::spawn_blocking(move || write_atomically(&destination, &png))
        .await
        .map_err(|e| ThumbError::Other(anyhow::anyhow!("write task failed: {e}")))??;

    info!(
        strategy = %result.metadata.thumbnail_type,
        width = result.metadata.thumbnail_width,
        height = result.metadata.thumbnail_height,
        bytes = written,
        "thumbnail written"
    );
    sink.record(&result.metadata);
    Ok(result.metadata)
}

fn sniff_zip(path: &Path) -> ThumbResult<bool> {
    let mut head = [0u8; ZIP_MAGIC.len() + 1];
    let mut file =
        std::fs::File::open(path).with_context(|| format!("open '{}'", path.display()))?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file
            .read(&mut head[filled..])
            .with_context(|| format!("read '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(has_zip_magic(&head[..filled]))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("animation")
        .to_string()
}

/// Write to a sibling temp file, then rename over `dest`. Returns the size on disk.
fn write_atomically(dest: &Path, png: &[u8]) -> ThumbResult<u64> {
    if png.is_empty() {
        return Err(ThumbError::Other(anyhow::anyhow!("refusing to write an empty thumbnail")));
    }
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("create output dir '{}'", parent.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".thumb_")
        .suffix(".png.part")
        .tempfile_in(&parent)
        .with_context(|| format!("create temp file in '{}'", parent.display()))?;
    tmp.write_all(png).context("write thumbnail")?;
    tmp.as_file().sync_all().context("sync thumbnail")?;
    tmp.persist(dest)
        .map_err(|e| anyhow::anyhow!("rename into '{}': {}", dest.display(), e.error))?;

    let size = std::fs::metadata(dest)
        .with_context(|| format!("stat '{}'", dest.display()))?
        .len();
    if size == 0 {
        return Err(ThumbError::Other(anyhow::anyhow!(
            "'{}' is empty after write",
            dest.display()
        )));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "lottie_thumb_{name}_{}_{}",
            std::process::id(),
            nanos
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn atomic_write_replaces_and_creates_parents() {
        let dir = temp_dir("atomic");
        let dest = dir.join("nested/out.png");
        assert_eq!(write_atomically(&dest, b"first").unwrap(), 5);
        assert_eq!(write_atomically(&dest, b"second!").unwrap(), 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"second!");
        let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(write_atomically(&dir.join("empty.png"), b"").is_err());
        assert!(!dir.join("empty.png").exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn zip_sniffing_reads_only_the_header() {
        let dir = temp_dir("sniff");
        let zip = dir.join("a.lottie");
        std::fs::write(&zip, [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00]).unwrap();
        let json = dir.join("b.zip");
        std::fs::write(&json, br#"{"layers": []}"#).unwrap();
        let short = dir.join("c.zip");
        std::fs::write(&short, [0x50, 0x4B, 0x03, 0x04]).unwrap();
        assert!(sniff_zip(&zip).unwrap());
        assert!(!sniff_zip(&json).unwrap());
        assert!(!sniff_zip(&short).unwrap());
        assert!(sniff_zip(&dir.join("missing")).is_err());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn metadata_sinks() {
        let doc = AnimationDocument::from_value(serde_json::json!({"layers": []})).unwrap();
        let req = RenderRequest::new(&doc, &ThumbnailConfig::default());
        let m = ThumbnailMetadata::describe(
            &doc,
            &req,
            "x".into(),
            false,
            crate::strategy::StrategyKind::Placeholder,
        );
        let mut one: Option<ThumbnailMetadata> = None;
        one.record(&m);
        assert_eq!(one.as_ref(), Some(&m));
        let mut all = Vec::new();
        all.record(&m);
        all.record(&m);
        assert_eq!(all.len(), 2);
    }
}
