use std::{
    collections::BTreeMap,
    io::{Cursor, Read as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use base64::Engine as _;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    document::{AnimationDocument, is_lottie_value},
    foundation::error::{ThumbError, ThumbResult},
};

/// Local file header signature, `PK\x03\x04`.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

pub fn has_zip_magic(bytes: &[u8]) -> bool {
    bytes.len() > ZIP_MAGIC.len() && bytes[..4] == ZIP_MAGIC
}

/// Reject oversized bundles from file metadata alone, before anything is read.
pub fn check_zip_size(path: &Path, limit: u64) -> ThumbResult<u64> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("stat '{}'", path.display()))?
        .len();
    if size > limit {
        return Err(ThumbError::ZipTooLarge { size, limit });
    }
    Ok(size)
}

/// MIME type for an asset file name, by extension.
pub fn mime_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Normalize an archive entry name to a relative `/`-separated path.
pub(crate) fn normalize_entry_name(source: &str) -> ThumbResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(ThumbError::asset_resolution(format!(
            "archive entry '{source}' is absolute"
        )));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(ThumbError::asset_resolution(format!(
                "archive entry '{source}' escapes the archive"
            )));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(ThumbError::asset_resolution(format!(
            "archive entry '{source}' has no file name"
        )));
    }
    Ok(out.join("/"))
}

/// Join `dir` and `file` lexically, dropping `.` and empty segments.
fn join_rel(dir: &str, file: &str) -> String {
    dir.split(['/', '\\'])
        .chain(file.split(['/', '\\']))
        .filter(|p| !p.is_empty() && *p != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn parent_dir(name: &str) -> &str {
    name.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
}

#[derive(Debug)]
struct BundleEntry {
    name: String,
    bytes: Vec<u8>,
}

/// The unpacked contents of an input file, backed by a temporary directory.
///
/// The directory is removed when the bundle is closed or dropped, whichever comes first.
#[derive(Debug)]
pub struct ExtractedBundle {
    dir: tempfile::TempDir,
    entries: Vec<BundleEntry>,
    index: BTreeMap<String, usize>,
    is_zip: bool,
}

/// The Lottie JSON found inside a bundle.
#[derive(Debug)]
pub struct FoundDocument {
    pub entry: String,
    /// Directory of `entry` inside the bundle, `""` at the root.
    pub base_dir: String,
    pub document: AnimationDocument,
}

impl ExtractedBundle {
    /// Unpack `path`. Files without the ZIP signature are kept as a single entry under their
    /// own file name.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn extract(path: &Path, max_zip_bytes: u64, max_unpacked_bytes: u64) -> ThumbResult<Self> {
        let size = check_zip_size(path, max_zip_bytes)?;
        debug!(size, "bundle size ok");

        let dir = tempfile::Builder::new()
            .prefix("lottie_zip_")
            .tempdir()
            .context("create extraction directory")?;
        let bytes =
            std::fs::read(path).with_context(|| format!("read '{}'", path.display()))?;

        let mut bundle = Self {
            dir,
            entries: Vec::new(),
            index: BTreeMap::new(),
            is_zip: has_zip_magic(&bytes),
        };

        if !bundle.is_zip {
            info!("no zip signature, treating input as a plain JSON file");
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("animation.json")
                .to_string();
            bundle.insert(name, bytes)?;
            return Ok(bundle);
        }

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ThumbError::asset_resolution(format!("corrupt zip archive: {e}")))?;

        let mut unpacked: u64 = 0;
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| ThumbError::asset_resolution(format!("corrupt zip entry {i}: {e}")))?;
            if file.is_dir() {
                continue;
            }
            let name = match normalize_entry_name(file.name()) {
                Ok(n) => n,
                Err(e) => {
                    warn!(entry = file.name(), error = %e, "skipping archive entry");
                    continue;
                }
            };

            let remaining = max_unpacked_bytes.saturating_sub(unpacked);
            let mut data = Vec::with_capacity(file.size().min(remaining) as usize);
            (&mut file)
                .take(remaining.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| {
                    ThumbError::asset_resolution(format!("failed to inflate '{name}': {e}"))
                })?;
            unpacked += data.len() as u64;
            if unpacked > max_unpacked_bytes {
                return Err(ThumbError::asset_resolution(format!(
                    "archive unpacks to more than {max_unpacked_bytes} bytes"
                )));
            }
            bundle.insert(name, data)?;
        }

        info!(entries = bundle.entries.len(), unpacked, "zip extracted");
        Ok(bundle)
    }

    fn insert(&mut self, name: String, bytes: Vec<u8>) -> ThumbResult<()> {
        let dest = self.dir.path().join(&name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create '{}'", parent.display()))?;
        }
        std::fs::write(&dest, &bytes).with_context(|| format!("write '{}'", dest.display()))?;
        debug!(entry = %name, bytes = bytes.len(), "extracted");

        match self.index.get(&name) {
            Some(&i) => self.entries[i].bytes = bytes,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(BundleEntry { name, bytes });
            }
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn is_zip(&self) -> bool {
        self.is_zip
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.index
            .get(name)
            .map(|&i| self.entries[i].bytes.as_slice())
    }

    /// Entry names in archive order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// On-disk location of an entry.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.index.contains_key(name).then(|| self.dir.path().join(name))
    }

    /// Locate the one Lottie document in the bundle.
    ///
    /// JSON-looking entries (`*.json`, or named `data` / `animation`) are parsed in archive
    /// order and the first valid one wins. Failing that, the first entry whose text mentions
    /// `"layers"` and `"v"` or `"fr"` is taken, and it must still validate.
    pub fn find_lottie_json(&self) -> ThumbResult<FoundDocument> {
        let found = |entry: &BundleEntry, document| FoundDocument {
            entry: entry.name.clone(),
            base_dir: parent_dir(&entry.name).to_string(),
            document,
        };

        for entry in self.entries.iter().filter(|e| looks_like_json_name(&e.name)) {
            let Ok(value) = serde_json::from_slice::<Value>(strip_bom(&entry.bytes)) else {
                continue;
            };
            if is_lottie_value(&value) {
                let doc = AnimationDocument::from_value(value)
                    .map_err(|e| ThumbError::asset_resolution(e.to_string()))?;
                return Ok(found(entry, doc));
            }
        }

        let sniffed = self.entries.iter().find(|e| {
            let text = String::from_utf8_lossy(&e.bytes);
            text.contains("\"layers\"") && (text.contains("\"v\"") || text.contains("\"fr\""))
        });
        let Some(entry) = sniffed else {
            return Err(ThumbError::asset_resolution(
                "no Lottie JSON found in bundle",
            ));
        };
        let doc = AnimationDocument::parse(&entry.bytes).map_err(|e| {
            ThumbError::asset_resolution(format!(
                "'{}' is not a valid Lottie document: {e}",
                entry.name
            ))
        })?;
        Ok(found(entry, doc))
    }

    /// Resolve an asset reference against the bundle, falling back to any entry with the same
    /// file name.
    pub fn find_image(&self, file_name: &str, base_dir: &str) -> Option<&[u8]> {
        let mut candidates = vec![file_name.to_string()];
        if !base_dir.is_empty() {
            candidates.push(format!("{base_dir}/{file_name}"));
        }
        candidates.push(format!("images/{file_name}"));
        candidates.push(file_name.trim_start_matches("./").to_string());
        candidates.push(file_name.trim_start_matches('/').to_string());

        if let Some(hit) = candidates.iter().find_map(|c| self.get(c)) {
            return Some(hit);
        }

        let wanted = basename(file_name);
        if wanted.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| basename(&e.name) == wanted)
            .map(|e| e.bytes.as_slice())
    }

    /// Copy `doc` with every bundle-relative image asset replaced by a `data:` URI.
    pub fn inline_assets(
        &self,
        doc: &AnimationDocument,
        base_dir: &str,
    ) -> ThumbResult<AnimationDocument> {
        let mut inlined = 0usize;
        let patched = doc.with_patched_assets(|asset| {
            let Some(p) = asset.get("p").and_then(Value::as_str) else {
                return;
            };
            if p.starts_with("data:") {
                return;
            }
            let file_name = match asset.get("u").and_then(Value::as_str) {
                Some(u) if !u.is_empty() => join_rel(u, p),
                _ => p.to_string(),
            };
            match self.find_image(&file_name, base_dir) {
                Some(bytes) => {
                    let uri = data_uri(mime_for(&file_name), bytes);
                    asset.insert("p".to_string(), Value::String(uri));
                    asset.insert("u".to_string(), Value::String(String::new()));
                    asset.insert("e".to_string(), Value::from(1));
                    inlined += 1;
                    debug!(asset = %file_name, "asset inlined");
                }
                None => warn!(asset = %file_name, "asset not found in bundle"),
            }
        })?;
        info!(inlined, "bundle assets resolved");
        Ok(patched)
    }

    /// Remove the extraction directory now, reporting failure instead of swallowing it.
    pub fn close(self) -> ThumbResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            ThumbError::cleanup(format!("remove '{}': {e}", path.display()))
        })
    }
}

fn looks_like_json_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let base = basename(&lower);
    lower.ends_with(".json") || base == "data" || base == "animation"
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Decode a `data:<mime>;base64,<payload>` URI into its MIME type and bytes.
pub fn decode_data_uri(uri: &str) -> Option<(&str, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;
    Some((mime, bytes))
}
