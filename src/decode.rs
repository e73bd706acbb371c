use std::sync::Arc;

use anyhow::Context;

use crate::{
    bundle::decode_data_uri,
    foundation::{
        core::premultiply_rgba8_in_place,
        error::{ThumbError, ThumbResult},
    },
};

/// Largest side an SVG asset is rasterized at.
const MAX_SVG_SIDE: f32 = 4096.0;

/// A decoded bitmap, premultiplied RGBA8.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl DecodedImage {
    pub fn to_pixmap(&self) -> ThumbResult<vello_cpu::Pixmap> {
        let w: u16 = self
            .width
            .try_into()
            .map_err(|_| ThumbError::invalid_input("image width exceeds u16"))?;
        let h: u16 = self
            .height
            .try_into()
            .map_err(|_| ThumbError::invalid_input("image height exceeds u16"))?;
        if self.rgba8_premul.len() != usize::from(w) * usize::from(h) * 4 {
            return Err(ThumbError::invalid_input("image byte len mismatch"));
        }
        // Pixmap stores PremulRgba8; our bytes are already premultiplied.
        let pixels = self
            .rgba8_premul
            .chunks_exact(4)
            .map(|px| {
                vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]])
            })
            .collect::<Vec<_>>();
        Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
    }

    /// Image paint for `vello_cpu`, sampling the bitmap at its natural size.
    pub fn to_paint(&self) -> ThumbResult<vello_cpu::Image> {
        Ok(vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(self.to_pixmap()?)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        })
    }
}

pub fn decode_image(bytes: &[u8]) -> ThumbResult<DecodedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(DecodedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// Rasterize an SVG at its intrinsic size, capped at [`MAX_SVG_SIDE`].
pub fn decode_svg(bytes: &[u8]) -> ThumbResult<DecodedImage> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts).context("parse svg tree")?;

    let size = tree.size();
    let (sw, sh) = (size.width(), size.height());
    if !sw.is_finite() || !sh.is_finite() || sw <= 0.0 || sh <= 0.0 {
        return Err(ThumbError::invalid_input("svg has invalid width/height"));
    }
    let scale = (MAX_SVG_SIDE / sw.max(sh)).min(1.0);
    let width = ((sw * scale).ceil() as u32).max(1);
    let height = ((sh * scale).ceil() as u32).max(1);

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ThumbError::invalid_input("failed to allocate svg pixmap"))?;
    let xform = resvg::tiny_skia::Transform::from_scale(width as f32 / sw, height as f32 / sh);
    resvg::render(&tree, xform, &mut pixmap.as_mut());

    Ok(DecodedImage {
        width,
        height,
        rgba8_premul: Arc::new(pixmap.data().to_vec()),
    })
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

/// Decode raster or SVG bytes; `mime` is a hint, the content decides when absent.
pub fn decode_asset_bytes(mime: Option<&str>, bytes: &[u8]) -> ThumbResult<DecodedImage> {
    if mime == Some("image/svg+xml") || looks_like_svg(bytes) {
        decode_svg(bytes)
    } else {
        decode_image(bytes)
    }
}

/// Decode an inline `data:` asset reference.
pub fn decode_data_uri_image(uri: &str) -> ThumbResult<DecodedImage> {
    let (mime, bytes) =
        decode_data_uri(uri).ok_or_else(|| ThumbError::invalid_input("malformed data URI"))?;
    decode_asset_bytes(Some(mime), &bytes)
}
