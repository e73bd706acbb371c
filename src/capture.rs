use std::{io::Cursor, time::Duration};

use anyhow::Context as _;
use image::ImageEncoder as _;

use crate::{
    bridge::Surface,
    foundation::{
        core::unpremultiply_rgba8_in_place,
        error::{ThumbError, ThumbResult},
    },
    strategy::StrategyKind,
};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Encode straight-alpha RGBA8 as PNG.
pub fn rgba_to_png(rgba: &[u8], width: u32, height: u32) -> ThumbResult<Vec<u8>> {
    let expected = (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4);
    if rgba.len() != expected {
        return Err(ThumbError::invalid_input(format!(
            "rgba buffer is {} bytes, {width}x{height} needs {expected}",
            rgba.len()
        )));
    }
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(Cursor::new(&mut out))
        .write_image(rgba, width, height, image::ExtendedColorType::Rgba8)
        .context("encode png")?;
    Ok(out)
}

/// Encode a premultiplied pixmap as straight-alpha PNG.
pub fn pixmap_to_png(pixmap: &vello_cpu::Pixmap) -> ThumbResult<Vec<u8>> {
    let mut rgba = pixmap.data_as_u8_slice().to_vec();
    unpremultiply_rgba8_in_place(&mut rgba);
    rgba_to_png(
        &rgba,
        u32::from(pixmap.width()),
        u32::from(pixmap.height()),
    )
}

/// Let the surface settle, then read it back. Anything that is not a PNG is a render failure.
pub(crate) async fn capture<S: Surface>(
    surface: &mut S,
    strategy: StrategyKind,
    settle: Duration,
) -> ThumbResult<Vec<u8>> {
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    let png = surface.capture_raster().await?;
    if !is_png(&png) {
        return Err(ThumbError::render(
            strategy,
            format!("capture returned {} bytes that are not a PNG", png.len()),
        ));
    }
    Ok(png)
}
