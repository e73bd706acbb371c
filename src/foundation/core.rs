use crate::foundation::error::{ThumbError, ThumbResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Absolute 0-based frame index in animation timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> ThumbResult<Self> {
        if width == 0 || height == 0 {
            return Err(ThumbError::invalid_input(
                "canvas width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn scaled(self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
        }
    }

    /// Dimensions as `u16`, which is what the raster backends accept.
    pub fn as_u16(self) -> ThumbResult<(u16, u16)> {
        let w: u16 = self
            .width
            .try_into()
            .map_err(|_| ThumbError::invalid_input("canvas width exceeds u16"))?;
        let h: u16 = self
            .height
            .try_into()
            .map_err(|_| ThumbError::invalid_input("canvas height exceeds u16"))?;
        Ok((w, h))
    }
}

/// Straight-alpha RGBA8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => {
                let nib = |i: usize| {
                    let v = u8::from_str_radix(hex.get(i..i + 1)?, 16).ok()?;
                    Some(v * 17)
                };
                Some(Self::new(nib(0)?, nib(1)?, nib(2)?, 255))
            }
            6 => Some(Self::new(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    /// Lottie colours are `[r, g, b]` or `[r, g, b, a]` in `0..=1`.
    pub fn from_unit(components: &[f64]) -> Self {
        fn unit(v: f64) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        let c = |i: usize, default: f64| components.get(i).copied().unwrap_or(default);
        Self::new(unit(c(0, 0.0)), unit(c(1, 0.0)), unit(c(2, 0.0)), unit(c(3, 1.0)))
    }

    pub fn with_opacity(self, opacity: f64) -> Self {
        let a = (f64::from(self.a) * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        px[0] = mul_div255(u16::from(px[0]), a) as u8;
        px[1] = mul_div255(u16::from(px[1]), a) as u8;
        px[2] = mul_div255(u16::from(px[2]), a) as u8;
    }
}

pub(crate) fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_rejects_zero() {
        assert!(Canvas::new(0, 10).is_err());
        assert_eq!(Canvas::new(4, 5).unwrap().scaled(2), Canvas::new(8, 10).unwrap());
    }

    #[test]
    fn canvas_u16_bounds() {
        assert!(Canvas::new(70_000, 1).unwrap().as_u16().is_err());
        assert_eq!(Canvas::new(300, 200).unwrap().as_u16().unwrap(), (300, 200));
    }

    #[test]
    fn hex_forms() {
        assert_eq!(Rgba8::from_hex("#ffffff"), Some(Rgba8::WHITE));
        assert_eq!(Rgba8::from_hex("f00"), Some(Rgba8::new(255, 0, 0, 255)));
        assert_eq!(
            Rgba8::from_hex("#00ff0080"),
            Some(Rgba8::new(0, 255, 0, 128))
        );
        assert_eq!(Rgba8::from_hex("#12"), None);
        assert_eq!(Rgba8::from_hex("#zzzzzz"), None);
    }

    #[test]
    fn unit_colour_defaults_alpha() {
        assert_eq!(
            Rgba8::from_unit(&[1.0, 0.5, 0.0]),
            Rgba8::new(255, 128, 0, 255)
        );
    }

    #[test]
    fn premul_roundtrip_is_close() {
        let mut px = vec![200u8, 100, 50, 128];
        premultiply_rgba8_in_place(&mut px);
        assert_eq!(px[3], 128);
        unpremultiply_rgba8_in_place(&mut px);
        assert!((i16::from(px[0]) - 200).abs() <= 2);
        assert!((i16::from(px[1]) - 100).abs() <= 2);
        assert!((i16::from(px[2]) - 50).abs() <= 2);
    }
}
