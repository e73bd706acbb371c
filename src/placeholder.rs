use tracing::warn;

use crate::{
    capture::pixmap_to_png, foundation::error::ThumbResult, request::RenderRequest,
};

/// A valid 1x1 transparent PNG.
pub const MINIMAL_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Last resort of the cascade. Never fails.
#[derive(Debug)]
pub struct PlaceholderStrategy {
    raster: bool,
}

impl PlaceholderStrategy {
    /// `raster: false` skips straight to [`MINIMAL_PNG`].
    pub fn new(raster: bool) -> Self {
        Self { raster }
    }

    pub fn render(&self, req: &RenderRequest) -> Vec<u8> {
        if !self.raster {
            return MINIMAL_PNG.to_vec();
        }
        match play_glyph(req.width(), req.height()) {
            Ok(png) => png,
            Err(e) => {
                warn!(error = %e, "placeholder glyph failed, using minimal png");
                MINIMAL_PNG.to_vec()
            }
        }
    }
}

/// Translucent circle with a play triangle, sized from the shorter side.
pub fn play_glyph(width: u32, height: u32) -> ThumbResult<Vec<u8>> {
    let canvas = crate::foundation::core::Canvas::new(width, height)?;
    let (w, h) = canvas.as_u16()?;
    let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
    let radius = f64::from(w.min(h)) * 0.25;

    let circle = vello_cpu::kurbo::Circle::new((cx, cy), radius);
    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 51));
    ctx.fill_path(&vello_cpu::kurbo::Shape::to_path(&circle, 0.1));
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 77));
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(2.0));
    ctx.stroke_path(&vello_cpu::kurbo::Shape::to_path(&circle, 0.1));

    // Right-pointing triangle, 0.6 of the radius across, centred on the circle.
    let half = radius * 0.6 / 2.0;
    let mut tri = vello_cpu::kurbo::BezPath::new();
    tri.move_to((cx - half, cy - half));
    tri.line_to((cx - half, cy + half));
    tri.line_to((cx + half, cy));
    tri.close_path();
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
    ctx.fill_path(&tri);

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);
    pixmap_to_png(&pixmap)
}
