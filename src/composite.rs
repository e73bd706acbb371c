use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::{
    capture::pixmap_to_png,
    decode::{DecodedImage, decode_data_uri_image},
    document::AnimationDocument,
    engine::paint::affine_to_cpu,
    foundation::{
        core::{Affine, Rgba8, Vec2},
        error::{ThumbError, ThumbResult},
    },
    request::RenderRequest,
    strategy::StrategyKind,
};

/// Background plus one representative image, no animation engine involved.
#[derive(Debug)]
pub struct CompositeStrategy {
    budget: Duration,
}

impl CompositeStrategy {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Runs [`render_static_composite`] off the async runtime so the cascade's timeout can fire.
    pub(crate) async fn try_render(&mut self, req: &RenderRequest) -> ThumbResult<Vec<u8>> {
        let req = req.clone();
        tokio::task::spawn_blocking(move || render_static_composite(&req))
            .await
            .map_err(|e| ThumbError::render(StrategyKind::StaticComposite, e.to_string()))?
    }
}

/// The image of the first layer, when it is an image layer whose asset is embedded.
pub fn representative_image(doc: &AnimationDocument) -> Option<DecodedImage> {
    let asset = doc.first_layer_image_asset()?;
    let p = asset.get("p").and_then(Value::as_str)?;
    if !p.starts_with("data:") {
        debug!("first layer image is not embedded");
        return None;
    }
    match decode_data_uri_image(p) {
        Ok(img) => Some(img),
        Err(e) => {
            debug!(error = %e, "first layer image did not decode");
            None
        }
    }
}

/// Scale `iw`x`ih` to fit inside `cw`x`ch`, preserving aspect ratio, centered.
pub fn contain(iw: f64, ih: f64, cw: f64, ch: f64) -> Affine {
    if iw <= 0.0 || ih <= 0.0 {
        return Affine::IDENTITY;
    }
    let scale = (cw / iw).min(ch / ih);
    Affine::translate(Vec2::new(
        (cw - iw * scale) / 2.0,
        (ch - ih * scale) / 2.0,
    )) * Affine::scale(scale)
}

pub fn render_static_composite(req: &RenderRequest) -> ThumbResult<Vec<u8>> {
    let (w, h) = req.canvas.as_u16()?;
    let bg = req
        .document
        .background()
        .and_then(Rgba8::from_hex)
        .unwrap_or(Rgba8::WHITE);

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(w), f64::from(h)));

    if let Some(img) = representative_image(&req.document) {
        let (iw, ih) = (f64::from(img.width), f64::from(img.height));
        ctx.set_transform(affine_to_cpu(contain(iw, ih, f64::from(w), f64::from(h))));
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(img.to_paint()?);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw, ih));
    }

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);
    pixmap_to_png(&pixmap)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::{bundle::data_uri, foundation::core::Canvas};

    fn png_uri(w: u32, h: u32, rgba: [u8; 4]) -> String {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        data_uri("image/png", &buf)
    }

    fn pixels(png: &[u8]) -> image::RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    #[test]
    fn contain_centers_tall_images() {
        let f = contain(50.0, 100.0, 100.0, 100.0);
        let tl = f * crate::foundation::core::Point::ORIGIN;
        assert_eq!((tl.x, tl.y), (25.0, 0.0));
    }

    #[test]
    fn white_background_without_image() {
        let doc = AnimationDocument::from_value(json!({"w": 8, "h": 8, "layers": []})).unwrap();
        let req = RenderRequest::with_canvas(&doc, Canvas::new(8, 8).unwrap());
        let px = pixels(&render_static_composite(&req).unwrap());
        assert_eq!(px.dimensions(), (8, 8));
        assert!(px.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn declared_background_and_centered_image() {
        let doc = AnimationDocument::from_value(json!({
            "w": 20, "h": 10, "bg": "#000000",
            "assets": [{"id": "img_0", "w": 10, "h": 10, "u": "", "p": png_uri(10, 10, [255, 0, 0, 255]), "e": 1}],
            "layers": [{"ty": 2, "refId": "img_0"}]
        }))
        .unwrap();
        let req = RenderRequest::with_canvas(&doc, Canvas::new(20, 10).unwrap());
        let px = pixels(&render_static_composite(&req).unwrap());
        assert_eq!(px.get_pixel(0, 5).0, [0, 0, 0, 255]);
        assert_eq!(px.get_pixel(10, 5).0, [255, 0, 0, 255]);
        assert_eq!(px.get_pixel(19, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn image_only_counts_when_it_is_the_first_layer() {
        let doc = AnimationDocument::from_value(json!({
            "w": 4, "h": 4,
            "assets": [{"id": "a", "p": png_uri(1, 1, [0, 0, 255, 255])}],
            "layers": [{"ty": 4, "shapes": []}, {"ty": 2, "refId": "a"}]
        }))
        .unwrap();
        assert!(representative_image(&doc).is_none());
    }
}
