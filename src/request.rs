use crate::{
    config::ThumbnailConfig,
    document::AnimationDocument,
    foundation::core::Canvas,
    strategy::StrategyKind,
};

/// One render job: output size plus an owned copy of the document.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub canvas: Canvas,
    pub scale: u32,
    pub document: AnimationDocument,
}

impl RenderRequest {
    pub fn new(document: &AnimationDocument, cfg: &ThumbnailConfig) -> Self {
        let declared = document.declared_canvas();
        let scale = thumbnail_scale(declared, cfg.small_size_threshold, cfg.small_size_scale);
        Self {
            canvas: declared.scaled(scale),
            scale,
            document: document.clone(),
        }
    }

    /// Request an explicit size, bypassing the small-size rule.
    pub fn with_canvas(document: &AnimationDocument, canvas: Canvas) -> Self {
        Self {
            canvas,
            scale: 1,
            document: document.clone(),
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.width
    }

    pub fn height(&self) -> u32 {
        self.canvas.height
    }
}

/// Upscale factor for small animations: both sides must be under `threshold`.
pub fn thumbnail_scale(declared: Canvas, threshold: u32, small_scale: u32) -> u32 {
    if declared.width < threshold && declared.height < threshold {
        small_scale
    } else {
        1
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailMetadata {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub duration_secs: f64,
    /// Duration rounded to two decimals, e.g. `"2s"` or `"2.53s"`.
    pub duration: String,
    /// e.g. `"30fps"`.
    pub frame_rate_label: String,
    pub total_frames: f64,
    pub name: String,
    pub is_zip: bool,
    pub thumbnail_scale: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub thumbnail_type: StrategyKind,
}

impl ThumbnailMetadata {
    pub fn describe(
        doc: &AnimationDocument,
        req: &RenderRequest,
        name: String,
        is_zip: bool,
        produced_by: StrategyKind,
    ) -> Self {
        let duration_secs = doc.duration_secs();
        Self {
            width: doc.width(),
            height: doc.height(),
            frame_rate: doc.frame_rate(),
            duration_secs,
            duration: duration_label(duration_secs),
            frame_rate_label: format!("{}fps", doc.frame_rate()),
            total_frames: doc.total_frames(),
            name,
            is_zip,
            thumbnail_scale: req.scale,
            thumbnail_width: req.width(),
            thumbnail_height: req.height(),
            thumbnail_type: produced_by,
        }
    }
}

pub fn duration_label(secs: f64) -> String {
    let rounded = (secs * 100.0).round() / 100.0;
    format!("{rounded}s")
}

/// Terminal output of the pipeline.
#[derive(Clone, Debug)]
pub struct ThumbnailResult {
    pub png: Vec<u8>,
    pub metadata: ThumbnailMetadata,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(w: u32, h: u32) -> AnimationDocument {
        AnimationDocument::from_value(json!({"w": w, "h": h, "layers": []})).unwrap()
    }

    #[test]
    fn small_documents_are_doubled() {
        let cfg = ThumbnailConfig::default();
        let req = RenderRequest::new(&doc(100, 100), &cfg);
        assert_eq!(req.scale, 2);
        assert_eq!(req.canvas, Canvas::new(200, 200).unwrap());
    }

    #[test]
    fn threshold_is_exclusive_and_needs_both_sides() {
        let cfg = ThumbnailConfig::default();
        for (w, h) in [(250, 100), (100, 250), (249, 600), (250, 250), (1920, 1080)] {
            let req = RenderRequest::new(&doc(w, h), &cfg);
            assert_eq!(req.scale, 1, "{w}x{h}");
            assert_eq!(req.canvas, Canvas::new(w, h).unwrap());
        }
        let req = RenderRequest::new(&doc(249, 249), &cfg);
        assert_eq!(req.canvas, Canvas::new(498, 498).unwrap());
    }

    #[test]
    fn labels() {
        assert_eq!(duration_label(2.0), "2s");
        assert_eq!(duration_label(2.5333), "2.53s");
        assert_eq!(duration_label(0.0), "0s");
    }

    #[test]
    fn metadata_serializes_camel_case() {
        let d = AnimationDocument::from_value(json!({
            "v": "5.6.5", "fr": 30, "ip": 0, "op": 60, "w": 100, "h": 100, "layers": []
        }))
        .unwrap();
        let req = RenderRequest::new(&d, &ThumbnailConfig::default());
        let meta = ThumbnailMetadata::describe(
            &d,
            &req,
            "demo".to_string(),
            false,
            StrategyKind::Placeholder,
        );
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["duration"], json!("2s"));
        assert_eq!(v["frameRateLabel"], json!("30fps"));
        assert_eq!(v["thumbnailWidth"], json!(200));
        assert_eq!(v["totalFrames"], json!(60.0));
        assert_eq!(v["thumbnailType"], json!("placeholder"));
    }
}
