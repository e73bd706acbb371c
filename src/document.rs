use serde_json::{Map, Value};

use crate::foundation::{
    core::Canvas,
    error::{ThumbError, ThumbResult},
};

const FALLBACK_DIMENSION: u32 = 512;
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Lottie layer type tag for image layers.
pub const LAYER_TYPE_IMAGE: u64 = 2;

/// A parsed Lottie animation.
///
/// The raw JSON is kept verbatim because both engines consume the document as data; the
/// header fields the pipeline needs are read once at parse time.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationDocument {
    raw: Value,
    width: u32,
    height: u32,
    frame_rate: f64,
    in_point: f64,
    out_point: f64,
}

/// `true` when `value` has a layer list, or both a version marker and an asset list.
pub fn is_lottie_value(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has = |k: &str| obj.get(k).is_some_and(|v| !v.is_null());
    has("layers") || (has("v") && has("assets"))
}

impl AnimationDocument {
    pub fn parse(bytes: &[u8]) -> ThumbResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ThumbError::invalid_input(format!("not utf-8 text: {e}")))?;
        // Some exporters emit a BOM.
        let text = text.trim_start_matches('\u{feff}');
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ThumbError::invalid_input(format!("not JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(raw: Value) -> ThumbResult<Self> {
        if !is_lottie_value(&raw) {
            return Err(ThumbError::invalid_input(
                "not a Lottie document (needs `layers`, or `v` and `assets`)",
            ));
        }

        let num = |keys: &[&str]| keys.iter().find_map(|k| raw.get(*k).and_then(Value::as_f64));
        let positive = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);
        let dim = |keys: &[&str]| {
            positive(num(keys))
                .map(|v| v.round().min(f64::from(u32::MAX)) as u32)
                .filter(|v| *v > 0)
                .unwrap_or(FALLBACK_DIMENSION)
        };

        let width = dim(&["w", "width"]);
        let height = dim(&["h", "height"]);
        let frame_rate = positive(num(&["fr"])).unwrap_or(FALLBACK_FRAME_RATE);
        let in_point = num(&["ip"]).filter(|v| v.is_finite()).unwrap_or(0.0);
        let out_point = num(&["op"]).filter(|v| v.is_finite()).unwrap_or(0.0);

        Ok(Self {
            raw,
            width,
            height,
            frame_rate,
            in_point,
            out_point,
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn declared_canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn in_point(&self) -> f64 {
        self.in_point
    }

    pub fn out_point(&self) -> f64 {
        self.out_point
    }

    /// `op - ip`, as the engines report it.
    pub fn total_frames(&self) -> f64 {
        self.out_point - self.in_point
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames() / self.frame_rate
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.get("nm").and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn version(&self) -> Option<&str> {
        self.raw.get("v").and_then(Value::as_str)
    }

    /// Declared background colour (`bg`), if any.
    pub fn background(&self) -> Option<&str> {
        self.raw.get("bg").and_then(Value::as_str)
    }

    pub fn assets(&self) -> &[Value] {
        self.raw
            .get("assets")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn layers(&self) -> &[Value] {
        self.raw
            .get("layers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn asset_by_id(&self, id: &str) -> Option<&Map<String, Value>> {
        self.assets()
            .iter()
            .filter_map(Value::as_object)
            .find(|a| a.get("id").and_then(Value::as_str) == Some(id))
    }

    /// The asset referenced by the first layer, when that layer is an image layer.
    pub fn first_layer_image_asset(&self) -> Option<&Map<String, Value>> {
        let first = self.layers().first()?;
        if first.get("ty").and_then(Value::as_u64) != Some(LAYER_TYPE_IMAGE) {
            return None;
        }
        let ref_id = first.get("refId").and_then(Value::as_str)?;
        self.asset_by_id(ref_id)
    }

    /// Copy the document, rewrite every asset object with `patch`, and re-derive the header.
    pub fn with_patched_assets(
        &self,
        mut patch: impl FnMut(&mut Map<String, Value>),
    ) -> ThumbResult<Self> {
        let mut raw = self.raw.clone();
        if let Some(assets) = raw.get_mut("assets").and_then(Value::as_array_mut) {
            for asset in assets.iter_mut().filter_map(Value::as_object_mut) {
                patch(asset);
            }
        }
        Self::from_value(raw)
    }

    pub fn to_json(&self) -> String {
        self.raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn validity_rule() {
        assert!(is_lottie_value(&json!({"layers": []})));
        assert!(is_lottie_value(&json!({"v": "5.6.5", "assets": []})));
        assert!(!is_lottie_value(&json!({"v": "5.6.5"})));
        assert!(!is_lottie_value(&json!({"assets": []})));
        assert!(!is_lottie_value(&json!([1, 2])));
        assert!(!is_lottie_value(&json!({"layers": null})));
    }

    #[test]
    fn header_fields_and_fallbacks() {
        let doc = AnimationDocument::from_value(json!({
            "v": "5.6.5", "fr": 30, "ip": 0, "op": 60, "w": 100, "h": 100, "layers": []
        }))
        .unwrap();
        assert_eq!(doc.declared_canvas(), Canvas::new(100, 100).unwrap());
        assert_eq!(doc.total_frames(), 60.0);
        assert_eq!(doc.duration_secs(), 2.0);

        let bare = AnimationDocument::from_value(json!({"layers": []})).unwrap();
        assert_eq!(bare.width(), 512);
        assert_eq!(bare.height(), 512);
        assert_eq!(bare.frame_rate(), 30.0);
        assert_eq!(bare.total_frames(), 0.0);

        let alt = AnimationDocument::from_value(json!({"layers": [], "width": 64, "height": 32}))
            .unwrap();
        assert_eq!((alt.width(), alt.height()), (64, 32));
    }

    #[test]
    fn parse_rejects_non_lottie() {
        assert!(matches!(
            AnimationDocument::parse(br#"{"hello": 1}"#),
            Err(ThumbError::InvalidInputFormat(_))
        ));
        assert!(matches!(
            AnimationDocument::parse(b"not json"),
            Err(ThumbError::InvalidInputFormat(_))
        ));
        AnimationDocument::parse("\u{feff}{\"layers\":[]}".as_bytes()).unwrap();
    }

    #[test]
    fn first_layer_image_lookup() {
        let doc = AnimationDocument::from_value(json!({
            "layers": [{"ty": 2, "refId": "img_0"}],
            "assets": [{"id": "img_0", "p": "a.png", "w": 10, "h": 10}]
        }))
        .unwrap();
        let asset = doc.first_layer_image_asset().unwrap();
        assert_eq!(asset.get("p").and_then(Value::as_str), Some("a.png"));

        let shape_first = AnimationDocument::from_value(json!({
            "layers": [{"ty": 4}, {"ty": 2, "refId": "img_0"}],
            "assets": [{"id": "img_0", "p": "a.png"}]
        }))
        .unwrap();
        assert!(shape_first.first_layer_image_asset().is_none());
    }

    #[test]
    fn patching_copies_and_leaves_source_untouched() {
        let doc = AnimationDocument::from_value(json!({
            "layers": [], "assets": [{"id": "a", "p": "x.png"}]
        }))
        .unwrap();
        let patched = doc
            .with_patched_assets(|a| {
                a.insert("p".to_string(), json!("data:image/png;base64,AA=="));
            })
            .unwrap();
        assert_eq!(doc.assets()[0]["p"], json!("x.png"));
        assert_eq!(patched.assets()[0]["p"], json!("data:image/png;base64,AA=="));
    }
}
