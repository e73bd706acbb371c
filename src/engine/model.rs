//! Typed view of the parts of a Lottie document the engine draws.
//!
//! Parsing is lenient below the top level: a layer or shape item that does not parse is
//! dropped, so one odd item does not take the whole animation down. The top level itself
//! must be an object with a `layers` array (when present).

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use super::anim::Property;

fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Vec::<Value>::deserialize(d)?;
    Ok(raw
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<T>(v) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(error = %e, "skipping unreadable item");
                None
            }
        })
        .collect())
}

fn lenient_opt_vec<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    lenient_vec(d).map(Some)
}

/// `true`/`false` or `0`/`1`.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        _ => false,
    })
}

/// Ids are strings in practice, numbers now and then.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Value::deserialize(d)?.as_f64())
}

fn default_size() -> f64 {
    512.0
}

fn default_frame_rate() -> f64 {
    30.0
}

fn far_future() -> f64 {
    f64::MAX
}

fn one() -> f64 {
    1.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct Composition {
    #[serde(default = "default_size")]
    pub w: f64,
    #[serde(default = "default_size")]
    pub h: f64,
    #[serde(default)]
    pub ip: f64,
    #[serde(default)]
    pub op: f64,
    #[serde(default = "default_frame_rate")]
    pub fr: f64,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub layers: Vec<Layer>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub assets: Vec<Asset>,
}

impl Composition {
    pub fn from_value(v: &Value) -> Result<Self, String> {
        if !v.is_object() {
            return Err("animation data is not an object".to_string());
        }
        if v.get("layers").is_some_and(|l| !l.is_array()) {
            return Err("`layers` is not an array".to_string());
        }
        Self::deserialize(v).map_err(|e| e.to_string())
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn total_frames(&self) -> f64 {
        self.op - self.ip
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Asset {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_f64")]
    pub w: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub h: Option<f64>,
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default)]
    pub p: Option<String>,
    /// Present on precomposition assets.
    #[serde(default, deserialize_with = "lenient_opt_vec")]
    pub layers: Option<Vec<Layer>>,
}

pub const LAYER_PRECOMP: u32 = 0;
pub const LAYER_SOLID: u32 = 1;
pub const LAYER_IMAGE: u32 = 2;
pub const LAYER_NULL: u32 = 3;
pub const LAYER_SHAPE: u32 = 4;

#[derive(Clone, Debug, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub ty: u32,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub ind: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub parent: Option<f64>,
    #[serde(default)]
    pub ip: f64,
    #[serde(default = "far_future")]
    pub op: f64,
    #[serde(default)]
    pub st: f64,
    #[serde(default = "one")]
    pub sr: f64,
    #[serde(default)]
    pub ks: Transform,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub shapes: Vec<Shape>,
    #[serde(default, rename = "refId")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub sw: f64,
    #[serde(default)]
    pub sh: f64,
    #[serde(default)]
    pub sc: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

impl Layer {
    pub fn visible_at(&self, frame: f64) -> bool {
        !self.hd && frame >= self.ip && frame < self.op
    }

    /// Frame in the layer's own time, for its properties and precomp contents.
    pub fn local_frame(&self, frame: f64) -> f64 {
        let sr = if self.sr.abs() > f64::EPSILON { self.sr } else { 1.0 };
        (frame - self.st) / sr
    }
}

/// Layer or group transform.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub a: Option<Property>,
    #[serde(default)]
    pub p: Option<Position>,
    #[serde(default)]
    pub s: Option<Property>,
    #[serde(default)]
    pub r: Option<Property>,
    /// 3D layers carry their z rotation here.
    #[serde(default)]
    pub rz: Option<Property>,
    #[serde(default)]
    pub o: Option<Property>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Position {
    Split { x: Property, y: Property },
    Combined(Property),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "ty")]
pub enum Shape {
    #[serde(rename = "gr")]
    Group(Group),
    #[serde(rename = "rc")]
    Rect(RectShape),
    #[serde(rename = "el")]
    Ellipse(EllipseShape),
    #[serde(rename = "sh")]
    Path(PathItem),
    #[serde(rename = "sr")]
    Star(StarShape),
    #[serde(rename = "fl")]
    Fill(FillStyle),
    #[serde(rename = "st")]
    Stroke(StrokeStyle),
    #[serde(rename = "tr")]
    Transform(Transform),
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Group {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub it: Vec<Shape>,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RectShape {
    pub p: Property,
    pub s: Property,
    #[serde(default)]
    pub r: Option<Property>,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EllipseShape {
    pub p: Property,
    pub s: Property,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PathItem {
    pub ks: Property,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

pub const STAR: u8 = 1;
pub const POLYGON: u8 = 2;

#[derive(Clone, Debug, Deserialize)]
pub struct StarShape {
    pub p: Property,
    pub pt: Property,
    #[serde(rename = "or")]
    pub outer_radius: Property,
    #[serde(default, rename = "ir")]
    pub inner_radius: Option<Property>,
    #[serde(default)]
    pub r: Option<Property>,
    #[serde(default = "star_kind")]
    pub sy: u8,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

fn star_kind() -> u8 {
    STAR
}

#[derive(Clone, Debug, Deserialize)]
pub struct FillStyle {
    pub c: Property,
    #[serde(default)]
    pub o: Option<Property>,
    /// 1 non-zero, 2 even-odd.
    #[serde(default = "fill_rule_default")]
    pub r: u8,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

fn fill_rule_default() -> u8 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct StrokeStyle {
    pub c: Property,
    #[serde(default)]
    pub o: Option<Property>,
    pub w: Property,
    #[serde(default, deserialize_with = "flag")]
    pub hd: bool,
}

impl Shape {
    pub fn hidden(&self) -> bool {
        match self {
            Self::Group(g) => g.hd,
            Self::Rect(s) => s.hd,
            Self::Ellipse(s) => s.hd,
            Self::Path(s) => s.hd,
            Self::Star(s) => s.hd,
            Self::Fill(s) => s.hd,
            Self::Stroke(s) => s.hd,
            Self::Transform(_) | Self::Unsupported => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_array_layers_fail() {
        assert!(Composition::from_value(&json!({"v": "5", "assets": [], "layers": 5})).is_err());
        assert!(Composition::from_value(&json!([1])).is_err());
    }

    #[test]
    fn bad_items_are_dropped_not_fatal() {
        let comp = Composition::from_value(&json!({
            "w": 100, "h": 50, "ip": 0, "op": 60, "fr": 30,
            "layers": [
                {"ty": 4, "shapes": [
                    {"ty": "gr", "it": [
                        {"ty": "rc", "p": {"k": [0, 0]}, "s": {"k": [10, 10]}},
                        {"ty": "gf"},
                        {"ty": "fl", "c": {"k": [1, 0, 0, 1]}}
                    ]},
                    {"ty": "el"}
                ]},
                "not a layer"
            ]
        }))
        .unwrap();
        assert_eq!(comp.layers.len(), 1);
        assert_eq!(comp.total_frames(), 60.0);
        let shapes = &comp.layers[0].shapes;
        assert_eq!(shapes.len(), 1);
        let Shape::Group(g) = &shapes[0] else {
            panic!("expected group");
        };
        assert!(matches!(g.it[1], Shape::Unsupported));
        assert_eq!(g.it.len(), 3);
    }

    #[test]
    fn split_and_combined_positions() {
        let t: Transform = serde_json::from_value(json!({
            "p": {"s": true, "x": {"k": 10}, "y": {"k": 20}}
        }))
        .unwrap();
        assert!(matches!(t.p, Some(Position::Split { .. })));

        let t: Transform = serde_json::from_value(json!({"p": {"a": 0, "k": [1, 2]}})).unwrap();
        assert!(matches!(t.p, Some(Position::Combined(_))));
    }

    #[test]
    fn layer_timing() {
        let l: Layer =
            serde_json::from_value(json!({"ty": 3, "ip": 10, "op": 20, "st": 5})).unwrap();
        assert!(!l.visible_at(9.0));
        assert!(l.visible_at(10.0));
        assert!(!l.visible_at(20.0));
        assert_eq!(l.local_frame(15.0), 10.0);

        let hidden: Layer = serde_json::from_value(json!({"ty": 4, "hd": true})).unwrap();
        assert!(!hidden.visible_at(0.0));
    }
}
