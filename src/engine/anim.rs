use serde_json::Value;

use super::ease::Ease;
use crate::foundation::core::{BezPath, Point};

pub trait Lerp: Sized {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        a + (b - a) * t
    }
}

impl Lerp for Vec<f64> {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        a.iter()
            .enumerate()
            .map(|(i, av)| match b.get(i) {
                Some(bv) => f64::lerp(av, bv, t),
                None => *av,
            })
            .collect()
    }
}

/// Values a property can be read as.
pub trait FromLottie: Sized {
    fn from_lottie(v: &Value) -> Option<Self>;
}

impl FromLottie for f64 {
    fn from_lottie(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::Array(a) => a.first().and_then(Value::as_f64),
            _ => None,
        }
    }
}

impl FromLottie for Vec<f64> {
    fn from_lottie(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64().map(|x| vec![x]),
            Value::Array(a) => a.iter().map(Value::as_f64).collect(),
            _ => None,
        }
    }
}

/// A bezier path in Lottie's vertex / in-tangent / out-tangent form. Tangents are relative.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathShape {
    pub closed: bool,
    pub vertices: Vec<[f64; 2]>,
    pub in_tangents: Vec<[f64; 2]>,
    pub out_tangents: Vec<[f64; 2]>,
}

impl PathShape {
    pub fn to_bezpath(&self) -> BezPath {
        let mut bp = BezPath::new();
        let n = self.vertices.len();
        if n == 0 {
            return bp;
        }
        let pt = |p: [f64; 2]| Point::new(p[0], p[1]);
        let tangent = |list: &[[f64; 2]], i: usize| list.get(i).copied().unwrap_or([0.0, 0.0]);

        bp.move_to(pt(self.vertices[0]));
        let segments = if self.closed { n } else { n - 1 };
        for i in 0..segments {
            let j = (i + 1) % n;
            let (a, b) = (self.vertices[i], self.vertices[j]);
            let o = tangent(&self.out_tangents, i);
            let t = tangent(&self.in_tangents, j);
            bp.curve_to(
                pt([a[0] + o[0], a[1] + o[1]]),
                pt([b[0] + t[0], b[1] + t[1]]),
                pt(b),
            );
        }
        if self.closed {
            bp.close_path();
        }
        bp
    }
}

fn points(v: Option<&Value>) -> Vec<[f64; 2]> {
    v.and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|p| {
                    let p = p.as_array()?;
                    Some([p.first()?.as_f64()?, p.get(1)?.as_f64()?])
                })
                .collect()
        })
        .unwrap_or_default()
}

impl FromLottie for PathShape {
    fn from_lottie(v: &Value) -> Option<Self> {
        // Keyframe values wrap the shape in a one-element array.
        let obj = match v {
            Value::Array(a) => a.first()?.as_object()?,
            Value::Object(o) => o,
            _ => return None,
        };
        Some(Self {
            closed: obj.get("c").and_then(Value::as_bool).unwrap_or(false),
            vertices: points(obj.get("v")),
            in_tangents: points(obj.get("i")),
            out_tangents: points(obj.get("o")),
        })
    }
}

impl Lerp for PathShape {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        if a.vertices.len() != b.vertices.len() {
            return if t < 1.0 { a.clone() } else { b.clone() };
        }
        let mix = |xs: &[[f64; 2]], ys: &[[f64; 2]]| {
            xs.iter()
                .zip(ys)
                .map(|(x, y)| [f64::lerp(&x[0], &y[0], t), f64::lerp(&x[1], &y[1], t)])
                .collect()
        };
        Self {
            closed: a.closed,
            vertices: mix(&a.vertices, &b.vertices),
            in_tangents: mix(&a.in_tangents, &b.in_tangents),
            out_tangents: mix(&a.out_tangents, &b.out_tangents),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub time: f64,
    pub start: Option<Value>,
    /// Explicit end value (older exporters); otherwise the next key's start.
    pub end: Option<Value>,
    pub ease: Ease,
}

fn first_component(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::Array(a) => a.first().and_then(Value::as_f64),
        _ => None,
    }
}

impl Keyframe {
    fn parse(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let time = obj.get("t").and_then(Value::as_f64)?;
        let hold = obj
            .get("h")
            .is_some_and(|h| h.as_f64() == Some(1.0) || h.as_bool() == Some(true));
        let tangent = |key: &str| {
            let t = obj.get(key)?;
            Some((first_component(t.get("x"))?, first_component(t.get("y"))?))
        };
        let ease = if hold {
            Ease::Hold
        } else {
            match (tangent("o"), tangent("i")) {
                (Some((x1, y1)), Some((x2, y2))) => Ease::bezier(x1, y1, x2, y2),
                _ => Ease::Linear,
            }
        };
        Some(Self {
            time,
            start: obj.get("s").cloned(),
            end: obj.get("e").cloned(),
            ease,
        })
    }
}

/// An animatable Lottie property: `{"a": 0|1, "k": ...}`.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(from = "Value")]
pub enum Property {
    Static(Value),
    Keyed(Vec<Keyframe>),
}

impl From<Value> for Property {
    fn from(v: Value) -> Self {
        let k = match v {
            Value::Object(mut obj) => obj.remove("k").unwrap_or(Value::Null),
            other => other,
        };
        let is_keyed = k
            .as_array()
            .and_then(|a| a.first())
            .is_some_and(|first| first.get("t").is_some());
        if !is_keyed {
            return Self::Static(k);
        }
        let mut keys: Vec<Keyframe> = k
            .as_array()
            .map(|a| a.iter().filter_map(Keyframe::parse).collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self::Keyed(keys)
    }
}

impl Property {
    pub fn constant(v: Value) -> Self {
        Self::Static(v)
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, Self::Keyed(k) if k.len() > 1)
    }

    fn key_value<T: FromLottie>(keys: &[Keyframe], i: usize) -> Option<T> {
        let k = keys.get(i)?;
        if let Some(v) = k.start.as_ref().and_then(T::from_lottie) {
            return Some(v);
        }
        let prev = keys.get(i.checked_sub(1)?)?;
        prev.end.as_ref().and_then(T::from_lottie)
    }

    pub fn sample<T: FromLottie + Lerp>(&self, frame: f64) -> Option<T> {
        let keys = match self {
            Self::Static(v) => return T::from_lottie(v),
            Self::Keyed(keys) => keys,
        };
        if keys.is_empty() {
            return None;
        }

        let idx = keys.partition_point(|k| k.time <= frame);
        if idx == 0 {
            return Self::key_value(keys, 0);
        }
        if idx >= keys.len() {
            return Self::key_value(keys, keys.len() - 1);
        }

        let a = &keys[idx - 1];
        let b = &keys[idx];
        let start: T = Self::key_value(keys, idx - 1)?;
        let denom = b.time - a.time;
        if denom <= 0.0 || a.ease == Ease::Hold {
            return Some(start);
        }
        let end = a
            .end
            .as_ref()
            .and_then(T::from_lottie)
            .or_else(|| b.start.as_ref().and_then(T::from_lottie));
        let Some(end) = end else {
            return Some(start);
        };

        let t = (frame - a.time) / denom;
        Some(T::lerp(&start, &end, a.ease.apply(t)))
    }

    pub fn sample_or<T: FromLottie + Lerp>(&self, frame: f64, default: T) -> T {
        self.sample(frame).unwrap_or(default)
    }
}

/// Sample an optional property, falling back to `default` when absent or unreadable.
pub fn sample_opt<T: FromLottie + Lerp>(p: Option<&Property>, frame: f64, default: T) -> T {
    match p {
        Some(p) => p.sample_or(frame, default),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn static_values() {
        let p = Property::from(json!({"a": 0, "k": [10, 20]}));
        assert_eq!(p.sample::<Vec<f64>>(5.0), Some(vec![10.0, 20.0]));
        assert_eq!(p.sample::<f64>(5.0), Some(10.0));
        assert!(!p.is_animated());

        let bare = Property::from(json!(42));
        assert_eq!(bare.sample::<f64>(0.0), Some(42.0));
    }

    #[test]
    fn linear_keys_interpolate_and_clamp() {
        let p = Property::from(json!({"a": 1, "k": [
            {"t": 0, "s": [0]},
            {"t": 10, "s": [100]}
        ]}));
        assert!(p.is_animated());
        assert_eq!(p.sample::<f64>(-5.0), Some(0.0));
        assert_eq!(p.sample::<f64>(5.0), Some(50.0));
        assert_eq!(p.sample::<f64>(10.0), Some(100.0));
        assert_eq!(p.sample::<f64>(50.0), Some(100.0));
    }

    #[test]
    fn hold_keys_step() {
        let p = Property::from(json!({"a": 1, "k": [
            {"t": 0, "s": [0], "h": 1},
            {"t": 10, "s": [100]}
        ]}));
        assert_eq!(p.sample::<f64>(9.9), Some(0.0));
        assert_eq!(p.sample::<f64>(10.0), Some(100.0));
    }

    #[test]
    fn legacy_end_values() {
        let p = Property::from(json!({"a": 1, "k": [
            {"t": 0, "s": [0], "e": [20]},
            {"t": 10}
        ]}));
        assert_eq!(p.sample::<f64>(5.0), Some(10.0));
        assert_eq!(p.sample::<f64>(12.0), Some(20.0));
    }

    #[test]
    fn eased_keys_use_out_and_in_tangents() {
        let p = Property::from(json!({"a": 1, "k": [
            {"t": 0, "s": [0], "o": {"x": [0.42], "y": [0]}, "i": {"x": [0.58], "y": [1]}},
            {"t": 10, "s": [100]}
        ]}));
        let early = p.sample::<f64>(2.5).unwrap();
        assert!(early < 25.0, "{early}");
        assert!((p.sample::<f64>(5.0).unwrap() - 50.0).abs() < 0.1);
    }

    #[test]
    fn closed_path_has_one_segment_per_vertex() {
        let p = Property::from(json!({"a": 0, "k": {
            "c": true,
            "v": [[0, 0], [10, 0], [10, 10]],
            "i": [[0, 0], [0, 0], [0, 0]],
            "o": [[0, 0], [0, 0], [0, 0]]
        }}));
        let shape: PathShape = p.sample(0.0).unwrap();
        let bp = shape.to_bezpath();
        // move + 3 curves + close
        assert_eq!(bp.elements().len(), 5);
    }

    #[test]
    fn mismatched_paths_snap() {
        let a = PathShape {
            vertices: vec![[0.0, 0.0]],
            ..PathShape::default()
        };
        let b = PathShape {
            vertices: vec![[1.0, 1.0], [2.0, 2.0]],
            ..PathShape::default()
        };
        assert_eq!(PathShape::lerp(&a, &b, 0.5), a);
        assert_eq!(PathShape::lerp(&a, &b, 1.0), b);
    }
}
