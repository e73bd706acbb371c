use std::{
    collections::HashMap,
    f64::consts::PI,
    sync::Arc,
};

use kurbo::Shape as _;

use super::{
    anim::{PathShape, sample_opt},
    model::{
        Composition, EllipseShape, Layer, LAYER_IMAGE, LAYER_PRECOMP, LAYER_SHAPE, LAYER_SOLID,
        POLYGON, Position, RectShape, Shape, StarShape, Transform,
    },
};
use crate::{
    decode::DecodedImage,
    foundation::core::{Affine, BezPath, Point, Rect, Rgba8, Vec2},
};

/// Curve flattening tolerance for ellipses and rounded rects, in layer units.
const TOLERANCE: f64 = 0.1;
/// Deepest precomp nesting or parent chain followed.
const MAX_DEPTH: usize = 16;

#[derive(Clone, Debug)]
pub enum DrawOp {
    Fill {
        path: BezPath,
        transform: Affine,
        color: Rgba8,
        even_odd: bool,
    },
    Stroke {
        path: BezPath,
        transform: Affine,
        color: Rgba8,
        width: f64,
    },
    Image {
        image: Arc<DecodedImage>,
        transform: Affine,
        opacity: f64,
    },
}

/// Decoded image assets by id.
pub type ImageAssets = HashMap<String, Arc<DecodedImage>>;

impl Transform {
    pub fn affine(&self, frame: f64) -> Affine {
        let anchor = sample_opt(self.a.as_ref(), frame, vec![0.0, 0.0]);
        let position = match &self.p {
            Some(Position::Split { x, y }) => vec![x.sample_or(frame, 0.0), y.sample_or(frame, 0.0)],
            Some(Position::Combined(p)) => p.sample_or(frame, vec![0.0, 0.0]),
            None => vec![0.0, 0.0],
        };
        let scale = sample_opt(self.s.as_ref(), frame, vec![100.0, 100.0]);
        let rotation = sample_opt(self.r.as_ref().or(self.rz.as_ref()), frame, 0.0);

        let pair = |v: &[f64], d: f64| {
            Vec2::new(
                v.first().copied().unwrap_or(d),
                v.get(1).copied().unwrap_or(d),
            )
        };
        let a = pair(&anchor, 0.0);
        let p = pair(&position, 0.0);
        let s = pair(&scale, 100.0) / 100.0;

        Affine::translate(p)
            * Affine::rotate(rotation.to_radians())
            * Affine::scale_non_uniform(s.x, s.y)
            * Affine::translate(-a)
    }

    pub fn opacity(&self, frame: f64) -> f64 {
        (sample_opt(self.o.as_ref(), frame, 100.0) / 100.0).clamp(0.0, 1.0)
    }
}

/// Builds the draw list for one frame of a composition.
pub struct SceneBuilder<'a> {
    comp: &'a Composition,
    images: &'a ImageAssets,
    ops: Vec<DrawOp>,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(comp: &'a Composition, images: &'a ImageAssets) -> Self {
        Self {
            comp,
            images,
            ops: Vec::new(),
        }
    }

    /// Draw ops for `frame`, in painter's order, in composition coordinates.
    pub fn build(mut self, frame: f64) -> Vec<DrawOp> {
        let comp = self.comp;
        self.emit_layers(&comp.layers, frame, Affine::IDENTITY, 1.0, 0);
        self.ops
    }

    fn emit_layers(&mut self, layers: &[Layer], frame: f64, base: Affine, opacity: f64, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let (comp, images) = (self.comp, self.images);
        // First layer in the list is the top one.
        for layer in layers.iter().rev() {
            if !layer.visible_at(frame) {
                continue;
            }
            let local = layer.local_frame(frame);
            let xf = base * world_transform(layer, layers, frame);
            let op = opacity * layer.ks.opacity(local);
            if op <= 0.0 {
                continue;
            }

            match layer.ty {
                LAYER_SHAPE => self.emit_shapes(&layer.shapes, local, xf, op),
                LAYER_SOLID => {
                    let color = layer
                        .sc
                        .as_deref()
                        .and_then(Rgba8::from_hex)
                        .unwrap_or(Rgba8::TRANSPARENT);
                    let rect = Rect::new(0.0, 0.0, layer.sw, layer.sh);
                    self.ops.push(DrawOp::Fill {
                        path: rect.to_path(TOLERANCE),
                        transform: xf,
                        color: color.with_opacity(op),
                        even_odd: false,
                    });
                }
                LAYER_IMAGE => {
                    let Some(image) = layer.ref_id.as_ref().and_then(|id| images.get(id)) else {
                        continue;
                    };
                    // Bitmaps are drawn at the asset's declared size.
                    let asset = layer.ref_id.as_deref().and_then(|id| comp.asset(id));
                    let (w, h) = asset
                        .map(|a| {
                            (
                                a.w.unwrap_or(f64::from(image.width)),
                                a.h.unwrap_or(f64::from(image.height)),
                            )
                        })
                        .unwrap_or((f64::from(image.width), f64::from(image.height)));
                    let fit = Affine::scale_non_uniform(
                        w / f64::from(image.width.max(1)),
                        h / f64::from(image.height.max(1)),
                    );
                    self.ops.push(DrawOp::Image {
                        image: image.clone(),
                        transform: xf * fit,
                        opacity: op,
                    });
                }
                LAYER_PRECOMP => {
                    let Some(children) = layer
                        .ref_id
                        .as_deref()
                        .and_then(|id| comp.asset(id))
                        .and_then(|a| a.layers.as_ref())
                    else {
                        continue;
                    };
                    self.emit_layers(children, local, xf, op, depth + 1);
                }
                // Nulls only parent; text, audio and the rest are not drawn.
                _ => {}
            }
        }
    }

    fn emit_shapes(&mut self, items: &[Shape], frame: f64, parent: Affine, opacity: f64) {
        let (xf, op) = match items.iter().find_map(|s| match s {
            Shape::Transform(t) => Some(t),
            _ => None,
        }) {
            Some(t) => (parent * t.affine(frame), opacity * t.opacity(frame)),
            None => (parent, opacity),
        };
        if op <= 0.0 {
            return;
        }

        // Geometry in this group, with its position in the item list.
        let geometry: Vec<(usize, BezPath)> = items
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.hidden())
            .filter_map(|(i, s)| geometry_of(s, frame).map(|p| (i, p)))
            .collect();
        // A style paints the geometry listed before it.
        let above = |idx: usize| {
            let mut path = BezPath::new();
            for (_, p) in geometry.iter().filter(|(gi, _)| *gi < idx) {
                path.extend(p.elements().iter().copied());
            }
            path
        };

        // Bottom of the list paints first.
        for (idx, item) in items.iter().enumerate().rev() {
            if item.hidden() {
                continue;
            }
            match item {
                Shape::Group(g) => self.emit_shapes(&g.it, frame, xf, op),
                Shape::Fill(f) => {
                    let path = above(idx);
                    if path.elements().is_empty() {
                        continue;
                    }
                    let alpha = sample_opt(f.o.as_ref(), frame, 100.0) / 100.0;
                    let color = Rgba8::from_unit(&f.c.sample_or(frame, vec![0.0, 0.0, 0.0]));
                    self.ops.push(DrawOp::Fill {
                        path,
                        transform: xf,
                        color: color.with_opacity(alpha * op),
                        even_odd: f.r == 2,
                    });
                }
                Shape::Stroke(s) => {
                    let path = above(idx);
                    let width = s.w.sample_or(frame, 0.0);
                    if path.elements().is_empty() || width <= 0.0 {
                        continue;
                    }
                    let alpha = sample_opt(s.o.as_ref(), frame, 100.0) / 100.0;
                    let color = Rgba8::from_unit(&s.c.sample_or(frame, vec![0.0, 0.0, 0.0]));
                    self.ops.push(DrawOp::Stroke {
                        path,
                        transform: xf,
                        color: color.with_opacity(alpha * op),
                        width,
                    });
                }
                _ => {}
            }
        }
    }
}

/// Layer transform composed with its parent chain.
fn world_transform(layer: &Layer, siblings: &[Layer], frame: f64) -> Affine {
    let mut xf = layer.ks.affine(layer.local_frame(frame));
    let mut parent = layer.parent;
    for _ in 0..MAX_DEPTH {
        let Some(ind) = parent else {
            break;
        };
        let Some(p) = siblings.iter().find(|l| l.ind == Some(ind)) else {
            break;
        };
        xf = p.ks.affine(p.local_frame(frame)) * xf;
        parent = p.parent;
    }
    xf
}

fn xy(v: &[f64]) -> (f64, f64) {
    (
        v.first().copied().unwrap_or(0.0),
        v.get(1).copied().unwrap_or(0.0),
    )
}

fn geometry_of(shape: &Shape, frame: f64) -> Option<BezPath> {
    match shape {
        Shape::Rect(r) => Some(rect_path(r, frame)),
        Shape::Ellipse(e) => Some(ellipse_path(e, frame)),
        Shape::Path(p) => {
            let shape: PathShape = p.ks.sample(frame)?;
            Some(shape.to_bezpath())
        }
        Shape::Star(s) => Some(star_path(s, frame)),
        _ => None,
    }
}

fn rect_path(r: &RectShape, frame: f64) -> BezPath {
    let (cx, cy) = xy(&r.p.sample_or(frame, vec![0.0, 0.0]));
    let (w, h) = xy(&r.s.sample_or(frame, vec![0.0, 0.0]));
    let radius = sample_opt(r.r.as_ref(), frame, 0.0).clamp(0.0, w.min(h) / 2.0);
    let rect = Rect::from_center_size(Point::new(cx, cy), (w, h));
    if radius > 0.0 {
        rect.to_rounded_rect(radius).to_path(TOLERANCE)
    } else {
        rect.to_path(TOLERANCE)
    }
}

fn ellipse_path(e: &EllipseShape, frame: f64) -> BezPath {
    let (cx, cy) = xy(&e.p.sample_or(frame, vec![0.0, 0.0]));
    let (w, h) = xy(&e.s.sample_or(frame, vec![0.0, 0.0]));
    kurbo::Ellipse::new(Point::new(cx, cy), Vec2::new(w / 2.0, h / 2.0), 0.0).to_path(TOLERANCE)
}

/// Point count cap for stars and polygons.
const MAX_STAR_POINTS: f64 = 2048.0;

fn star_path(s: &StarShape, frame: f64) -> BezPath {
    let mut path = BezPath::new();
    let points = s.pt.sample_or(frame, 5.0).round();
    if !points.is_finite() || points < 3.0 {
        return path;
    }
    let points = points.min(MAX_STAR_POINTS);
    let (cx, cy) = xy(&s.p.sample_or(frame, vec![0.0, 0.0]));
    let outer = s.outer_radius.sample_or(frame, 0.0);
    let inner = sample_opt(s.inner_radius.as_ref(), frame, outer / 2.0);
    let rotation = sample_opt(s.r.as_ref(), frame, 0.0);
    if ![cx, cy, outer, inner, rotation].iter().all(|v| v.is_finite()) {
        return path;
    }

    let is_star = s.sy != POLYGON;
    let total = (if is_star { points * 2.0 } else { points }) as usize;
    let start = (rotation - 90.0).to_radians();
    let step = 2.0 * PI / total as f64;

    for i in 0..total {
        let r = if is_star && i % 2 == 1 { inner } else { outer };
        let angle = start + step * i as f64;
        let p = Point::new(cx + r * angle.cos(), cy + r * angle.sin());
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    path.close_path();
    path
}

#[cfg(test)]
mod tests {
    use kurbo::Shape as _;
    use serde_json::json;

    use super::*;

    fn comp(v: serde_json::Value) -> Composition {
        Composition::from_value(&v).unwrap()
    }

    #[test]
    fn transform_order_is_translate_rotate_scale_anchor() {
        let t: Transform = serde_json::from_value(json!({
            "a": {"k": [10, 0]},
            "p": {"k": [100, 100]},
            "s": {"k": [200, 200]},
            "r": {"k": 90}
        }))
        .unwrap();
        let p = t.affine(0.0) * Point::new(10.0, 0.0);
        assert!((p.x - 100.0).abs() < 1e-9 && (p.y - 100.0).abs() < 1e-9);
        let q = t.affine(0.0) * Point::new(11.0, 0.0);
        assert!((q.x - 100.0).abs() < 1e-9 && (q.y - 102.0).abs() < 1e-9);
    }

    #[test]
    fn fill_paints_geometry_above_it() {
        let c = comp(json!({"w": 100, "h": 100, "op": 10, "layers": [
            {"ty": 4, "shapes": [
                {"ty": "rc", "p": {"k": [50, 50]}, "s": {"k": [20, 20]}},
                {"ty": "fl", "c": {"k": [1, 0, 0, 1]}, "o": {"k": 50}},
                {"ty": "el", "p": {"k": [0, 0]}, "s": {"k": [5, 5]}}
            ]}
        ]}));
        let images = ImageAssets::new();
        let ops = SceneBuilder::new(&c, &images).build(0.0);
        assert_eq!(ops.len(), 1);
        let DrawOp::Fill { path, color, .. } = &ops[0] else {
            panic!("expected fill");
        };
        assert_eq!(*color, Rgba8::new(255, 0, 0, 128));
        let bounds = path.bounding_box();
        assert_eq!(bounds, Rect::new(40.0, 40.0, 60.0, 60.0));
    }

    #[test]
    fn layers_outside_their_range_are_skipped() {
        let c = comp(json!({"w": 10, "h": 10, "op": 60, "layers": [
            {"ty": 1, "sw": 10, "sh": 10, "sc": "#00ff00", "ip": 30, "op": 60}
        ]}));
        let images = ImageAssets::new();
        assert!(SceneBuilder::new(&c, &images).build(10.0).is_empty());
        assert_eq!(SceneBuilder::new(&c, &images).build(30.0).len(), 1);
    }

    #[test]
    fn parenting_and_precomp_offsets() {
        let c = comp(json!({"w": 100, "h": 100, "op": 60,
            "assets": [{"id": "pre", "layers": [
                {"ty": 1, "sw": 4, "sh": 4, "sc": "#0000ff", "ip": 0, "op": 5}
            ]}],
            "layers": [
                {"ty": 0, "refId": "pre", "st": 20, "ip": 0, "op": 60, "parent": 9},
                {"ty": 3, "ind": 9, "ks": {"p": {"k": [30, 40]}}}
            ]
        }));
        let images = ImageAssets::new();
        // Precomp local frame 25 - 20 = 5 is past the inner layer's out point.
        assert!(SceneBuilder::new(&c, &images).build(25.0).is_empty());
        let ops = SceneBuilder::new(&c, &images).build(22.0);
        assert_eq!(ops.len(), 1);
        let DrawOp::Fill { transform, .. } = &ops[0] else {
            panic!("expected fill");
        };
        let origin = *transform * Point::ORIGIN;
        assert_eq!((origin.x, origin.y), (30.0, 40.0));
    }

    #[test]
    fn star_and_polygon_vertex_counts() {
        let star: StarShape = serde_json::from_value(json!({
            "p": {"k": [0, 0]}, "pt": {"k": 5}, "or": {"k": 10}, "ir": {"k": 5}, "sy": 1
        }))
        .unwrap();
        // move + 9 lines + close
        assert_eq!(star_path(&star, 0.0).elements().len(), 11);
        let poly: StarShape = serde_json::from_value(json!({
            "p": {"k": [0, 0]}, "pt": {"k": 6}, "or": {"k": 10}, "sy": 2
        }))
        .unwrap();
        assert_eq!(star_path(&poly, 0.0).elements().len(), 7);
    }

    #[test]
    fn huge_point_counts_are_capped() {
        let star: StarShape = serde_json::from_value(json!({
            "p": {"k": [0, 0]}, "pt": {"k": 1e9}, "or": {"k": 10}, "sy": 1
        }))
        .unwrap();
        let cap = MAX_STAR_POINTS as usize;
        assert_eq!(star_path(&star, 0.0).elements().len(), 2 * cap + 1);

        let poly: StarShape = serde_json::from_value(json!({
            "p": {"k": [0, 0]}, "pt": {"k": 1e12}, "or": {"k": 10}, "sy": 2
        }))
        .unwrap();
        assert_eq!(star_path(&poly, 0.0).elements().len(), cap + 1);
    }

    #[test]
    fn zero_opacity_layers_draw_nothing() {
        let c = comp(json!({"w": 10, "h": 10, "op": 10, "layers": [
            {"ty": 1, "sw": 10, "sh": 10, "sc": "#ffffff", "ks": {"o": {"k": 0}}}
        ]}));
        let images = ImageAssets::new();
        assert!(SceneBuilder::new(&c, &images).build(0.0).is_empty());
    }
}
