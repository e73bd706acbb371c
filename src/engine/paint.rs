use tracing::debug;

use super::scene::DrawOp;
use crate::foundation::core::{Affine, BezPath, Rgba8, Vec2};

/// Map a `w`x`h` composition onto a `cw`x`ch` canvas: uniform scale, centered.
pub fn fit_transform(w: f64, h: f64, cw: f64, ch: f64) -> Affine {
    if w <= 0.0 || h <= 0.0 || !w.is_finite() || !h.is_finite() {
        return Affine::IDENTITY;
    }
    let scale = (cw / w).min(ch / h);
    let offset = Vec2::new((cw - w * scale) / 2.0, (ch - h * scale) / 2.0);
    Affine::translate(offset) * Affine::scale(scale)
}

/// Replay `ops` onto `ctx`, each transformed by `view`.
pub fn paint_ops(ctx: &mut vello_cpu::RenderContext, ops: &[DrawOp], view: Affine) {
    ctx.set_blend_mode(vello_cpu::peniko::BlendMode::default());
    for op in ops {
        match op {
            DrawOp::Fill {
                path,
                transform,
                color,
                even_odd,
            } => {
                ctx.set_transform(affine_to_cpu(view * *transform));
                ctx.set_paint(color_to_cpu(*color));
                ctx.set_fill_rule(if *even_odd {
                    vello_cpu::peniko::Fill::EvenOdd
                } else {
                    vello_cpu::peniko::Fill::NonZero
                });
                ctx.fill_path(&bezpath_to_cpu(path));
            }
            DrawOp::Stroke {
                path,
                transform,
                color,
                width,
            } => {
                ctx.set_transform(affine_to_cpu(view * *transform));
                ctx.set_paint(color_to_cpu(*color));
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(*width));
                ctx.stroke_path(&bezpath_to_cpu(path));
            }
            DrawOp::Image {
                image,
                transform,
                opacity,
            } => {
                let paint = match image.to_paint() {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "skipping undrawable image");
                        continue;
                    }
                };
                let opacity = opacity.clamp(0.0, 1.0) as f32;
                ctx.set_transform(affine_to_cpu(view * *transform));
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(paint);
                if opacity < 1.0 {
                    ctx.push_opacity_layer(opacity);
                }
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(image.width),
                    f64::from(image.height),
                ));
                if opacity < 1.0 {
                    ctx.pop_layer();
                }
            }
        }
    }
    ctx.set_fill_rule(vello_cpu::peniko::Fill::NonZero);
}

fn color_to_cpu(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let pt = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Point;

    #[test]
    fn fit_letterboxes_wide_compositions() {
        let f = fit_transform(200.0, 100.0, 100.0, 100.0);
        let tl = f * Point::new(0.0, 0.0);
        let br = f * Point::new(200.0, 100.0);
        assert_eq!((tl.x, tl.y), (0.0, 25.0));
        assert_eq!((br.x, br.y), (100.0, 75.0));
        assert_eq!(fit_transform(0.0, 10.0, 5.0, 5.0), Affine::IDENTITY);
    }

    #[test]
    fn fill_op_reaches_the_pixmap() {
        let ops = vec![DrawOp::Fill {
            path: kurbo::Shape::to_path(&kurbo::Rect::new(0.0, 0.0, 4.0, 4.0), 0.1),
            transform: Affine::IDENTITY,
            color: Rgba8::new(0, 0, 255, 255),
            even_odd: false,
        }];
        let mut ctx = vello_cpu::RenderContext::new(4, 4);
        paint_ops(&mut ctx, &ops, Affine::IDENTITY);
        ctx.flush();
        let mut pm = vello_cpu::Pixmap::new(4, 4);
        ctx.render_to_pixmap(&mut pm);
        assert_eq!(&pm.data_as_u8_slice()[..4], &[0, 0, 255, 255]);
    }
}
