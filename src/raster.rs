use std::sync::Arc;

use crate::foundation::core::{Affine, Point, TWIPS_PER_PIXEL, Vec2};
use crate::foundation::error::{SkelterError, SkelterResult};
use crate::movie::shape::ShapeDef;

/// Hard cap on either bitmap dimension. Anything larger is an authoring or
/// quality-selection error, not something to attempt.
const MAX_DIM: i64 = 8192;

/// A shape rendered to premultiplied RGBA8 pixels at a fixed quality.
#[derive(Clone, Debug)]
pub struct RasterBitmap {
    pub width: u32,
    pub height: u32,
    /// Tightly packed premultiplied RGBA8 rows.
    pub rgba8_premul: Arc<Vec<u8>>,
    /// Pixel-space top-left of the shape bounds (floored, unscaled by
    /// quality).
    pub offset: Point,
    /// Output pixels per shape-local pixel.
    pub quality: f64,
}

impl RasterBitmap {
    /// Shape-local pixels -> bitmap pixels.
    pub fn placement_transform(&self) -> Affine {
        Affine::scale(self.quality) * Affine::translate(-self.offset.to_vec2())
    }

    /// Bitmap pixels -> shape-local pixels, the exact inverse of
    /// [`Self::placement_transform`]. Drawing the bitmap through this
    /// transform puts the artwork back where it was authored.
    pub fn to_local(&self) -> Affine {
        Affine::translate(self.offset.to_vec2()) * Affine::scale(1.0 / self.quality)
    }
}

/// Rasterize a shape's fills at `quality` output pixels per local pixel.
///
/// The bitmap anchors at the floor of the bounds top-left in local pixels;
/// the flooring remainder is added back into the size, plus two pixels for
/// anti-aliasing spill, so no geometry is clipped however the bounds land on
/// the pixel grid.
pub fn rasterize(shape: &ShapeDef, quality: f64) -> SkelterResult<RasterBitmap> {
    if !quality.is_finite() || quality <= 0.0 {
        return Err(SkelterError::validation(format!(
            "raster quality must be positive and finite, got {quality}"
        )));
    }

    let d = TWIPS_PER_PIXEL;
    let min_x = shape.bounds.x0 / d;
    let min_y = shape.bounds.y0 / d;
    let off_x = min_x.floor();
    let off_y = min_y.floor();
    let frac_x = (min_x - off_x) * quality;
    let frac_y = (min_y - off_y) * quality;
    let width = ((shape.bounds.width().max(0.0) / d) * quality + frac_x).floor() as i64 + 2;
    let height = ((shape.bounds.height().max(0.0) / d) * quality + frac_y).floor() as i64 + 2;
    if width > MAX_DIM || height > MAX_DIM {
        return Err(SkelterError::raster(format!(
            "shape {:?} rasterizes to {width}x{height}, over the {MAX_DIM} px cap (quality {quality})",
            shape.id
        )));
    }
    let w = u16::try_from(width)
        .map_err(|_| SkelterError::raster("internal error: bitmap width out of range"))?;
    let h = u16::try_from(height)
        .map_err(|_| SkelterError::raster("internal error: bitmap height out of range"))?;

    let placement = Affine::scale(quality) * Affine::translate(Vec2::new(-off_x, -off_y));
    // Fill geometry is in twips; fold the unit conversion into the transform.
    let to_bitmap = placement * Affine::scale(1.0 / d);

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.set_transform(affine_to_cpu(to_bitmap));
    for fill in &shape.fills {
        let c = fill.color;
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a));
        ctx.fill_path(&bezpath_to_cpu(&fill.path));
    }
    ctx.flush();

    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);

    Ok(RasterBitmap {
        width: u32::from(w),
        height: u32::from(h),
        rgba8_premul: Arc::new(pixmap.data_as_u8_slice().to_vec()),
        offset: Point::new(off_x, off_y),
        quality,
    })
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &crate::foundation::core::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
#[path = "../tests/unit/raster.rs"]
mod tests;
