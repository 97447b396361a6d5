use crate::mesh::TrianglePair;
use crate::shapes::triangle::Triangle;
use image::{Rgb, RgbImage};
use tracing::debug;

// below this the vertices are collinear: integer-grid triangles have an area
// of at least one half
const MIN_AREA: f64 = 0.25;

/// Warp a face onto the target geometry of its mesh.
///
/// Starts from a zeroed canvas of the same dimensions. Each triangle is
/// resampled under its own affine transform and written into the canvas
/// through the filled target-triangle mask. Triangles are independent;
/// adjacent ones only meet on shared edges where either write is fine, so
/// processing order does not affect the result beyond those border pixels.
pub fn align_face(image: &RgbImage, pairs: &[TrianglePair]) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(width, height);

    for pair in pairs {
        if pair.source.area() < MIN_AREA || pair.target.area() < MIN_AREA {
            debug!(source = ?pair.source, "skipping degenerate triangle");
            continue;
        }

        // resampling walks target pixels, so solve for the inverse map
        let Some(back) = affine_between(&pair.target, &pair.source) else {
            debug!(source = ?pair.source, "no affine transform, skipping triangle");
            continue;
        };
        stamp_triangle(image, &mut canvas, &pair.target, &back);
    }

    canvas
}

/// Coefficients `[a, b, c, d, e, f]` of the unique affine transform taking
/// the first triangle's vertices onto the second's:
/// `x' = a*x + b*y + c`, `y' = d*x + e*y + f`. `None` when the first
/// triangle has no area.
fn affine_between(from: &Triangle, to: &Triangle) -> Option<[f64; 6]> {
    let [s0, s1, s2] = from.vertices;
    let (sx0, sy0) = (s0.x as f64, s0.y as f64);
    let (sx1, sy1) = (s1.x as f64, s1.y as f64);
    let (sx2, sy2) = (s2.x as f64, s2.y as f64);

    let det = sx0 * (sy1 - sy2) - sx1 * (sy0 - sy2) + sx2 * (sy0 - sy1);
    if det.abs() < f64::EPSILON {
        return None;
    }

    let [t0, t1, t2] = to.vertices;
    let (tx0, ty0) = (t0.x as f64, t0.y as f64);
    let (tx1, ty1) = (t1.x as f64, t1.y as f64);
    let (tx2, ty2) = (t2.x as f64, t2.y as f64);

    let a = (tx0 * (sy1 - sy2) + tx1 * (sy2 - sy0) + tx2 * (sy0 - sy1)) / det;
    let b = (tx0 * (sx2 - sx1) + tx1 * (sx0 - sx2) + tx2 * (sx1 - sx0)) / det;
    let c = (tx0 * (sx1 * sy2 - sx2 * sy1)
        + tx1 * (sx2 * sy0 - sx0 * sy2)
        + tx2 * (sx0 * sy1 - sx1 * sy0))
        / det;
    let d = (ty0 * (sy1 - sy2) + ty1 * (sy2 - sy0) + ty2 * (sy0 - sy1)) / det;
    let e = (ty0 * (sx2 - sx1) + ty1 * (sx0 - sx2) + ty2 * (sx1 - sx0)) / det;
    let f = (ty0 * (sx1 * sy2 - sx2 * sy1)
        + ty1 * (sx2 * sy0 - sx0 * sy2)
        + ty2 * (sx0 * sy1 - sx1 * sy0))
        / det;

    Some([a, b, c, d, e, f])
}

/// Fill the target triangle on the canvas with pixels pulled from `source`
/// through the inverse transform, clipped to the canvas. The containment
/// test is inclusive, so every canvas pixel under the mesh is written by at
/// least one triangle and no seams open up between neighbours.
fn stamp_triangle(source: &RgbImage, canvas: &mut RgbImage, target: &Triangle, back: &[f64; 6]) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let (tl, br) = target.bounding();
    let x0 = tl.x.clamp(0, width as i32 - 1) as u32;
    let x1 = br.x.clamp(0, width as i32 - 1) as u32;
    let y0 = tl.y.clamp(0, height as i32 - 1) as u32;
    let y1 = br.y.clamp(0, height as i32 - 1) as u32;

    for y in y0..=y1 {
        for x in x0..=x1 {
            if !target.contains(x as i32, y as i32) {
                continue;
            }
            let sx = back[0] * x as f64 + back[1] * y as f64 + back[2];
            let sy = back[3] * x as f64 + back[4] * y as f64 + back[5];
            canvas.put_pixel(x, y, sample_bilinear(source, sx as f32, sy as f32));
        }
    }
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = image.dimensions();

    // samples sit inside the source triangle; border pixels can drift a
    // fraction past the edge, replicate it instead of bleeding black in
    let x = x.clamp(0., (width - 1) as f32);
    let y = y.clamp(0., (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for ch in 0..3 {
        let top = p00[ch] as f32 * (1. - fx) + p10[ch] as f32 * fx;
        let bottom = p01[ch] as f32 * (1. - fx) + p11[ch] as f32 * fx;
        out[ch] = (top * (1. - fy) + bottom * fy).round().clamp(0., 255.) as u8;
    }
    Rgb(out)
}
