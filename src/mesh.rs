use crate::error::{Error, Result};
use crate::shapes::point::{edge_points, Point};
use crate::shapes::triangle::Triangle;
use image::{Rgb, RgbImage};
use imageproc::drawing;
use tracing::debug;

/// One triangle of the alignment mesh: where it sits in the source frame and
/// where its pixels belong in the aligned output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrianglePair {
    pub source: Triangle,
    pub target: Triangle,
}

/// Build the source→target triangle mesh for one face.
///
/// The source points are zipped with their targets, extended with the 8
/// frame-boundary anchors and any caller-pinned stable points (both mapped to
/// themselves), then triangulated. The boundary anchors keep the convex hull
/// equal to the frame rectangle, so the mesh always spans the whole frame.
///
/// Source points outside the frame are excluded here only; callers computing
/// target geometry upstream keep them in.
pub fn build(
    source: &[Point],
    target: &[Point],
    frame_width: u32,
    frame_height: u32,
    stable: &[Point],
) -> Result<Vec<TrianglePair>> {
    if source.len() != target.len() {
        return Err(Error::LandmarkCount {
            expected: source.len(),
            got: target.len(),
        });
    }

    let mut correspondence: Vec<(Point, Point)> =
        Vec::with_capacity(source.len() + 8 + stable.len());

    for (s, t) in source.iter().zip(target) {
        if !s.in_frame(frame_width, frame_height) {
            debug!(?s, "landmark outside frame, excluded from mesh");
            continue;
        }
        upsert(&mut correspondence, *s, *t);
    }
    // anchors come last so they win over a landmark sitting exactly on one
    for anchor in edge_points(frame_width, frame_height) {
        upsert(&mut correspondence, anchor, anchor);
    }
    for anchor in stable {
        upsert(&mut correspondence, *anchor, *anchor);
    }

    let points: Vec<delaunator::Point> = correspondence
        .iter()
        .map(|(s, _)| delaunator::Point {
            x: s.x as f64,
            y: s.y as f64,
        })
        .collect();

    let triangulation = delaunator::triangulate(&points);

    let pairs = triangulation
        .triangles
        .chunks(3)
        .map(|t| TrianglePair {
            source: Triangle::new(
                correspondence[t[0]].0,
                correspondence[t[1]].0,
                correspondence[t[2]].0,
            ),
            target: Triangle::new(
                correspondence[t[0]].1,
                correspondence[t[1]].1,
                correspondence[t[2]].1,
            ),
        })
        .collect();

    Ok(pairs)
}

fn upsert(correspondence: &mut Vec<(Point, Point)>, source: Point, target: Point) {
    match correspondence.iter_mut().find(|(p, _)| *p == source) {
        Some(entry) => entry.1 = target,
        None => correspondence.push((source, target)),
    }
}

/// Debug overlay: trace the source triangle edges onto a frame.
pub fn draw(frame: &mut RgbImage, pairs: &[TrianglePair]) {
    let green = Rgb([0u8, 255u8, 0u8]);
    for pair in pairs {
        let [a, b, c] = pair.source.vertices;
        for (from, to) in [(a, b), (b, c), (c, a)] {
            drawing::draw_line_segment_mut(
                frame,
                (from.x as f32, from.y as f32),
                (to.x as f32, to.y as f32),
                green,
            );
        }
    }
}

/// Debug overlay: mark a set of points on a frame.
pub fn draw_landmarks(frame: &mut RgbImage, points: &[Point]) {
    let red = Rgb([255u8, 0u8, 0u8]);
    for p in points {
        drawing::draw_filled_circle_mut(frame, (p.x, p.y), 2, red);
    }
}
