use crate::error::{Error, Result};
use crate::shapes::point::Point;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Landmark schema: the 68-point layout emitted by dlib-style detectors.
/// Index order is fixed for a session; the gate reads the two outer eye
/// corners directly.
pub const LANDMARK_COUNT: usize = 68;

pub const LEFT_EYE: usize = 36;
pub const RIGHT_EYE: usize = 45;

/// An ordered, fixed-length set of facial feature points. Points may fall
/// outside the frame; consumers that need in-frame points filter themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Result<LandmarkSet> {
        if points.len() != LANDMARK_COUNT {
            return Err(Error::LandmarkCount {
                expected: LANDMARK_COUNT,
                got: points.len(),
            });
        }
        Ok(LandmarkSet { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn point(&self, idx: usize) -> Point {
        self.points[idx]
    }

    pub fn chin(&self) -> &[Point] {
        &self.points[0..17]
    }

    pub fn left_eyebrow(&self) -> &[Point] {
        &self.points[17..22]
    }

    pub fn right_eyebrow(&self) -> &[Point] {
        &self.points[22..27]
    }

    pub fn nose_bridge(&self) -> &[Point] {
        &self.points[27..31]
    }

    pub fn nose_tip(&self) -> &[Point] {
        &self.points[31..36]
    }

    pub fn left_eye(&self) -> &[Point] {
        &self.points[36..42]
    }

    pub fn right_eye(&self) -> &[Point] {
        &self.points[42..48]
    }

    pub fn outer_lip(&self) -> &[Point] {
        &self.points[48..60]
    }

    pub fn inner_lip(&self) -> &[Point] {
        &self.points[60..68]
    }

    pub fn scaled(&self, factor: f32) -> LandmarkSet {
        LandmarkSet {
            points: self.points.iter().map(|p| p.scaled(factor)).collect(),
        }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> LandmarkSet {
        LandmarkSet {
            points: self
                .points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        }
    }

    /// Per-index arithmetic mean across several sets, rounded to the nearest
    /// integer coordinates. Returns `None` for an empty iterator.
    pub fn mean<'a, I>(sets: I) -> Option<LandmarkSet>
    where
        I: IntoIterator<Item = &'a LandmarkSet>,
    {
        let mut sums = [(0i64, 0i64); LANDMARK_COUNT];
        let mut count = 0usize;

        for set in sets {
            for (sum, p) in sums.iter_mut().zip(&set.points) {
                sum.0 += p.x as i64;
                sum.1 += p.y as i64;
            }
            count += 1;
        }

        if count == 0 {
            return None;
        }

        let points = sums
            .iter()
            .map(|(x, y)| {
                Point::new(
                    (*x as f64 / count as f64).round() as i32,
                    (*y as f64 / count as f64).round() as i32,
                )
            })
            .collect();
        Some(LandmarkSet { points })
    }
}

/// One detected face: the full source frame it was found in plus its
/// landmark set. Read-only once constructed; every alignment produces a new
/// buffer instead of mutating this one.
#[derive(Debug, Clone)]
pub struct RecognizedFace {
    image: RgbImage,
    landmarks: LandmarkSet,
}

impl RecognizedFace {
    pub fn new(image: RgbImage, landmarks: LandmarkSet) -> RecognizedFace {
        RecognizedFace { image, landmarks }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    /// Copy out a sub-region, shifting the landmarks into its coordinates.
    pub fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Result<RecognizedFace> {
        let (frame_width, frame_height) = self.image.dimensions();
        if x + width > frame_width || y + height > frame_height {
            return Err(Error::CropBounds {
                x,
                y,
                width,
                height,
                frame_width,
                frame_height,
            });
        }

        Ok(RecognizedFace {
            image: imageops::crop_imm(&self.image, x, y, width, height).to_image(),
            landmarks: self.landmarks.offset(-(x as i32), -(y as i32)),
        })
    }

    /// Resample frame and landmarks by `factor`, e.g. to undo the shrink a
    /// detector ran at.
    pub fn scaled(&self, factor: f32) -> RecognizedFace {
        let (w, h) = self.image.dimensions();
        let new_w = ((w as f32 * factor).round() as u32).max(1);
        let new_h = ((h as f32 * factor).round() as u32).max(1);

        RecognizedFace {
            image: imageops::resize(&self.image, new_w, new_h, FilterType::Triangle),
            landmarks: self.landmarks.scaled(factor),
        }
    }
}
