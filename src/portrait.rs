use crate::error::{Error, Result};
use crate::face::{LandmarkSet, RecognizedFace};
use crate::shapes::point::Point;
use crate::{mesh, warp};
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, span, warn, Level};

#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// How many of the most recent admitted faces contribute to the portrait.
    pub stack_size: usize,
    /// Worker count for per-face alignment; capped at the core count.
    pub pool_size: usize,
    /// Caller-pinned points every mesh anchors in place, e.g. regions of the
    /// frame that must never deform.
    pub stable_points: Vec<Point>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            stack_size: 10,
            pool_size: 4,
            stable_points: Vec::new(),
        }
    }
}

/// Folds admitted faces into a single averaged portrait.
///
/// Owns a bounded FIFO window of the most recent faces. Every push aligns
/// each windowed face onto the mean landmark geometry on a worker pool, then
/// blends the aligned frames with equal weight. Readers always see the last
/// fully folded portrait; a failed update leaves window and portrait exactly
/// as they were.
pub struct PortraitComposer {
    config: ComposerConfig,
    pool: rayon::ThreadPool,
    window: VecDeque<Arc<RecognizedFace>>,
    target: Option<LandmarkSet>,
    portrait: Option<RgbImage>,
    // fixed by the first admitted face for the lifetime of the composer
    frame_size: Option<(u32, u32)>,
}

impl PortraitComposer {
    pub fn new(mut config: ComposerConfig) -> Result<PortraitComposer> {
        config.stack_size = config.stack_size.max(1);
        let threads = config.pool_size.clamp(1, num_cpus::get());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;

        Ok(PortraitComposer {
            config,
            pool,
            window: VecDeque::new(),
            target: None,
            portrait: None,
            frame_size: None,
        })
    }

    /// Fold new faces into the portrait. Returns whether anything changed,
    /// so callers can skip redraws when nothing was admitted.
    ///
    /// Faces whose frame dimensions disagree with the session's are rejected
    /// here; the remaining faces still go through. On a worker failure the
    /// whole update is abandoned and the previous state kept.
    pub fn push(&mut self, faces: Vec<RecognizedFace>) -> Result<bool> {
        if faces.is_empty() {
            return Ok(false);
        }

        let mut staged: Vec<Arc<RecognizedFace>> = self.window.iter().cloned().collect();
        let mut frame_size = self.frame_size;
        let mut admitted = 0usize;

        for face in faces {
            let dims = face.image().dimensions();
            match frame_size {
                None => frame_size = Some(dims),
                Some(expected) if expected != dims => {
                    warn!(
                        ?dims,
                        ?expected,
                        "face frame size does not match session, rejecting"
                    );
                    continue;
                }
                Some(_) => {}
            }
            staged.push(Arc::new(face));
            admitted += 1;
        }

        if admitted == 0 {
            return Ok(false);
        }
        let Some((width, height)) = frame_size else {
            return Ok(false);
        };

        // oldest-first eviction down to capacity
        let excess = staged.len().saturating_sub(self.config.stack_size);
        staged.drain(..excess);

        let Some(target) = LandmarkSet::mean(staged.iter().map(|f| f.landmarks())) else {
            return Ok(false);
        };

        debug!(window = staged.len(), admitted, "updating portrait");
        let span = span!(Level::INFO, "portrait_fold", faces = staged.len());
        let _guard = span.enter();

        let stable = &self.config.stable_points;
        let aligned: Result<Vec<RgbImage>> = self.pool.install(|| {
            staged
                .par_iter()
                .map(|face| {
                    let pairs = mesh::build(
                        face.landmarks().points(),
                        target.points(),
                        width,
                        height,
                        stable,
                    )?;
                    Ok(warp::align_face(face.image(), &pairs))
                })
                .collect()
        });
        let aligned = aligned.map_err(|e| Error::PushFailed(Box::new(e)))?;

        let portrait = average(&aligned, width, height);
        info!(faces = staged.len(), "portrait updated");

        self.frame_size = Some((width, height));
        self.window = staged.into();
        self.target = Some(target);
        self.portrait = Some(portrait);
        Ok(true)
    }

    /// The current composite, or `Error::EmptyWindow` until the first
    /// successful push.
    pub fn portrait(&self) -> Result<&RgbImage> {
        self.portrait.as_ref().ok_or(Error::EmptyWindow)
    }

    /// The mean landmark geometry the windowed faces are aligned to.
    pub fn target_landmarks(&self) -> Option<&LandmarkSet> {
        self.target.as_ref()
    }

    pub fn faces(&self) -> impl Iterator<Item = &RecognizedFace> {
        self.window.iter().map(|f| f.as_ref())
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

/// Equal-weight per-pixel average. Folds in window order over a widened
/// float accumulator and rounds once, so the result does not depend on which
/// worker finished first or on the pool size.
fn average(frames: &[RgbImage], width: u32, height: u32) -> RgbImage {
    let weight = 1. / frames.len() as f32;
    let mut acc = vec![0f32; (width * height * 3) as usize];

    for frame in frames {
        for (slot, value) in acc.iter_mut().zip(frame.as_raw()) {
            *slot += f32::from(*value) * weight;
        }
    }

    RgbImage::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 3) as usize;
        Rgb([channel(acc[i]), channel(acc[i + 1]), channel(acc[i + 2])])
    })
}

fn channel(v: f32) -> u8 {
    v.round().clamp(0., 255.) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::LANDMARK_COUNT;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;

    fn face(marker: i32, color: [u8; 3]) -> RecognizedFace {
        let points = (0..LANDMARK_COUNT)
            .map(|i| {
                Point::new(
                    marker + WIDTH as i32 * ((i % 10) as i32 + 1) / 14,
                    marker + HEIGHT as i32 * ((i / 10) as i32 + 1) / 10,
                )
            })
            .collect();
        RecognizedFace::new(
            RgbImage::from_pixel(WIDTH, HEIGHT, Rgb(color)),
            LandmarkSet::new(points).unwrap(),
        )
    }

    #[test]
    fn test_empty_push_changes_nothing() {
        let mut composer = PortraitComposer::new(ComposerConfig::default()).unwrap();
        assert!(!composer.push(Vec::new()).unwrap());
        assert_eq!(composer.window_len(), 0);
        assert!(composer.target_landmarks().is_none());
        assert!(matches!(composer.portrait(), Err(Error::EmptyWindow)));
    }

    #[test]
    fn test_push_populates_portrait() {
        let mut composer = PortraitComposer::new(ComposerConfig::default()).unwrap();
        let changed = composer
            .push(vec![face(0, [100, 100, 100]), face(2, [200, 200, 200])])
            .unwrap();

        assert!(changed);
        assert_eq!(composer.window_len(), 2);
        let portrait = composer.portrait().unwrap();
        assert_eq!(portrait.dimensions(), (WIDTH, HEIGHT));
    }

    #[test]
    fn test_target_is_mean_of_window() {
        let mut composer = PortraitComposer::new(ComposerConfig::default()).unwrap();
        composer.push(vec![face(0, [0; 3]), face(2, [0; 3])]).unwrap();

        let target = composer.target_landmarks().unwrap();
        let a = face(0, [0; 3]);
        for (t, p) in target.iter().zip(a.landmarks().iter()) {
            assert_eq!(*t, Point::new(p.x + 1, p.y + 1));
        }
    }

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut composer = PortraitComposer::new(ComposerConfig {
            stack_size: 3,
            ..Default::default()
        })
        .unwrap();

        composer
            .push(vec![face(0, [0; 3]), face(1, [0; 3])])
            .unwrap();
        composer
            .push(vec![face(2, [0; 3]), face(3, [0; 3])])
            .unwrap();

        assert_eq!(composer.window_len(), 3);
        let markers: Vec<i32> = composer
            .faces()
            .map(|f| f.landmarks().point(0).x - WIDTH as i32 / 14)
            .collect();
        assert_eq!(markers, vec![1, 2, 3]);
    }

    #[test]
    fn test_identical_geometry_averages_colors() {
        let mut composer = PortraitComposer::new(ComposerConfig::default()).unwrap();
        composer
            .push(vec![face(0, [100, 60, 20]), face(0, [200, 160, 120])])
            .unwrap();

        let portrait = composer.portrait().unwrap();
        let expected = [150u8, 110, 70];
        for px in portrait.pixels() {
            for ch in 0..3 {
                let diff = (px[ch] as i16 - expected[ch] as i16).abs();
                assert!(diff <= 1, "channel {ch} off by {diff}");
            }
        }
    }

    #[test]
    fn test_mismatched_frame_size_rejected() {
        let mut composer = PortraitComposer::new(ComposerConfig::default()).unwrap();
        composer.push(vec![face(0, [50; 3])]).unwrap();

        let small = RecognizedFace::new(
            RgbImage::new(WIDTH / 2, HEIGHT / 2),
            face(0, [0; 3]).landmarks().clone(),
        );
        let changed = composer.push(vec![small]).unwrap();
        assert!(!changed);
        assert_eq!(composer.window_len(), 1);
    }

    #[test]
    fn test_rejected_face_does_not_block_the_rest() {
        let mut composer = PortraitComposer::new(ComposerConfig::default()).unwrap();
        composer.push(vec![face(0, [50; 3])]).unwrap();

        let small = RecognizedFace::new(
            RgbImage::new(WIDTH / 2, HEIGHT / 2),
            face(0, [0; 3]).landmarks().clone(),
        );
        let changed = composer.push(vec![small, face(1, [80; 3])]).unwrap();
        assert!(changed);
        assert_eq!(composer.window_len(), 2);
    }

    #[test]
    fn test_fold_is_pool_size_invariant() {
        let faces = || {
            vec![
                face(0, [10, 200, 30]),
                face(1, [250, 40, 90]),
                face(3, [77, 131, 201]),
            ]
        };

        let mut serial = PortraitComposer::new(ComposerConfig {
            pool_size: 1,
            ..Default::default()
        })
        .unwrap();
        let mut parallel = PortraitComposer::new(ComposerConfig {
            pool_size: 4,
            ..Default::default()
        })
        .unwrap();

        serial.push(faces()).unwrap();
        parallel.push(faces()).unwrap();

        assert_eq!(
            serial.portrait().unwrap().as_raw(),
            parallel.portrait().unwrap().as_raw()
        );
    }
}
