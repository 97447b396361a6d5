use crate::face::{RecognizedFace, LEFT_EYE, RIGHT_EYE};
use tracing::debug;

/// Which admission rule the gate applies.
///
/// Both rules are in active use: `Threshold` grades the face on a continuous
/// combined score, `AllChecks` requires every individual check to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePolicy {
    #[default]
    Threshold,
    AllChecks,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Target distance in pixels between the outer eye corners.
    pub eye_distance: f32,
    pub eye_distance_margin: f32,
    /// Horizontal target for the mid-eye point; defaults to the frame centre.
    pub centre_x: Option<f32>,
    pub centre_margin: f32,
    /// Maximum allowed vertical offset between the two eyes.
    pub max_eye_height: f32,
    pub score_threshold: f32,
    pub policy: GatePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            eye_distance: 220.,
            eye_distance_margin: 40.,
            centre_x: None,
            centre_margin: 60.,
            max_eye_height: 100.,
            score_threshold: 0.5,
            policy: GatePolicy::default(),
        }
    }
}

/// Positional grading of a single face. All component scores are in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct QualityScore {
    pub width_score: f32,
    pub centre_score: f32,
    pub height_score: f32,
    /// Geometric mean of the three component scores.
    pub combined: f32,
    pub width_ok: bool,
    pub centre_ok: bool,
    pub height_ok: bool,
    pub admitted: bool,
}

/// Grades faces on eye distance, horizontal centering and eye levelness
/// against a fixed frame size. Pure: no state beyond its configuration.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: GateConfig,
    centre_x: f32,
}

impl QualityGate {
    pub fn new(frame_width: u32, config: GateConfig) -> QualityGate {
        let centre_x = config.centre_x.unwrap_or(frame_width as f32 / 2.);
        QualityGate { config, centre_x }
    }

    pub fn evaluate(&self, face: &RecognizedFace) -> QualityScore {
        let left = face.landmarks().point(LEFT_EYE);
        let right = face.landmarks().point(RIGHT_EYE);

        let d = left.distance(&right);
        let (width_score, width_ok) = if d <= f32::EPSILON {
            // coincident eye corners: maximal deviation, never a division fault
            (0., false)
        } else {
            let deviation = (self.config.eye_distance - d).abs();
            (
                clamp01(1. - deviation / self.config.eye_distance_margin),
                deviation < self.config.eye_distance_margin,
            )
        };

        let centre = left.midpoint(&right);
        let centre_deviation = (centre.x - self.centre_x).abs();
        let centre_score = clamp01(1. - centre_deviation / self.config.centre_margin);
        let centre_ok = centre_deviation < self.config.centre_margin;

        let eye_height = (left.y - right.y).abs() as f32;
        let height_score = clamp01(1. - eye_height / self.config.max_eye_height);
        let height_ok = eye_height < self.config.max_eye_height;

        let combined = (width_score * centre_score * height_score).cbrt();
        let admitted = match self.config.policy {
            GatePolicy::Threshold => combined > self.config.score_threshold,
            GatePolicy::AllChecks => width_ok && centre_ok && height_ok,
        };

        QualityScore {
            width_score,
            centre_score,
            height_score,
            combined,
            width_ok,
            centre_ok,
            height_ok,
            admitted,
        }
    }

    /// Keep only the faces the gate admits.
    pub fn filter(&self, faces: Vec<RecognizedFace>) -> Vec<RecognizedFace> {
        faces
            .into_iter()
            .filter(|face| {
                let score = self.evaluate(face);
                if !score.admitted {
                    debug!(combined = score.combined, "face rejected by quality gate");
                }
                score.admitted
            })
            .collect()
    }
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0., 1.)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{LandmarkSet, LANDMARK_COUNT};
    use crate::shapes::point::Point;
    use image::RgbImage;

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    fn config() -> GateConfig {
        GateConfig {
            eye_distance: 200.,
            eye_distance_margin: 50.,
            centre_x: None,
            centre_margin: 60.,
            max_eye_height: 100.,
            score_threshold: 0.5,
            policy: GatePolicy::Threshold,
        }
    }

    fn face_with_eyes(left: Point, right: Point) -> RecognizedFace {
        let mut points: Vec<Point> = (0..LANDMARK_COUNT)
            .map(|i| Point::new(100 + (i % 10) as i32 * 4, 100 + (i / 10) as i32 * 5))
            .collect();
        points[LEFT_EYE] = left;
        points[RIGHT_EYE] = right;
        RecognizedFace::new(
            RgbImage::new(WIDTH, HEIGHT),
            LandmarkSet::new(points).unwrap(),
        )
    }

    #[test]
    fn test_centered_face_admitted() {
        let gate = QualityGate::new(WIDTH, config());
        let score = gate.evaluate(&face_with_eyes(Point::new(220, 200), Point::new(420, 200)));

        assert_eq!(score.width_score, 1.);
        assert_eq!(score.centre_score, 1.);
        assert_eq!(score.height_score, 1.);
        assert_eq!(score.combined, 1.);
        assert!(score.admitted);
        assert!(score.width_ok && score.centre_ok && score.height_ok);
    }

    #[test]
    fn test_too_small_face_rejected() {
        let gate = QualityGate::new(WIDTH, config());
        let score = gate.evaluate(&face_with_eyes(Point::new(300, 200), Point::new(340, 200)));

        assert_eq!(score.width_score, 0.);
        assert!(!score.width_ok);
        assert_eq!(score.combined, 0.);
        assert!(!score.admitted);
    }

    #[test]
    fn test_coincident_eyes_do_not_fault() {
        let gate = QualityGate::new(WIDTH, config());
        let score = gate.evaluate(&face_with_eyes(Point::new(320, 200), Point::new(320, 200)));

        assert_eq!(score.width_score, 0.);
        assert!(!score.width_ok);
        assert!(!score.admitted);
    }

    #[test]
    fn test_scores_stay_in_unit_range() {
        let gate = QualityGate::new(WIDTH, config());
        let faces = [
            face_with_eyes(Point::new(0, 0), Point::new(639, 479)),
            face_with_eyes(Point::new(500, 10), Point::new(620, 470)),
            face_with_eyes(Point::new(-40, 200), Point::new(700, 210)),
        ];

        for face in &faces {
            let score = gate.evaluate(face);
            for v in [
                score.width_score,
                score.centre_score,
                score.height_score,
                score.combined,
            ] {
                assert!((0. ..=1.).contains(&v), "score out of range: {v}");
            }
            if score.admitted {
                assert!(score.combined > gate.config.score_threshold);
            }
        }
    }

    #[test]
    fn test_policies_diverge_on_borderline_face() {
        // every check passes individually but the combined score is weak:
        // d = 160 (score 0.2), centre off by 30 (score 0.5), eyes level
        let face = face_with_eyes(Point::new(270, 200), Point::new(430, 200));

        let strict = QualityGate::new(WIDTH, config());
        let score = strict.evaluate(&face);
        assert!(score.width_ok && score.centre_ok && score.height_ok);
        assert!(score.combined < 0.5);
        assert!(!score.admitted);

        let mut lenient = config();
        lenient.policy = GatePolicy::AllChecks;
        let score = QualityGate::new(WIDTH, lenient).evaluate(&face);
        assert!(score.admitted);
    }

    #[test]
    fn test_filter_drops_rejected_faces() {
        let gate = QualityGate::new(WIDTH, config());
        let kept = gate.filter(vec![
            face_with_eyes(Point::new(220, 200), Point::new(420, 200)),
            face_with_eyes(Point::new(300, 200), Point::new(340, 200)),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].landmarks().point(LEFT_EYE), Point::new(220, 200));
    }
}
