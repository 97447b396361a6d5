//! Face alignment and portrait compositing.
//!
//! Takes already-detected faces (frame + 68-point landmark set), grades them
//! for position and size, and folds the admitted ones into a single averaged
//! portrait: each face is piecewise-affine warped onto the mean landmark
//! geometry over a Delaunay mesh, then all aligned frames are blended with
//! equal weight.
//!
//! ```no_run
//! use facefold::{ComposerConfig, GateConfig, PortraitComposer, QualityGate};
//!
//! # fn demo(faces: Vec<facefold::RecognizedFace>) -> facefold::Result<()> {
//! let gate = QualityGate::new(1920, GateConfig::default());
//! let mut composer = PortraitComposer::new(ComposerConfig::default())?;
//!
//! if composer.push(gate.filter(faces))? {
//!     let portrait = composer.portrait()?;
//!     // hand the new portrait to the display
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod face;
pub mod mesh;
pub mod portrait;
pub mod quality;
pub mod shapes;
pub mod warp;

pub use error::{Error, Result};
pub use face::{LandmarkSet, RecognizedFace, LANDMARK_COUNT, LEFT_EYE, RIGHT_EYE};
pub use mesh::TrianglePair;
pub use portrait::{ComposerConfig, PortraitComposer};
pub use quality::{GateConfig, GatePolicy, QualityGate, QualityScore};
pub use shapes::point::Point;
pub use shapes::triangle::Triangle;
