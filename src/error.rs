use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("landmark set has {got} points, schema requires {expected}")]
    LandmarkCount { expected: usize, got: usize },

    #[error("crop region {x},{y} {width}x{height} exceeds frame {frame_width}x{frame_height}")]
    CropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("no faces admitted yet, portrait not ready")]
    EmptyWindow,

    #[error("portrait update failed, previous portrait kept")]
    PushFailed(#[source] Box<Error>),

    #[error("alignment pool construction failed")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
