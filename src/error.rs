//! Error types for spline fitting, warping and target generation

use thiserror::Error;

/// Errors that can occur while fitting a warp or building an image
#[derive(Debug, Error)]
pub enum Error {
    /// Too few control points, mismatched point lists or degenerate pin spacing
    #[error("invalid control points: {0}")]
    InvalidControlPoints(String),

    /// The spline system has no unique solution
    #[error("singular spline system: {0}")]
    SingularSystem(String),

    /// Invalid generator parameters
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Image decode/encode failure
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type for warp and generator operations
pub type Result<T> = std::result::Result<T, Error>;
