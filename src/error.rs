use thiserror::Error;

/// Failures that abort processing of a page.
///
/// Angle and geometry indeterminacy never shows up here: those stages degrade
/// to neutral values instead.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("rasterization failed for page {page}: {message}")]
    Rasterization { page: usize, message: String },

    #[error("text recognition failed for page {page} after {attempts} attempt(s): {message}")]
    Recognition {
        page: usize,
        attempts: usize,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, AlignError>;
