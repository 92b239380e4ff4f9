use thiserror::Error;

/// Errors produced by the pixel core, the project container and the CLI.
///
/// Pure filter math never fails on a well-formed [`crate::canvas::PixelBuffer`];
/// most variants come from construction checks or from file I/O.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid dimensions {width}x{height}: both sides must be positive")]
    InvalidDimension { width: u32, height: u32 },

    #[error("buffer holds {actual} bytes, expected {expected} for the given dimensions")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid convolution kernel: {0}")]
    InvalidKernel(String),

    #[error("layer index {index} out of range (stack has {len} layers)")]
    LayerIndexOutOfRange { index: usize, len: usize },

    #[error("layer '{0}' is locked")]
    LayerLocked(String),

    #[error("unknown filter type '{0}'")]
    UnknownFilter(String),

    #[error("invalid project: {0}")]
    InvalidProject(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
