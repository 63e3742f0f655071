//! Compositor error types.

use thiserror::Error;

/// Result type for compositor operations.
pub type CompositeResult<T> = Result<T, CompositeError>;

/// Errors that can occur while compositing or decoding images.
#[derive(Debug, Error)]
pub enum CompositeError {
    /// The target raster does not match the canvas.
    #[error("Raster is {actual:?}, canvas is {expected:?}")]
    SizeMismatch {
        /// Canvas dimensions.
        expected: (u32, u32),
        /// Dimensions of the raster supplied.
        actual: (u32, u32),
    },

    /// Image bytes or data URI could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Raster could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),
}
