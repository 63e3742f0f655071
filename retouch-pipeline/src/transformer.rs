//! The generative collaborator boundary.
//!
//! The pipeline never talks to a network itself. Whatever implements
//! [`Transformer`] receives the current composite, the tool, and the optional
//! prompt and mask, and answers with an image.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use retouch_compositor::{decode_bytes, decode_data_uri, fit_to_canvas};
use retouch_core::{Mask, OperationId, ToolKind};
use thiserror::Error;

use crate::operation::FailureReason;

/// Request handed to a [`Transformer`].
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Operation being served.
    pub operation_id: OperationId,
    /// Tool to apply.
    pub tool: ToolKind,
    /// Text prompt, if any.
    pub prompt: Option<String>,
    /// Target region, `None` for the whole canvas.
    pub mask: Option<Mask>,
    /// Current composite of the document.
    pub source_image: Arc<RgbaImage>,
}

/// Image returned by a collaborator.
#[derive(Debug, Clone)]
pub enum ResultImage {
    /// Decoded RGBA pixels.
    Raster(RgbaImage),
    /// Encoded PNG, JPEG or WebP bytes.
    Encoded(Vec<u8>),
    /// A `data:` URI, e.g. `data:image/png;base64,...`.
    DataUri(String),
}

impl ResultImage {
    /// Decode to RGBA and resample to the canvas size.
    ///
    /// # Errors
    ///
    /// Returns [`FailureReason::InvalidResult`] if the image cannot be decoded
    /// or is empty.
    pub fn into_canvas_raster(self, width: u32, height: u32) -> Result<RgbaImage, FailureReason> {
        let raster = match self {
            Self::Raster(img) => img,
            Self::Encoded(bytes) => decode_bytes(&bytes).map_err(|e| FailureReason::InvalidResult(e.to_string()))?,
            Self::DataUri(uri) => decode_data_uri(&uri).map_err(|e| FailureReason::InvalidResult(e.to_string()))?,
        };
        if raster.width() == 0 || raster.height() == 0 {
            return Err(FailureReason::InvalidResult("empty image".to_string()));
        }
        Ok(fit_to_canvas(raster, width, height))
    }
}

/// Successful collaborator answer.
#[derive(Debug, Clone)]
pub struct TransformResponse {
    /// The generated image.
    pub result_image: ResultImage,
}

impl TransformResponse {
    /// Wrap a result image.
    #[must_use]
    pub fn new(result_image: ResultImage) -> Self {
        Self { result_image }
    }
}

/// Errors a collaborator can report.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The service could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The service answered with something that is not an image.
    #[error("invalid result: {0}")]
    InvalidResult(String),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<TransformError> for FailureReason {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Network(msg) => Self::Network(msg),
            TransformError::Rejected(msg) => Self::Collaborator(msg),
            TransformError::InvalidResult(msg) => Self::InvalidResult(msg),
            TransformError::Other(err) => Self::Collaborator(format!("{err:#}")),
        }
    }
}

/// A generative image service.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Run a tool over the source image.
    async fn transform(&self, request: TransformRequest) -> Result<TransformResponse, TransformError>;
}
