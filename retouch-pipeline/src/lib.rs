//! # Retouch Pipeline
//!
//! Turns a (tool, region, prompt) request into a collaborator call and hands
//! the outcome back for committing.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ──► Queued ──dispatch──► Processing ──► next_outcome()
//!              │                      │               │
//!            cancel                 cancel      complete / fail
//!              ▼                      ▼               ▼
//!           Failed                 Failed      Completed / Failed
//! ```
//!
//! Only one operation may be queued or processing at a time; a second
//! submission is rejected with `Busy`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod operation;
pub mod pipeline;
pub mod transformer;

pub use config::{PipelineConfig, DEFAULT_LOG_LIMIT, DEFAULT_OPERATION_TIMEOUT_MS};
pub use operation::{FailureReason, Operation, OperationStatus};
pub use pipeline::{OperationPipeline, Outcome};
pub use transformer::{
    ResultImage, TransformError, TransformRequest, TransformResponse, Transformer,
};
