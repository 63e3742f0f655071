//! # Retouch Session
//!
//! The editing session that ties the document model, the compositor and
//! the AI pipeline together.
//!
//! ## Flow
//!
//! ```text
//!  caller ──► Editor ──mutate──► LayerStack ──► History.record
//!               │                    │
//!               │                    └─dirty rect─► CompositeCache
//!               │
//!               └─submit──► OperationPipeline ──spawn──► Transformer
//!                                  ▲                          │
//!                 settle / poll ───┘◄──────── outcome ────────┘
//!                      │
//!                      └─commit──► LayerStack ──► History.record
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod editor;
mod paint;
pub mod versions;

pub use config::EngineConfig;
pub use editor::Editor;
pub use versions::{Version, VersionId, VersionStore, VersionSummary};

/// Retouch session version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
