//! # Retouch Core
//!
//! Document model for the retouching engine: everything that has to stay
//! consistent while an operator edits a single image.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                retouch-core                 │
//! ├─────────────────────────────────────────────┤
//! │  Layer Stack      │  Selection Engine       │
//! │  - Dense order    │  - Rect / path / map    │
//! │  - Flags, opacity │  - Canvas-sized masks   │
//! │  - COW buffers    │                         │
//! ├─────────────────────────────────────────────┤
//! │  History          │  Document               │
//! │  - Linear cursor  │  - Layer manifest       │
//! │  - Bounded        │  - Buffer table         │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod document;
pub mod error;
pub mod history;
pub mod layer;
pub mod selection;
pub mod stack;
pub mod tool;

pub use document::{BufferDocument, CanvasDocument, DocumentSnapshot, LayerDocument};
pub use error::{EditorError, EditorResult};
pub use history::{timestamp_ms, History, HistoryEntry, Snapshot, DEFAULT_HISTORY_LIMIT};
pub use layer::{BlendMode, Layer, LayerId, LayerKind, PixelBuffer};
pub use selection::{CoverageMap, Mask, Point, Rect, Selection, SelectionEngine};
pub use stack::{LayerStack, DEFAULT_THUMBNAIL_SIZE};
pub use tool::{CommitMode, OperationId, ToolKind, ToolSpec};

/// Retouch core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
