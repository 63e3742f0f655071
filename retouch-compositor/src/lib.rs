//! # Retouch Compositor
//!
//! CPU compositor for the retouch layer stack.
//!
//! ```text
//! ┌──────────────┐   visible layers,    ┌──────────────┐
//! │  LayerStack  │ ───────────────────► │  composite   │ ──► RgbaImage
//! │ (bottom→top) │  opacity × mask × α  │ (rayon rows) │
//! └──────────────┘                      └──────┬───────┘
//!                                              │ dirty rect
//!                                       ┌──────▼───────┐
//!                                       │CompositeCache│
//!                                       └──────────────┘
//! ```
//!
//! Results of generative operations come back as encoded images; the
//! [`decode`] module turns them into canvas-sized rasters.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blend;
pub mod cache;
pub mod compositor;
pub mod decode;
pub mod error;

pub use cache::{CacheStats, CompositeCache};
pub use compositor::{composite, composite_region};
pub use decode::{decode_bytes, decode_data_uri, encode_png, fit_to_canvas, to_data_uri, ImageFormat};
pub use error::{CompositeError, CompositeResult};
