//! Serialized document representation handed to the persistence layer.
//!
//! The document is a layer manifest plus a buffer table: each layer names its
//! pixel buffer by key, and the buffers themselves travel as base64 RGBA.
//! History is session-local and never serialized.

use std::collections::BTreeMap;

use base64::Engine;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::layer::{BlendMode, Layer, LayerId, LayerKind, PixelBuffer};
use crate::selection::Mask;
use crate::stack::LayerStack;
use crate::{EditorError, EditorResult};

/// Format version written by [`DocumentSnapshot::from_stack`].
pub const DOCUMENT_VERSION: u32 = 1;

/// Canvas metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasDocument {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Document-friendly layer description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDocument {
    /// Layer identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Content kind.
    pub kind: LayerKind,
    /// Paint order, 0 is the bottom.
    pub order: usize,
    /// Visibility flag.
    #[serde(default = "LayerDocument::default_visible")]
    pub visible: bool,
    /// Lock flag.
    #[serde(default)]
    pub locked: bool,
    /// Opacity in percent.
    #[serde(default = "LayerDocument::default_opacity")]
    pub opacity: u8,
    /// Blend mode name.
    #[serde(default = "LayerDocument::default_blend_mode")]
    pub blend_mode: String,
    /// Key into [`DocumentSnapshot::buffers`].
    pub buffer: String,
    /// Key into [`DocumentSnapshot::masks`], if the layer is masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

impl LayerDocument {
    const fn default_visible() -> bool {
        true
    }

    const fn default_opacity() -> u8 {
        100
    }

    fn default_blend_mode() -> String {
        BlendMode::Normal.name().to_string()
    }
}

/// A raw buffer in the buffer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDocument {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Base64 of the raw bytes (RGBA8 for pixels, little-endian f32 for masks).
    pub data: String,
}

/// Canonical serialized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Format version.
    pub version: u32,
    /// Canvas metadata.
    pub canvas: CanvasDocument,
    /// Layers in paint order.
    pub layers: Vec<LayerDocument>,
    /// The active layer's ID.
    pub active_layer: String,
    /// Pixel buffers keyed by reference.
    pub buffers: BTreeMap<String, BufferDocument>,
    /// Layer masks keyed by reference.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub masks: BTreeMap<String, BufferDocument>,
}

impl DocumentSnapshot {
    /// Build a document from a layer stack.
    #[must_use]
    pub fn from_stack(stack: &LayerStack) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut buffers = BTreeMap::new();
        let mut masks = BTreeMap::new();
        let layers = stack
            .layers()
            .iter()
            .map(|layer| {
                let key = layer.id().to_string();
                let (width, height) = layer.pixel_buffer().dimensions();
                buffers.insert(
                    key.clone(),
                    BufferDocument {
                        width,
                        height,
                        data: engine.encode(layer.pixels().as_raw()),
                    },
                );
                let mask = layer.mask().map(|mask| {
                    let bytes: Vec<u8> = mask.values().iter().flat_map(|v| v.to_le_bytes()).collect();
                    masks.insert(
                        key.clone(),
                        BufferDocument {
                            width: mask.width(),
                            height: mask.height(),
                            data: engine.encode(bytes),
                        },
                    );
                    key.clone()
                });
                LayerDocument {
                    id: key.clone(),
                    name: layer.name().to_string(),
                    kind: layer.kind(),
                    order: layer.order(),
                    visible: layer.is_visible(),
                    locked: layer.is_locked(),
                    opacity: layer.opacity(),
                    blend_mode: layer.blend_mode().name().to_string(),
                    buffer: key,
                    mask,
                }
            })
            .collect();

        Self {
            version: DOCUMENT_VERSION,
            canvas: CanvasDocument {
                width: stack.width(),
                height: stack.height(),
            },
            layers,
            active_layer: stack.active_id().to_string(),
            buffers,
            masks,
        }
    }

    /// Materialize a fresh layer stack.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unsupported version, empty
    /// or non-dense layer orders, bad IDs, missing or mis-sized buffers, and
    /// [`EditorError::UnknownBlendMode`] for an unrecognized blend mode.
    pub fn into_stack(self, thumbnail_size: u32) -> EditorResult<LayerStack> {
        if self.version != DOCUMENT_VERSION {
            return Err(EditorError::invalid(format!(
                "unsupported document version {}",
                self.version
            )));
        }
        let CanvasDocument { width, height } = self.canvas;

        let mut docs = self.layers;
        docs.sort_by_key(|doc| doc.order);
        for (expected, doc) in docs.iter().enumerate() {
            if doc.order != expected {
                return Err(EditorError::invalid(format!(
                    "layer orders are not contiguous: expected {expected}, found {}",
                    doc.order
                )));
            }
        }

        let mut layers = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = parse_layer_id(&doc.id)?;
            let buffer = self
                .buffers
                .get(&doc.buffer)
                .ok_or_else(|| EditorError::invalid(format!("missing buffer '{}'", doc.buffer)))?;
            let pixels = decode_pixels(buffer)?;
            let mut layer = Layer::new(doc.name, doc.kind, pixels)
                .with_id(id)
                .with_visible(doc.visible)
                .with_locked(doc.locked)
                .with_opacity(i32::from(doc.opacity))
                .with_blend_mode(doc.blend_mode.parse()?);
            if let Some(key) = doc.mask {
                let mask_doc = self
                    .masks
                    .get(&key)
                    .ok_or_else(|| EditorError::invalid(format!("missing mask '{key}'")))?;
                layer = layer.with_mask(decode_mask(mask_doc)?);
            }
            layers.push(layer);
        }

        let active = parse_layer_id(&self.active_layer)?;
        LayerStack::from_layers(width, height, layers, active, thumbnail_size)
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> EditorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a document.
    pub fn from_json(json: &str) -> EditorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn parse_layer_id(s: &str) -> EditorResult<LayerId> {
    LayerId::parse(s).map_err(|e| EditorError::invalid(format!("bad layer id '{s}': {e}")))
}

fn decode_bytes(buffer: &BufferDocument) -> EditorResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(&buffer.data)
        .map_err(|e| EditorError::invalid(format!("failed to decode base64: {e}")))
}

fn decode_pixels(buffer: &BufferDocument) -> EditorResult<PixelBuffer> {
    let bytes = decode_bytes(buffer)?;
    RgbaImage::from_raw(buffer.width, buffer.height, bytes)
        .map(PixelBuffer::new)
        .ok_or_else(|| {
            EditorError::invalid(format!(
                "buffer does not hold {}x{} RGBA pixels",
                buffer.width, buffer.height
            ))
        })
}

fn decode_mask(buffer: &BufferDocument) -> EditorResult<Mask> {
    let bytes = decode_bytes(buffer)?;
    if bytes.len() % 4 != 0 {
        return Err(EditorError::invalid("mask data is not a whole number of f32 values"));
    }
    let values = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Mask::from_values(buffer.width, buffer.height, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{Rect, Selection};

    fn sample_stack() -> LayerStack {
        let base = Layer::raster("Background", PixelBuffer::filled(4, 4, [200, 100, 50, 255]));
        let mut stack = LayerStack::new(base);
        let overlay = Layer::generated("Inpaint Result", PixelBuffer::filled(4, 4, [0, 0, 255, 128]))
            .with_blend_mode(BlendMode::Screen)
            .with_opacity(60)
            .with_mask(Selection::Rectangle(Rect::new(1, 1, 2, 2)).to_mask(4, 4));
        stack.add_layer(overlay, None).unwrap();
        let base_id = stack.layers()[0].id();
        stack.set_active(base_id).unwrap();
        stack
    }

    #[test]
    fn test_document_restores_layers_and_flags() {
        let stack = sample_stack();
        let json = DocumentSnapshot::from_stack(&stack).to_json().unwrap();
        let restored = DocumentSnapshot::from_json(&json)
            .unwrap()
            .into_stack(stack.thumbnail_size())
            .unwrap();
        assert_eq!(restored, stack);
    }

    #[test]
    fn test_document_lists_buffer_references() {
        let doc = DocumentSnapshot::from_stack(&sample_stack());
        assert_eq!(doc.layers.len(), 2);
        for layer in &doc.layers {
            assert!(doc.buffers.contains_key(&layer.buffer));
        }
        assert_eq!(doc.layers[1].blend_mode, "screen");
        assert_eq!(doc.masks.len(), 1);
    }

    #[test]
    fn test_non_dense_orders_rejected() {
        let mut doc = DocumentSnapshot::from_stack(&sample_stack());
        doc.layers[1].order = 5;
        assert!(matches!(doc.into_stack(64), Err(EditorError::InvalidState(_))));
    }

    #[test]
    fn test_unknown_blend_mode_rejected() {
        let mut doc = DocumentSnapshot::from_stack(&sample_stack());
        doc.layers[0].blend_mode = "plasma".to_string();
        assert!(matches!(doc.into_stack(64), Err(EditorError::UnknownBlendMode(_))));
    }

    #[test]
    fn test_missing_buffer_rejected() {
        let mut doc = DocumentSnapshot::from_stack(&sample_stack());
        doc.buffers.clear();
        assert!(matches!(doc.into_stack(64), Err(EditorError::InvalidState(_))));
    }

    #[test]
    fn test_empty_document_rejected() {
        let mut doc = DocumentSnapshot::from_stack(&sample_stack());
        doc.layers.clear();
        assert!(matches!(doc.into_stack(64), Err(EditorError::InvalidState(_))));
    }

    #[test]
    fn test_zero_area_canvas_rejected() {
        let stack = LayerStack::new(Layer::raster("empty", PixelBuffer::blank(0, 4)));
        let doc = DocumentSnapshot::from_stack(&stack);
        assert_eq!(doc.canvas.width, 0);
        assert!(matches!(doc.into_stack(64), Err(EditorError::InvalidState(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            DocumentSnapshot::from_json("{\"version\": 1"),
            Err(EditorError::Serialization(_))
        ));
    }
}
