//! The layer stack - ordered layers with flags, one of them active.
//!
//! Layers are stored bottom first; a layer's position in the vector is its
//! paint order, and every mutation re-denses `order` to `0..N-1`.

use image::RgbaImage;

use crate::layer::{BlendMode, Layer, LayerId, PixelBuffer};
use crate::{EditorError, EditorResult};

/// Default thumbnail edge length in pixels.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 128;

/// Ordered collection of canvas-sized layers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStack {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    active: LayerId,
    thumbnail_size: u32,
}

impl LayerStack {
    /// Create a stack whose canvas takes the size of its first layer.
    #[must_use]
    pub fn new(base: Layer) -> Self {
        Self::with_thumbnail_size(base, DEFAULT_THUMBNAIL_SIZE)
    }

    /// Create a stack with a custom thumbnail size.
    #[must_use]
    pub fn with_thumbnail_size(mut base: Layer, thumbnail_size: u32) -> Self {
        let (width, height) = base.pixel_buffer().dimensions();
        base.set_order(0);
        base.refresh_thumbnail(thumbnail_size);
        Self {
            width,
            height,
            active: base.id(),
            layers: vec![base],
            thumbnail_size,
        }
    }

    /// Rebuild a stack from already-ordered layers (bottom first).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if the canvas has no area,
    /// `layers` is empty, contains a duplicate ID or a layer of the wrong
    /// size, or `active` is not present.
    pub fn from_layers(
        width: u32,
        height: u32,
        layers: Vec<Layer>,
        active: LayerId,
        thumbnail_size: u32,
    ) -> EditorResult<Self> {
        if width == 0 || height == 0 {
            return Err(EditorError::invalid(format!("canvas {width}x{height} has no area")));
        }
        if layers.is_empty() {
            return Err(EditorError::invalid("a document needs at least one layer"));
        }
        let mut stack = Self {
            width,
            height,
            layers: Vec::with_capacity(layers.len()),
            active,
            thumbnail_size,
        };
        for layer in layers {
            stack.check_insertable(&layer)?;
            stack.layers.push(layer);
        }
        stack.index_of(active)?;
        for layer in &mut stack.layers {
            layer.refresh_thumbnail(thumbnail_size);
        }
        stack.redense();
        Ok(stack)
    }

    /// Canvas width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Thumbnail edge length used for derived previews.
    #[must_use]
    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    /// Number of layers (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false: a document keeps at least one layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in paint order, bottom first.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Look up a layer.
    #[must_use]
    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    /// Paint position of a layer.
    #[must_use]
    pub fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    /// The active layer's ID.
    #[must_use]
    pub fn active_id(&self) -> LayerId {
        self.active
    }

    /// The active layer.
    #[must_use]
    pub fn active_layer(&self) -> Option<&Layer> {
        self.get(self.active)
    }

    /// The topmost layer.
    #[must_use]
    pub fn top(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Insert a layer at `position` (default: top) and make it active.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if `position` is outside
    /// `0..=len`, the ID already exists, or the raster is not canvas-sized.
    pub fn add_layer(&mut self, mut layer: Layer, position: Option<usize>) -> EditorResult<&Self> {
        let position = position.unwrap_or(self.layers.len());
        if position > self.layers.len() {
            return Err(EditorError::invalid(format!(
                "layer position {position} outside 0..={}",
                self.layers.len()
            )));
        }
        self.check_insertable(&layer)?;

        layer.refresh_thumbnail(self.thumbnail_size);
        tracing::debug!("Adding layer {} '{}' at {position}", layer.id(), layer.name());
        self.active = layer.id();
        self.layers.insert(position, layer);
        self.redense();
        Ok(self)
    }

    /// Remove a layer.
    ///
    /// If it was active, the layer now at its former position becomes active,
    /// or the topmost layer when it was on top.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] for a locked layer and
    /// [`EditorError::InvalidState`] for an unknown or last remaining layer.
    pub fn delete_layer(&mut self, id: LayerId) -> EditorResult<&Self> {
        let index = self.index_of(id)?;
        if self.layers[index].is_locked() {
            return Err(EditorError::Locked(id));
        }
        if self.layers.len() == 1 {
            return Err(EditorError::invalid("cannot delete the last remaining layer"));
        }

        let removed = self.layers.remove(index);
        tracing::debug!("Deleted layer {} '{}'", removed.id(), removed.name());
        if self.active == id {
            let next = self.layers.get(index).or_else(|| self.layers.last());
            if let Some(next) = next {
                self.active = next.id();
            }
        }
        self.redense();
        Ok(self)
    }

    /// Move a layer to a new paint position.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] if the layer is locked or the move would
    /// take it below a locked layer (use [`LayerStack::force_move_layer`] to do
    /// that on purpose), and [`EditorError::InvalidState`] for an unknown layer
    /// or a position outside `0..len`.
    pub fn move_layer(&mut self, id: LayerId, position: usize) -> EditorResult<&Self> {
        self.reorder(id, position, false)
    }

    /// Move a layer, allowing it to pass below locked layers.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] if the moved layer itself is locked and
    /// [`EditorError::InvalidState`] for an unknown layer or bad position.
    pub fn force_move_layer(&mut self, id: LayerId, position: usize) -> EditorResult<&Self> {
        self.reorder(id, position, true)
    }

    fn reorder(&mut self, id: LayerId, position: usize, cross_locked: bool) -> EditorResult<&Self> {
        let from = self.index_of(id)?;
        if position >= self.layers.len() {
            return Err(EditorError::invalid(format!(
                "layer position {position} outside 0..{}",
                self.layers.len()
            )));
        }
        if self.layers[from].is_locked() {
            return Err(EditorError::Locked(id));
        }
        if !cross_locked && position < from {
            if let Some(locked) = self.layers[position..from].iter().find(|l| l.is_locked()) {
                return Err(EditorError::Locked(locked.id()));
            }
        }

        let layer = self.layers.remove(from);
        self.layers.insert(position, layer);
        tracing::debug!("Moved layer {id} from {from} to {position}");
        self.redense();
        Ok(self)
    }

    /// Flip a layer's visibility.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn toggle_visibility(&mut self, id: LayerId) -> EditorResult<&Self> {
        let layer = self.layer_mut(id)?;
        layer.set_visible(!layer.is_visible());
        Ok(self)
    }

    /// Flip a layer's lock.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn toggle_lock(&mut self, id: LayerId) -> EditorResult<&Self> {
        let layer = self.layer_mut(id)?;
        layer.set_locked(!layer.is_locked());
        Ok(self)
    }

    /// Set a layer's opacity; values outside `0..=100` are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_opacity(&mut self, id: LayerId, value: i32) -> EditorResult<&Self> {
        self.layer_mut(id)?.set_opacity(value);
        Ok(self)
    }

    /// Set a layer's blend mode.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> EditorResult<&Self> {
        self.layer_mut(id)?.set_blend_mode(mode);
        Ok(self)
    }

    /// Set a layer's blend mode by name.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownBlendMode`] for an unrecognized name and
    /// [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_blend_mode_named(&mut self, id: LayerId, mode: &str) -> EditorResult<&Self> {
        let mode: BlendMode = mode.parse()?;
        self.set_blend_mode(id, mode)
    }

    /// Make a layer the active one.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_active(&mut self, id: LayerId) -> EditorResult<&Self> {
        self.index_of(id)?;
        self.active = id;
        Ok(self)
    }

    /// Rename a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer or an empty name.
    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> EditorResult<&Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditorError::invalid("layer name cannot be empty"));
        }
        self.layer_mut(id)?.set_name(name.to_string());
        Ok(self)
    }

    /// Copy a layer directly above itself and make the copy active.
    ///
    /// The copy shares pixel storage with the original until either changes.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn duplicate_layer(&mut self, id: LayerId) -> EditorResult<&Self> {
        let index = self.index_of(id)?;
        let mut copy = self.layers[index].clone();
        copy.set_id(LayerId::new());
        copy.set_name(format!("{} copy", self.layers[index].name()));
        copy.set_locked(false);
        self.active = copy.id();
        self.layers.insert(index + 1, copy);
        self.redense();
        Ok(self)
    }

    /// Replace a layer's pixels wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] for a locked layer and
    /// [`EditorError::InvalidState`] for an unknown layer or wrong raster size.
    pub fn replace_pixels(&mut self, id: LayerId, pixels: impl Into<PixelBuffer>) -> EditorResult<&Self> {
        let pixels = pixels.into();
        if pixels.dimensions() != (self.width, self.height) {
            let (w, h) = pixels.dimensions();
            return Err(EditorError::invalid(format!(
                "raster {w}x{h} does not match canvas {}x{}",
                self.width, self.height
            )));
        }
        let size = self.thumbnail_size;
        let layer = self.unlocked_layer_mut(id)?;
        layer.set_pixels(pixels);
        layer.refresh_thumbnail(size);
        Ok(self)
    }

    /// Edit a layer's pixels in place.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] for a locked layer and
    /// [`EditorError::InvalidState`] for an unknown layer.
    pub fn update_pixels<F>(&mut self, id: LayerId, f: F) -> EditorResult<&Self>
    where
        F: FnOnce(&mut RgbaImage),
    {
        let size = self.thumbnail_size;
        let layer = self.unlocked_layer_mut(id)?;
        f(layer.pixels_mut());
        layer.refresh_thumbnail(size);
        Ok(self)
    }

    fn index_of(&self, id: LayerId) -> EditorResult<usize> {
        self.position(id)
            .ok_or_else(|| EditorError::invalid(format!("no layer with id {id}")))
    }

    fn layer_mut(&mut self, id: LayerId) -> EditorResult<&mut Layer> {
        let index = self.index_of(id)?;
        Ok(&mut self.layers[index])
    }

    fn unlocked_layer_mut(&mut self, id: LayerId) -> EditorResult<&mut Layer> {
        let layer = self.layer_mut(id)?;
        if layer.is_locked() {
            return Err(EditorError::Locked(id));
        }
        Ok(layer)
    }

    fn check_insertable(&self, layer: &Layer) -> EditorResult<()> {
        if self.layers.iter().any(|l| l.id() == layer.id()) {
            return Err(EditorError::invalid(format!(
                "layer {} is already in the stack",
                layer.id()
            )));
        }
        let (w, h) = layer.pixel_buffer().dimensions();
        if (w, h) != (self.width, self.height) {
            return Err(EditorError::invalid(format!(
                "layer {w}x{h} does not match canvas {}x{}",
                self.width, self.height
            )));
        }
        if let Some(mask) = layer.mask() {
            if (mask.width(), mask.height()) != (self.width, self.height) {
                return Err(EditorError::invalid("layer mask does not match canvas"));
            }
        }
        Ok(())
    }

    fn redense(&mut self) {
        for (order, layer) in self.layers.iter_mut().enumerate() {
            layer.set_order(order);
        }
    }
}
