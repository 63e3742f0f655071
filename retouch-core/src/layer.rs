//! Layers - independently owned rasters stacked for compositing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::selection::Mask;
use crate::{EditorError, EditorResult};

/// Unique identifier for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Create a new unique layer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a layer ID from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What produced a layer's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Imported or hand-painted pixels.
    Raster,
    /// A correction layer.
    Adjustment,
    /// Output of an AI operation.
    Generated,
}

/// Per-channel pixel combination formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    /// Top replaces base.
    #[default]
    Normal,
    /// Product of base and top.
    Multiply,
    /// Inverse product of inverses.
    Screen,
    /// Multiply or screen depending on the base.
    Overlay,
    /// Per-channel minimum.
    Darken,
    /// Per-channel maximum.
    Lighten,
    /// Brighten base by dividing by the inverted top.
    ColorDodge,
    /// Darken base by dividing the inverted base by top.
    ColorBurn,
    /// Multiply or screen depending on the top.
    HardLight,
    /// Gentle hard light (W3C formula).
    SoftLight,
    /// Absolute difference.
    Difference,
    /// Low-contrast difference.
    Exclusion,
    /// Hue of top, saturation and luminosity of base.
    Hue,
    /// Saturation of top, hue and luminosity of base.
    Saturation,
    /// Hue and saturation of top, luminosity of base.
    Color,
    /// Luminosity of top, hue and saturation of base.
    Luminosity,
}

impl BlendMode {
    /// Every supported blend mode, in menu order.
    pub const ALL: [Self; 16] = [
        Self::Normal,
        Self::Multiply,
        Self::Screen,
        Self::Overlay,
        Self::Darken,
        Self::Lighten,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::HardLight,
        Self::SoftLight,
        Self::Difference,
        Self::Exclusion,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Luminosity,
    ];

    /// Stable kebab-case name, as used in serialized documents.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::HardLight => "hard-light",
            Self::SoftLight => "soft-light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Color => "color",
            Self::Luminosity => "luminosity",
        }
    }

    /// Whether the formula works channel by channel.
    ///
    /// Hue, saturation, color and luminosity need all three channels at once.
    #[must_use]
    pub const fn is_separable(self) -> bool {
        !matches!(
            self,
            Self::Hue | Self::Saturation | Self::Color | Self::Luminosity
        )
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlendMode {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == normalized)
            .ok_or_else(|| EditorError::UnknownBlendMode(s.to_string()))
    }
}

/// Copy-on-write RGBA pixel storage.
///
/// Clones share storage until one side mutates through [`PixelBuffer::make_mut`],
/// so a buffer is either exclusively owned or shared read-only.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer(Arc<RgbaImage>);

impl PixelBuffer {
    /// Wrap an existing image.
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// A fully transparent buffer.
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::new(width, height))
    }

    /// A buffer filled with one color.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Read access to the pixels.
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// Write access, detaching from any other holder first.
    pub fn make_mut(&mut self) -> &mut RgbaImage {
        Arc::make_mut(&mut self.0)
    }

    /// Whether two buffers currently share storage.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("PixelBuffer")
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        Self::new(image)
    }
}

/// A layer in the stack.
///
/// Fields are private: flags, order and pixels change only through
/// [`crate::LayerStack`], which keeps the stack invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    id: LayerId,
    name: String,
    kind: LayerKind,
    order: usize,
    visible: bool,
    locked: bool,
    opacity: u8,
    blend_mode: BlendMode,
    pixels: PixelBuffer,
    mask: Option<Arc<Mask>>,
    thumbnail: Option<Arc<RgbaImage>>,
}

impl Layer {
    /// Create a visible, unlocked, fully opaque layer.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: LayerKind, pixels: impl Into<PixelBuffer>) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            kind,
            order: 0,
            visible: true,
            locked: false,
            opacity: 100,
            blend_mode: BlendMode::Normal,
            pixels: pixels.into(),
            mask: None,
            thumbnail: None,
        }
    }

    /// Create a raster layer.
    #[must_use]
    pub fn raster(name: impl Into<String>, pixels: impl Into<PixelBuffer>) -> Self {
        Self::new(name, LayerKind::Raster, pixels)
    }

    /// Create a layer holding AI output.
    #[must_use]
    pub fn generated(name: impl Into<String>, pixels: impl Into<PixelBuffer>) -> Self {
        Self::new(name, LayerKind::Generated, pixels)
    }

    /// Use a specific ID.
    #[must_use]
    pub fn with_id(mut self, id: LayerId) -> Self {
        self.id = id;
        self
    }

    /// Set the initial opacity (clamped to 0-100).
    #[must_use]
    pub fn with_opacity(mut self, opacity: i32) -> Self {
        self.opacity = clamp_opacity(opacity);
        self
    }

    /// Set the initial blend mode.
    #[must_use]
    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    /// Set the initial visibility.
    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set the initial lock state.
    #[must_use]
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Attach a coverage mask limiting where the layer paints.
    #[must_use]
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(Arc::new(mask));
        self
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content kind.
    #[must_use]
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Paint order, 0 is the bottom of the stack.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Whether the compositor paints this layer.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether pixel mutation is rejected.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Opacity in percent.
    #[must_use]
    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    /// Blend mode used when compositing over the layers below.
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// The layer's pixels.
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        self.pixels.image()
    }

    /// The layer's pixel storage.
    #[must_use]
    pub fn pixel_buffer(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Optional coverage mask.
    #[must_use]
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_deref()
    }

    /// Derived preview image; `None` until the layer joins a stack.
    #[must_use]
    pub fn thumbnail(&self) -> Option<&RgbaImage> {
        self.thumbnail.as_deref()
    }

    pub(crate) fn set_order(&mut self, order: usize) {
        self.order = order;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub(crate) fn set_opacity(&mut self, opacity: i32) {
        self.opacity = clamp_opacity(opacity);
    }

    pub(crate) fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    pub(crate) fn set_id(&mut self, id: LayerId) {
        self.id = id;
    }

    /// Mutable pixels. Callers must check the lock first.
    pub(crate) fn pixels_mut(&mut self) -> &mut RgbaImage {
        self.pixels.make_mut()
    }

    pub(crate) fn set_pixels(&mut self, pixels: PixelBuffer) {
        self.pixels = pixels;
    }

    pub(crate) fn mask_arc(&self) -> Option<Arc<Mask>> {
        self.mask.clone()
    }

    pub(crate) fn set_mask(&mut self, mask: Option<Arc<Mask>>) {
        self.mask = mask;
    }

    /// Regenerate the thumbnail to fit within `size` x `size`.
    pub(crate) fn refresh_thumbnail(&mut self, size: u32) {
        let (width, height) = self.pixels.dimensions();
        let (thumb_w, thumb_h) = thumbnail_dimensions(width, height, size);
        self.thumbnail = Some(Arc::new(image::imageops::thumbnail(
            self.pixels.image(),
            thumb_w,
            thumb_h,
        )));
    }
}

fn clamp_opacity(value: i32) -> u8 {
    // Clamped into 0..=100, so the cast cannot truncate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamped = value.clamp(0, 100) as u8;
    clamped
}

/// Fit `width` x `height` into a `size` square, preserving aspect ratio.
fn thumbnail_dimensions(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width <= size && height <= size {
        return (width.max(1), height.max(1));
    }
    let scale = f64::from(size) / f64::from(width.max(height));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let fit = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
    (fit(width), fit(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_round_trips_through_names() {
        for mode in BlendMode::ALL {
            assert_eq!(mode.name().parse::<BlendMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_blend_mode_parse_is_lenient_on_separators() {
        assert_eq!("Color Dodge".parse::<BlendMode>().unwrap(), BlendMode::ColorDodge);
        assert_eq!("soft_light".parse::<BlendMode>().unwrap(), BlendMode::SoftLight);
    }

    #[test]
    fn test_unknown_blend_mode() {
        let err = "vivid-light".parse::<BlendMode>().unwrap_err();
        assert!(matches!(err, EditorError::UnknownBlendMode(ref name) if name == "vivid-light"));
    }

    #[test]
    fn test_non_separable_modes() {
        let non_separable: Vec<_> = BlendMode::ALL
            .into_iter()
            .filter(|m| !m.is_separable())
            .collect();
        assert_eq!(
            non_separable,
            vec![
                BlendMode::Hue,
                BlendMode::Saturation,
                BlendMode::Color,
                BlendMode::Luminosity
            ]
        );
    }

    #[test]
    fn test_opacity_builder_clamps() {
        let pixels = PixelBuffer::blank(2, 2);
        assert_eq!(Layer::raster("a", pixels.clone()).with_opacity(-5).opacity(), 0);
        assert_eq!(Layer::raster("b", pixels).with_opacity(500).opacity(), 100);
    }

    #[test]
    fn test_pixel_buffer_copy_on_write() {
        let original = PixelBuffer::filled(4, 4, [10, 20, 30, 255]);
        let mut copy = original.clone();
        assert!(copy.shares_storage(&original));

        copy.make_mut().put_pixel(0, 0, Rgba([0, 0, 0, 0]));

        assert!(!copy.shares_storage(&original));
        assert_eq!(original.image().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(copy.image().get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_thumbnail_preserves_aspect_ratio() {
        assert_eq!(thumbnail_dimensions(512, 256, 128), (128, 64));
        assert_eq!(thumbnail_dimensions(64, 32, 128), (64, 32));
        assert_eq!(thumbnail_dimensions(1000, 1, 100), (100, 1));
    }

    #[test]
    fn test_layer_id_parse() {
        let id = LayerId::new();
        assert_eq!(LayerId::parse(&id.to_string()).unwrap(), id);
        assert!(LayerId::parse("not-a-uuid").is_err());
    }
}
