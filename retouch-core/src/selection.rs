//! Selections and masks - the region an edit applies to.
//!
//! A [`Selection`] describes a region in whichever form the operator drew it.
//! Downstream code never branches on that form: it asks for a [`Mask`] sized
//! to the canvas via [`Selection::to_mask`].

use serde::{Deserialize, Serialize};

use crate::{EditorError, EditorResult};

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (pixels from left).
    pub x: u32,
    /// Top edge (pixels from top).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle covering a whole canvas.
    #[must_use]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Whether the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check if a pixel lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlap of two rectangles, `None` if they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Self::new(x, y, right - x, bottom - y))
    }

    /// Smallest rectangle containing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }
}

/// A point on a freeform path, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Per-pixel coverage values anchored at the canvas origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl CoverageMap {
    /// Create a coverage map; values are clamped to `[0, 1]` (NaN becomes 0).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if `values` does not hold exactly
    /// `width * height` entries.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> EditorResult<Self> {
        let expected = pixel_count(width, height);
        if values.len() != expected {
            return Err(EditorError::invalid(format!(
                "coverage map {width}x{height} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values: values.into_iter().map(clamp_coverage).collect(),
        })
    }

    /// Build a coverage map by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut values = Vec::with_capacity(pixel_count(width, height));
        for y in 0..height {
            for x in 0..width {
                values.push(clamp_coverage(f(x, y)));
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Coverage at a pixel; 0 outside the map.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.values[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Whether every value is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|&v| v <= 0.0)
    }
}

/// A region descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Selection {
    /// The entire canvas (no selection).
    #[default]
    All,
    /// A rectangular bound.
    Rectangle(Rect),
    /// A closed freeform polygon (even-odd fill).
    Path(Vec<Point>),
    /// Explicit per-pixel coverage.
    Coverage(CoverageMap),
}

impl Selection {
    /// Whether this selection means the whole canvas.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Collapse empty regions to [`Selection::All`].
    ///
    /// A zero-area rectangle, a path with fewer than three points and an
    /// all-zero coverage map select nothing, which means "entire canvas".
    #[must_use]
    pub fn normalized(self) -> Self {
        match &self {
            Self::Rectangle(rect) if rect.is_empty() => Self::All,
            Self::Path(points) if points.len() < 3 => Self::All,
            Self::Coverage(map) if map.is_empty() => Self::All,
            _ => self,
        }
    }

    /// Rasterize to a coverage mask sized to the canvas.
    #[must_use]
    pub fn to_mask(&self, width: u32, height: u32) -> Mask {
        match self {
            Self::All => Mask::full(width, height),
            Self::Rectangle(rect) => {
                let mut mask = Mask::empty(width, height);
                if let Some(clipped) = rect.intersect(&Rect::from_size(width, height)) {
                    for y in clipped.y..clipped.bottom() {
                        for x in clipped.x..clipped.right() {
                            mask.set(x, y, 1.0);
                        }
                    }
                }
                mask
            }
            Self::Path(points) => rasterize_polygon(points, width, height),
            Self::Coverage(map) => {
                let mut mask = Mask::empty(width, height);
                for y in 0..height.min(map.height) {
                    for x in 0..width.min(map.width) {
                        mask.set(x, y, map.get(x, y));
                    }
                }
                mask
            }
        }
    }
}

/// Canvas-sized coverage buffer, the only region form consumers use.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

impl Mask {
    /// A mask covering every pixel.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![1.0; pixel_count(width, height)],
        }
    }

    /// A mask covering nothing.
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![0.0; pixel_count(width, height)],
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Coverage at a pixel; 0 outside the mask.
    #[must_use]
    pub fn coverage(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.coverage[self.index(x, y)]
    }

    /// Raw coverage values, row-major.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.coverage
    }

    /// Whether every pixel is fully covered.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.coverage.iter().all(|&v| v >= 1.0)
    }

    /// Tight bounds of the non-zero coverage, `None` if nothing is covered.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut any = false;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.coverage[self.index(x, y)] > 0.0 {
                    any = true;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        any.then(|| Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    /// Rebuild a mask from raw values (used by document loading).
    pub(crate) fn from_values(width: u32, height: u32, values: Vec<f32>) -> EditorResult<Self> {
        let map = CoverageMap::new(width, height, values)?;
        Ok(Self {
            width,
            height,
            coverage: map.values,
        })
    }

    fn set(&mut self, x: u32, y: u32, value: f32) {
        let index = self.index(x, y);
        self.coverage[index] = value;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }
}

/// Holds the live selection; every action replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionEngine {
    current: Selection,
}

impl SelectionEngine {
    /// Start with the whole canvas selected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live selection.
    #[must_use]
    pub fn current(&self) -> &Selection {
        &self.current
    }

    /// Select a rectangle.
    pub fn set_rectangle(&mut self, rect: Rect) -> &Selection {
        self.replace(Selection::Rectangle(rect))
    }

    /// Select a closed freeform path.
    pub fn set_path(&mut self, points: Vec<Point>) -> &Selection {
        self.replace(Selection::Path(points))
    }

    /// Select by explicit coverage.
    pub fn set_coverage_map(&mut self, map: CoverageMap) -> &Selection {
        self.replace(Selection::Coverage(map))
    }

    /// Reset to the whole canvas.
    pub fn clear(&mut self) -> &Selection {
        self.replace(Selection::All)
    }

    /// Replace the selection with any region (normalized).
    pub fn replace(&mut self, selection: Selection) -> &Selection {
        self.current = selection.normalized();
        tracing::debug!("Selection replaced: {}", describe(&self.current));
        &self.current
    }

    /// Rasterize the live selection for a canvas.
    #[must_use]
    pub fn to_mask(&self, width: u32, height: u32) -> Mask {
        self.current.to_mask(width, height)
    }
}

fn describe(selection: &Selection) -> String {
    match selection {
        Selection::All => "all".to_string(),
        Selection::Rectangle(r) => format!("rect {}x{} at ({}, {})", r.width, r.height, r.x, r.y),
        Selection::Path(points) => format!("path with {} points", points.len()),
        Selection::Coverage(map) => format!("coverage {}x{}", map.width, map.height),
    }
}

fn clamp_coverage(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize)
}

/// Scanline polygon fill sampled at pixel centres.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rasterize_polygon(points: &[Point], width: u32, height: u32) -> Mask {
    let mut mask = Mask::empty(width, height);
    let n = points.len();
    if n < 3 {
        return mask;
    }

    let mut nodes: Vec<f32> = Vec::with_capacity(n);
    for y in 0..height {
        let yf = y as f32 + 0.5;
        nodes.clear();
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            if (a.y < yf && b.y >= yf) || (b.y < yf && a.y >= yf) {
                let t = (yf - a.y) / (b.y - a.y);
                nodes.push(a.x + t * (b.x - a.x));
            }
        }
        nodes.sort_by(f32::total_cmp);

        for pair in nodes.chunks_exact(2) {
            // Pixel x is inside when its centre x + 0.5 lies in [start, end).
            let start = (pair[0] - 0.5).ceil().max(0.0) as u32;
            let end = ((pair[1] - 0.5).ceil().max(0.0) as u32).min(width);
            for x in start..end {
                mask.set(x, y, 1.0);
            }
        }
    }
    mask
}
