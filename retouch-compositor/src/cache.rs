//! Incremental composite cache.
//!
//! Keeps the last composited raster and the union of regions changed since.
//! A refresh recomposites only that union, or everything when the canvas
//! size changed or nothing has been rendered yet.

use image::RgbaImage;
use retouch_core::{LayerStack, Rect};

use crate::compositor::{composite, composite_region};
use crate::error::CompositeResult;

/// Counters for monitoring how much work the cache saves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Refreshes that recomposited the whole canvas.
    pub full_renders: u64,
    /// Refreshes that recomposited a dirty region only.
    pub partial_renders: u64,
    /// Refreshes that found nothing to do.
    pub hits: u64,
    /// Total pixels recomposited.
    pub pixels_rendered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dirty {
    Clean,
    Region(Rect),
    All,
}

/// Last composite plus the dirty region accumulated since.
#[derive(Debug, Clone)]
pub struct CompositeCache {
    raster: Option<RgbaImage>,
    dirty: Dirty,
    stats: CacheStats,
}

impl Default for CompositeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeCache {
    /// Create an empty cache; the first refresh renders everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raster: None,
            dirty: Dirty::All,
            stats: CacheStats::default(),
        }
    }

    /// Add a changed region.
    pub fn mark_dirty(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.dirty = match self.dirty {
            Dirty::Clean => Dirty::Region(rect),
            Dirty::Region(current) => Dirty::Region(current.union(&rect)),
            Dirty::All => Dirty::All,
        };
    }

    /// Invalidate the whole canvas.
    pub fn mark_all_dirty(&mut self) {
        self.dirty = Dirty::All;
    }

    /// Whether the next refresh has work to do.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty != Dirty::Clean
    }

    /// The pending dirty rectangle for a canvas of the given size.
    #[must_use]
    pub fn dirty_rect(&self, width: u32, height: u32) -> Option<Rect> {
        match self.dirty {
            Dirty::Clean => None,
            Dirty::Region(rect) => rect.intersect(&Rect::from_size(width, height)),
            Dirty::All => Some(Rect::from_size(width, height)),
        }
    }

    /// The cached raster, possibly stale.
    #[must_use]
    pub fn raster(&self) -> Option<&RgbaImage> {
        self.raster.as_ref()
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Bring the cached raster up to date with `stack` and return it.
    ///
    /// # Errors
    ///
    /// Propagates region compositing failures.
    pub fn refresh(&mut self, stack: &LayerStack) -> CompositeResult<&RgbaImage> {
        let size = (stack.width(), stack.height());
        let stale_size = self.raster.as_ref().is_none_or(|r| r.dimensions() != size);

        if stale_size || self.dirty == Dirty::All {
            self.raster = Some(composite(stack));
            self.stats.full_renders += 1;
            self.stats.pixels_rendered += u64::from(size.0) * u64::from(size.1);
        } else if let Some(rect) = self.dirty_rect(size.0, size.1) {
            if let Some(raster) = self.raster.as_mut() {
                composite_region(stack, rect, raster)?;
            }
            self.stats.partial_renders += 1;
            self.stats.pixels_rendered += u64::from(rect.width) * u64::from(rect.height);
        } else {
            self.stats.hits += 1;
        }

        self.dirty = Dirty::Clean;
        Ok(self.raster.get_or_insert_with(|| composite(stack)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retouch_core::{Layer, PixelBuffer};

    fn stack() -> LayerStack {
        let mut stack = LayerStack::new(Layer::raster(
            "base",
            PixelBuffer::filled(6, 6, [40, 80, 120, 255]),
        ));
        stack
            .add_layer(
                Layer::raster("top", PixelBuffer::filled(6, 6, [250, 10, 10, 128])),
                None,
            )
            .unwrap();
        stack
    }

    #[test]
    fn test_first_refresh_renders_everything() {
        let stack = stack();
        let mut cache = CompositeCache::new();
        assert!(cache.is_dirty());
        let raster = cache.refresh(&stack).unwrap().clone();
        assert_eq!(raster, composite(&stack));
        assert_eq!(cache.stats().full_renders, 1);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_clean_refresh_is_a_hit() {
        let stack = stack();
        let mut cache = CompositeCache::new();
        cache.refresh(&stack).unwrap();
        cache.refresh(&stack).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_dirty_region_refresh_matches_full() {
        let mut stack = stack();
        let mut cache = CompositeCache::new();
        cache.refresh(&stack).unwrap();

        let top = stack.top().unwrap().id();
        stack
            .update_pixels(top, |img| {
                for y in 1..3 {
                    for x in 2..5 {
                        img.put_pixel(x, y, image::Rgba([0, 255, 0, 255]));
                    }
                }
            })
            .unwrap();
        cache.mark_dirty(Rect::new(2, 1, 3, 2));

        let refreshed = cache.refresh(&stack).unwrap().clone();
        assert_eq!(refreshed, composite(&stack));
        assert_eq!(cache.stats().partial_renders, 1);
        assert_eq!(cache.stats().pixels_rendered, 36 + 6);
    }

    #[test]
    fn test_dirty_regions_accumulate() {
        let mut cache = CompositeCache::new();
        cache.refresh(&stack()).unwrap();
        cache.mark_dirty(Rect::new(0, 0, 1, 1));
        cache.mark_dirty(Rect::new(4, 4, 1, 1));
        cache.mark_dirty(Rect::new(2, 2, 0, 5));
        assert_eq!(cache.dirty_rect(6, 6), Some(Rect::new(0, 0, 5, 5)));
    }

    #[test]
    fn test_mark_all_dirty_forces_full_render() {
        let stack = stack();
        let mut cache = CompositeCache::new();
        cache.refresh(&stack).unwrap();
        cache.mark_dirty(Rect::new(0, 0, 1, 1));
        cache.mark_all_dirty();
        cache.refresh(&stack).unwrap();
        assert_eq!(cache.stats().full_renders, 2);
    }
}
