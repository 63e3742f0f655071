//! Full and region compositing of a layer stack.

use image::RgbaImage;
use rayon::prelude::*;
use retouch_core::{BlendMode, LayerStack, Mask, Rect};

use crate::blend::{self, Rgba, TRANSPARENT};
use crate::error::{CompositeError, CompositeResult};

/// A visible layer reduced to what the blend loop needs.
struct Source<'a> {
    pixels: &'a RgbaImage,
    opacity: f32,
    mode: BlendMode,
    mask: Option<&'a Mask>,
}

impl Source<'_> {
    fn sample(&self, x: u32, y: u32) -> ([f32; 3], f32) {
        let p = self.pixels.get_pixel(x, y).0;
        let coverage = self.mask.map_or(1.0, |m| m.coverage(x, y));
        let alpha = blend::unit(p[3]) * self.opacity * coverage;
        ([blend::unit(p[0]), blend::unit(p[1]), blend::unit(p[2])], alpha)
    }
}

fn sources(stack: &LayerStack) -> Vec<Source<'_>> {
    stack
        .layers()
        .iter()
        .filter(|layer| layer.is_visible() && layer.opacity() > 0)
        .map(|layer| Source {
            pixels: layer.pixels(),
            opacity: f32::from(layer.opacity()) / 100.0,
            mode: layer.blend_mode(),
            mask: layer.mask(),
        })
        .collect()
}

fn composite_pixel(sources: &[Source<'_>], x: u32, y: u32) -> [u8; 4] {
    let mut acc: Rgba = TRANSPARENT;
    for source in sources {
        let (rgb, alpha) = source.sample(x, y);
        acc = blend::composite_over(acc, rgb, alpha, source.mode);
    }
    blend::to_rgba8(acc)
}

fn render_rows(sources: &[Source<'_>], target: &mut RgbaImage, rect: Rect) {
    let row_len = target.width() as usize * 4;
    if row_len == 0 || rect.is_empty() {
        return;
    }
    let start = rect.y as usize * row_len;
    let end = rect.bottom() as usize * row_len;
    let buffer: &mut [u8] = target;

    buffer[start..end]
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(offset, row)| {
            #[allow(clippy::cast_possible_truncation)]
            let y = rect.y + offset as u32;
            for x in rect.x..rect.right() {
                let i = x as usize * 4;
                row[i..i + 4].copy_from_slice(&composite_pixel(sources, x, y));
            }
        });
}

/// Composite the whole stack onto a transparent canvas.
///
/// Layers are painted bottom to top; invisible layers are skipped. The result
/// is deterministic for a given stack.
#[must_use]
pub fn composite(stack: &LayerStack) -> RgbaImage {
    let (width, height) = (stack.width(), stack.height());
    let mut target = RgbaImage::new(width, height);
    let sources = sources(stack);
    render_rows(&sources, &mut target, Rect::from_size(width, height));
    tracing::debug!("Composited {} layers at {width}x{height}", sources.len());
    target
}

/// Recompute only `rect` of `target`, leaving the rest untouched.
///
/// `rect` is clipped to the canvas. The recomputed pixels are identical to the
/// same pixels of [`composite`].
///
/// # Errors
///
/// Returns [`CompositeError::SizeMismatch`] if `target` is not canvas-sized.
pub fn composite_region(stack: &LayerStack, rect: Rect, target: &mut RgbaImage) -> CompositeResult<()> {
    let expected = (stack.width(), stack.height());
    if target.dimensions() != expected {
        return Err(CompositeError::SizeMismatch {
            expected,
            actual: target.dimensions(),
        });
    }
    let Some(rect) = rect.intersect(&Rect::from_size(expected.0, expected.1)) else {
        return Ok(());
    };
    let sources = sources(stack);
    render_rows(&sources, target, rect);
    tracing::debug!(
        "Recomposited {}x{} region at ({}, {})",
        rect.width,
        rect.height,
        rect.x,
        rect.y
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use retouch_core::{Layer, PixelBuffer, Selection};

    fn two_layer_stack(mode: BlendMode) -> LayerStack {
        let mut stack = LayerStack::new(Layer::raster(
            "base",
            PixelBuffer::filled(8, 6, [200, 100, 50, 255]),
        ));
        let top = Layer::raster("top", PixelBuffer::filled(8, 6, [0, 128, 255, 200]))
            .with_blend_mode(mode)
            .with_opacity(70);
        stack.add_layer(top, None).unwrap();
        stack
    }

    #[test]
    fn test_single_opaque_layer_is_identity() {
        let stack = LayerStack::new(Layer::raster(
            "base",
            PixelBuffer::filled(3, 3, [10, 20, 30, 255]),
        ));
        let out = composite(&stack);
        assert!(out.pixels().all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn test_zero_width_canvas_composites_to_empty() {
        let stack = LayerStack::new(Layer::raster("empty", PixelBuffer::blank(0, 4)));
        assert_eq!(composite(&stack).dimensions(), (0, 4));
    }

    #[test]
    fn test_invisible_layers_are_skipped() {
        let mut stack = two_layer_stack(BlendMode::Normal);
        let top = stack.top().unwrap().id();
        stack.toggle_visibility(top).unwrap();
        let out = composite(&stack);
        assert_eq!(out.get_pixel(0, 0).0, [200, 100, 50, 255]);
    }

    #[test]
    fn test_zero_opacity_contributes_nothing() {
        let mut stack = two_layer_stack(BlendMode::Screen);
        let top = stack.top().unwrap().id();
        stack.set_opacity(top, 0).unwrap();
        assert_eq!(composite(&stack).get_pixel(4, 4).0, [200, 100, 50, 255]);
    }

    #[test]
    fn test_empty_canvas_is_transparent() {
        let stack = LayerStack::new(Layer::raster("empty", PixelBuffer::blank(4, 4)));
        assert!(composite(&stack).pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_mask_limits_layer_contribution() {
        let mut stack = LayerStack::new(Layer::raster(
            "base",
            PixelBuffer::filled(4, 4, [0, 0, 0, 255]),
        ));
        let mask = Selection::Rectangle(Rect::new(0, 0, 2, 4)).to_mask(4, 4);
        let patch = Layer::generated("patch", PixelBuffer::filled(4, 4, [255, 255, 255, 255])).with_mask(mask);
        stack.add_layer(patch, None).unwrap();

        let out = composite(&stack);
        assert_eq!(out.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(3, 1).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_composite_is_deterministic() {
        for mode in BlendMode::ALL {
            let stack = two_layer_stack(mode);
            assert_eq!(composite(&stack), composite(&stack), "mode {mode}");
        }
    }

    #[test]
    fn test_region_matches_full() {
        let stack = two_layer_stack(BlendMode::Overlay);
        let full = composite(&stack);
        let mut partial = RgbaImage::new(8, 6);
        composite_region(&stack, Rect::new(2, 1, 3, 4), &mut partial).unwrap();

        for (x, y, p) in partial.enumerate_pixels() {
            if Rect::new(2, 1, 3, 4).contains(x, y) {
                assert_eq!(p, full.get_pixel(x, y));
            } else {
                assert_eq!(p.0, [0, 0, 0, 0]);
            }
        }
    }

    #[test]
    fn test_region_is_clipped() {
        let stack = two_layer_stack(BlendMode::Normal);
        let mut target = composite(&stack);
        composite_region(&stack, Rect::new(6, 4, 100, 100), &mut target).unwrap();
        assert_eq!(target, composite(&stack));
        composite_region(&stack, Rect::new(50, 50, 2, 2), &mut target).unwrap();
    }

    #[test]
    fn test_region_rejects_wrong_target_size() {
        let stack = two_layer_stack(BlendMode::Normal);
        let mut target = RgbaImage::new(2, 2);
        assert!(matches!(
            composite_region(&stack, Rect::new(0, 0, 1, 1), &mut target),
            Err(CompositeError::SizeMismatch { .. })
        ));
    }
}
