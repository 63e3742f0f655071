//! Mask-weighted pixel writes shared by manual edits and in-place commits.

use image::{Rgba, RgbaImage};
use retouch_core::Mask;

/// Blend `source` into `target` in proportion to mask coverage.
///
/// Only pixels inside the mask bounds are visited. Full coverage copies the
/// source pixel; partial coverage interpolates every channel.
pub(crate) fn paint_through_mask(target: &mut RgbaImage, mask: &Mask, source: impl Fn(u32, u32) -> Rgba<u8>) {
    let Some(bounds) = mask.bounds() else {
        return;
    };
    for y in bounds.y..bounds.bottom() {
        for x in bounds.x..bounds.right() {
            let coverage = mask.coverage(x, y);
            if coverage <= 0.0 {
                continue;
            }
            let new = source(x, y);
            let pixel = target.get_pixel_mut(x, y);
            if coverage >= 1.0 {
                *pixel = new;
                continue;
            }
            for (old, new) in pixel.0.iter_mut().zip(new.0) {
                *old = lerp(*old, new, coverage);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lerp(from: u8, to: u8, t: f32) -> u8 {
    let from = f32::from(from);
    (from + (f32::from(to) - from) * t).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use retouch_core::{CoverageMap, Rect, Selection};

    #[test]
    fn test_rectangle_paints_inside_only() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]));
        let mask = Selection::Rectangle(Rect::new(1, 1, 2, 2)).to_mask(4, 4);
        paint_through_mask(&mut img, &mask, |_, _| Rgba([200, 0, 0, 255]));

        assert_eq!(img.get_pixel(1, 1).0, [200, 0, 0, 255]);
        assert_eq!(img.get_pixel(2, 2).0, [200, 0, 0, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [10, 10, 10, 255]);
        assert_eq!(img.get_pixel(3, 1).0, [10, 10, 10, 255]);
    }

    #[test]
    fn test_partial_coverage_interpolates() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        let mask = Selection::Coverage(CoverageMap::new(1, 1, vec![0.5]).unwrap()).to_mask(1, 1);
        paint_through_mask(&mut img, &mask, |_, _| Rgba([200, 100, 50, 255]));
        assert_eq!(img.get_pixel(0, 0).0, [100, 50, 25, 128]);
    }

    #[test]
    fn test_empty_mask_is_noop() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4]));
        let before = img.clone();
        paint_through_mask(&mut img, &Mask::empty(2, 2), |_, _| Rgba([9, 9, 9, 9]));
        assert_eq!(img, before);
    }
}
