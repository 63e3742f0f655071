//! Blend formulas and source-over alpha compositing.
//!
//! Colors are straight (non-premultiplied) RGB in `0.0..=1.0`. Separable modes
//! apply one formula per channel; hue, saturation, color and luminosity use
//! the W3C compositing formulas over the whole triple.

use retouch_core::BlendMode;

/// Straight RGB triple in `0.0..=1.0`.
pub type Rgb = [f32; 3];

/// Straight RGBA quadruple in `0.0..=1.0`.
pub type Rgba = [f32; 4];

/// Fully transparent black.
pub const TRANSPARENT: Rgba = [0.0; 4];

/// Apply a blend formula to a backdrop and source color.
#[must_use]
pub fn blend_channels(mode: BlendMode, base: Rgb, top: Rgb) -> Rgb {
    match mode {
        BlendMode::Normal => top,
        BlendMode::Multiply => per_channel(base, top, |b, t| b * t),
        BlendMode::Screen => per_channel(base, top, |b, t| 1.0 - (1.0 - b) * (1.0 - t)),
        BlendMode::Overlay => per_channel(base, top, overlay_channel),
        BlendMode::Darken => per_channel(base, top, f32::min),
        BlendMode::Lighten => per_channel(base, top, f32::max),
        BlendMode::ColorDodge => per_channel(base, top, color_dodge_channel),
        BlendMode::ColorBurn => per_channel(base, top, color_burn_channel),
        // Hard light is overlay with the operands swapped.
        BlendMode::HardLight => per_channel(base, top, |b, t| overlay_channel(t, b)),
        BlendMode::SoftLight => per_channel(base, top, soft_light_channel),
        BlendMode::Difference => per_channel(base, top, |b, t| (b - t).abs()),
        BlendMode::Exclusion => per_channel(base, top, |b, t| b + t - 2.0 * b * t),
        BlendMode::Hue => set_lum(set_sat(top, sat(base)), lum(base)),
        BlendMode::Saturation => set_lum(set_sat(base, sat(top)), lum(base)),
        BlendMode::Color => set_lum(top, lum(base)),
        BlendMode::Luminosity => set_lum(base, lum(top)),
    }
}

/// Composite a source pixel over a backdrop.
///
/// `top_alpha` is the effective source alpha (pixel alpha already scaled by
/// layer opacity and mask coverage). Where the backdrop is transparent the
/// source shows through unblended.
#[must_use]
pub fn composite_over(base: Rgba, top: Rgb, top_alpha: f32, mode: BlendMode) -> Rgba {
    let top_alpha = top_alpha.clamp(0.0, 1.0);
    if top_alpha <= 0.0 {
        return base;
    }

    let base_a = base[3];
    let base_rgb = [base[0], base[1], base[2]];
    let blended = blend_channels(mode, base_rgb, top);

    let out_a = top_alpha + base_a * (1.0 - top_alpha);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let mut out = [0.0, 0.0, 0.0, out_a];
    for i in 0..3 {
        let mixed = (1.0 - base_a) * top[i] + base_a * blended[i];
        out[i] = ((mixed * top_alpha + base_rgb[i] * base_a * (1.0 - top_alpha)) / out_a).clamp(0.0, 1.0);
    }
    out
}

/// Convert an 8-bit channel to `0.0..=1.0`.
#[must_use]
pub fn unit(value: u8) -> f32 {
    f32::from(value) / 255.0
}

/// Quantize a `0.0..=1.0` channel to 8 bits, rounding to nearest.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Quantize a straight RGBA color; fully transparent pixels become zero.
#[must_use]
pub fn to_rgba8(color: Rgba) -> [u8; 4] {
    let alpha = quantize(color[3]);
    if alpha == 0 {
        return [0; 4];
    }
    [quantize(color[0]), quantize(color[1]), quantize(color[2]), alpha]
}

fn per_channel(base: Rgb, top: Rgb, f: impl Fn(f32, f32) -> f32) -> Rgb {
    [f(base[0], top[0]), f(base[1], top[1]), f(base[2], top[2])]
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if base <= 0.0 {
        0.0
    } else if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if base >= 1.0 {
        1.0
    } else if top <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

fn lum(c: Rgb) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: Rgb) -> Rgb {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l - n > f32::EPSILON {
        out = out.map(|v| l + (v - l) * l / (l - n));
    }
    if x > 1.0 && x - l > f32::EPSILON {
        out = out.map(|v| l + (v - l) * (1.0 - l) / (x - l));
    }
    out.map(|v| v.clamp(0.0, 1.0))
}

fn set_lum(c: Rgb, l: f32) -> Rgb {
    let d = l - lum(c);
    clip_color(c.map(|v| v + d))
}

fn sat(c: Rgb) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: Rgb, s: f32) -> Rgb {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
    let [min, mid, max] = idx;

    let mut out = [0.0; 3];
    let range = c[max] - c[min];
    if range > 0.0 {
        out[mid] = (c[mid] - c[min]) * s / range;
        out[max] = s;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = [1.0, 0.0, 0.0];
    const GRAY: Rgb = [0.5, 0.5, 0.5];

    fn approx(a: Rgb, b: Rgb) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_normal_opaque_replaces() {
        let out = composite_over([0.2, 0.4, 0.6, 1.0], RED, 1.0, BlendMode::Normal);
        assert_eq!(to_rgba8(out), [255, 0, 0, 255]);
    }

    #[test]
    fn test_transparent_top_leaves_base() {
        let base = [0.2, 0.4, 0.6, 1.0];
        assert_eq!(composite_over(base, RED, 0.0, BlendMode::Multiply), base);
    }

    #[test]
    fn test_half_alpha_normal_mixes() {
        let out = composite_over([0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0], 0.5, BlendMode::Normal);
        assert_eq!(to_rgba8(out), [128, 128, 128, 255]);
    }

    #[test]
    fn test_blend_over_transparent_keeps_source_color() {
        for mode in BlendMode::ALL {
            let out = composite_over(TRANSPARENT, [unit(51), unit(153), unit(230)], 1.0, mode);
            assert_eq!(to_rgba8(out), [51, 153, 230, 255], "mode {mode}");
        }
    }

    #[test]
    fn test_identity_elements() {
        let base = [0.3, 0.6, 0.9];
        assert!(approx(blend_channels(BlendMode::Multiply, base, [1.0; 3]), base));
        assert!(approx(blend_channels(BlendMode::Screen, base, [0.0; 3]), base));
        assert!(approx(blend_channels(BlendMode::Difference, base, base), [0.0; 3]));
        assert!(approx(blend_channels(BlendMode::Darken, base, [1.0; 3]), base));
        assert!(approx(blend_channels(BlendMode::Lighten, base, [0.0; 3]), base));
    }

    #[test]
    fn test_overlay_and_hard_light_are_mirrors() {
        let a = [0.2, 0.7, 0.4];
        let b = [0.9, 0.1, 0.5];
        assert!(approx(
            blend_channels(BlendMode::Overlay, a, b),
            blend_channels(BlendMode::HardLight, b, a)
        ));
    }

    #[test]
    fn test_dodge_and_burn_edges() {
        assert!((color_dodge_channel(0.0, 1.0)).abs() < f32::EPSILON);
        assert!((color_dodge_channel(0.5, 1.0) - 1.0).abs() < f32::EPSILON);
        assert!((color_burn_channel(1.0, 0.0) - 1.0).abs() < f32::EPSILON);
        assert!((color_burn_channel(0.5, 0.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_soft_light_neutral_gray() {
        let base = [0.1, 0.5, 0.8];
        assert!(approx(blend_channels(BlendMode::SoftLight, base, GRAY), base));
    }

    #[test]
    fn test_color_of_gray_desaturates() {
        let out = blend_channels(BlendMode::Color, RED, GRAY);
        assert!(approx(out, [lum(RED); 3]));
        let lum_out = blend_channels(BlendMode::Luminosity, GRAY, RED);
        assert!((lum(lum_out) - lum(RED)).abs() < 1e-4);
    }

    #[test]
    fn test_hue_keeps_base_luminosity() {
        let base = [0.2, 0.5, 0.3];
        let out = blend_channels(BlendMode::Hue, base, [0.1, 0.2, 0.9]);
        assert!((lum(out) - lum(base)).abs() < 1e-4);
    }

    #[test]
    fn test_non_separable_outputs_stay_in_range() {
        let samples = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], RED, [0.0, 1.0, 0.2], [0.9, 0.8, 0.05]];
        for mode in BlendMode::ALL.into_iter().filter(|m| !m.is_separable()) {
            for base in samples {
                for top in samples {
                    let out = blend_channels(mode, base, top);
                    assert!(out.iter().all(|v| (0.0..=1.0).contains(v)), "{mode} {out:?}");
                }
            }
        }
    }

    #[test]
    fn test_quantize_rounds() {
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(2.0), 255);
        assert_eq!(to_rgba8([1.0, 1.0, 1.0, 0.0]), [0, 0, 0, 0]);
    }
}
