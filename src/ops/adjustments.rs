// ============================================================================
// COLOUR ADJUSTMENTS
// ============================================================================
//
// Point operations: every output pixel depends only on the matching input
// pixel. All of them go through `apply_per_pixel`, which rounds and clamps.
// ============================================================================

use crate::canvas::PixelBuffer;
use crate::ops::apply_per_pixel;
use crate::ops::effects::hash_f32;

/// Half-width of the grain added by [`vintage`].
pub const VINTAGE_GRAIN: f32 = 10.0;

/// Salt that separates the vintage grain stream from the noise filter's.
const VINTAGE_SALT: u32 = 0x5EED_0F17;

// ============================================================================
// TONE
// ============================================================================

/// Brightness/Contrast adjustment.
/// `brightness`: -100..100, additive offset as a percentage of full scale.
/// `contrast`: -100..100, multiplier around the 128 midpoint.
/// Out-of-range inputs are clamped.
pub fn brightness_contrast(src: &PixelBuffer, brightness: f32, contrast: f32) -> PixelBuffer {
    let brightness = clamp_param(brightness, 100.0);
    let contrast = clamp_param(contrast, 100.0);
    let offset = brightness / 100.0 * 255.0;
    let factor = (259.0 * (contrast + 255.0)) / (255.0 * (259.0 - contrast));
    apply_per_pixel(src, move |_, _, [r, g, b, a]| {
        [
            factor * (r + offset - 128.0) + 128.0,
            factor * (g + offset - 128.0) + 128.0,
            factor * (b + offset - 128.0) + 128.0,
            a,
        ]
    })
}

/// Rotate hue by `hue` degrees (-180..180) and scale saturation by
/// `saturation` percent (-100..100). Lightness is unchanged.
pub fn hue_saturation(src: &PixelBuffer, hue: f32, saturation: f32) -> PixelBuffer {
    let hue_shift = clamp_param(hue, 180.0) / 360.0;
    let sat_scale = 1.0 + clamp_param(saturation, 100.0) / 100.0;
    apply_per_pixel(src, move |_, _, [r, g, b, a]| {
        let (h, s, l) = rgb_to_hsl(r / 255.0, g / 255.0, b / 255.0);
        let h = (h + hue_shift).rem_euclid(1.0);
        let s = (s * sat_scale).clamp(0.0, 1.0);
        let (nr, ng, nb) = hsl_to_rgb(h, s, l);
        [nr * 255.0, ng * 255.0, nb * 255.0, a]
    })
}

fn clamp_param(v: f32, limit: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(-limit, limit) }
}

// ============================================================================
// INSTANT OPERATIONS
// ============================================================================

/// Luma (BT.601 weights) written to R, G and B.
pub fn grayscale(src: &PixelBuffer) -> PixelBuffer {
    apply_per_pixel(src, |_, _, [r, g, b, a]| {
        let l = luma(r, g, b).round();
        [l, l, l, a]
    })
}

#[inline]
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

pub fn sepia(src: &PixelBuffer) -> PixelBuffer {
    apply_per_pixel(src, |_, _, [r, g, b, a]| {
        let (sr, sg, sb) = sepia_tone(r, g, b);
        [sr, sg, sb, a]
    })
}

#[inline]
fn sepia_tone(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let sr = 0.393 * r + 0.769 * g + 0.189 * b;
    let sg = 0.349 * r + 0.686 * g + 0.168 * b;
    let sb = 0.272 * r + 0.534 * g + 0.131 * b;
    (sr.min(255.0), sg.min(255.0), sb.min(255.0))
}

/// Invert R, G and B. Alpha is preserved.
pub fn invert(src: &PixelBuffer) -> PixelBuffer {
    apply_per_pixel(src, |_, _, [r, g, b, a]| [255.0 - r, 255.0 - g, 255.0 - b, a])
}

/// Sepia tone plus film grain in `[-10, 10)`, the same offset on all three
/// colour channels of a pixel.
pub fn vintage(src: &PixelBuffer, seed: u32) -> PixelBuffer {
    let seed = seed ^ VINTAGE_SALT;
    apply_per_pixel(src, move |x, y, [r, g, b, a]| {
        let (sr, sg, sb) = sepia_tone(r, g, b);
        let grain = (hash_f32(x, y, seed) * 2.0 - 1.0) * VINTAGE_GRAIN;
        [sr + grain, sg + grain, sb + grain, a]
    })
}

// ============================================================================
// COLOR SPACE HELPERS
// ============================================================================

/// RGB (0..1) → HSL (H: 0..1, S: 0..1, L: 0..1)
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    let d = max - min;
    if d.abs() < 1e-6 {
        return (0.0, 0.0, l);
    }

    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if max == r {
        ((g - b) / d).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// HSL (H: 0..1, S: 0..1, L: 0..1) → RGB (0..1)
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

pub fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swatch() -> PixelBuffer {
        let mut buf = PixelBuffer::new(4, 2).unwrap();
        let colours = [
            [255, 0, 0, 255],
            [0, 255, 0, 255],
            [0, 0, 255, 255],
            [10, 20, 30, 255],
            [200, 150, 100, 128],
            [0, 0, 0, 0],
            [255, 255, 255, 255],
            [77, 133, 9, 40],
        ];
        for (i, c) in colours.iter().enumerate() {
            buf.set(i as u32 % 4, i as u32 / 4, *c);
        }
        buf
    }

    #[test]
    fn grayscale_of_primaries() {
        let mut src = PixelBuffer::new(2, 2).unwrap();
        src.set(0, 0, [255, 0, 0, 255]);
        src.set(1, 0, [0, 255, 0, 255]);
        src.set(0, 1, [0, 0, 255, 255]);
        src.set(1, 1, [255, 255, 255, 255]);
        let out = grayscale(&src);
        assert_eq!(out.get(0, 0), [76, 76, 76, 255]);
        assert_eq!(out.get(1, 0), [150, 150, 150, 255]);
        assert_eq!(out.get(0, 1), [29, 29, 29, 255]);
        assert_eq!(out.get(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn grayscale_is_idempotent() {
        let once = grayscale(&swatch());
        assert_eq!(grayscale(&once), once);
    }

    #[test]
    fn invert_is_an_involution() {
        let src = swatch();
        let out = invert(&src);
        assert_eq!(out.get(3, 0), [245, 235, 225, 255]);
        assert_eq!(invert(&out), src);
    }

    #[test]
    fn neutral_tone_parameters_are_identity() {
        let src = swatch();
        assert_eq!(brightness_contrast(&src, 0.0, 0.0), src);
        assert_eq!(hue_saturation(&src, 0.0, 0.0), src);
        assert_eq!(hue_saturation(&src, 360.0, 0.0), hue_saturation(&src, 180.0, 0.0));
    }

    #[test]
    fn brightness_shifts_and_clamps() {
        let src = PixelBuffer::new_filled(1, 1, [100, 200, 0, 9]).unwrap();
        let out = brightness_contrast(&src, 20.0, 0.0);
        assert_eq!(out.get(0, 0), [151, 251, 51, 9]);
        let out = brightness_contrast(&src, 500.0, 0.0);
        assert_eq!(out.get(0, 0), [255, 255, 255, 9]);
    }

    #[test]
    fn hue_rotation_and_desaturation() {
        let red = PixelBuffer::new_filled(1, 1, [255, 0, 0, 255]).unwrap();
        assert_eq!(hue_saturation(&red, 120.0, 0.0).get(0, 0), [0, 255, 0, 255]);
        assert_eq!(hue_saturation(&red, -120.0, 0.0).get(0, 0), [0, 0, 255, 255]);
        assert_eq!(hue_saturation(&red, 0.0, -100.0).get(0, 0), [128, 128, 128, 255]);
    }

    #[test]
    fn sepia_caps_channels() {
        let white = PixelBuffer::new_filled(1, 1, [255, 255, 255, 200]).unwrap();
        assert_eq!(sepia(&white).get(0, 0), [255, 255, 239, 200]);
    }

    #[test]
    fn vintage_is_sepia_plus_bounded_grain() {
        let src = PixelBuffer::new_filled(8, 8, [90, 90, 90, 255]).unwrap();
        let tone = sepia(&src);
        let a = vintage(&src, 7);
        assert_eq!(a, vintage(&src, 7));
        for y in 0..8 {
            for x in 0..8 {
                let (v, s) = (a.get(x, y), tone.get(x, y));
                for c in 0..3 {
                    assert!((v[c] as i32 - s[c] as i32).abs() <= 11);
                }
                assert_eq!(v[3], 255);
            }
        }
    }

    #[test]
    fn hsl_round_trip() {
        for &(r, g, b) in &[(0.2, 0.4, 0.6), (1.0, 0.5, 0.0), (0.3, 0.3, 0.3)] {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            let (nr, ng, nb) = hsl_to_rgb(h, s, l);
            assert!((nr - r).abs() < 1e-4 && (ng - g).abs() < 1e-4 && (nb - b).abs() < 1e-4);
        }
    }
}
