// ============================================================================
// LAYER COMPOSITOR
// ============================================================================

use rayon::prelude::*;

use crate::canvas::{BlendMode, Layer, PixelBuffer};
use crate::error::Result;

/// Composite `layers` (bottom to top) onto a transparent canvas of the given
/// size. Hidden layers are skipped; parts of a layer that fall outside the
/// canvas are clipped.
pub fn composite_layers(layers: &[Layer], width: u32, height: u32) -> Result<PixelBuffer> {
    let mut out = PixelBuffer::new(width, height)?;
    for layer in layers {
        composite_onto(&mut out, layer);
    }
    Ok(out)
}

/// Draw one layer onto `dest` using its offset, blend mode and opacity.
pub fn composite_onto(dest: &mut PixelBuffer, layer: &Layer) {
    if !layer.visible || layer.opacity == 0 {
        return;
    }
    blend_buffer_at(
        dest,
        &layer.pixels,
        layer.x,
        layer.y,
        layer.blend_mode,
        layer.opacity_factor(),
    );
}

/// Blend `src` into `dest` with its top-left corner at `(ox, oy)`.
/// `opacity` (0..1) scales the source alpha before blending.
pub fn blend_buffer_at(
    dest: &mut PixelBuffer,
    src: &PixelBuffer,
    ox: i32,
    oy: i32,
    mode: BlendMode,
    opacity: f32,
) {
    let dw = dest.width() as i64;
    let dh = dest.height() as i64;
    let sw = src.width() as i64;
    let sh = src.height() as i64;

    let x0 = (ox as i64).max(0);
    let x1 = (ox as i64 + sw).min(dw);
    let y0 = (oy as i64).max(0);
    let y1 = (oy as i64 + sh).min(dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let dst_stride = dw as usize * 4;
    let src_raw = src.as_raw();
    let src_stride = sw as usize * 4;
    dest.as_raw_mut()
        .par_chunks_mut(dst_stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row_out)| {
            let sy = (y as i64 - oy as i64) as usize;
            for x in x0..x1 {
                let sx = (x - ox as i64) as usize;
                let si = sy * src_stride + sx * 4;
                let di = x as usize * 4;
                let top = [src_raw[si], src_raw[si + 1], src_raw[si + 2], src_raw[si + 3]];
                let base = [row_out[di], row_out[di + 1], row_out[di + 2], row_out[di + 3]];
                row_out[di..di + 4].copy_from_slice(&blend_pixel(base, top, mode, opacity));
            }
        });
}

/// Blend a single straight-alpha `top` pixel over `base`.
pub fn blend_pixel(base: [u8; 4], top: [u8; 4], mode: BlendMode, opacity: f32) -> [u8; 4] {
    // Fast path: nothing to draw
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }

    // Fast path: opaque normal paint replaces the destination
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let r = blend_channel(mode, base_r, top_r);
    let g = blend_channel(mode, base_g, top_g);
    let b = blend_channel(mode, base_b, top_b);

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    // Over a transparent base the blend function has nothing to act on.
    let mix = |blended: f32, top_c: f32, base_c: f32| -> f32 {
        let c = blended * base_a + top_c * (1.0 - base_a);
        (c * top_a + base_c * base_a * (1.0 - top_a)) / out_a
    };

    [
        unit_to_u8(mix(r, top_r, base_r)),
        unit_to_u8(mix(g, top_g, base_g)),
        unit_to_u8(mix(b, top_b, base_b)),
        unit_to_u8(out_a),
    ]
}

/// Separable blend function `B(base, top)` for one channel in 0..1.
pub fn blend_channel(mode: BlendMode, base: f32, top: f32) -> f32 {
    match mode {
        BlendMode::Normal => top,
        BlendMode::Multiply => base * top,
        BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
        BlendMode::Overlay => hard_light(top, base),
        BlendMode::Darken => base.min(top),
        BlendMode::Lighten => base.max(top),
        BlendMode::ColorDodge => {
            if base <= 0.0 {
                0.0
            } else if top >= 1.0 {
                1.0
            } else {
                (base / (1.0 - top)).min(1.0)
            }
        }
        BlendMode::ColorBurn => {
            if base >= 1.0 {
                1.0
            } else if top <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - base) / top).min(1.0)
            }
        }
        BlendMode::HardLight => hard_light(base, top),
        BlendMode::SoftLight => soft_light(base, top),
        BlendMode::Difference => (base - top).abs(),
        BlendMode::Exclusion => base + top - 2.0 * base * top,
    }
}

fn hard_light(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base * 2.0 * top
    } else {
        let t = 2.0 * top - 1.0;
        base + t - base * t
    }
}

/// W3C Soft Light formula.
fn soft_light(base: f32, top: f32) -> f32 {
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

#[inline]
fn unit_to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_layer(color: [u8; 4], w: u32, h: u32) -> Layer {
        Layer::new("t".into(), w, h, color).unwrap()
    }

    #[test]
    fn single_opaque_layer_reproduces_itself() {
        let mut layer = solid_layer([0, 0, 0, 255], 3, 2);
        for (i, px) in [[1, 2, 3, 255], [200, 100, 50, 255], [9, 9, 9, 255]].iter().enumerate() {
            layer.pixels.set(i as u32, 1, *px);
        }
        let out = composite_layers(std::slice::from_ref(&layer), 3, 2).unwrap();
        assert_eq!(out, layer.pixels);
    }

    #[test]
    fn half_blue_over_red() {
        let bottom = solid_layer([255, 0, 0, 255], 1, 1);
        let mut top = solid_layer([0, 0, 255, 255], 1, 1);
        top.opacity = 50;
        let out = composite_layers(&[bottom, top], 1, 1).unwrap();
        assert_eq!(out.get(0, 0), [128, 0, 128, 255]);
    }

    #[test]
    fn hidden_and_offset_layers() {
        let bottom = solid_layer([10, 10, 10, 255], 4, 4);
        let mut hidden = solid_layer([200, 0, 0, 255], 4, 4);
        hidden.visible = false;
        let mut shifted = solid_layer([0, 200, 0, 255], 2, 2);
        shifted.x = 3;
        shifted.y = -1;
        let out = composite_layers(&[bottom, hidden, shifted], 4, 4).unwrap();
        assert_eq!(out.get(0, 0), [10, 10, 10, 255]);
        assert_eq!(out.get(3, 0), [0, 200, 0, 255]);
        assert_eq!(out.get(3, 1), [10, 10, 10, 255]);
    }

    #[test]
    fn layer_entirely_outside_is_clipped() {
        let mut far = solid_layer([1, 2, 3, 255], 2, 2);
        far.x = 100;
        let out = composite_layers(&[far], 4, 4).unwrap();
        assert!(out.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn blend_functions_on_opaque_pixels() {
        let base = [128, 64, 255, 255];
        let top = [255, 128, 0, 255];
        assert_eq!(blend_pixel(base, top, BlendMode::Multiply, 1.0), [128, 32, 0, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Screen, 1.0), [255, 160, 255, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Darken, 1.0), [128, 64, 0, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Lighten, 1.0), [255, 128, 255, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Difference, 1.0), [127, 64, 255, 255]);
    }

    #[test]
    fn contrast_blend_modes_on_opaque_pixels() {
        // Channels straddle 0.5 on the base (overlay) and on the top
        // (hard/soft light); blue's base is under 0.25 for soft light.
        let base = [60, 200, 40, 255];
        let top = [100, 100, 220, 255];
        assert_eq!(blend_pixel(base, top, BlendMode::Overlay, 1.0), [47, 188, 69, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::HardLight, 1.0), [47, 157, 196, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::SoftLight, 1.0), [50, 191, 84, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::ColorDodge, 1.0), [99, 255, 255, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::ColorBurn, 1.0), [0, 115, 6, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Exclusion, 1.0), [113, 143, 191, 255]);

        let base = [200, 60, 30, 255];
        let top = [180, 30, 120, 255];
        assert_eq!(blend_pixel(base, top, BlendMode::Overlay, 1.0), [223, 14, 28, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::SoftLight, 1.0), [211, 25, 28, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::ColorDodge, 1.0), [255, 68, 57, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::ColorBurn, 1.0), [177, 0, 0, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Exclusion, 1.0), [98, 76, 122, 255]);
    }

    #[test]
    fn blend_over_transparent_keeps_source_colour() {
        let out = blend_pixel([0, 0, 0, 0], [40, 80, 120, 255], BlendMode::Multiply, 1.0);
        assert_eq!(out, [40, 80, 120, 255]);
        let faded = blend_pixel([0, 0, 0, 0], [40, 80, 120, 255], BlendMode::Normal, 0.5);
        assert_eq!(faded, [40, 80, 120, 128]);
    }

    #[test]
    fn zero_opacity_or_alpha_is_a_noop() {
        let base = [1, 2, 3, 4];
        assert_eq!(blend_pixel(base, [255; 4], BlendMode::Screen, 0.0), base);
        assert_eq!(blend_pixel(base, [255, 255, 255, 0], BlendMode::Normal, 1.0), base);
    }
}
