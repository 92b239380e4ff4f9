// ============================================================================
// PIXEL OPERATIONS - filters, adjustments, effects and layer compositing
// ============================================================================
//
// Every filter is a pure function `&PixelBuffer -> PixelBuffer`: it reads the
// source and writes into a freshly allocated output of the same size, so no
// pass ever observes its own partial writes. Work is split by output row with
// rayon.
// ============================================================================

pub mod adjustments;
pub mod compositor;
pub mod convolution;
pub mod dispatch;
pub mod effects;
pub mod filters;

use rayon::prelude::*;

use crate::canvas::PixelBuffer;

/// Apply a per-pixel transform. `transform` receives `(x, y, [r, g, b, a])`
/// as f32 in 0..255 and returns the new channels, which are rounded and
/// clamped to 0..255.
pub(crate) fn apply_per_pixel<F>(src: &PixelBuffer, transform: F) -> PixelBuffer
where
    F: Fn(u32, u32, [f32; 4]) -> [f32; 4] + Sync,
{
    let w = src.width() as usize;
    let stride = w * 4;
    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; src_raw.len()];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row_in = &src_raw[y * stride..(y + 1) * stride];
            for x in 0..w {
                let pi = x * 4;
                let px = [
                    row_in[pi] as f32,
                    row_in[pi + 1] as f32,
                    row_in[pi + 2] as f32,
                    row_in[pi + 3] as f32,
                ];
                let out = transform(x as u32, y as u32, px);
                for c in 0..4 {
                    row_out[pi + c] = to_channel(out[c]);
                }
            }
        });

    src.with_data(dst_raw)
}

/// Round and clamp a float channel into a byte.
#[inline]
pub(crate) fn to_channel(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}
