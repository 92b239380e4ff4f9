// ============================================================================
// BLUR FILTERS
// ============================================================================

use rayon::prelude::*;

use crate::canvas::PixelBuffer;
use crate::ops::to_channel;

/// Radius used by the watercolor filter.
pub const WATERCOLOR_RADIUS: f32 = 3.0;

/// Largest radius a kernel is built for; larger requests are clamped.
pub const MAX_KERNEL_RADIUS: f32 = 32_768.0;

/// Normalized 1-D Gaussian taps for `radius`: side `2*ceil(radius)+1`,
/// `sigma = radius / 3`. The radius is clamped to [`MAX_KERNEL_RADIUS`].
pub fn build_gaussian_kernel(radius: f32) -> Vec<f32> {
    if radius.is_nan() || radius <= 0.0 {
        return vec![1.0];
    }
    let radius = radius.min(MAX_KERNEL_RADIUS);
    let half = radius.ceil() as i32;
    let sigma = radius / 3.0;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| {
            let d = i as f32;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Gaussian blur over all four channels. The 2-D weight is the outer
/// product of the 1-D kernel, so the work is done as a horizontal then a
/// vertical pass in f32; each pass divides by the weight it actually used.
/// A radius of 0 (negative and NaN clamp to 0) returns a copy.
pub fn gaussian_blur(src: &PixelBuffer, radius: f32) -> PixelBuffer {
    let radius = if radius.is_nan() { 0.0 } else { radius.max(0.0) };
    // Radii past the longest edge are clamped to it.
    let longest = src.width().max(src.height()) as f32;
    let kernel = build_gaussian_kernel(radius.min(longest));
    if kernel.len() == 1 {
        return src.clone();
    }

    let w = src.width() as usize;
    let h = src.height() as usize;
    let half = (kernel.len() / 2) as isize;
    let stride = w * 4;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();

    // Horizontal pass
    let mut buf_h = vec![0.0f32; buf_in.len()];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            let mut weight = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - half).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
                weight += kv;
            }
            for c in 0..4 {
                row_out[x * 4 + c] = acc[c] / weight;
            }
        }
    });

    // Vertical pass
    let mut dst_raw = vec![0u8; buf_in.len()];
    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            let mut weight = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - half).clamp(0, h as isize - 1) as usize;
                let idx = sy * stride + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
                weight += kv;
            }
            for c in 0..4 {
                row_out[x * 4 + c] = to_channel(acc[c] / weight);
            }
        }
    });

    src.with_data(dst_raw)
}

/// Soft, bleeding-edge look: a fixed small Gaussian blur.
pub fn watercolor(src: &PixelBuffer) -> PixelBuffer {
    gaussian_blur(src, WATERCOLOR_RADIUS)
}
