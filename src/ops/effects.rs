// ============================================================================
// EFFECTS
// ============================================================================
//
// Randomness comes from a deterministic integer hash of (x, y, seed), so the
// same seed always reproduces the same grain and rows can be processed in
// any order.
// ============================================================================

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;

use crate::canvas::PixelBuffer;
use crate::ops::{adjustments, apply_per_pixel, convolution};

pub const DEFAULT_OIL_RADIUS: u32 = 7;
pub const DEFAULT_OIL_LEVELS: u32 = 55;

/// Salt that gives uniform noise its own hash stream.
const UNIFORM_STREAM: u32 = 0xA511_E9B3;

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Simple hash for deterministic noise.
#[inline]
pub(crate) fn hash_u32(mut x: u32) -> u32 {
    x = x.wrapping_add(0x9E3779B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EBCA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2AE35);
    x ^= x >> 16;
    x
}

/// Hash to f32 in [0, 1).
#[inline]
pub(crate) fn hash_f32(x: u32, y: u32, seed: u32) -> f32 {
    let h = hash_u32(
        x.wrapping_mul(374761393)
            .wrapping_add(y.wrapping_mul(668265263))
            .wrapping_add(seed),
    );
    (h & 0x00FFFFFF) as f32 / 16777216.0
}

static SEED_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A seed that differs between calls, for filters run without an explicit
/// `seed` option.
pub fn fresh_seed() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or(0);
    let n = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
    hash_u32(nanos ^ n.wrapping_mul(0x9E3779B9))
}

// ============================================================================
// NOISE
// ============================================================================

/// Add grain of strength `amount` (0..100 percent of full scale). Every pixel
/// gets one offset in `[-intensity, intensity)` applied to R, G and B alike;
/// alpha is untouched. `uniform` selects a separate hash stream.
pub fn add_noise(src: &PixelBuffer, amount: f32, uniform: bool, seed: u32) -> PixelBuffer {
    let amount = if amount.is_nan() { 0.0 } else { amount.clamp(0.0, 100.0) };
    if amount == 0.0 {
        return src.clone();
    }
    let intensity = amount / 100.0 * 255.0;
    let stream = if uniform { seed ^ UNIFORM_STREAM } else { seed };
    apply_per_pixel(src, move |x, y, [r, g, b, a]| {
        let n = (hash_f32(x, y, stream) * 2.0 - 1.0) * intensity;
        [r + n, g + n, b + n, a]
    })
}

// ============================================================================
// RANK FILTERS
// ============================================================================

/// Per-channel median over a `size`×`size` window. Even sizes grow to the
/// next odd size and 0 acts as 1. Alpha comes from the centre pixel.
pub fn median(src: &PixelBuffer, size: u32) -> PixelBuffer {
    let size = if size % 2 == 0 { size + 1 } else { size };
    if size <= 1 {
        return src.clone();
    }
    let r = (size / 2) as i64;
    let w = src.width() as usize;
    let stride = w * 4;
    let mut dst_raw = vec![0u8; src.as_raw().len()];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let mut channels: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
            for x in 0..w {
                for c in &mut channels {
                    c.clear();
                }
                for dy in -r..=r {
                    for dx in -r..=r {
                        let px = src.sample_clamped(x as i64 + dx, y as i64 + dy);
                        for c in 0..3 {
                            channels[c].push(px[c]);
                        }
                    }
                }
                let pi = x * 4;
                for c in 0..3 {
                    channels[c].sort_unstable();
                    row_out[pi + c] = channels[c][channels[c].len() / 2];
                }
                row_out[pi + 3] = src.get(x as u32, y as u32)[3];
            }
        });

    src.with_data(dst_raw)
}

// ============================================================================
// ARTISTIC
// ============================================================================

/// Oil painting: bucket every pixel of the `(2r+1)²` window by mean
/// intensity into `levels` bins, then output the average colour of the
/// fullest bin (the lowest bin wins a tie). Alpha comes from the centre.
pub fn oil_painting(src: &PixelBuffer, radius: u32, levels: u32) -> PixelBuffer {
    let r = radius as i64;
    let num_levels = levels.clamp(2, 256) as usize;
    let top_level = (num_levels - 1) as u32;
    let w = src.width() as usize;
    let stride = w * 4;
    let mut dst_raw = vec![0u8; src.as_raw().len()];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let mut count = vec![0u64; num_levels];
            let mut sum_r = vec![0u64; num_levels];
            let mut sum_g = vec![0u64; num_levels];
            let mut sum_b = vec![0u64; num_levels];

            for x in 0..w {
                count.iter_mut().for_each(|v| *v = 0);
                sum_r.iter_mut().for_each(|v| *v = 0);
                sum_g.iter_mut().for_each(|v| *v = 0);
                sum_b.iter_mut().for_each(|v| *v = 0);

                for dy in -r..=r {
                    for dx in -r..=r {
                        let [pr, pg, pb, _] = src.sample_clamped(x as i64 + dx, y as i64 + dy);
                        // floor(mean * (levels - 1) / 255) in integers
                        let total = pr as u32 + pg as u32 + pb as u32;
                        let bucket = (total * top_level / 765) as usize;
                        count[bucket] += 1;
                        sum_r[bucket] += pr as u64;
                        sum_g[bucket] += pg as u64;
                        sum_b[bucket] += pb as u64;
                    }
                }

                // Strictly greater keeps the lowest bucket on ties.
                let mut max_count = 0u64;
                let mut max_idx = 0usize;
                for (i, &c) in count.iter().enumerate() {
                    if c > max_count {
                        max_count = c;
                        max_idx = i;
                    }
                }

                let pi = x * 4;
                if max_count > 0 {
                    row_out[pi] = (sum_r[max_idx] / max_count) as u8;
                    row_out[pi + 1] = (sum_g[max_idx] / max_count) as u8;
                    row_out[pi + 2] = (sum_b[max_idx] / max_count) as u8;
                }
                row_out[pi + 3] = src.get(x as u32, y as u32)[3];
            }
        });

    src.with_data(dst_raw)
}

/// Pencil sketch: grayscale, Laplacian edges, then invert so edges come out
/// dark on white.
pub fn sketch(src: &PixelBuffer) -> PixelBuffer {
    let gray = adjustments::grayscale(src);
    let edges = convolution::edge_detect(&gray);
    adjustments::invert(&edges)
}
