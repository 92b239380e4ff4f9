// ============================================================================
// CONVOLUTION ENGINE
// ============================================================================

use rayon::prelude::*;

use crate::canvas::PixelBuffer;
use crate::error::{CoreError, Result};
use crate::ops::to_channel;

/// Square convolution matrix with an odd side.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Vec<f32>,
    normalize: bool,
}

impl Kernel {
    /// Build a kernel from rows. Every row must have the same length as the
    /// number of rows, and that length must be odd.
    pub fn new(rows: Vec<Vec<f32>>, normalize: bool) -> Result<Self> {
        let size = rows.len();
        if size == 0 || size % 2 == 0 {
            return Err(CoreError::InvalidKernel(format!(
                "side must be odd and positive, got {size}"
            )));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != size) {
            return Err(CoreError::InvalidKernel(format!(
                "expected {size} columns per row, found a row with {}",
                bad.len()
            )));
        }
        let weights = rows.into_iter().flatten().collect();
        Ok(Self {
            size,
            weights,
            normalize,
        })
    }

    /// Build a kernel from row-major weights.
    pub fn from_flat(size: usize, weights: Vec<f32>, normalize: bool) -> Result<Self> {
        if size == 0 || size % 2 == 0 || weights.len() != size * size {
            return Err(CoreError::InvalidKernel(format!(
                "{} weights cannot form an odd {size}x{size} matrix",
                weights.len()
            )));
        }
        Ok(Self {
            size,
            weights,
            normalize,
        })
    }

    pub fn identity() -> Self {
        Self::fixed([[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]])
    }

    pub fn sharpen() -> Self {
        Self::fixed([[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]])
    }

    pub fn emboss() -> Self {
        Self::fixed([[-2.0, -1.0, 0.0], [-1.0, 1.0, 1.0], [0.0, 1.0, 2.0]])
    }

    /// 4-neighbour Laplacian.
    pub fn edge_detect() -> Self {
        Self::fixed([[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]])
    }

    fn fixed(rows: [[f32; 3]; 3]) -> Self {
        Self {
            size: 3,
            weights: rows.iter().flatten().copied().collect(),
            normalize: false,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn weight(&self, kx: usize, ky: usize) -> f32 {
        self.weights[ky * self.size + kx]
    }

    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }
}

/// What happens to the alpha channel during a convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AlphaMode {
    /// Copy alpha from the source pixel.
    #[default]
    Preserve,
    /// Convolve alpha like the colour channels.
    Convolve,
}

/// Convolve `src` with `kernel`, reading neighbours through the clamped
/// sampler. The output is a fresh buffer of the same size.
pub fn convolve(src: &PixelBuffer, kernel: &Kernel, alpha: AlphaMode) -> PixelBuffer {
    let w = src.width() as usize;
    let stride = w * 4;
    let half = (kernel.size / 2) as i64;
    let divisor = {
        let s = kernel.sum();
        if kernel.normalize && s != 0.0 { s } else { 1.0 }
    };
    let channels = match alpha {
        AlphaMode::Preserve => 3,
        AlphaMode::Convolve => 4,
    };

    let mut dst_raw = vec![0u8; src.as_raw().len()];
    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            for x in 0..w {
                let mut acc = [0.0f32; 4];
                for ky in 0..kernel.size {
                    let sy = y as i64 + ky as i64 - half;
                    for kx in 0..kernel.size {
                        let k = kernel.weight(kx, ky);
                        if k == 0.0 {
                            continue;
                        }
                        let sx = x as i64 + kx as i64 - half;
                        let px = src.sample_clamped(sx, sy);
                        for c in 0..channels {
                            acc[c] += k * px[c] as f32;
                        }
                    }
                }
                let pi = x * 4;
                for c in 0..channels {
                    row_out[pi + c] = to_channel(acc[c] / divisor);
                }
                if alpha == AlphaMode::Preserve {
                    row_out[pi + 3] = src.get(x as u32, y as u32)[3];
                }
            }
        });

    src.with_data(dst_raw)
}

pub fn sharpen(src: &PixelBuffer) -> PixelBuffer {
    convolve(src, &Kernel::sharpen(), AlphaMode::Preserve)
}

pub fn emboss(src: &PixelBuffer) -> PixelBuffer {
    convolve(src, &Kernel::emboss(), AlphaMode::Preserve)
}

pub fn edge_detect(src: &PixelBuffer) -> PixelBuffer {
    convolve(src, &Kernel::edge_detect(), AlphaMode::Preserve)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                buf.set(x, y, [(x * 40) as u8, (y * 30) as u8, 100, 200 - x as u8]);
            }
        }
        buf
    }

    #[test]
    fn identity_kernel_returns_the_input() {
        let src = gradient(5, 4);
        assert_eq!(convolve(&src, &Kernel::identity(), AlphaMode::Convolve), src);
        assert_eq!(convolve(&src, &Kernel::identity(), AlphaMode::Preserve), src);
    }

    #[test]
    fn even_or_ragged_kernels_are_rejected() {
        assert!(Kernel::new(vec![vec![1.0, 1.0], vec![1.0, 1.0]], false).is_err());
        assert!(Kernel::new(vec![], true).is_err());
        assert!(Kernel::new(vec![vec![1.0], vec![1.0, 2.0], vec![0.0]], false).is_err());
        assert!(Kernel::from_flat(3, vec![1.0; 8], false).is_err());
        assert!(Kernel::from_flat(1, vec![2.0], true).is_ok());
    }

    #[test]
    fn normalized_box_kernel_keeps_flat_colour() {
        let src = PixelBuffer::new_filled(4, 4, [90, 30, 210, 255]).unwrap();
        let k = Kernel::new(vec![vec![1.0; 3]; 3], true).unwrap();
        assert_eq!(convolve(&src, &k, AlphaMode::Convolve), src);
    }

    #[test]
    fn fixed_kernels_on_flat_input() {
        let src = PixelBuffer::new_filled(3, 3, [100, 100, 100, 77]).unwrap();
        // weights sum to 1 (sharpen), 1 (emboss) and 0 (edge)
        assert_eq!(sharpen(&src), src);
        assert_eq!(emboss(&src), src);
        let edges = edge_detect(&src);
        assert_eq!(edges.get(1, 1), [0, 0, 0, 77]);
    }

    #[test]
    fn convolution_preserves_dimensions_and_alpha() {
        let src = gradient(7, 3);
        let out = sharpen(&src);
        assert_eq!(out.dimensions(), (7, 3));
        for y in 0..3 {
            for x in 0..7 {
                assert_eq!(out.get(x, y)[3], src.get(x, y)[3]);
            }
        }
    }

    #[test]
    fn sharpen_boosts_an_isolated_bright_pixel() {
        let mut src = PixelBuffer::new_filled(3, 3, [50, 50, 50, 255]).unwrap();
        src.set(1, 1, [100, 100, 100, 255]);
        let out = sharpen(&src);
        // 5*100 - 4*50
        assert_eq!(out.get(1, 1), [255, 255, 255, 255]);
        // 5*50 - 100 - 3*50 = 0 for the edge-adjacent neighbour
        assert_eq!(out.get(1, 0)[0], 0);
    }
}
