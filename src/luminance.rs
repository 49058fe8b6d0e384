// luminance.rs — Per-pixel luminance and the bright-pixel mask used by bloom.
//
// luminance = (R + G + B) / 3, integer truncation, alpha ignored.
//
// The global maximum is a parallel reduction: each rayon worker folds a
// local maximum over the rows it processed, and the partial maxima are then
// merged into the shared value under a mutex. Workers never write the shared
// scalar without holding the lock.
//
// A pixel is "bright" when its luminance is strictly greater than
// `ratio * max_luminance` (ratio = 0.9 by default). The mask keeps the full
// RGBA of bright pixels and zeroes all four samples elsewhere.

use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;

use crate::error::{BlurError, Result};
use crate::image::{RgbaImage, CHANNELS};

/// Default fraction of the maximum luminance a pixel must exceed.
pub const DEFAULT_BRIGHT_RATIO: f32 = 0.9;

/// Luminance of one pixel.
#[inline]
pub fn pixel_luminance(rgba: &[u8]) -> u8 {
    ((rgba[0] as u16 + rgba[1] as u16 + rgba[2] as u16) / 3) as u8
}

/// `width * height` luminance values plus their maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceBuffer {
    values: Vec<u8>,
    width: usize,
    height: usize,
    max: u8,
}

impl LuminanceBuffer {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Largest luminance in the image.
    pub fn max(&self) -> u8 {
        self.max
    }

    /// Luminance values in row-major pixel order.
    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }

    /// Luminance at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        assert!(x < self.width && y < self.height, "({x},{y}) out of bounds");
        self.values[y * self.width + x]
    }

    /// Cut-off a pixel's luminance must exceed to count as bright.
    pub fn threshold(&self, ratio: f32) -> f32 {
        ratio * self.max as f32
    }

    /// Whether pixel `index` (row-major) is bright for `ratio`.
    ///
    /// # Panics
    /// Panics if `index >= width * height`.
    #[inline]
    pub fn is_bright(&self, index: usize, ratio: f32) -> bool {
        self.values[index] as f32 > self.threshold(ratio)
    }

    /// Number of bright pixels for `ratio`.
    pub fn bright_count(&self, ratio: f32) -> usize {
        let t = self.threshold(ratio);
        self.values.par_iter().filter(|&&v| v as f32 > t).count()
    }
}

/// Compute the luminance buffer and its global maximum.
pub fn compute_luminance(src: &RgbaImage) -> LuminanceBuffer {
    let (w, h) = src.dimensions();
    let mut values = vec![0u8; w * h];
    let global_max = Mutex::new(0u8);

    values
        .par_chunks_mut(w.max(1))
        .zip(src.as_slice().par_chunks(src.row_len().max(CHANNELS)))
        .fold(
            || 0u8,
            |local_max, (lum_row, px_row)| {
                let mut row_max = local_max;
                for (l, px) in lum_row.iter_mut().zip(px_row.chunks_exact(CHANNELS)) {
                    *l = pixel_luminance(px);
                    row_max = row_max.max(*l);
                }
                row_max
            },
        )
        .for_each(|local_max| {
            let mut g = global_max.lock().unwrap_or_else(PoisonError::into_inner);
            if local_max > *g {
                *g = local_max;
            }
        });

    let max = global_max.into_inner().unwrap_or_else(PoisonError::into_inner);
    LuminanceBuffer {
        values,
        width: w,
        height: h,
        max,
    }
}

/// Copy bright pixels of `src`, zero everything else.
///
/// # Errors
/// `DimensionMismatch` if `lum` was computed from an image of another shape.
pub fn bright_mask(src: &RgbaImage, lum: &LuminanceBuffer, ratio: f32) -> Result<RgbaImage> {
    if src.dimensions() != (lum.width, lum.height) {
        return Err(BlurError::DimensionMismatch {
            a: src.dimensions(),
            b: (lum.width, lum.height),
        });
    }
    let threshold = lum.threshold(ratio);

    let mut dst = src.same_shape();
    dst.as_mut_slice()
        .par_chunks_exact_mut(CHANNELS)
        .zip(src.as_slice().par_chunks_exact(CHANNELS))
        .zip(lum.values.par_iter())
        .for_each(|((out, px), &l)| {
            if l as f32 > threshold {
                out.copy_from_slice(px);
            } else {
                out.fill(0);
            }
        });
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_luminance_truncates_and_ignores_alpha() {
        assert_eq!(pixel_luminance(&[255, 255, 255, 0]), 255);
        assert_eq!(pixel_luminance(&[1, 1, 0, 255]), 0);
        assert_eq!(pixel_luminance(&[10, 20, 32, 7]), 20);
    }

    #[test]
    fn test_is_bright_last_pixel() {
        let img = RgbaImage::from_fn(3, 2, |x, y| if (x, y) == (2, 1) { [255; 4] } else { [0; 4] });
        let lum = compute_luminance(&img);
        assert!(lum.is_bright(5, 0.9));
        assert!(!lum.is_bright(0, 0.9));
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_is_bright_out_of_range() {
        let lum = compute_luminance(&RgbaImage::filled(3, 2, [9, 9, 9, 255]));
        lum.is_bright(6, 0.5);
    }

    #[test]
    fn test_compute_luminance_max() {
        let img = RgbaImage::from_fn(7, 5, |x, y| {
            let v = (x * 10 + y * 3) as u8;
            [v, v, v, 255]
        });
        let lum = compute_luminance(&img);
        assert_eq!(lum.max(), 6 * 10 + 4 * 3);
        assert_eq!(lum.get(2, 1), 23);
        assert_eq!(lum.as_slice().len(), 35);
    }

    #[test]
    fn test_single_bright_pixel_mask() {
        let mut img = RgbaImage::filled(6, 4, [0, 0, 0, 255]);
        img.set_pixel(3, 2, [255, 255, 255, 255]);
        let lum = compute_luminance(&img);
        assert_eq!(lum.max(), 255);
        assert_eq!(lum.bright_count(DEFAULT_BRIGHT_RATIO), 1);

        let mask = bright_mask(&img, &lum, DEFAULT_BRIGHT_RATIO).unwrap();
        for (x, y, p) in mask.pixels() {
            if (x, y) == (3, 2) {
                assert_eq!(p, [255, 255, 255, 255]);
            } else {
                assert_eq!(p, [0, 0, 0, 0], "pixel ({x},{y}) should be masked out");
            }
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        // max = 100, cut-off = 50: exactly 50 is not bright, 51 is.
        let img = RgbaImage::from_fn(3, 1, |x, _| {
            let v = [50u8, 51, 100][x];
            [v, v, v, 255]
        });
        let lum = compute_luminance(&img);
        assert!(!lum.is_bright(0, 0.5));
        assert!(lum.is_bright(1, 0.5));
        assert!(lum.is_bright(2, 0.5));
    }

    #[test]
    fn test_black_image_has_no_bright_pixels() {
        let img = RgbaImage::filled(4, 4, [0, 0, 0, 255]);
        let lum = compute_luminance(&img);
        assert_eq!(lum.max(), 0);
        let mask = bright_mask(&img, &lum, DEFAULT_BRIGHT_RATIO).unwrap();
        assert!(mask.as_slice().iter().all(|&v| v == 0));
    }
}
