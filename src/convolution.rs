// convolution.rs — Edge-clamped 1-D Gaussian sampling and separable passes.
//
// A full blur is two passes over the interleaved RGBA buffer:
//   apply_pass(src, Horizontal) → intermediate
//   apply_pass(intermediate, Vertical) → output
//
// A 2-D Gaussian factors into the product of two 1-D Gaussians, so the two
// passes compute the same filter as `blur_2d` at O(2r+1) taps per sample
// instead of O((2r+1)²). `blur_2d` is kept as the correctness baseline.
//
// BORDER HANDLING: clamp (replicate edge pixels). A tap that would fall
// outside the image reads the nearest edge pixel instead, so there is no
// dark fringe along the borders.
//
// NORMALIZATION: every sample divides by the sum of the weights it actually
// accumulated rather than by a precomputed constant. Clamped taps still
// contribute their weight, so the divisor is the full table sum; computing
// it alongside the value keeps the result exact for any weight table.
//
// Every CPU backend funnels through `sample`, in the same tap order, which
// is what makes their outputs bit-identical.

use std::ops::Range;

use crate::image::{RgbaImage, CHANNELS};
use crate::kernel::KernelWeights;

/// Which dimension the 1-D kernel walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    /// Value passed to the device kernel (0 = horizontal, 1 = vertical).
    pub fn as_u32(self) -> u32 {
        match self {
            Axis::Horizontal => 0,
            Axis::Vertical => 1,
        }
    }
}

/// Anything the sampler can read interleaved RGBA samples from.
///
/// Implemented by `RgbaImage` and by the shared atomic buffers of the
/// channel-pipeline backend.
pub trait SampleSource {
    /// `(width, height)` in pixels.
    fn dimensions(&self) -> (usize, usize);

    /// Load the sample at a flat index into the interleaved buffer.
    fn load(&self, index: usize) -> u8;
}

impl SampleSource for RgbaImage {
    #[inline]
    fn dimensions(&self) -> (usize, usize) {
        RgbaImage::dimensions(self)
    }

    #[inline]
    fn load(&self, index: usize) -> u8 {
        self.as_slice()[index]
    }
}

/// Clamp `coord + offset` into `[0, len - 1]`.
///
/// # Panics
/// Panics (debug) if `len == 0`.
#[inline]
pub fn tap_coordinate(coord: usize, offset: isize, len: usize) -> usize {
    debug_assert!(len > 0, "cannot clamp into an empty range");
    (coord as isize + offset).clamp(0, len as isize - 1) as usize
}

/// Round and saturate an accumulated value to a byte.
#[inline]
pub(crate) fn quantize(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Compute one output sample of a 1-D pass.
///
/// Walks offsets `-radius..=radius` along `axis`, clamping each tap into the
/// image, and returns `round(Σ w·src / Σ w)` saturated to `[0, 255]`.
pub fn sample<S: SampleSource + ?Sized>(
    src: &S,
    x: usize,
    y: usize,
    channel: usize,
    axis: Axis,
    weights: &KernelWeights,
) -> u8 {
    let (w, h) = src.dimensions();
    let mut acc = 0.0f32;
    let mut weight_sum = 0.0f32;
    for (offset, wt) in weights.taps() {
        let (tx, ty) = match axis {
            Axis::Horizontal => (tap_coordinate(x, offset, w), y),
            Axis::Vertical => (x, tap_coordinate(y, offset, h)),
        };
        acc += wt * src.load((ty * w + tx) * CHANNELS + channel) as f32;
        weight_sum += wt;
    }
    quantize(acc / weight_sum)
}

/// Compute rows `rows` of a pass into `out`, which holds exactly those rows.
///
/// This is the per-row body shared by every CPU backend: each worker owns a
/// disjoint slice of the output and reads the whole source.
///
/// # Panics
/// Panics if `out.len() != rows.len() * width * 4` or the range exceeds the
/// image height.
pub fn apply_pass_rows<S: SampleSource + ?Sized>(
    src: &S,
    axis: Axis,
    weights: &KernelWeights,
    rows: Range<usize>,
    out: &mut [u8],
) {
    let (w, h) = src.dimensions();
    assert!(rows.end <= h, "row range {rows:?} exceeds height {h}");
    assert_eq!(
        out.len(),
        rows.len() * w * CHANNELS,
        "output slice does not match row range {rows:?}"
    );
    let row_len = w * CHANNELS;
    for (y, out_row) in rows.zip(out.chunks_exact_mut(row_len.max(1))) {
        for x in 0..w {
            for c in 0..CHANNELS {
                out_row[x * CHANNELS + c] = sample(src, x, y, c, axis, weights);
            }
        }
    }
}

/// Apply one pass over the whole image on the calling thread.
pub fn apply_pass(src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> RgbaImage {
    let mut dst = src.same_shape();
    apply_pass_rows(src, axis, weights, 0..src.height(), dst.as_mut_slice());
    dst
}

/// Full separable Gaussian blur: horizontal pass, then vertical pass over
/// the complete intermediate image.
pub fn blur_separable(src: &RgbaImage, weights: &KernelWeights) -> RgbaImage {
    let intermediate = apply_pass(src, Axis::Horizontal, weights);
    apply_pass(&intermediate, Axis::Vertical, weights)
}

/// Non-separable 2-D Gaussian blur with the same radius and sigma.
///
/// Weight for tap (dx, dy) is `w(dx) · w(dy) = exp(-(dx² + dy²) / 2σ²)`.
/// Quadratic in the radius; use only as a reference.
pub fn blur_2d(src: &RgbaImage, weights: &KernelWeights) -> RgbaImage {
    let (w, h) = src.dimensions();
    let data = src.as_slice();
    let mut dst = src.same_shape();
    for y in 0..h {
        for x in 0..w {
            for c in 0..CHANNELS {
                let mut acc = 0.0f32;
                let mut weight_sum = 0.0f32;
                for (dy, wy) in weights.taps() {
                    let ty = tap_coordinate(y, dy, h);
                    for (dx, wx) in weights.taps() {
                        let tx = tap_coordinate(x, dx, w);
                        let wt = wx * wy;
                        acc += wt * data[(ty * w + tx) * CHANNELS + c] as f32;
                        weight_sum += wt;
                    }
                }
                let i = dst.index(x, y, c);
                dst.as_mut_slice()[i] = quantize(acc / weight_sum);
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_row(values: &[u8]) -> RgbaImage {
        RgbaImage::from_fn(values.len(), 1, |x, _| {
            let v = values[x];
            [v, v, v, 255]
        })
    }

    #[test]
    fn test_tap_coordinate_clamps() {
        assert_eq!(tap_coordinate(0, -3, 10), 0);
        assert_eq!(tap_coordinate(9, 4, 10), 9);
        assert_eq!(tap_coordinate(5, -2, 10), 3);
        assert_eq!(tap_coordinate(0, 5, 1), 0);
    }

    #[test]
    fn test_quantize_rounds_and_saturates() {
        assert_eq!(quantize(12.5), 13);
        assert_eq!(quantize(12.49), 12);
        assert_eq!(quantize(-4.0), 0);
        assert_eq!(quantize(300.0), 255);
    }

    #[test]
    fn test_clamp_border_sample() {
        // Row [10, 20, 30], radius 1, sigma large enough that the weights
        // are ~[a, 1, a]. At x = 0 the left tap clamps onto pixel 0.
        let img = gray_row(&[10, 20, 30]);
        let k = KernelWeights::new(1, 1.0).unwrap();
        let a = k.weight(1);
        let expected = (a * 10.0 + 10.0 + a * 20.0) / (1.0 + 2.0 * a);
        assert_eq!(sample(&img, 0, 0, 0, Axis::Horizontal, &k), quantize(expected));
        // Alpha is blurred like any other channel.
        assert_eq!(sample(&img, 0, 0, 3, Axis::Horizontal, &k), 255);
    }

    #[test]
    fn test_vertical_ignores_horizontal_neighbors() {
        // A single row: every vertical tap clamps to the same row.
        let img = gray_row(&[0, 200, 0, 90]);
        let k = KernelWeights::default();
        let out = apply_pass(&img, Axis::Vertical, &k);
        assert_eq!(out, img);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let img = RgbaImage::from_fn(5, 4, |x, y| [(x * 40) as u8, (y * 60) as u8, 7, 255]);
        let k = KernelWeights::new(0, 1.0).unwrap();
        assert_eq!(blur_separable(&img, &k), img);
    }

    #[test]
    fn test_single_pixel_unchanged() {
        let img = RgbaImage::filled(1, 1, [42, 17, 250, 128]);
        let out = blur_separable(&img, &KernelWeights::default());
        assert_eq!(out, img);
    }

    #[test]
    fn test_uniform_image_unchanged() {
        let img = RgbaImage::filled(13, 7, [100, 37, 201, 255]);
        let k = KernelWeights::default();
        assert_eq!(blur_separable(&img, &k), img);
        assert_eq!(blur_2d(&img, &k), img);
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut img = RgbaImage::new(9, 9);
        img.set_pixel(4, 4, [255, 255, 255, 255]);
        let out = blur_separable(&img, &KernelWeights::new(2, 1.0).unwrap());
        assert!(out.sample(4, 4, 0) < 255);
        assert!(out.sample(5, 4, 0) > 0);
        assert!(out.sample(4, 5, 0) > 0);
        // Symmetric spread.
        assert_eq!(out.sample(3, 4, 0), out.sample(5, 4, 0));
        assert_eq!(out.sample(4, 3, 0), out.sample(4, 5, 0));
    }

    #[test]
    fn test_separable_close_to_2d() {
        let img = RgbaImage::from_fn(16, 12, |x, y| {
            [((x * 37 + y * 11) % 256) as u8, ((x * y) % 256) as u8, (y * 20) as u8, 255]
        });
        let k = KernelWeights::new(3, 1.5).unwrap();
        let sep = blur_separable(&img, &k);
        let full = blur_2d(&img, &k);
        // The separable path rounds its intermediate to 8 bits.
        assert!(sep.max_abs_diff(&full) <= 1, "diff {}", sep.max_abs_diff(&full));
    }

    #[test]
    fn test_apply_pass_rows_matches_full_pass() {
        let img = RgbaImage::from_fn(6, 5, |x, y| [(x * 50) as u8, (y * 50) as u8, 3, 9]);
        let k = KernelWeights::new(2, 1.0).unwrap();
        let full = apply_pass(&img, Axis::Vertical, &k);
        let mut part = vec![0u8; 2 * img.row_len()];
        apply_pass_rows(&img, Axis::Vertical, &k, 2..4, &mut part);
        assert_eq!(&part[..], &full.as_slice()[2 * img.row_len()..4 * img.row_len()]);
    }

    #[test]
    #[should_panic(expected = "does not match row range")]
    fn test_apply_pass_rows_wrong_slice() {
        let img = RgbaImage::new(4, 4);
        let mut out = vec![0u8; 3];
        apply_pass_rows(&img, Axis::Horizontal, &KernelWeights::default(), 0..1, &mut out);
    }
}
