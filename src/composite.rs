// composite.rs — Saturating additive blend of two images.
//
//   out = min(a + b, 255)   per sample, summed in u16 so it never wraps.

use rayon::prelude::*;

use crate::error::Result;
use crate::image::RgbaImage;

/// Saturating sum of two samples.
#[inline]
pub fn add_saturating(a: u8, b: u8) -> u8 {
    (a as u16 + b as u16).min(255) as u8
}

/// Add `b` onto `a` sample by sample, clamping at 255.
///
/// # Errors
/// `DimensionMismatch` if the images differ in shape.
pub fn composite(a: &RgbaImage, b: &RgbaImage) -> Result<RgbaImage> {
    a.ensure_same_shape(b)?;
    let mut dst = a.same_shape();
    dst.as_mut_slice()
        .par_iter_mut()
        .zip(a.as_slice().par_iter().zip(b.as_slice().par_iter()))
        .for_each(|(out, (&x, &y))| *out = add_saturating(x, y));
    Ok(dst)
}
