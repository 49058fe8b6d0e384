// normalize.rs — Per-channel contrast stretch to the full 0–255 range.
//
// For each channel c independently:
//   1. max_c = max over all pixels of src[c]
//   2. dst[c] = 255 * src[c] / max_c      (integer division, truncating)
//
// Step 2 for a channel may only start once step 1 for that channel has
// seen every pixel. Here the four maxima are reduced in parallel first and
// the rescale runs afterwards; the channel-pipeline backend performs the
// same two steps per channel inside its own worker threads.
//
// An all-zero channel (max_c == 0) is valid input and stays at zero.

use rayon::prelude::*;

use crate::image::{RgbaImage, CHANNELS};

/// Maximum observed sample value per channel, in R, G, B, A order.
pub type ChannelMax = [u8; CHANNELS];

/// Largest value of `channel` across the image.
pub fn channel_max(src: &RgbaImage, channel: usize) -> u8 {
    assert!(channel < CHANNELS, "channel {channel} out of range");
    src.as_slice()
        .par_chunks_exact(src.row_len().max(CHANNELS))
        .map(|row| {
            row.iter()
                .skip(channel)
                .step_by(CHANNELS)
                .copied()
                .max()
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0)
}

/// Maxima of all four channels.
pub fn channel_maxima(src: &RgbaImage) -> ChannelMax {
    let mut out = [0u8; CHANNELS];
    out.par_iter_mut()
        .enumerate()
        .for_each(|(c, m)| *m = channel_max(src, c));
    out
}

/// `255 * sample / max` with integer truncation; zero when `max == 0`.
#[inline]
pub fn rescale_sample(sample: u8, max: u8) -> u8 {
    if max == 0 {
        return 0;
    }
    // sample <= max, so the quotient never exceeds 255.
    (255 * sample as u32 / max as u32).min(255) as u8
}

/// Lookup table mapping every sample value to its rescaled value.
pub(crate) fn rescale_table(max: u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (s, v) in lut.iter_mut().enumerate() {
        *v = rescale_sample(s as u8, max);
    }
    lut
}

/// Stretch every channel to the full range.
///
/// Returns the normalized image together with the per-channel maxima that
/// were used.
pub fn normalize(src: &RgbaImage) -> (RgbaImage, ChannelMax) {
    let maxima = channel_maxima(src);
    let luts: [[u8; 256]; CHANNELS] = [
        rescale_table(maxima[0]),
        rescale_table(maxima[1]),
        rescale_table(maxima[2]),
        rescale_table(maxima[3]),
    ];

    let mut dst = src.same_shape();
    dst.as_mut_slice()
        .par_chunks_exact_mut(CHANNELS)
        .zip(src.as_slice().par_chunks_exact(CHANNELS))
        .for_each(|(out, px)| {
            for c in 0..CHANNELS {
                out[c] = luts[c][px[c] as usize];
            }
        });

    log::debug!("normalize: channel maxima {maxima:?}");
    (dst, maxima)
}
