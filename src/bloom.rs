// bloom.rs — Bright-pass → blur → additive composite.
//
//   src ─┬─▶ compute_luminance ─▶ bright_mask ─▶ backend.blur ─▶ blurred_mask ─┐
//        │                                                                     ▼
//        └───────────────────────────────────────────────────────────▶ composite ─▶ output
//
// Every arrow is a full synchronization point: each stage returns a complete
// image before the next one starts reading it. The blur itself is delegated
// to any `BlurBackend`, so the same pipeline runs on threads, rayon or the
// device.
//
// Optionally each channel is stretched to the full range first
// (`normalize::normalize`); the normalized image then stands in for `src`
// in every later stage, including the composite.

use std::fmt;
use std::time::Instant;

use crate::backend::{BlurBackend, DataParallel};
use crate::composite::composite;
use crate::error::{BlurError, Result};
use crate::image::RgbaImage;
use crate::kernel::KernelWeights;
use crate::luminance::{bright_mask, compute_luminance, DEFAULT_BRIGHT_RATIO};
use crate::normalize::normalize;

/// Every image produced by one bloom run.
#[derive(Debug, Clone)]
pub struct BloomOutput {
    /// Largest `(R + G + B) / 3` in the (possibly normalized) input.
    pub max_luminance: u8,
    /// Bright pixels of the input, everything else transparent black.
    pub mask: RgbaImage,
    /// `mask` after the separable blur.
    pub blurred_mask: RgbaImage,
    /// `input + blurred_mask`, saturated at 255.
    pub output: RgbaImage,
}

/// Bloom post-process over a chosen blur backend.
pub struct BloomPipeline {
    backend: Box<dyn BlurBackend>,
    weights: KernelWeights,
    threshold: f32,
    normalize: bool,
}

impl BloomPipeline {
    /// # Errors
    /// `InvalidThreshold` unless `0.0 <= threshold <= 1.0`.
    pub fn new(backend: Box<dyn BlurBackend>, weights: KernelWeights, threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(BlurError::InvalidThreshold(threshold));
        }
        Ok(BloomPipeline {
            backend,
            weights,
            threshold,
            normalize: false,
        })
    }

    /// Stretch every channel to 0..=255 before extracting bright pixels.
    pub fn with_normalization(mut self, enabled: bool) -> Self {
        self.normalize = enabled;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn weights(&self) -> &KernelWeights {
        &self.weights
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run the whole pipeline on `src`.
    ///
    /// # Errors
    /// `EmptyImage` for an image without pixels; otherwise whatever the
    /// blur backend reports.
    pub fn run(&self, src: &RgbaImage) -> Result<BloomOutput> {
        src.ensure_not_empty()?;
        let start = Instant::now();

        let normalized;
        let input = if self.normalize {
            let (img, maxima) = normalize(src);
            log::debug!("bloom: channel maxima {maxima:?}");
            normalized = img;
            &normalized
        } else {
            src
        };

        let lum = compute_luminance(input);
        let mask = bright_mask(input, &lum, self.threshold)?;
        log::debug!(
            "bloom: max luminance {}, {} bright pixel(s) at ratio {}",
            lum.max(),
            lum.bright_count(self.threshold),
            self.threshold
        );

        let blurred_mask = self.backend.blur(&mask, &self.weights)?;
        let output = composite(input, &blurred_mask)?;

        log::debug!(
            "bloom[{}]: {}×{} in {:.2?}",
            self.backend.name(),
            src.width(),
            src.height(),
            start.elapsed()
        );
        Ok(BloomOutput {
            max_luminance: lum.max(),
            mask,
            blurred_mask,
            output,
        })
    }
}

impl Default for BloomPipeline {
    /// rayon backend, radius 8 / sigma 3.0, threshold 0.9.
    fn default() -> Self {
        BloomPipeline {
            backend: Box::new(DataParallel::new()),
            weights: KernelWeights::default(),
            threshold: DEFAULT_BRIGHT_RATIO,
            normalize: false,
        }
    }
}

impl fmt::Debug for BloomPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomPipeline")
            .field("backend", &self.backend.name())
            .field("weights", &self.weights)
            .field("threshold", &self.threshold)
            .field("normalize", &self.normalize)
            .finish()
    }
}
