// backend/serial.rs — Single-threaded reference backend.

use crate::backend::BlurBackend;
use crate::convolution::{apply_pass, Axis};
use crate::error::Result;
use crate::image::RgbaImage;
use crate::kernel::KernelWeights;

/// Runs every pass on the calling thread. The other backends are checked
/// against this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serial;

impl BlurBackend for Serial {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage> {
        src.ensure_not_empty()?;
        Ok(apply_pass(src, axis, weights))
    }
}
