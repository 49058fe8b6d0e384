// backend/mod.rs — Interchangeable execution strategies for the blur passes.
//
// Every backend computes exactly the same function: the serial reference in
// `convolution`. They differ only in how rows (or channels) are handed out
// to workers and where the synchronization points sit:
//
//   Serial          — calling thread, one pass after the other.
//   RowPartitioned  — fixed `PartitionPlan`, one scoped thread per range,
//                     join between passes.
//   DataParallel    — rayon work stealing over individual rows.
//   ChannelPipeline — four threads, one per channel, separated by barriers
//                     (optionally normalizing each channel first).
//   gpu::GpuBlur    — wgpu compute kernel, device-side completion between
//                     passes.
//
// The CPU backends share `convolution::sample`, so their outputs are
// bit-identical. The GPU may differ by one unit per sample from fused
// multiply-add rounding.

use std::time::Instant;

use serde::Deserialize;

use crate::convolution::Axis;
use crate::error::Result;
use crate::image::RgbaImage;
use crate::kernel::KernelWeights;

pub mod channel_pipeline;
pub mod data_parallel;
pub mod row_partitioned;
pub mod serial;

pub use channel_pipeline::{ChannelPipeline, ChannelPipelineOutput};
pub use data_parallel::DataParallel;
pub use row_partitioned::RowPartitioned;
pub use serial::Serial;

/// A strategy for running separable blur passes over an image.
///
/// Implementors must be interchangeable: for the same input and weights,
/// every backend returns the same image (within one unit per sample).
pub trait BlurBackend: Send + Sync {
    /// Short name for logs and benchmark labels.
    fn name(&self) -> &'static str;

    /// Run one 1-D pass along `axis` over the whole image.
    ///
    /// Fails with `EmptyImage` if either dimension is zero.
    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage>;

    /// Full separable blur: horizontal pass, then vertical pass over the
    /// completed intermediate image.
    ///
    /// The horizontal pass is fully joined before the vertical pass reads
    /// it, because vertical taps reach rows written by other workers.
    fn blur(&self, src: &RgbaImage, weights: &KernelWeights) -> Result<RgbaImage> {
        let start = Instant::now();
        let horizontal = self.blur_pass(src, Axis::Horizontal, weights)?;
        let out = self.blur_pass(&horizontal, Axis::Vertical, weights)?;
        log::debug!(
            "{}: blurred {}×{} (r={}) in {:.2?}",
            self.name(),
            src.width(),
            src.height(),
            weights.radius(),
            start.elapsed()
        );
        Ok(out)
    }
}

impl<B: BlurBackend + ?Sized> BlurBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage> {
        (**self).blur_pass(src, axis, weights)
    }

    fn blur(&self, src: &RgbaImage, weights: &KernelWeights) -> Result<RgbaImage> {
        (**self).blur(src, weights)
    }
}

/// Backend selector used by configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Serial,
    RowPartitioned,
    #[default]
    DataParallel,
    ChannelPipeline,
    Gpu,
}

impl BackendKind {
    /// All CPU backends, for tests and benches that compare them.
    pub const CPU: [BackendKind; 4] = [
        BackendKind::Serial,
        BackendKind::RowPartitioned,
        BackendKind::DataParallel,
        BackendKind::ChannelPipeline,
    ];
}
