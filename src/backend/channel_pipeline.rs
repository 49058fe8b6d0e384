// backend/channel_pipeline.rs — One thread per channel, barrier-separated stages.
//
// Four workers, one per RGBA channel, each run the same three-stage pipeline
// over their own channel of the interleaved buffers:
//
//   stage 1  find max_c, rescale channel c          src        → normalized
//   ───────── barrier ─────────
//   stage 2  horizontal pass for channel c          normalized → horizontal
//   ───────── barrier ─────────
//   stage 3  vertical pass for channel c            horizontal → output
//
// The buffers are interleaved (RGBARGBA…): the four workers write
// neighbouring bytes of the same allocation, and stage 3 reads `horizontal`
// at rows other than the one it writes. Every stage-(n+1) read must
// happen-after every stage-n write of *all* workers, which is the edge the
// barrier provides. Buffers are `AtomicU8` so the concurrent disjoint byte
// writes need no `unsafe`; relaxed ordering suffices since the barrier
// carries the synchronization.
//
// A panicking stage must not strand the other workers at the barrier.
// `StageGate` runs each stage under `catch_unwind`, records the failure and
// still waits, so every worker reaches every barrier. Once a failure is
// recorded the remaining stages are skipped and the run reports
// `WorkerPanicked`.
//
// Used as a plain `BlurBackend`, stage 1 copies the channel unchanged.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Barrier, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use crate::backend::BlurBackend;
use crate::convolution::{sample, Axis, SampleSource};
use crate::error::{BlurError, Result};
use crate::image::{RgbaImage, CHANNELS};
use crate::kernel::KernelWeights;
use crate::normalize::{rescale_sample, ChannelMax};

// ---------------------------------------------------------------------------
// Shared interleaved buffer
// ---------------------------------------------------------------------------

/// Interleaved RGBA buffer that several threads may write disjoint bytes of.
struct SharedImage {
    data: Vec<AtomicU8>,
    width: usize,
    height: usize,
}

impl SharedImage {
    fn new(width: usize, height: usize) -> Self {
        SharedImage {
            data: (0..width * height * CHANNELS).map(|_| AtomicU8::new(0)).collect(),
            width,
            height,
        }
    }

    #[inline]
    fn store(&self, index: usize, value: u8) {
        self.data[index].store(value, Ordering::Relaxed);
    }

    /// Snapshot into an owned image. Call only after all writers joined.
    fn to_image(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for (dst, src) in img.as_mut_slice().iter_mut().zip(&self.data) {
            *dst = src.load(Ordering::Relaxed);
        }
        img
    }
}

impl SampleSource for SharedImage {
    #[inline]
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    fn load(&self, index: usize) -> u8 {
        self.data[index].load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Stage gate
// ---------------------------------------------------------------------------

/// Barrier that every worker reaches, whether or not its stage panicked.
struct StageGate {
    barrier: Barrier,
    failed: AtomicBool,
}

impl StageGate {
    fn new(workers: usize) -> Self {
        StageGate {
            barrier: Barrier::new(workers),
            failed: AtomicBool::new(false),
        }
    }

    /// Run `stage` unless a previous stage failed, then wait for every worker.
    fn run(&self, stage: impl FnOnce()) {
        if !self.failed() && panic::catch_unwind(AssertUnwindSafe(stage)).is_err() {
            self.failed.store(true, Ordering::Relaxed);
        }
        self.barrier.wait();
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// ChannelPipeline
// ---------------------------------------------------------------------------

/// Every intermediate buffer of a channel-pipeline run.
#[derive(Debug, Clone)]
pub struct ChannelPipelineOutput {
    /// After stage 1 (rescaled, or a copy of the input).
    pub normalized: RgbaImage,
    /// After stage 2.
    pub horizontal: RgbaImage,
    /// After stage 3; the blurred result.
    pub output: RgbaImage,
    /// Per-channel maxima of the *input* image.
    pub channel_max: ChannelMax,
}

/// Four-way channel pipeline synchronized by a full barrier between stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelPipeline;

/// Everything one channel worker borrows.
struct Stages<'a> {
    src: &'a RgbaImage,
    weights: &'a KernelWeights,
    normalized: &'a SharedImage,
    horizontal: &'a SharedImage,
    output: &'a SharedImage,
    maxima: &'a Mutex<ChannelMax>,
    gate: &'a StageGate,
    normalize: bool,
}

impl ChannelPipeline {
    /// Stretch each channel to the full range, then blur it.
    ///
    /// # Errors
    /// `EmptyImage` for an image without pixels, `WorkerPanicked` if any
    /// stage of any channel worker panicked.
    pub fn normalize_and_blur(
        &self,
        src: &RgbaImage,
        weights: &KernelWeights,
    ) -> Result<ChannelPipelineOutput> {
        self.run(src, weights, true)
    }

    fn run(&self, src: &RgbaImage, weights: &KernelWeights, normalize: bool) -> Result<ChannelPipelineOutput> {
        src.ensure_not_empty()?;
        let (w, h) = src.dimensions();
        let normalized = SharedImage::new(w, h);
        let horizontal = SharedImage::new(w, h);
        let output = SharedImage::new(w, h);
        let maxima = Mutex::new([0u8; CHANNELS]);
        let gate = StageGate::new(CHANNELS);

        let stages = Stages {
            src,
            weights,
            normalized: &normalized,
            horizontal: &horizontal,
            output: &output,
            maxima: &maxima,
            gate: &gate,
            normalize,
        };

        let start = Instant::now();
        let all_joined = thread::scope(|s| {
            let handles: Vec<_> = (0..CHANNELS)
                .map(|c| {
                    let stages = &stages;
                    s.spawn(move || channel_worker(c, stages))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().is_ok())
                .fold(true, |ok, joined| ok && joined)
        });
        if !all_joined || gate.failed() {
            return Err(BlurError::WorkerPanicked);
        }

        let channel_max = maxima.into_inner().unwrap_or_else(PoisonError::into_inner);
        log::debug!(
            "channel_pipeline: {w}×{h} normalize={normalize} maxima={channel_max:?} in {:.2?}",
            start.elapsed()
        );
        Ok(ChannelPipelineOutput {
            normalized: normalized.to_image(),
            horizontal: horizontal.to_image(),
            output: output.to_image(),
            channel_max,
        })
    }
}

fn channel_worker(c: usize, st: &Stages<'_>) {
    let (w, h) = st.src.dimensions();
    let data = st.src.as_slice();
    let samples = move || (0..w * h).map(move |p| p * CHANNELS + c);

    // Stage 1: max, then rescale (or copy).
    st.gate.run(|| {
        let max = samples().map(|i| data[i]).max().unwrap_or(0);
        st.maxima.lock().unwrap_or_else(PoisonError::into_inner)[c] = max;
        for i in samples() {
            let v = if st.normalize { rescale_sample(data[i], max) } else { data[i] };
            st.normalized.store(i, v);
        }
    });

    // Stage 2: horizontal pass over the complete normalized buffer.
    st.gate.run(|| {
        for y in 0..h {
            for x in 0..w {
                let v = sample(st.normalized, x, y, c, Axis::Horizontal, st.weights);
                st.horizontal.store((y * w + x) * CHANNELS + c, v);
            }
        }
    });

    // Stage 3: vertical pass over the complete horizontal buffer.
    st.gate.run(|| {
        for y in 0..h {
            for x in 0..w {
                let v = sample(st.horizontal, x, y, c, Axis::Vertical, st.weights);
                st.output.store((y * w + x) * CHANNELS + c, v);
            }
        }
    });
}

impl BlurBackend for ChannelPipeline {
    fn name(&self) -> &'static str {
        "channel_pipeline"
    }

    /// A single pass needs no barrier: each worker reads the shared input
    /// and writes only its own channel.
    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage> {
        src.ensure_not_empty()?;
        let (w, h) = src.dimensions();
        let out = SharedImage::new(w, h);
        let all_joined = thread::scope(|s| {
            let handles: Vec<_> = (0..CHANNELS)
                .map(|c| {
                    let out = &out;
                    s.spawn(move || {
                        for y in 0..h {
                            for x in 0..w {
                                out.store((y * w + x) * CHANNELS + c, sample(src, x, y, c, axis, weights));
                            }
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().is_ok())
                .fold(true, |ok, joined| ok && joined)
        });
        if !all_joined {
            return Err(BlurError::WorkerPanicked);
        }
        Ok(out.to_image())
    }

    fn blur(&self, src: &RgbaImage, weights: &KernelWeights) -> Result<RgbaImage> {
        Ok(self.run(src, weights, false)?.output)
    }
}
