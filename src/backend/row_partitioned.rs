// backend/row_partitioned.rs — Fixed pool of scoped threads over row ranges.
//
// Partition → Dispatch → Join:
//   1. `PartitionPlan` splits [0, height) into `workers` contiguous ranges.
//   2. The output buffer is split into matching disjoint `&mut` slices and
//      each slice is moved into its own scoped thread.
//   3. The scope ends only after every thread has been joined, so the caller
//      never observes a partially written output.
//
// No locking is needed inside a pass: the source is shared read-only and
// every output byte belongs to exactly one worker.

use std::thread;

use crate::backend::BlurBackend;
use crate::convolution::{apply_pass_rows, Axis};
use crate::error::{BlurError, Result};
use crate::image::RgbaImage;
use crate::kernel::KernelWeights;
use crate::partition::PartitionPlan;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 2;

/// Static row partitioning over `workers` OS threads.
#[derive(Debug, Clone, Copy)]
pub struct RowPartitioned {
    workers: usize,
}

impl RowPartitioned {
    /// # Errors
    /// `InvalidWorkerCount` if `workers == 0`.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(BlurError::InvalidWorkerCount(workers));
        }
        Ok(RowPartitioned { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for RowPartitioned {
    fn default() -> Self {
        RowPartitioned {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl BlurBackend for RowPartitioned {
    fn name(&self) -> &'static str {
        "row_partitioned"
    }

    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage> {
        src.ensure_not_empty()?;
        let plan = PartitionPlan::new(src.height(), self.workers)?;
        let mut dst = src.same_shape();
        let row_len = src.row_len();
        let parts = plan.split_rows(dst.as_mut_slice(), row_len);

        let all_joined = thread::scope(|s| {
            let handles: Vec<_> = plan
                .ranges()
                .iter()
                .cloned()
                .zip(parts)
                .map(|(rows, out)| s.spawn(move || apply_pass_rows(src, axis, weights, rows, out)))
                .collect();
            // Join every handle before deciding, so no panicked thread is
            // left for the scope to re-raise.
            handles
                .into_iter()
                .map(|h| h.join().is_ok())
                .fold(true, |ok, joined| ok && joined)
        });
        if !all_joined {
            return Err(BlurError::WorkerPanicked);
        }
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Serial;

    fn scene(w: usize, h: usize) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            [((x * 13) % 256) as u8, ((y * 29) % 256) as u8, ((x ^ y) % 256) as u8, 255]
        })
    }

    #[test]
    fn test_matches_serial_for_various_worker_counts() {
        let img = scene(23, 17);
        let k = KernelWeights::new(4, 2.0).unwrap();
        let reference = Serial.blur(&img, &k).unwrap();
        for workers in [1, 2, 3, 4, 7, 32] {
            let out = RowPartitioned::new(workers).unwrap().blur(&img, &k).unwrap();
            assert_eq!(out, reference, "mismatch with {workers} workers");
        }
    }

    #[test]
    fn test_empty_image_rejected() {
        let backend = RowPartitioned::new(4).unwrap();
        let err = backend.blur_pass(&RgbaImage::new(5, 0), Axis::Vertical, &KernelWeights::default());
        assert!(matches!(err, Err(BlurError::EmptyImage { width: 5, height: 0 })));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            RowPartitioned::new(0),
            Err(BlurError::InvalidWorkerCount(0))
        ));
    }
}
