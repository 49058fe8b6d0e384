// backend/data_parallel.rs — rayon loop scheduling over rows.
//
// Each output row is one work item. rayon splits the row range adaptively
// and idle workers steal from busy ones, so rows are handed out dynamically
// as threads become free instead of by a fixed partition.
//
// By default the global rayon pool is used. `with_threads` builds a
// dedicated pool so the thread count can be pinned (e.g. for benchmarks).

use rayon::prelude::*;

use crate::backend::BlurBackend;
use crate::convolution::{apply_pass_rows, Axis};
use crate::error::{BlurError, Result};
use crate::image::RgbaImage;
use crate::kernel::KernelWeights;

/// Work-stealing row scheduler.
#[derive(Debug, Default)]
pub struct DataParallel {
    pool: Option<rayon::ThreadPool>,
}

impl DataParallel {
    /// Use the global rayon pool.
    pub fn new() -> Self {
        DataParallel { pool: None }
    }

    /// Use a dedicated pool of exactly `threads` workers.
    ///
    /// # Errors
    /// `InvalidWorkerCount` for zero threads, `ThreadPool` if the pool
    /// cannot be built.
    pub fn with_threads(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(BlurError::InvalidWorkerCount(threads));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sepconv-row-{i}"))
            .build()?;
        Ok(DataParallel { pool: Some(pool) })
    }

    /// Number of threads rows are spread over.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl BlurBackend for DataParallel {
    fn name(&self) -> &'static str {
        "data_parallel"
    }

    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage> {
        src.ensure_not_empty()?;
        let mut dst = src.same_shape();
        let row_len = src.row_len();
        let run = |out: &mut [u8]| {
            out.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(y, row)| apply_pass_rows(src, axis, weights, y..y + 1, row));
        };
        match &self.pool {
            Some(pool) => pool.install(|| run(dst.as_mut_slice())),
            None => run(dst.as_mut_slice()),
        }
        Ok(dst)
    }
}
