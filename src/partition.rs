// partition.rs — Static row partitioning for the fixed worker pool.
//
// Rows are split into `workers` contiguous ranges of `height / workers` rows
// each; the last worker also takes the remainder:
//
//   height = 10, workers = 3  →  [0,3) [3,6) [6,10)
//   height = 2,  workers = 4  →  [0,0) [0,0) [0,0) [0,2)
//
// The ranges are disjoint and cover [0, height) exactly once, which lets each
// worker own a disjoint `&mut` slice of the output buffer.

use std::ops::Range;

use crate::error::{BlurError, Result};

/// Ordered, disjoint row ranges covering `[0, height)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ranges: Vec<Range<usize>>,
    height: usize,
}

impl PartitionPlan {
    /// Divide `height` rows among `workers`.
    ///
    /// # Errors
    /// `InvalidWorkerCount` if `workers == 0`.
    pub fn new(height: usize, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(BlurError::InvalidWorkerCount(workers));
        }
        let chunk = height / workers;
        let ranges = (0..workers)
            .map(|i| {
                let start = i * chunk;
                let end = if i == workers - 1 { height } else { start + chunk };
                start..end
            })
            .collect();
        Ok(PartitionPlan { ranges, height })
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn workers(&self) -> usize {
        self.ranges.len()
    }

    /// Split a buffer of `height` rows of `row_len` bytes into one mutable
    /// slice per range, in range order.
    ///
    /// # Panics
    /// Panics if `buf.len() != height * row_len`.
    pub fn split_rows<'a>(&self, buf: &'a mut [u8], row_len: usize) -> Vec<&'a mut [u8]> {
        assert_eq!(
            buf.len(),
            self.height * row_len,
            "buffer does not hold {} rows of {row_len} bytes",
            self.height
        );
        let mut rest = buf;
        let mut parts = Vec::with_capacity(self.ranges.len());
        for r in &self.ranges {
            let (head, tail) = rest.split_at_mut(r.len() * row_len);
            parts.push(head);
            rest = tail;
        }
        parts
    }
}
