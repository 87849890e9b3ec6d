//! Batching deconvolution backend.
//!
//! Collects frames into power-of-two batches and runs the whole batch as
//! one data-parallel operation, emitting results in input order. This is
//! the tile-oriented counterpart to the scalar backend: batch assembly is
//! the only point where the rest of the pipeline can observe a stall, and
//! the arithmetic is byte-for-byte the same, so backend choice never
//! changes results.

use crate::config::LineConfig;
use crate::defaults::{BATCH_SIZE, MAX_BATCH_SIZE};
use crate::vbi::deconvolver::{CpuDeconvolver, Deconvolve, LineOutcome};
use crate::vbi::frame::SampleFrame;
use rayon::prelude::*;
use std::sync::Arc;

pub struct BatchDeconvolver {
    inner: CpuDeconvolver,
    batch_size: usize,
}

impl BatchDeconvolver {
    pub fn new(config: Arc<LineConfig>) -> Self {
        Self::with_batch_size(config, BATCH_SIZE)
    }

    /// Creates a backend with an explicit batch size.
    ///
    /// The size is clamped to [1, MAX_BATCH_SIZE] and rounded down to a
    /// power of two, matching the queue-capacity deadlock guard.
    pub fn with_batch_size(config: Arc<LineConfig>, batch_size: usize) -> Self {
        let clamped = batch_size.clamp(1, MAX_BATCH_SIZE);
        let rounded = 1usize << (usize::BITS - 1 - clamped.leading_zeros());
        Self {
            inner: CpuDeconvolver::new(config),
            batch_size: rounded,
        }
    }
}

impl Deconvolve for BatchDeconvolver {
    fn deconvolve(&self, frame: &SampleFrame) -> LineOutcome {
        self.inner.deconvolve(frame)
    }

    fn deconvolve_batch(&self, frames: &[SampleFrame]) -> Vec<LineOutcome> {
        // par_iter preserves index order in collect.
        frames
            .par_iter()
            .map(|frame| self.inner.deconvolve(frame))
            .collect()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn name(&self) -> &'static str {
        "batch"
    }
}
