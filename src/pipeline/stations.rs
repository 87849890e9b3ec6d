//! Concrete stations: deconvolution, reordering, decoding, filtering.

use crate::error::VbitextError;
use crate::filter::{PassFilter, SquashFilter};
use crate::packet::{decode_line, Packet, RawLine};
use crate::pipeline::error::StationError;
use crate::pipeline::reorder::ReorderBuffer;
use crate::pipeline::stats::PipelineStats;
use crate::vbi::{Deconvolve, LineOutcome, SampleFrame};
use std::sync::Arc;

/// One worker of the deconvolver pool.
///
/// Several of these run against the same input queue; outputs carry the
/// source sequence number so the reorder station can restore order.
pub struct DeconvolveStation {
    backend: Arc<dyn Deconvolve>,
    stats: Arc<PipelineStats>,
}

impl DeconvolveStation {
    pub fn new(backend: Arc<dyn Deconvolve>, stats: Arc<PipelineStats>) -> Self {
        Self { backend, stats }
    }
}

impl crate::pipeline::Station for DeconvolveStation {
    type Input = (u64, SampleFrame);
    type Output = Vec<(u64, LineOutcome)>;

    fn process(&mut self, (sequence, frame): Self::Input) -> Result<Option<Self::Output>, StationError> {
        let outcome = self.backend.deconvolve(&frame);
        match outcome {
            LineOutcome::Line(_) => self.stats.record_line(),
            LineOutcome::NoLine { .. } => self.stats.record_reject(),
        }
        Ok(Some(vec![(sequence, outcome)]))
    }

    fn name(&self) -> &'static str {
        "deconvolve"
    }
}

/// Batching deconvolver stage.
///
/// Assembles frames into backend-sized batches and emits whole batches in
/// order; assembly is the only suspension point this stage introduces.
pub struct BatchStation {
    backend: Arc<dyn Deconvolve>,
    stats: Arc<PipelineStats>,
    buffer: Vec<(u64, SampleFrame)>,
}

impl BatchStation {
    pub fn new(backend: Arc<dyn Deconvolve>, stats: Arc<PipelineStats>) -> Self {
        let capacity = backend.batch_size();
        Self {
            backend,
            stats,
            buffer: Vec::with_capacity(capacity),
        }
    }

    fn flush_batch(&mut self) -> Vec<(u64, LineOutcome)> {
        let batch = std::mem::take(&mut self.buffer);
        let (sequences, frames): (Vec<u64>, Vec<SampleFrame>) = batch.into_iter().unzip();
        let outcomes = self.backend.deconvolve_batch(&frames);
        for outcome in &outcomes {
            match outcome {
                LineOutcome::Line(_) => self.stats.record_line(),
                LineOutcome::NoLine { .. } => self.stats.record_reject(),
            }
        }
        sequences.into_iter().zip(outcomes).collect()
    }
}

impl crate::pipeline::Station for BatchStation {
    type Input = (u64, SampleFrame);
    type Output = Vec<(u64, LineOutcome)>;

    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError> {
        self.buffer.push(input);
        if self.buffer.len() >= self.backend.batch_size() {
            Ok(Some(self.flush_batch()))
        } else {
            Ok(None)
        }
    }

    fn drain(&mut self) -> Vec<Self::Output> {
        if self.buffer.is_empty() {
            Vec::new()
        } else {
            vec![self.flush_batch()]
        }
    }

    fn name(&self) -> &'static str {
        "deconvolve-batch"
    }
}

/// Restores source order behind the worker pool.
///
/// Rejected frames are dropped here, after they have held their place in
/// the sequence; framed lines leave strictly in source order.
pub struct ReorderStation {
    buffer: ReorderBuffer<LineOutcome>,
}

impl ReorderStation {
    pub fn new() -> Self {
        Self {
            buffer: ReorderBuffer::new(),
        }
    }

    fn lines(outcomes: Vec<LineOutcome>) -> Vec<RawLine> {
        outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                LineOutcome::Line(line) => Some(line),
                LineOutcome::NoLine { .. } => None,
            })
            .collect()
    }
}

impl Default for ReorderStation {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::pipeline::Station for ReorderStation {
    type Input = Vec<(u64, LineOutcome)>;
    type Output = Vec<RawLine>;

    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError> {
        let mut released = Vec::new();
        for (sequence, outcome) in input {
            released.extend(self.buffer.push(sequence, outcome));
        }
        let lines = Self::lines(released);
        Ok((!lines.is_empty()).then_some(lines))
    }

    fn drain(&mut self) -> Vec<Self::Output> {
        let lines = Self::lines(self.buffer.drain());
        if lines.is_empty() {
            Vec::new()
        } else {
            vec![lines]
        }
    }

    fn name(&self) -> &'static str {
        "reorder"
    }
}

/// Decodes framed lines into typed packets.
pub struct DecodeStation {
    stats: Arc<PipelineStats>,
}

impl DecodeStation {
    pub fn new(stats: Arc<PipelineStats>) -> Self {
        Self { stats }
    }
}

impl crate::pipeline::Station for DecodeStation {
    type Input = Vec<RawLine>;
    type Output = Vec<Packet>;

    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError> {
        let packets: Vec<Packet> = input
            .iter()
            .map(|line| {
                let packet = decode_line(line);
                self.stats.record_packet(&packet);
                packet
            })
            .collect();
        Ok((!packets.is_empty()).then_some(packets))
    }

    fn name(&self) -> &'static str {
        "decode"
    }
}

/// How the filter station treats the packet stream.
pub enum FilterMode {
    /// Predicate pass-through.
    Pass(PassFilter),
    /// Optional predicate followed by squash voting.
    Squash {
        predicate: Option<PassFilter>,
        squash: SquashFilter,
    },
}

/// Stateful filter stage; single-threaded by construction.
pub struct FilterStation {
    mode: FilterMode,
}

impl FilterStation {
    pub fn new(mode: FilterMode) -> Self {
        Self { mode }
    }
}

impl crate::pipeline::Station for FilterStation {
    type Input = Vec<Packet>;
    type Output = Vec<Packet>;

    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError> {
        let mut output = Vec::new();
        for packet in input {
            match &mut self.mode {
                FilterMode::Pass(filter) => {
                    if filter.accept(&packet) {
                        output.push(packet);
                    }
                }
                FilterMode::Squash { predicate, squash } => {
                    if let Some(filter) = predicate {
                        if !filter.accept(&packet) {
                            continue;
                        }
                    }
                    match squash.push(&packet) {
                        Ok(flushed) => output.extend(flushed),
                        Err(VbitextError::Internal {
                            frame_index,
                            message,
                        }) => return Err(StationError::fatal_at(frame_index, message)),
                        Err(other) => return Err(StationError::fatal(other.to_string())),
                    }
                }
            }
        }
        Ok((!output.is_empty()).then_some(output))
    }

    fn drain(&mut self) -> Vec<Self::Output> {
        match &mut self.mode {
            FilterMode::Pass(_) => Vec::new(),
            FilterMode::Squash { squash, .. } => {
                let flushed = squash.flush_all();
                if flushed.is_empty() {
                    Vec::new()
                } else {
                    vec![flushed]
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "filter"
    }
}
