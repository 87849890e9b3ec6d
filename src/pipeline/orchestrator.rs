//! Pipeline wiring: stages, queues, threads, cancellation.
//!
//! Stages run on dedicated threads connected by bounded channels, so a
//! slow stage exerts backpressure on everything upstream. A closed
//! channel propagates end-of-stream; stateful stages drain into it before
//! exiting, so cancellation and stream end both leave well-formed output.

use crate::defaults;
use crate::error::{Result, VbitextError};
use crate::io::sink::PacketSink;
use crate::packet::Packet;
use crate::pipeline::error::{FaultReporter, StationError};
use crate::pipeline::station::StationRunner;
use crate::pipeline::stations::{
    BatchStation, DeconvolveStation, DecodeStation, FilterMode, FilterStation, ReorderStation,
};
use crate::pipeline::stats::PipelineStats;
use crate::vbi::{Deconvolve, SampleFrame};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Queue capacities and worker counts for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source to deconvolver queue, in frames.
    pub frame_queue: usize,
    /// Deconvolver to decoder queue, in messages.
    pub line_queue: usize,
    /// Decoder to filter/sink queue, in messages.
    pub packet_queue: usize,
    /// Deconvolver worker threads; 0 means available parallelism.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_queue: defaults::FRAME_QUEUE,
            line_queue: defaults::LINE_QUEUE,
            packet_queue: defaults::PACKET_QUEUE,
            workers: 0,
        }
    }
}

impl PipelineConfig {
    fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }
    }
}

/// Stream-level cancellation signal.
///
/// The source stops feeding on its next frame; every stage downstream
/// drains what it already holds and exits, so partial output is still a
/// whole number of records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn join_thread(handle: JoinHandle<Result<()>>, stage: &str) -> Result<()> {
    handle.join().map_err(|_| VbitextError::Pipeline {
        message: format!("{stage} thread panicked"),
    })?
}

/// Forwards faults to the caller's reporter and latches the first fatal
/// one, so a station abort surfaces as a pipeline error rather than a
/// silent short run.
struct FatalLatch {
    inner: Arc<dyn FaultReporter>,
    fatal: std::sync::Mutex<Option<String>>,
}

impl FatalLatch {
    fn new(inner: Arc<dyn FaultReporter>) -> Self {
        Self {
            inner,
            fatal: std::sync::Mutex::new(None),
        }
    }

    fn take(&self) -> Option<String> {
        self.fatal.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl FaultReporter for FatalLatch {
    fn report(&self, error: &StationError) {
        if error.is_fatal() {
            if let Ok(mut slot) = self.fatal.lock() {
                slot.get_or_insert_with(|| error.to_string());
            }
        }
        self.inner.report(error);
    }
}

/// Runs the full deconvolution pipeline:
/// source → deconvolver pool → reorder → decoder → sink.
///
/// The backend decides the deconvolver topology: a batch size above one
/// gets a single batching stage (batch assembly is its only suspension
/// point), anything else gets a worker pool over the shared frame queue.
pub fn run_deconvolve<I>(
    frames: I,
    backend: Arc<dyn Deconvolve>,
    config: &PipelineConfig,
    sink: Box<dyn PacketSink>,
    reporter: Arc<dyn FaultReporter>,
    cancel: CancelToken,
) -> Result<Arc<PipelineStats>>
where
    I: Iterator<Item = Result<SampleFrame>> + Send + 'static,
{
    // Deadlock guard: the batcher drains the frame queue without emitting
    // until a batch fills, so the queue must hold at least two batches.
    let batch_size = backend.batch_size();
    if config.frame_queue < 2 * batch_size {
        return Err(VbitextError::Pipeline {
            message: format!(
                "frame queue {} cannot absorb two batches of {}",
                config.frame_queue, batch_size
            ),
        });
    }

    let stats = Arc::new(PipelineStats::default());
    let latch = Arc::new(FatalLatch::new(reporter));

    let (frame_tx, frame_rx) = bounded::<(u64, SampleFrame)>(config.frame_queue);
    let (line_tx, line_rx) = bounded(config.line_queue);
    let (ordered_tx, ordered_rx) = bounded(config.line_queue);
    let (packet_tx, packet_rx) = bounded(config.packet_queue);

    let mut runners = Vec::new();
    if batch_size > 1 {
        runners.push(StationRunner::spawn(
            BatchStation::new(backend, stats.clone()),
            frame_rx,
            line_tx,
            latch.clone(),
        ));
    } else {
        for _ in 0..config.effective_workers() {
            runners.push(StationRunner::spawn(
                DeconvolveStation::new(backend.clone(), stats.clone()),
                frame_rx.clone(),
                line_tx.clone(),
                latch.clone(),
            ));
        }
        drop(frame_rx);
        drop(line_tx);
    }

    runners.push(StationRunner::spawn(
        ReorderStation::new(),
        line_rx,
        ordered_tx,
        latch.clone(),
    ));
    runners.push(StationRunner::spawn(
        DecodeStation::new(stats.clone()),
        ordered_rx,
        packet_tx,
        latch.clone(),
    ));

    let source_stats = stats.clone();
    let source = thread::spawn(move || -> Result<()> {
        let mut sequence = 0u64;
        for item in frames {
            if cancel.is_cancelled() {
                break;
            }
            let frame = item?;
            source_stats.record_frame();
            if frame_tx.send((sequence, frame)).is_err() {
                break;
            }
            sequence += 1;
        }
        Ok(())
    });

    let sink_thread = thread::spawn(move || -> Result<()> {
        let mut sink = sink;
        for batch in packet_rx.iter() {
            for packet in &batch {
                sink.write(packet)?;
            }
        }
        sink.finish()
    });

    let source_result = join_thread(source, "source");
    for runner in runners {
        runner.join();
    }
    let sink_result = join_thread(sink_thread, "sink");

    source_result?;
    sink_result?;
    if let Some(message) = latch.take() {
        return Err(VbitextError::Pipeline { message });
    }
    Ok(stats)
}

/// Runs the packet pipeline: source → filter → sink.
///
/// Used by the filter verb over already-framed `.t42` streams; the
/// filter stage is stateful and runs single-threaded.
pub fn run_packets<I>(
    packets: I,
    mode: FilterMode,
    config: &PipelineConfig,
    sink: Box<dyn PacketSink>,
    reporter: Arc<dyn FaultReporter>,
    cancel: CancelToken,
) -> Result<Arc<PipelineStats>>
where
    I: Iterator<Item = Result<Packet>> + Send + 'static,
{
    let stats = Arc::new(PipelineStats::default());
    let latch = Arc::new(FatalLatch::new(reporter));

    let (packet_tx, packet_rx) = bounded(config.packet_queue);
    let (out_tx, out_rx) = bounded(config.packet_queue);

    let filter_runner =
        StationRunner::spawn(FilterStation::new(mode), packet_rx, out_tx, latch.clone());

    let source_stats = stats.clone();
    let source = thread::spawn(move || -> Result<()> {
        for item in packets {
            if cancel.is_cancelled() {
                break;
            }
            let packet = item?;
            source_stats.record_packet(&packet);
            if packet_tx.send(vec![packet]).is_err() {
                break;
            }
        }
        Ok(())
    });

    let sink_thread = thread::spawn(move || -> Result<()> {
        let mut sink = sink;
        for batch in out_rx.iter() {
            for packet in &batch {
                sink.write(packet)?;
            }
        }
        sink.finish()
    });

    let source_result = join_thread(source, "source");
    filter_runner.join();
    let sink_result = join_thread(sink_thread, "sink");

    source_result?;
    sink_result?;
    if let Some(message) = latch.take() {
        return Err(VbitextError::Pipeline { message });
    }
    Ok(stats)
}
