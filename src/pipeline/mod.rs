//! Multi-stage processing pipeline.
//!
//! Stations on dedicated threads, connected by bounded crossbeam channels
//! for backpressure. The deconvolver is the hot path and runs as a worker
//! pool (or one batching stage); a reorder buffer restores source order
//! behind it. Decoder and filter are stateful and single-threaded.

pub mod error;
pub mod orchestrator;
pub mod reorder;
pub mod station;
pub mod stations;
pub mod stats;

pub use error::{FaultReporter, Severity, StationError, StderrReporter};
pub use orchestrator::{run_deconvolve, run_packets, CancelToken, PipelineConfig};
pub use reorder::ReorderBuffer;
pub use station::{Station, StationRunner};
pub use stations::{FilterMode, FilterStation};
pub use stats::PipelineStats;
