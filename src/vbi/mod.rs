//! VBI signal processing: frames, preamble location, deconvolution.

pub mod batch;
pub mod correlate;
pub mod deconvolver;
pub mod frame;
pub mod synth;

pub use batch::BatchDeconvolver;
pub use deconvolver::{CpuDeconvolver, Deconvolve, LineOutcome};
pub use frame::SampleFrame;
