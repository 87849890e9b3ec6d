//! Default configuration constants for vbitext.
//!
//! This module provides shared constants used across configuration types
//! to ensure consistency and eliminate duplication.

/// Default capture device profile name.
///
/// The bt8x8 family of capture chips is by far the most common source of
/// archived VBI material, so its PAL geometry is the out-of-the-box default.
pub const DEVICE_PROFILE: &str = "bt8x8_pal";

/// Teletext line payload length in bytes (MRAG + 40 data bytes).
pub const LINE_BYTES: usize = 42;

/// Number of payload bits per teletext line (42 bytes, LSB first).
pub const LINE_BITS: usize = LINE_BYTES * 8;

/// Bits of clock run-in plus framing code preceding the payload.
///
/// Two CRI bytes (0x55 0x55) and the framing code 0x27, all LSB first.
pub const PREAMBLE_BITS: usize = 24;

/// Nominal teletext bit rate in Hz (444 times the PAL line frequency).
pub const BIT_RATE: f64 = 6_937_500.0;

/// Default peak-to-sidelobe ratio below which a line is rejected.
///
/// Clean captures produce ratios of 3.5 and up; lines without teletext
/// rarely exceed 1.5. The value is a profile tunable, not a constant of
/// the algorithm.
pub const REJECT_RATIO: f32 = 3.0;

/// Gaussian integration width as a fraction of the bit period.
pub const BIT_SIGMA_FRACTION: f64 = 0.25;

/// Default inverse kernel applied to the soft-bit sequence.
///
/// A short symmetric high-boost filter that undoes most of the smearing the
/// VBI low-pass channel applies to adjacent bits. Coefficients sum to 1.
pub const INVERSE_KERNEL: [f32; 5] = [-0.06, -0.12, 1.36, -0.12, -0.06];

/// Bounded queue capacity between the sample source and the deconvolver.
pub const FRAME_QUEUE: usize = 1024;

/// Bounded queue capacity between the deconvolver and the packet decoder.
pub const LINE_QUEUE: usize = 4096;

/// Bounded queue capacity between the packet decoder and the filter.
pub const PACKET_QUEUE: usize = 4096;

/// Default batch size for the batching deconvolver backend.
pub const BATCH_SIZE: usize = 256;

/// Largest batch the batching backend will assemble.
pub const MAX_BATCH_SIZE: usize = 512;

/// Merged copies of a subpage after which the squash filter flushes it.
pub const SQUASH_MAX_OBSERVATIONS: u32 = 32;

/// Frames of silence after which the squash filter flushes a subpage.
pub const SQUASH_QUIET_FRAMES: u64 = 500;

/// Weight discount applied to parity-failed bytes during squash voting.
pub const PARITY_FAIL_WEIGHT: f32 = 0.25;
