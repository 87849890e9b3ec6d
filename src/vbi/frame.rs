//! Raw VBI sample frames.

/// One scanline's worth of raw VBI samples.
///
/// Frames carry a monotonically increasing index assigned by the source;
/// the index survives the whole pipeline so that output order can be
/// re-established after parallel deconvolution and so that diagnostics
/// can name the offending frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFrame {
    /// Monotonic frame number within the capture.
    pub index: u64,
    /// Unsigned 8-bit samples, one scanline's VBI region.
    pub samples: Vec<u8>,
}

impl SampleFrame {
    pub fn new(index: u64, samples: Vec<u8>) -> Self {
        Self { index, samples }
    }
}
