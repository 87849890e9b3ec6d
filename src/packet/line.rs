//! Framed teletext lines as produced by the deconvolver.

use crate::defaults::LINE_BYTES;

/// One framed 42-byte teletext line with per-byte confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// The 42 payload bytes in transmission order.
    pub bytes: [u8; LINE_BYTES],
    /// Per-byte confidence in [0, 1]; min over the byte's bit confidences.
    pub confidence: [f32; LINE_BYTES],
    /// Index of the sample frame this line was recovered from.
    pub frame_index: u64,
}

impl RawLine {
    /// Builds a line with uniform confidence, e.g. when reading `.t42`
    /// files where the capture confidence is no longer available.
    pub fn from_bytes(bytes: [u8; LINE_BYTES], frame_index: u64) -> Self {
        Self {
            bytes,
            confidence: [1.0; LINE_BYTES],
            frame_index,
        }
    }

    /// Mean confidence across the line, used for diagnostics.
    pub fn mean_confidence(&self) -> f32 {
        self.confidence.iter().sum::<f32>() / LINE_BYTES as f32
    }
}
