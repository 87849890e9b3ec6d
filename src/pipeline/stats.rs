//! Shared pipeline counters.
//!
//! Every stage increments its own counters; the totals print as a single
//! summary line on stderr when the run finishes. Atomics keep the stats
//! write path lock-free from the worker pool.

use crate::packet::Packet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Sample frames read from the source.
    pub frames: AtomicU64,
    /// Frames that framed successfully.
    pub lines: AtomicU64,
    /// Frames rejected for missing clock run-in.
    pub rejects: AtomicU64,
    /// Packets decoded.
    pub packets: AtomicU64,
    /// Residual Hamming errors across all packets.
    pub hamming_errors: AtomicU64,
    /// Packets per magazine (index 0 is magazine 1).
    pub magazines: [AtomicU64; 8],
}

impl PipelineStats {
    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self) {
        self.rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet(&self, packet: &Packet) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.hamming_errors
            .fetch_add(packet.errors as u64, Ordering::Relaxed);
        self.magazines[(packet.mrag.magazine - 1) as usize].fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames {} | lines {} | rejected {} | packets {} | hamming errors {} | magazines",
            self.frames.load(Ordering::Relaxed),
            self.lines.load(Ordering::Relaxed),
            self.rejects.load(Ordering::Relaxed),
            self.packets.load(Ordering::Relaxed),
            self.hamming_errors.load(Ordering::Relaxed),
        )?;
        for (i, count) in self.magazines.iter().enumerate() {
            write!(f, " {}:{}", i + 1, count.load(Ordering::Relaxed))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_bytes, encode};

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::default();
        stats.record_frame();
        stats.record_frame();
        stats.record_line();
        stats.record_reject();

        let packet = decode_bytes(encode::display_row(3, 1, b"X"), 0);
        stats.record_packet(&packet);

        assert_eq!(stats.frames.load(Ordering::Relaxed), 2);
        assert_eq!(stats.lines.load(Ordering::Relaxed), 1);
        assert_eq!(stats.rejects.load(Ordering::Relaxed), 1);
        assert_eq!(stats.packets.load(Ordering::Relaxed), 1);
        assert_eq!(stats.magazines[2].load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_display_mentions_all_counters() {
        let stats = PipelineStats::default();
        stats.record_frame();
        let rendered = stats.to_string();
        assert!(rendered.contains("frames 1"));
        assert!(rendered.contains("magazines"));
    }
}
