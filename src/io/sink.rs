//! Packet sinks: where the pipeline's output goes.
//!
//! A sink sees whole packets and writes whole records; a partially
//! written 42-byte record cannot happen short of the process dying
//! mid-syscall, because writes are all-or-nothing per packet.

use crate::error::Result;
use crate::packet::Packet;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Pluggable packet output handler.
pub trait PacketSink: Send {
    /// Handles one packet.
    fn write(&mut self, packet: &Packet) -> Result<()>;

    /// Called once at end of stream.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Name for logging and debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Writes raw `.t42` records: 42 bytes per packet, nothing between.
pub struct T42Writer<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> T42Writer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> PacketSink for T42Writer<W> {
    fn write(&mut self, packet: &Packet) -> Result<()> {
        self.writer.write_all(&packet.raw)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "t42"
    }
}

/// Prints page headers as text lines, one per header packet.
///
/// `skip` drops that many header prints between displayed ones, which
/// keeps rolling-header output readable on fast captures.
pub struct HeaderTextWriter<W: Write + Send> {
    writer: W,
    skip: usize,
    countdown: usize,
}

impl<W: Write + Send> HeaderTextWriter<W> {
    pub fn new(writer: W, skip: usize) -> Self {
        Self {
            writer,
            skip,
            countdown: 0,
        }
    }
}

impl<W: Write + Send> PacketSink for HeaderTextWriter<W> {
    fn write(&mut self, packet: &Packet) -> Result<()> {
        let Some(text) = packet.header_text() else {
            return Ok(());
        };
        if self.countdown > 0 {
            self.countdown -= 1;
            return Ok(());
        }
        self.countdown = self.skip;
        writeln!(self.writer, "{:8} {}", packet.frame_index, text)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "header-text"
    }
}

/// Collects packets in memory; the test sink.
#[derive(Default)]
pub struct CollectorSink {
    packets: Arc<Mutex<Vec<Packet>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected packets, valid after the pipeline
    /// has consumed the sink.
    pub fn handle(&self) -> Arc<Mutex<Vec<Packet>>> {
        self.packets.clone()
    }
}

impl PacketSink for CollectorSink {
    fn write(&mut self, packet: &Packet) -> Result<()> {
        self.packets.lock().expect("collector poisoned").push(packet.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
