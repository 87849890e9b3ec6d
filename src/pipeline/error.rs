//! Station fault model.
//!
//! A station that cannot process an item raises a [`StationError`]
//! carrying everything the operator needs to locate the problem: how bad
//! it is, which stage raised it, and which source frame was in hand.
//! The runner stamps the stage name, so stations only describe what went
//! wrong.

use std::fmt;

/// Whether the raising station can keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The offending item is skipped; the station continues.
    Recoverable,
    /// The station stops and the pipeline drains.
    Fatal,
}

/// A fault raised by a pipeline station.
#[derive(Debug, Clone)]
pub struct StationError {
    pub severity: Severity,
    /// Stage that raised the fault; stamped by the runner.
    pub stage: &'static str,
    /// Source frame being processed when the fault occurred, if one was.
    pub frame_index: Option<u64>,
    /// What went wrong.
    pub detail: String,
}

impl StationError {
    /// A fault the station can skip past.
    pub fn recoverable(detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Recoverable,
            stage: "station",
            frame_index: None,
            detail: detail.into(),
        }
    }

    /// A fault that stops the station.
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            stage: "station",
            frame_index: None,
            detail: detail.into(),
        }
    }

    /// A stopping fault pinned to the frame that triggered it.
    pub fn fatal_at(frame_index: u64, detail: impl fmt::Display) -> Self {
        Self {
            frame_index: Some(frame_index),
            ..Self::fatal(detail.to_string())
        }
    }

    /// Attributes the fault to a named stage.
    pub fn in_stage(mut self, stage: &'static str) -> Self {
        self.stage = stage;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Recoverable => "skipping",
            Severity::Fatal => "stopping",
        };
        match self.frame_index {
            Some(frame) => write!(
                f,
                "{} stage {kind} at frame {frame}: {}",
                self.stage, self.detail
            ),
            None => write!(f, "{} stage {kind}: {}", self.stage, self.detail),
        }
    }
}

impl std::error::Error for StationError {}

/// Receives station faults as they happen.
///
/// The pipeline keeps running through recoverable faults; the reporter
/// is how they become visible at all.
pub trait FaultReporter: Send + Sync {
    fn report(&self, error: &StationError);
}

/// Default reporter: one line per fault on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrReporter;

impl FaultReporter for StderrReporter {
    fn report(&self, error: &StationError) {
        eprintln!("vbitext: {error}");
    }
}
