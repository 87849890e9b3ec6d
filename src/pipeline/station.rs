//! Core station abstraction and runner.
//!
//! Each pipeline stage is a station: it receives one input, processes it,
//! and may produce one output. Stations run on dedicated threads connected
//! by bounded channels; a closed input channel is the end-of-stream signal
//! and triggers a drain before the station exits, so stateful stages can
//! flush whatever they are still holding.

use crate::pipeline::error::{FaultReporter, StationError};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing station in the pipeline.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - produced output
    /// - `Ok(None)` - consumed without output (e.g. filtered away)
    /// - `Err(StationError)` - processing failed
    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError>;

    /// Remaining output to emit after the input stream ends.
    ///
    /// Stateful stations (reorder buffer, squash filter) override this to
    /// flush; the default has nothing to add.
    fn drain(&mut self) -> Vec<Self::Output> {
        Vec::new()
    }

    /// Station name for logging and error reporting.
    fn name(&self) -> &'static str;
}

/// Runs a station in a dedicated thread.
pub struct StationRunner {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
}

impl StationRunner {
    /// Spawns `station` on its own thread between `input_rx` and
    /// `output_tx`.
    ///
    /// Both channel ends may be clones: several runners sharing one input
    /// receiver form a worker pool over that queue.
    pub fn spawn<S: Station>(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        reporter: Arc<dyn FaultReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::spawn(move || {
            Self::run_station(&mut station, input_rx, output_tx, reporter);
        });

        Self {
            handle: Some(handle),
            station_name,
        }
    }

    fn run_station<S: Station>(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        reporter: Arc<dyn FaultReporter>,
    ) {
        let station_name = station.name();

        while let Ok(input) = input_rx.recv() {
            match station.process(input) {
                Ok(Some(output)) => {
                    // A closed output channel means downstream is gone.
                    if output_tx.send(output).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    let error = error.in_stage(station_name);
                    let fatal = error.is_fatal();
                    reporter.report(&error);
                    if fatal {
                        break;
                    }
                }
            }
        }

        // Input closed or fatal error: flush whatever is still held.
        for output in station.drain() {
            if output_tx.send(output).is_err() {
                return;
            }
        }
    }

    /// Waits for the station thread to finish.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn name(&self) -> &'static str {
        self.station_name
    }
}
