//! Fixed-size record chunking for `.vbi` and `.t42` streams.
//!
//! Both file formats are headerless: frame and packet boundaries exist
//! only as fixed strides. The chunker turns any reader into an iterator
//! of (index, bytes) records with the range controls the CLI exposes:
//! start, stop, step, limit.

use crate::error::{Result, VbitextError};
use std::io::Read;

/// Range controls applied to the chunk stream.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// First chunk index to yield.
    pub start: u64,
    /// Stop before this chunk index.
    pub stop: Option<u64>,
    /// Yield every Nth chunk from `start`.
    pub step: u64,
    /// Stop after yielding this many chunks.
    pub limit: Option<u64>,
    /// Error on a trailing partial chunk instead of dropping it.
    ///
    /// `.t42` input is strict (a file whose length is not a multiple of
    /// 42 is malformed); `.vbi` input tolerates a truncated final frame.
    pub strict: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            start: 0,
            stop: None,
            step: 1,
            limit: None,
            strict: false,
        }
    }
}

/// Iterator of fixed-size records over a reader.
pub struct FileChunker<R: Read> {
    reader: R,
    chunk_size: usize,
    config: ChunkerConfig,
    position: u64,
    yielded: u64,
    done: bool,
}

impl<R: Read> FileChunker<R> {
    pub fn new(reader: R, chunk_size: usize, config: ChunkerConfig) -> Self {
        debug_assert!(chunk_size > 0);
        Self {
            reader,
            chunk_size,
            config: ChunkerConfig {
                step: config.step.max(1),
                ..config
            },
            position: 0,
            yielded: 0,
            done: false,
        }
    }

    /// Reads one full chunk; `Ok(None)` is clean end of stream.
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < self.chunk_size {
            if self.config.strict {
                return Err(VbitextError::MalformedInput {
                    message: format!(
                        "trailing {} bytes are not a whole {}-byte record",
                        filled, self.chunk_size
                    ),
                });
            }
            return Ok(None);
        }
        Ok(Some(buf))
    }
}

impl<R: Read> Iterator for FileChunker<R> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(stop) = self.config.stop {
                if self.position >= stop {
                    self.done = true;
                    return None;
                }
            }
            if let Some(limit) = self.config.limit {
                if self.yielded >= limit {
                    self.done = true;
                    return None;
                }
            }

            let chunk = match self.read_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            let index = self.position;
            self.position += 1;

            if index < self.config.start {
                continue;
            }
            if (index - self.config.start) % self.config.step != 0 {
                continue;
            }

            self.yielded += 1;
            return Some(Ok((index, chunk)));
        }
    }
}
