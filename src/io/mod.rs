//! Stream I/O: record chunking and packet sinks.

pub mod chunker;
pub mod sink;

pub use chunker::{ChunkerConfig, FileChunker};
pub use sink::{CollectorSink, HeaderTextWriter, PacketSink, T42Writer};
