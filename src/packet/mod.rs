//! Teletext packet model: framing, error-corrected decoding, encoding.

pub mod decoder;
pub mod encode;
pub mod hamming;
pub mod line;
pub mod parity;
pub mod types;

pub use decoder::{decode_bytes, decode_line};
pub use line::RawLine;
pub use types::{Mrag, Packet, PacketPayload, PageLink};
