//! Typed teletext packets.
//!
//! A packet's kind is determined at decode time from its row (and, for
//! control rows, its designation code) and carried as a tagged variant so
//! that every consumer matches exhaustively.

use crate::defaults::LINE_BYTES;
use crate::packet::parity;

/// Magazine and row address of a packet (the MRAG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mrag {
    /// Magazine number, 1 through 8 (transmitted 0 means 8).
    pub magazine: u8,
    /// Row number, 0 through 31.
    pub row: u8,
}

impl Mrag {
    /// Packs magazine and row into the two transmitted address nibbles.
    pub fn nibbles(self) -> (u8, u8) {
        let mag_bits = if self.magazine == 8 { 0 } else { self.magazine } & 0x07;
        (mag_bits | ((self.row & 0x01) << 3), self.row >> 1)
    }

    /// Rebuilds an MRAG from its two decoded address nibbles.
    pub fn from_nibbles(n0: u8, n1: u8) -> Self {
        let mag_bits = n0 & 0x07;
        Self {
            magazine: if mag_bits == 0 { 8 } else { mag_bits },
            row: ((n0 >> 3) & 0x01) | (n1 << 1),
        }
    }
}

/// A decoded cross-reference to another page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLink {
    pub magazine: u8,
    pub page: u8,
    pub subpage: u16,
}

/// Row 0: page header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderPayload {
    /// Page number within the magazine (two hex digits).
    pub page: u8,
    /// 13-bit subpage code.
    pub subpage: u16,
    /// Control bits C4 through C14, C4 in bit 0.
    pub control: u16,
    /// The 32 status-row text bytes, parity bits intact.
    pub text: [u8; 32],
}

/// Rows 1 through 24: display text.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayPayload {
    /// The 40 text bytes, parity bits intact.
    pub text: [u8; 40],
}

/// Row 27, designations 0 through 3: fastext navigation links.
#[derive(Debug, Clone, PartialEq)]
pub struct FastextPayload {
    pub designation: u8,
    pub links: [PageLink; 6],
}

/// Row 30 on magazine 8: broadcast service data.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastPayload {
    pub designation: u8,
    /// Initial teletext page, present for format 1 (designations 0 and 1).
    pub initial_page: Option<PageLink>,
    /// The full 40-byte payload for downstream consumers.
    pub raw: [u8; 40],
}

/// Rows 25, 26, 28, 29, 31: page enhancement and independent data.
///
/// Payload formats past designation code 0 vary by standard revision;
/// they are carried raw rather than decoded speculatively.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementPayload {
    pub designation: u8,
    pub raw: [u8; 39],
}

/// Anything that could not be classified.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownPayload {
    pub raw: [u8; 40],
}

/// Kind-specific decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketPayload {
    Header(HeaderPayload),
    DisplayRow(DisplayPayload),
    Fastext(FastextPayload),
    Broadcast(BroadcastPayload),
    Enhancement(EnhancementPayload),
    Unknown(UnknownPayload),
}

impl PacketPayload {
    /// Short kind name for histograms and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PacketPayload::Header(_) => "header",
            PacketPayload::DisplayRow(_) => "display",
            PacketPayload::Fastext(_) => "fastext",
            PacketPayload::Broadcast(_) => "broadcast",
            PacketPayload::Enhancement(_) => "enhancement",
            PacketPayload::Unknown(_) => "unknown",
        }
    }
}

/// A decoded teletext packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub mrag: Mrag,
    pub payload: PacketPayload,
    /// Residual error count: corrected plus unrecoverable Hamming errors.
    pub errors: u16,
    /// Index of the source sample frame.
    pub frame_index: u64,
    /// The 42 bytes as transmitted.
    pub raw: [u8; LINE_BYTES],
    /// Per-byte confidence after decoding (parity failures zeroed).
    pub confidence: [f32; LINE_BYTES],
    /// Per-byte confidence as captured, before parity accounting.
    ///
    /// The squash voter weighs parity-failed bytes by this value times a
    /// discount; zeroing it here would erase exactly the evidence the
    /// voter is meant to keep.
    pub channel_confidence: [f32; LINE_BYTES],
}

impl Packet {
    /// True for page header packets.
    pub fn is_header(&self) -> bool {
        matches!(self.payload, PacketPayload::Header(_))
    }

    /// Full page address (magazine digit plus page byte), e.g. 0x100.
    ///
    /// Only meaningful for header packets; other rows inherit the page
    /// that is currently open on their magazine.
    pub fn full_page_address(&self) -> Option<u16> {
        match &self.payload {
            PacketPayload::Header(h) => {
                Some(((self.mrag.magazine as u16) << 8) | h.page as u16)
            }
            _ => None,
        }
    }

    /// Renders a header packet as a one-line status string.
    pub fn header_text(&self) -> Option<String> {
        match &self.payload {
            PacketPayload::Header(h) => {
                let text: String = h.text.iter().map(|&b| parity::display_char(b)).collect();
                Some(format!(
                    "P{}{:02X} {:04X} {}",
                    self.mrag.magazine, h.page, h.subpage, text
                ))
            }
            _ => None,
        }
    }
}
