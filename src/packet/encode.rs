//! Constructs well-formed 42-byte packets.
//!
//! Used by the squash filter when synthesizing voted pages, by the
//! waveform synthesizer, and throughout the tests. Encoding is the exact
//! inverse of the decoder for every field the decoder interprets.

use crate::defaults::LINE_BYTES;
use crate::packet::hamming;
use crate::packet::parity;
use crate::packet::types::{Mrag, PageLink};

/// Writes the two Hamming-coded address bytes for (magazine, row).
pub fn mrag(magazine: u8, row: u8) -> [u8; 2] {
    let (n0, n1) = Mrag { magazine, row }.nibbles();
    [hamming::encode(n0), hamming::encode(n1)]
}

fn put_mrag(bytes: &mut [u8; LINE_BYTES], magazine: u8, row: u8) {
    let address = mrag(magazine, row);
    bytes[0] = address[0];
    bytes[1] = address[1];
}

fn put_text(bytes: &mut [u8], text: &[u8]) {
    for (i, slot) in bytes.iter_mut().enumerate() {
        let ch = text.get(i).copied().unwrap_or(b' ');
        *slot = parity::encode(ch);
    }
}

fn put_link(bytes: &mut [u8], link: PageLink, carrier_magazine: u8) {
    let carrier_bits = if carrier_magazine == 8 {
        0
    } else {
        carrier_magazine
    };
    let link_bits = if link.magazine == 8 { 0 } else { link.magazine };
    let relative = carrier_bits ^ link_bits;

    bytes[0] = hamming::encode(link.page & 0x0f);
    bytes[1] = hamming::encode(link.page >> 4);
    bytes[2] = hamming::encode((link.subpage & 0x0f) as u8);
    bytes[3] = hamming::encode((((link.subpage >> 4) & 0x07) as u8) | ((relative & 0x01) << 3));
    bytes[4] = hamming::encode(((link.subpage >> 8) & 0x0f) as u8);
    bytes[5] = hamming::encode((((link.subpage >> 12) & 0x03) as u8) | ((relative >> 1) << 2));
}

/// Builds a page header packet (row 0).
///
/// `control` packs C4..C14 with C4 in bit 0; `text` is the status row,
/// space padded to 32 characters.
pub fn header(magazine: u8, page: u8, subpage: u16, control: u16, text: &[u8]) -> [u8; LINE_BYTES] {
    let mut bytes = [0u8; LINE_BYTES];
    put_mrag(&mut bytes, magazine, 0);

    bytes[2] = hamming::encode(page & 0x0f);
    bytes[3] = hamming::encode(page >> 4);
    bytes[4] = hamming::encode((subpage & 0x0f) as u8);
    bytes[5] = hamming::encode((((subpage >> 4) & 0x07) as u8) | (((control & 0x01) as u8) << 3));
    bytes[6] = hamming::encode(((subpage >> 8) & 0x0f) as u8);
    bytes[7] = hamming::encode((((subpage >> 12) & 0x03) as u8) | ((((control >> 1) & 0x03) as u8) << 2));
    bytes[8] = hamming::encode(((control >> 3) & 0x0f) as u8);
    bytes[9] = hamming::encode(((control >> 7) & 0x0f) as u8);

    put_text(&mut bytes[10..], text);
    bytes
}

/// Builds a display row packet (rows 1 through 24).
pub fn display_row(magazine: u8, row: u8, text: &[u8]) -> [u8; LINE_BYTES] {
    debug_assert!((1..=24).contains(&row));
    let mut bytes = [0u8; LINE_BYTES];
    put_mrag(&mut bytes, magazine, row);
    put_text(&mut bytes[2..], text);
    bytes
}

/// Builds a fastext link packet (row 27).
pub fn fastext(magazine: u8, designation: u8, links: &[PageLink; 6]) -> [u8; LINE_BYTES] {
    let mut bytes = [0u8; LINE_BYTES];
    put_mrag(&mut bytes, magazine, 27);
    bytes[2] = hamming::encode(designation);
    for (i, &link) in links.iter().enumerate() {
        let offset = 3 + i * 6;
        put_link(&mut bytes[offset..offset + 6], link, magazine);
    }
    // Link control flag; the trailing CRC is left unchecked downstream.
    bytes[39] = hamming::encode(0x0f);
    bytes
}

/// Builds a broadcast service data packet (8/30 format 1).
pub fn broadcast_service(designation: u8, initial_page: PageLink) -> [u8; LINE_BYTES] {
    let mut bytes = [0u8; LINE_BYTES];
    put_mrag(&mut bytes, 8, 30);
    bytes[2] = hamming::encode(designation);
    put_link(&mut bytes[3..9], initial_page, 8);
    put_text(&mut bytes[22..], b"");
    bytes
}
