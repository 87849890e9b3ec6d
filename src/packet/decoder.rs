//! Decodes framed 42-byte lines into typed packets.
//!
//! Address and control bytes go through Hamming 8/4 with residual error
//! accounting; display text goes through odd-parity checks that zero
//! confidence but never drop bytes. Signal-quality problems are in-band
//! values here, never errors.

use crate::defaults::LINE_BYTES;
use crate::packet::hamming::{self, Nibble};
use crate::packet::line::RawLine;
use crate::packet::parity;
use crate::packet::types::{
    BroadcastPayload, DisplayPayload, EnhancementPayload, FastextPayload, HeaderPayload, Mrag,
    Packet, PacketPayload, PageLink, UnknownPayload,
};

/// Nibble substituted for unrecoverable Hamming bytes.
const ERASED: u8 = 0xf;

/// Decodes a framed line into a typed packet.
pub fn decode_line(line: &RawLine) -> Packet {
    let bytes = &line.bytes;
    let channel_confidence = line.confidence;
    let mut confidence = line.confidence;
    let mut errors: u16 = 0;

    let n0 = hamming::decode(bytes[0]);
    let n1 = hamming::decode(bytes[1]);
    errors += n0.errors() + n1.errors();

    // An address that cannot be corrected cannot be trusted to route the
    // packet anywhere; the payload is carried raw.
    if matches!(n0, Nibble::Invalid) || matches!(n1, Nibble::Invalid) {
        return Packet {
            mrag: Mrag::from_nibbles(n0.value_or(0), n1.value_or(0)),
            payload: PacketPayload::Unknown(UnknownPayload {
                raw: payload_bytes(bytes),
            }),
            errors,
            frame_index: line.frame_index,
            raw: *bytes,
            confidence,
            channel_confidence,
        };
    }

    let mrag = Mrag::from_nibbles(n0.value_or(0), n1.value_or(0));

    let payload = match mrag.row {
        0 => decode_header(bytes, &mut confidence, &mut errors),
        1..=24 => decode_display(bytes, &mut confidence),
        27 => decode_fastext(bytes, mrag.magazine, &mut errors),
        30 if mrag.magazine == 8 => decode_broadcast(bytes, &mut errors),
        _ => decode_enhancement(bytes, &mut errors),
    };

    Packet {
        mrag,
        payload,
        errors,
        frame_index: line.frame_index,
        raw: *bytes,
        confidence,
        channel_confidence,
    }
}

/// Decodes a bare 42-byte record, e.g. from a `.t42` file, where capture
/// confidence is no longer available.
pub fn decode_bytes(bytes: [u8; LINE_BYTES], frame_index: u64) -> Packet {
    decode_line(&RawLine::from_bytes(bytes, frame_index))
}

fn payload_bytes(bytes: &[u8; LINE_BYTES]) -> [u8; 40] {
    let mut raw = [0u8; 40];
    raw.copy_from_slice(&bytes[2..]);
    raw
}

fn ham_at(bytes: &[u8; LINE_BYTES], index: usize, errors: &mut u16) -> u8 {
    let nibble = hamming::decode(bytes[index]);
    *errors += nibble.errors();
    nibble.value_or(ERASED)
}

/// Zeroes confidence for parity-failed text cells in `range`.
fn apply_parity(bytes: &[u8; LINE_BYTES], confidence: &mut [f32; LINE_BYTES], range: std::ops::Range<usize>) {
    for i in range {
        if !parity::is_valid(bytes[i]) {
            confidence[i] = 0.0;
        }
    }
}

fn decode_header(
    bytes: &[u8; LINE_BYTES],
    confidence: &mut [f32; LINE_BYTES],
    errors: &mut u16,
) -> PacketPayload {
    let units = ham_at(bytes, 2, errors);
    let tens = ham_at(bytes, 3, errors);
    let s1 = ham_at(bytes, 4, errors);
    let s2 = ham_at(bytes, 5, errors);
    let s3 = ham_at(bytes, 6, errors);
    let s4 = ham_at(bytes, 7, errors);
    let c7_10 = ham_at(bytes, 8, errors);
    let c11_14 = ham_at(bytes, 9, errors);

    let page = (tens << 4) | units;
    // Subpage digits stay hex-aligned (max 0x3F7F) so page filters and
    // status displays can use the transmitted notation directly.
    let subpage = (s1 as u16)
        | (((s2 & 0x07) as u16) << 4)
        | ((s3 as u16) << 8)
        | (((s4 & 0x03) as u16) << 12);

    // Control bits C4..C14 packed with C4 in bit 0.
    let control = (((s2 >> 3) & 0x01) as u16)
        | ((((s4 >> 2) & 0x03) as u16) << 1)
        | ((c7_10 as u16) << 3)
        | ((c11_14 as u16) << 7);

    apply_parity(bytes, confidence, 10..LINE_BYTES);

    let mut text = [0u8; 32];
    text.copy_from_slice(&bytes[10..]);

    PacketPayload::Header(HeaderPayload {
        page,
        subpage,
        control,
        text,
    })
}

fn decode_display(bytes: &[u8; LINE_BYTES], confidence: &mut [f32; LINE_BYTES]) -> PacketPayload {
    apply_parity(bytes, confidence, 2..LINE_BYTES);
    PacketPayload::DisplayRow(DisplayPayload {
        text: payload_bytes(bytes),
    })
}

/// Decodes a six-byte page link starting at `offset`.
///
/// The relative magazine bits fold into the carrying packet's magazine by
/// exclusive or, per the fastext link format.
fn decode_link(
    bytes: &[u8; LINE_BYTES],
    offset: usize,
    magazine: u8,
    errors: &mut u16,
) -> PageLink {
    let units = ham_at(bytes, offset, errors);
    let tens = ham_at(bytes, offset + 1, errors);
    let s1 = ham_at(bytes, offset + 2, errors);
    let s2m = ham_at(bytes, offset + 3, errors);
    let s3 = ham_at(bytes, offset + 4, errors);
    let s4m = ham_at(bytes, offset + 5, errors);

    let relative = ((s2m >> 3) & 0x01) | (((s4m >> 2) & 0x03) << 1);
    let mag_bits = (if magazine == 8 { 0 } else { magazine }) ^ relative;

    PageLink {
        magazine: if mag_bits == 0 { 8 } else { mag_bits },
        page: (tens << 4) | units,
        subpage: (s1 as u16)
            | (((s2m & 0x07) as u16) << 4)
            | ((s3 as u16) << 8)
            | (((s4m & 0x03) as u16) << 12),
    }
}

fn decode_fastext(bytes: &[u8; LINE_BYTES], magazine: u8, errors: &mut u16) -> PacketPayload {
    let designation = hamming::decode(bytes[2]);
    *errors += designation.errors();
    let designation = match designation {
        Nibble::Valid(d) | Nibble::Corrected(d) if d <= 3 => d,
        // Unknown or unrecoverable designations pass through untouched.
        _ => {
            return PacketPayload::Unknown(UnknownPayload {
                raw: payload_bytes(bytes),
            })
        }
    };

    let links = std::array::from_fn(|i| decode_link(bytes, 3 + i * 6, magazine, errors));

    PacketPayload::Fastext(FastextPayload { designation, links })
}

fn decode_broadcast(bytes: &[u8; LINE_BYTES], errors: &mut u16) -> PacketPayload {
    let designation = hamming::decode(bytes[2]);
    *errors += designation.errors();
    let designation = match designation {
        Nibble::Valid(d) | Nibble::Corrected(d) if d <= 3 => d,
        _ => {
            return PacketPayload::Unknown(UnknownPayload {
                raw: payload_bytes(bytes),
            })
        }
    };

    // Format 1 carries an initial page link; format 2 payloads stay raw.
    let initial_page = if designation <= 1 {
        Some(decode_link(bytes, 3, 8, errors))
    } else {
        None
    };

    PacketPayload::Broadcast(BroadcastPayload {
        designation,
        initial_page,
        raw: payload_bytes(bytes),
    })
}

fn decode_enhancement(bytes: &[u8; LINE_BYTES], errors: &mut u16) -> PacketPayload {
    let designation = hamming::decode(bytes[2]);
    *errors += designation.errors();
    match designation {
        Nibble::Valid(d) | Nibble::Corrected(d) => {
            let mut raw = [0u8; 39];
            raw.copy_from_slice(&bytes[3..]);
            PacketPayload::Enhancement(EnhancementPayload {
                designation: d,
                raw,
            })
        }
        Nibble::Invalid => PacketPayload::Unknown(UnknownPayload {
            raw: payload_bytes(bytes),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encode;

    #[test]
    fn test_decode_clean_header() {
        let bytes = encode::header(1, 0x00, 0x0000, 0, b"HELLO");
        let packet = decode_bytes(bytes, 5);
        assert_eq!(packet.mrag.magazine, 1);
        assert_eq!(packet.mrag.row, 0);
        assert_eq!(packet.errors, 0);
        assert_eq!(packet.frame_index, 5);
        match &packet.payload {
            PacketPayload::Header(h) => {
                assert_eq!(h.page, 0x00);
                assert_eq!(h.subpage, 0x0000);
                assert_eq!(parity::strip(h.text[0]), b'H');
                assert_eq!(parity::strip(h.text[4]), b'O');
                assert_eq!(parity::strip(h.text[5]), b' ');
            }
            other => panic!("expected header, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_decode_display_row() {
        let bytes = encode::display_row(3, 7, b"TEST ROW");
        let packet = decode_bytes(bytes, 0);
        assert_eq!(packet.mrag.magazine, 3);
        assert_eq!(packet.mrag.row, 7);
        match &packet.payload {
            PacketPayload::DisplayRow(d) => {
                assert_eq!(parity::strip(d.text[0]), b'T');
            }
            other => panic!("expected display, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_single_bit_mrag_error_corrected() {
        let mut bytes = encode::display_row(2, 4, b"X");
        bytes[0] ^= 0x10;
        let packet = decode_bytes(bytes, 0);
        assert_eq!(packet.mrag.magazine, 2);
        assert_eq!(packet.mrag.row, 4);
        assert_eq!(packet.errors, 1);
    }

    #[test]
    fn test_unrecoverable_mrag_reclassified_unknown() {
        let mut bytes = encode::display_row(2, 4, b"X");
        bytes[0] ^= 0x03;
        let packet = decode_bytes(bytes, 9);
        assert!(matches!(packet.payload, PacketPayload::Unknown(_)));
        assert!(packet.errors >= 1);
        assert_eq!(packet.frame_index, 9);
    }

    #[test]
    fn test_parity_failure_keeps_byte_zeroes_confidence() {
        let mut bytes = encode::display_row(1, 1, b"AB");
        bytes[2] ^= 0x80;
        let packet = decode_bytes(bytes, 0);
        match &packet.payload {
            PacketPayload::DisplayRow(d) => {
                assert_eq!(parity::strip(d.text[0]), b'A');
            }
            _ => panic!("expected display row"),
        }
        assert_eq!(packet.confidence[2], 0.0);
        assert!(packet.confidence[3] > 0.0);
        // The channel view keeps the capture confidence for the voter.
        assert!(packet.channel_confidence[2] > 0.0);
        // Parity failures are not Hamming residual errors.
        assert_eq!(packet.errors, 0);
    }

    #[test]
    fn test_header_subpage_and_control_bits() {
        let bytes = encode::header(4, 0x56, 0x1234, 0x07, b"");
        let packet = decode_bytes(bytes, 0);
        match &packet.payload {
            PacketPayload::Header(h) => {
                assert_eq!(h.page, 0x56);
                assert_eq!(h.subpage, 0x1234);
                assert_eq!(h.control, 0x07);
            }
            _ => panic!("expected header"),
        }
    }

    #[test]
    fn test_erased_page_nibble_counts_error() {
        let mut bytes = encode::header(1, 0x42, 0, 0, b"");
        // Two bit flips make the units nibble unrecoverable.
        bytes[2] ^= 0x03;
        let packet = decode_bytes(bytes, 0);
        match &packet.payload {
            PacketPayload::Header(h) => {
                assert_eq!(h.page & 0x0f, ERASED);
                assert_eq!(h.page >> 4, 0x4);
            }
            _ => panic!("expected header"),
        }
        assert_eq!(packet.errors, 1);
    }

    #[test]
    fn test_fastext_links_decode() {
        let links = [
            PageLink {
                magazine: 1,
                page: 0x01,
                subpage: 0,
            },
            PageLink {
                magazine: 2,
                page: 0x34,
                subpage: 0x0001,
            },
            PageLink {
                magazine: 8,
                page: 0xff,
                subpage: 0x3f7f,
            },
            PageLink {
                magazine: 1,
                page: 0x00,
                subpage: 0,
            },
            PageLink {
                magazine: 1,
                page: 0x99,
                subpage: 0,
            },
            PageLink {
                magazine: 3,
                page: 0x10,
                subpage: 0,
            },
        ];
        let bytes = encode::fastext(1, 0, &links);
        let packet = decode_bytes(bytes, 0);
        match &packet.payload {
            PacketPayload::Fastext(f) => {
                assert_eq!(f.designation, 0);
                assert_eq!(f.links, links);
            }
            other => panic!("expected fastext, got {}", other.kind_name()),
        }
        assert_eq!(packet.errors, 0);
    }

    #[test]
    fn test_row27_unknown_designation_passes_raw() {
        let links = [PageLink {
            magazine: 1,
            page: 0,
            subpage: 0,
        }; 6];
        let mut bytes = encode::fastext(1, 0, &links);
        bytes[2] = hamming::encode(0x9);
        let packet = decode_bytes(bytes, 0);
        assert!(matches!(packet.payload, PacketPayload::Unknown(_)));
    }

    #[test]
    fn test_enhancement_row_keeps_designation_and_raw() {
        let mut bytes = [0u8; LINE_BYTES];
        let (n0, n1) = Mrag {
            magazine: 2,
            row: 26,
        }
        .nibbles();
        bytes[0] = hamming::encode(n0);
        bytes[1] = hamming::encode(n1);
        bytes[2] = hamming::encode(0x2);
        bytes[3] = 0xab;
        let packet = decode_bytes(bytes, 0);
        match &packet.payload {
            PacketPayload::Enhancement(e) => {
                assert_eq!(e.designation, 2);
                assert_eq!(e.raw[0], 0xab);
            }
            other => panic!("expected enhancement, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_broadcast_initial_page() {
        let bytes = encode::broadcast_service(
            0,
            PageLink {
                magazine: 1,
                page: 0x00,
                subpage: 0x3f7f,
            },
        );
        let packet = decode_bytes(bytes, 0);
        assert_eq!(packet.mrag.magazine, 8);
        assert_eq!(packet.mrag.row, 30);
        match &packet.payload {
            PacketPayload::Broadcast(b) => {
                assert_eq!(b.designation, 0);
                let link = b.initial_page.unwrap();
                assert_eq!(link.page, 0x00);
                assert_eq!(link.subpage, 0x3f7f);
                assert_eq!(link.magazine, 1);
            }
            other => panic!("expected broadcast, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_row30_on_other_magazine_is_enhancement() {
        let mut bytes = [0u8; LINE_BYTES];
        let (n0, n1) = Mrag {
            magazine: 3,
            row: 30,
        }
        .nibbles();
        bytes[0] = hamming::encode(n0);
        bytes[1] = hamming::encode(n1);
        bytes[2] = hamming::encode(0x0);
        let packet = decode_bytes(bytes, 0);
        assert!(matches!(packet.payload, PacketPayload::Enhancement(_)));
    }
}
