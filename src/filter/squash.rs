//! Subpage deduplication by confidence-weighted voting ("squash").
//!
//! Broadcast teletext retransmits every page on a carousel; a long
//! capture sees the same subpage dozens of times, each copy with its own
//! noise. The squash filter accumulates per-cell votes across copies and
//! emits one synthesized page whose bytes each won their cell's vote.

use crate::defaults::{
    LINE_BYTES, PARITY_FAIL_WEIGHT, SQUASH_MAX_OBSERVATIONS, SQUASH_QUIET_FRAMES,
};
use crate::error::{Result, VbitextError};
use crate::filter::magazine::{MagazineTracker, PageKey};
use crate::packet::{decode_bytes, encode, parity, Packet, PacketPayload};
use std::collections::BTreeMap;
use std::ops::Range;

/// Payload cells per packet (everything after the MRAG).
const CELLS: usize = LINE_BYTES - 2;

/// Flush policy for the squash filter.
#[derive(Debug, Clone, Copy)]
pub struct SquashConfig {
    /// Merged copies of a subpage after which it is flushed.
    pub max_observations: u32,
    /// Frames of silence after which a subpage is flushed.
    pub quiet_frames: u64,
}

impl Default for SquashConfig {
    fn default() -> Self {
        Self {
            max_observations: SQUASH_MAX_OBSERVATIONS,
            quiet_frames: SQUASH_QUIET_FRAMES,
        }
    }
}

/// Payload cells that carry 7-bit odd parity for a given row.
fn parity_cells(row: u8) -> Option<Range<usize>> {
    match row {
        0 => Some(8..CELLS),
        1..=24 => Some(0..CELLS),
        _ => None,
    }
}

/// Accumulated vote weights for one byte cell.
struct CellAcc {
    /// One weight bucket per possible byte value.
    weights: Box<[f32; 256]>,
    /// Most recently observed value, for tie-breaking.
    last: u8,
}

impl CellAcc {
    fn new() -> Self {
        Self {
            weights: Box::new([0.0; 256]),
            last: 0,
        }
    }

    fn vote(&mut self, value: u8, weight: f32) {
        self.weights[value as usize] += weight;
        self.last = value;
    }

    /// The winning byte and its margin as a fraction of total weight.
    ///
    /// Ties go to the most recently observed value, then to a candidate
    /// with valid parity (when the cell carries parity), then to the
    /// lowest value.
    fn resolve(&self, expect_parity: bool) -> (u8, f32) {
        let mut total = 0.0f32;
        let mut top = 0.0f32;
        for &w in self.weights.iter() {
            total += w;
            if w > top {
                top = w;
            }
        }
        if total <= 0.0 {
            return (self.last, 0.0);
        }

        let at_top = |v: u8| self.weights[v as usize] == top;
        let chosen = if at_top(self.last) {
            self.last
        } else {
            let parity_pick = expect_parity
                .then(|| (0..=255u8).find(|&v| at_top(v) && parity::is_valid(v)))
                .flatten();
            parity_pick
                .or_else(|| (0..=255u8).find(|&v| at_top(v)))
                .unwrap_or(self.last)
        };

        let runner = self
            .weights
            .iter()
            .enumerate()
            .filter(|&(v, _)| v != chosen as usize)
            .map(|(_, &w)| w)
            .fold(0.0f32, f32::max);

        (chosen, ((top - runner) / total).clamp(0.0, 1.0))
    }
}

/// Votes for the 40 payload cells of one row.
struct RowAcc {
    cells: Vec<CellAcc>,
}

impl RowAcc {
    fn new() -> Self {
        Self {
            cells: (0..CELLS).map(|_| CellAcc::new()).collect(),
        }
    }

    fn vote(&mut self, packet: &Packet, parity_range: &Option<Range<usize>>) {
        for (i, cell) in self.cells.iter_mut().enumerate() {
            let value = packet.raw[i + 2];
            let base = packet.channel_confidence[i + 2];
            let discounted = matches!(parity_range, Some(range) if range.contains(&i))
                && !parity::is_valid(value);
            let weight = if discounted {
                base * PARITY_FAIL_WEIGHT
            } else {
                base
            };
            cell.vote(value, weight);
        }
    }

    fn resolve(&self, parity_range: &Option<Range<usize>>) -> ([u8; CELLS], [f32; CELLS]) {
        let mut bytes = [0u8; CELLS];
        let mut confidence = [0.0f32; CELLS];
        for (i, cell) in self.cells.iter().enumerate() {
            let expect_parity = matches!(parity_range, Some(range) if range.contains(&i));
            let (value, margin) = cell.resolve(expect_parity);
            bytes[i] = value;
            confidence[i] = margin;
        }
        (bytes, confidence)
    }
}

/// All accumulated state for one subpage.
struct SubpageAcc {
    key: PageKey,
    rows: BTreeMap<u8, RowAcc>,
    /// Header copies merged so far.
    observations: u32,
    /// Frame index of the newest contribution.
    last_frame: u64,
}

impl SubpageAcc {
    fn new(key: PageKey) -> Self {
        Self {
            key,
            rows: BTreeMap::new(),
            observations: 0,
            last_frame: 0,
        }
    }

    fn vote(&mut self, row: u8, packet: &Packet) {
        let parity_range = parity_cells(row);
        self.rows
            .entry(row)
            .or_insert_with(RowAcc::new)
            .vote(packet, &parity_range);
        self.last_frame = self.last_frame.max(packet.frame_index);
    }

    /// Synthesizes the voted page: header first, then rows ascending.
    fn emit(&self) -> Vec<Packet> {
        self.rows
            .iter()
            .map(|(&row, acc)| {
                let parity_range = parity_cells(row);
                let (cells, cell_confidence) = acc.resolve(&parity_range);

                let mut bytes = [0u8; LINE_BYTES];
                let address = encode::mrag(self.key.magazine, row);
                bytes[0] = address[0];
                bytes[1] = address[1];
                bytes[2..].copy_from_slice(&cells);

                let mut confidence = [1.0f32; LINE_BYTES];
                confidence[2..].copy_from_slice(&cell_confidence);

                let mut packet = decode_bytes(bytes, self.last_frame);
                packet.confidence = confidence;
                packet.channel_confidence = confidence;
                packet
            })
            .collect()
    }
}

/// The squash filter: one vote bag per observed subpage.
pub struct SquashFilter {
    config: SquashConfig,
    tracker: MagazineTracker,
    accs: BTreeMap<PageKey, SubpageAcc>,
}

impl SquashFilter {
    pub fn new(config: SquashConfig) -> Self {
        Self {
            config,
            tracker: MagazineTracker::new(),
            accs: BTreeMap::new(),
        }
    }

    /// Feeds one packet; returns any subpages flushed by this step.
    pub fn push(&mut self, packet: &Packet) -> Result<Vec<Packet>> {
        let row = packet.mrag.row;
        if row > 31 {
            return Err(VbitextError::Internal {
                frame_index: packet.frame_index,
                message: format!("filter received row {row}"),
            });
        }

        let mut flushed = Vec::new();

        if let PacketPayload::Header(header) = &packet.payload {
            let key = PageKey {
                magazine: packet.mrag.magazine,
                page: header.page,
                subpage: header.subpage,
            };
            // The displaced page stays in the bag: it may still collect
            // late votes and will leave via the quiet or end-of-stream
            // flush.
            self.tracker.open(key);

            // A subpage that already merged its budget of copies flushes
            // before this copy starts a fresh accumulation.
            if self
                .accs
                .get(&key)
                .is_some_and(|acc| acc.observations >= self.config.max_observations)
            {
                if let Some(acc) = self.accs.remove(&key) {
                    flushed.extend(acc.emit());
                }
            }

            let acc = self.accs.entry(key).or_insert_with(|| SubpageAcc::new(key));
            acc.observations += 1;
            acc.vote(0, packet);

            flushed.extend(self.flush_quiet(packet.frame_index));
        } else if let Some(key) = self.tracker.current(packet.mrag.magazine) {
            if let Some(acc) = self.accs.get_mut(&key) {
                acc.vote(row, packet);
            }
        }
        // Rows arriving before any header on their magazine cannot be
        // attributed to a page and are dropped.

        Ok(flushed)
    }

    /// Flushes subpages silent for longer than the quiet horizon.
    fn flush_quiet(&mut self, current_frame: u64) -> Vec<Packet> {
        let quiet: Vec<PageKey> = self
            .accs
            .iter()
            .filter(|(_, acc)| {
                current_frame.saturating_sub(acc.last_frame) > self.config.quiet_frames
            })
            .map(|(&key, _)| key)
            .collect();

        let mut flushed = Vec::new();
        for key in quiet {
            if let Some(acc) = self.accs.remove(&key) {
                flushed.extend(acc.emit());
            }
        }
        flushed
    }

    /// Flushes everything at end of stream, in page-address order.
    pub fn flush_all(&mut self) -> Vec<Packet> {
        self.tracker.close_all();
        let accs = std::mem::take(&mut self.accs);
        accs.into_values().flat_map(|acc| acc.emit()).collect()
    }
}
