//! Teletext waveform synthesis.
//!
//! Renders 42-byte packets into raw VBI sample frames at a profile's
//! geometry: the exact inverse of the deconvolver, including the channel
//! low-pass that smears adjacent bits. Used by the integration tests and
//! for generating fixtures; noise is deterministic so failures reproduce.

use crate::config::LineConfig;
use crate::defaults::{LINE_BYTES, PREAMBLE_BITS};
use crate::vbi::correlate::PREAMBLE;
use std::sync::Arc;

/// Deterministic noise source (64-bit LCG, gaussian by central limit).
#[derive(Debug, Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493))
    }

    fn next_uniform(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / 16_777_216.0
    }

    /// Approximately standard normal.
    fn next_gaussian(&mut self) -> f32 {
        let sum: f32 = (0..12).map(|_| self.next_uniform()).sum();
        sum - 6.0
    }
}

/// Renders sample frames from packet bytes.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: Arc<LineConfig>,
    /// Sample position where preamble bit 0 begins.
    line_start: f64,
    /// Black level in sample units.
    black: f32,
    /// Logic-high amplitude above black, in sample units.
    amplitude: f32,
    /// Channel low-pass width in samples.
    channel_sigma: f64,
    /// Additive gaussian noise as a fraction of amplitude.
    noise: f32,
    seed: u64,
}

impl Synthesizer {
    pub fn new(config: Arc<LineConfig>) -> Self {
        let channel_sigma = config.samples_per_bit / 4.0;
        Self {
            config,
            line_start: 90.0,
            black: 40.0,
            amplitude: 150.0,
            channel_sigma,
            noise: 0.0,
            seed: 0,
        }
    }

    /// Places the start of the preamble at a specific sample position.
    pub fn with_line_start(mut self, line_start: f64) -> Self {
        self.line_start = line_start;
        self
    }

    /// Adds gaussian sample noise (fraction of logic-high amplitude).
    pub fn with_noise(mut self, noise: f32, seed: u64) -> Self {
        self.noise = noise;
        self.seed = seed;
        self
    }

    fn smoothed(&self, ideal: &[f32]) -> Vec<f32> {
        let sigma = self.channel_sigma;
        let radius = (3.0 * sigma).ceil() as isize;
        let kernel: Vec<f64> = (-radius..=radius)
            .map(|d| (-((d * d) as f64) / (2.0 * sigma * sigma)).exp())
            .collect();
        let norm: f64 = kernel.iter().sum();

        (0..ideal.len())
            .map(|i| {
                let mut acc = 0.0f64;
                for (ki, w) in kernel.iter().enumerate() {
                    let j = i as isize + ki as isize - radius;
                    if j >= 0 && (j as usize) < ideal.len() {
                        acc += w * ideal[j as usize] as f64;
                    }
                }
                (acc / norm) as f32
            })
            .collect()
    }

    fn quantize(&self, waveform: &[f32], rng: &mut Lcg) -> Vec<u8> {
        waveform
            .iter()
            .map(|&v| {
                let noise = if self.noise > 0.0 {
                    rng.next_gaussian() * self.noise * self.amplitude
                } else {
                    0.0
                };
                (self.black + v * self.amplitude + noise)
                    .round()
                    .clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Renders one packet as a full sample frame.
    pub fn render(&self, packet: &[u8; LINE_BYTES]) -> Vec<u8> {
        let spb = self.config.samples_per_bit;
        let total_bits = PREAMBLE_BITS + LINE_BYTES * 8;

        let ideal: Vec<f32> = (0..self.config.samples_per_line)
            .map(|i| {
                let t = (i as f64 - self.line_start) / spb;
                if t < 0.0 || t >= total_bits as f64 {
                    return 0.0;
                }
                let bit = t as usize;
                if bit < PREAMBLE_BITS {
                    PREAMBLE[bit] as f32
                } else {
                    let payload_bit = bit - PREAMBLE_BITS;
                    ((packet[payload_bit / 8] >> (payload_bit % 8)) & 1) as f32
                }
            })
            .collect();

        let mut rng = Lcg::new(self.seed);
        self.quantize(&self.smoothed(&ideal), &mut rng)
    }

    /// Renders a frame with no teletext line, black level and noise only.
    pub fn render_blank(&self) -> Vec<u8> {
        let ideal = vec![0.0f32; self.config.samples_per_line];
        let mut rng = Lcg::new(self.seed ^ 0x9e3779b97f4a7c15);
        self.quantize(&ideal, &mut rng)
    }

    /// Renders a sequence of packets as one concatenated `.vbi` buffer.
    pub fn render_stream(&self, packets: &[[u8; LINE_BYTES]]) -> Vec<u8> {
        let mut out = Vec::with_capacity(packets.len() * self.config.samples_per_line);
        for (i, packet) in packets.iter().enumerate() {
            let mut frame = Synthesizer {
                seed: self.seed.wrapping_add(i as u64),
                ..self.clone()
            }
            .render(packet);
            out.append(&mut frame);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{profile_by_name, GeometryOverrides};
    use crate::packet::encode;

    fn test_config() -> Arc<LineConfig> {
        let profile = profile_by_name("bt8x8_pal").unwrap();
        LineConfig::from_profile(&profile, GeometryOverrides::default()).unwrap()
    }

    #[test]
    fn test_render_is_frame_sized() {
        let config = test_config();
        let synth = Synthesizer::new(config.clone());
        let packet = encode::display_row(1, 1, b"X");
        assert_eq!(synth.render(&packet).len(), config.samples_per_line);
        assert_eq!(synth.render_blank().len(), config.samples_per_line);
    }

    #[test]
    fn test_render_is_deterministic() {
        let config = test_config();
        let synth = Synthesizer::new(config).with_noise(0.1, 42);
        let packet = encode::display_row(1, 1, b"SAME");
        assert_eq!(synth.render(&packet), synth.render(&packet));
    }

    #[test]
    fn test_blank_frame_stays_near_black() {
        let config = test_config();
        let synth = Synthesizer::new(config);
        let blank = synth.render_blank();
        assert!(blank.iter().all(|&s| s == 40));
    }

    #[test]
    fn test_render_stream_concatenates() {
        let config = test_config();
        let synth = Synthesizer::new(config.clone());
        let a = encode::display_row(1, 1, b"A");
        let b = encode::display_row(1, 2, b"B");
        let stream = synth.render_stream(&[a, b]);
        assert_eq!(stream.len(), 2 * config.samples_per_line);
    }

    #[test]
    fn test_preamble_region_has_signal() {
        let config = test_config();
        let synth = Synthesizer::new(config.clone());
        let packet = encode::display_row(1, 1, b"");
        let frame = synth.render(&packet);
        // Bit 0 of the preamble is a one; its center must sit well above
        // black level.
        let center = (90.0 + 0.5 * config.samples_per_bit) as usize;
        assert!(frame[center] > 100);
    }
}
