//! Clock run-in and framing code location.
//!
//! The start of a teletext line is found by cross-correlating the
//! normalized samples against an idealized preamble template: sixteen
//! alternating clock run-in bits followed by the framing code 0x27
//! (LSB first). The correlation peak gives the position of bit 0; the
//! peak-to-sidelobe ratio decides whether a line is present at all.

use crate::config::LineConfig;
use crate::defaults::PREAMBLE_BITS;

/// Transmitted preamble bits: 0x55, 0x55, 0x27, LSB first.
pub const PREAMBLE: [u8; PREAMBLE_BITS] = [
    1, 0, 1, 0, 1, 0, 1, 0, // CRI byte 0
    1, 0, 1, 0, 1, 0, 1, 0, // CRI byte 1
    1, 1, 1, 0, 0, 1, 0, 0, // framing code 0x27
];

/// Weight given to framing-code bits relative to clock run-in bits.
///
/// The CRI is periodic at two bits, so correlation against it alone has
/// strong sidelobes at every even bit offset; the framing code is the
/// part of the preamble that actually pins the alignment.
const FC_WEIGHT: f32 = 3.0;

/// Absolute floor on the normalized peak correlation.
///
/// The statistical ratio alone can be fooled by a lucky noise peak; a
/// real preamble always correlates well above this in absolute terms,
/// independent of signal amplitude.
const MIN_CORRELATION: f32 = 0.4;

/// Result of a successful preamble search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreambleFix {
    /// Fractional sample position of the start of preamble bit 0.
    pub bit0: f64,
    /// Normalized correlation at the peak.
    pub correlation: f32,
    /// Peak-to-sidelobe ratio that cleared the rejection threshold.
    pub ratio: f32,
}

/// Precomputed zero-mean preamble template at a profile's bit spacing.
#[derive(Debug, Clone)]
pub struct PreambleTemplate {
    samples: Vec<f32>,
    energy: f32,
    samples_per_bit: f64,
}

impl PreambleTemplate {
    pub fn new(config: &LineConfig) -> Self {
        let samples_per_bit = config.samples_per_bit;
        let len = (PREAMBLE_BITS as f64 * samples_per_bit).round() as usize;

        let mut samples: Vec<f32> = (0..len)
            .map(|i| {
                let bit = ((i as f64 / samples_per_bit) as usize).min(PREAMBLE_BITS - 1);
                let weight = if bit >= 16 { FC_WEIGHT } else { 1.0 };
                weight * (PREAMBLE[bit] as f32 - 0.5)
            })
            .collect();

        let mean = samples.iter().sum::<f32>() / len as f32;
        for s in &mut samples {
            *s -= mean;
        }
        let energy = samples.iter().map(|s| s * s).sum::<f32>();

        Self {
            samples,
            energy,
            samples_per_bit,
        }
    }

    /// Length of the template in samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Normalized correlation of the template against `signal` at `offset`.
    ///
    /// The template is zero-mean, so the numerator is invariant to the
    /// window's DC level; the window mean is removed from the energy term
    /// for the same reason (plain Pearson correlation).
    fn correlate_at(&self, signal: &[f32], offset: usize) -> f32 {
        let window = &signal[offset..offset + self.samples.len()];
        let mut num = 0.0f32;
        let mut sum = 0.0f32;
        let mut sum_sq = 0.0f32;
        for (t, x) in self.samples.iter().zip(window) {
            num += t * x;
            sum += x;
            sum_sq += x * x;
        }
        let n = self.samples.len() as f32;
        let sig_energy = (sum_sq - sum * sum / n).max(0.0);
        let denom = (self.energy * sig_energy).sqrt();
        if denom > f32::EPSILON {
            num / denom
        } else {
            0.0
        }
    }

    /// Searches `window` for the preamble; `None` means no line present.
    ///
    /// Two rejection tests, both scale-invariant:
    /// - the peak must reach an absolute correlation floor, and
    /// - the peak-to-sidelobe ratio (peak minus sidelobe mean, over
    ///   sidelobe deviation, the detection-theory definition) must clear
    ///   the profile threshold. The CRI alone is periodic at two bits,
    ///   so nearby correlations are structurally high; the statistical
    ///   ratio separates "line present" from "noise got lucky" where a
    ///   plain max-sidelobe quotient cannot.
    ///
    /// Sub-sample position comes from a parabolic fit through the peak
    /// and its neighbours.
    pub fn locate(
        &self,
        signal: &[f32],
        window: (usize, usize),
        reject_ratio: f32,
    ) -> Option<PreambleFix> {
        let last_start = signal.len().checked_sub(self.samples.len())?;
        let lo = window.0.min(last_start);
        let hi = window.1.min(last_start);
        if lo >= hi {
            return None;
        }

        let correlations: Vec<f32> = (lo..=hi).map(|o| self.correlate_at(signal, o)).collect();

        let (peak_idx, &peak) = correlations
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        if peak < MIN_CORRELATION {
            return None;
        }

        // Sidelobe statistics exclude one bit period around the peak,
        // where the correlation main lobe still dominates.
        let exclusion = self.samples_per_bit.ceil() as usize;
        let mut count = 0usize;
        let mut mean = 0.0f32;
        let mut mean_sq = 0.0f32;
        for (i, &c) in correlations.iter().enumerate() {
            if i.abs_diff(peak_idx) > exclusion {
                count += 1;
                mean += c;
                mean_sq += c * c;
            }
        }
        if count < 2 {
            return None;
        }
        mean /= count as f32;
        let deviation = (mean_sq / count as f32 - mean * mean).max(0.0).sqrt();
        if deviation <= f32::EPSILON {
            return None;
        }

        let ratio = (peak - mean) / deviation;
        if ratio < reject_ratio {
            return None;
        }

        // Parabolic interpolation around the peak for sub-sample timing.
        let mut bit0 = (lo + peak_idx) as f64;
        if peak_idx > 0 && peak_idx + 1 < correlations.len() {
            let before = correlations[peak_idx - 1] as f64;
            let at = peak as f64;
            let after = correlations[peak_idx + 1] as f64;
            let denom = before - 2.0 * at + after;
            if denom.abs() > f64::EPSILON {
                let delta = 0.5 * (before - after) / denom;
                if delta.abs() < 1.0 {
                    bit0 += delta;
                }
            }
        }

        Some(PreambleFix {
            bit0,
            correlation: peak,
            ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{profile_by_name, GeometryOverrides, LineConfig};

    fn test_config() -> std::sync::Arc<LineConfig> {
        let profile = profile_by_name("bt8x8_pal").unwrap();
        LineConfig::from_profile(&profile, GeometryOverrides::default()).unwrap()
    }

    /// Renders the preamble into a sample buffer starting at `start`.
    fn preamble_signal(config: &LineConfig, start: f64) -> Vec<f32> {
        let mut signal = vec![0.0f32; config.samples_per_line];
        for (i, s) in signal.iter_mut().enumerate() {
            let t = (i as f64 - start) / config.samples_per_bit;
            if t >= 0.0 && (t as usize) < PREAMBLE_BITS {
                *s = PREAMBLE[t as usize] as f32;
            }
        }
        signal
    }

    #[test]
    fn test_template_is_zero_mean() {
        let template = PreambleTemplate::new(&test_config());
        let mean: f32 = template.samples.iter().sum::<f32>() / template.len() as f32;
        assert!(mean.abs() < 1e-5);
        assert!(template.energy > 0.0);
    }

    #[test]
    fn test_locate_finds_clean_preamble() {
        let config = test_config();
        let template = PreambleTemplate::new(&config);
        let signal = preamble_signal(&config, 90.0);

        let fix = template
            .locate(&signal, config.cri_window, config.reject_ratio)
            .expect("clean preamble must be found");
        assert!(
            (fix.bit0 - 90.0).abs() < 1.0,
            "located at {} instead of 90",
            fix.bit0
        );
        assert!(fix.correlation > 0.7);
        assert!(fix.ratio >= config.reject_ratio);
    }

    #[test]
    fn test_locate_tracks_offset_across_window() {
        let config = test_config();
        let template = PreambleTemplate::new(&config);
        for start in [65.0, 80.0, 100.0, 125.0] {
            let signal = preamble_signal(&config, start);
            let fix = template
                .locate(&signal, config.cri_window, config.reject_ratio)
                .unwrap_or_else(|| panic!("preamble at {start} must be found"));
            assert!((fix.bit0 - start).abs() < 1.0, "start {start} -> {}", fix.bit0);
        }
    }

    #[test]
    fn test_locate_rejects_flat_line() {
        let config = test_config();
        let template = PreambleTemplate::new(&config);
        let signal = vec![0.0f32; config.samples_per_line];
        assert!(template
            .locate(&signal, config.cri_window, config.reject_ratio)
            .is_none());
    }

    #[test]
    fn test_locate_rejects_noise() {
        let config = test_config();
        let template = PreambleTemplate::new(&config);
        // Deterministic pseudo-noise, no preamble structure.
        let mut state = 0x2545f4914f6cdd1du64;
        let signal: Vec<f32> = (0..config.samples_per_line)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 40) as f32 / 16777216.0) - 0.5
            })
            .collect();
        assert!(template
            .locate(&signal, config.cri_window, config.reject_ratio)
            .is_none());
    }
}
