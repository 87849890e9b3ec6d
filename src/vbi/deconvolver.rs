//! Sample-frame deconvolution: from raw VBI samples to framed lines.
//!
//! The deconvolver normalizes a frame against its own black level, finds
//! the clock run-in and framing code by correlation, integrates a soft
//! value for each of the 336 payload bits, sharpens the sequence with the
//! profile's inverse kernel, and slices to bytes with per-byte confidence.
//!
//! Backends implement the [`Deconvolve`] trait; the pipeline only ever
//! sees the trait, so swapping the scalar backend for the batching one
//! cannot change observable results.

use crate::config::{LineConfig, ThresholdMode};
use crate::defaults::{self, LINE_BITS, LINE_BYTES, PREAMBLE_BITS};
use crate::packet::RawLine;
use crate::vbi::correlate::PreambleTemplate;
use crate::vbi::frame::SampleFrame;
use std::sync::Arc;

/// Result of deconvolving one sample frame.
///
/// A frame without a locatable preamble is a rejection, never a zeroed
/// line; lines with garbage content still come back as lines, carrying
/// their low confidence with them.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// A framed 42-byte line.
    Line(RawLine),
    /// No clock run-in / framing code found in this frame.
    NoLine { frame_index: u64 },
}

impl LineOutcome {
    /// Source frame index regardless of outcome.
    pub fn frame_index(&self) -> u64 {
        match self {
            LineOutcome::Line(line) => line.frame_index,
            LineOutcome::NoLine { frame_index } => *frame_index,
        }
    }
}

/// A deconvolution backend.
///
/// Implementations must be pure with respect to the frame: the same frame
/// and configuration always produce the same outcome, which is what makes
/// the worker pool and the batching backend interchangeable.
pub trait Deconvolve: Send + Sync {
    /// Deconvolves a single frame.
    fn deconvolve(&self, frame: &SampleFrame) -> LineOutcome;

    /// Deconvolves a batch of frames, preserving input order.
    fn deconvolve_batch(&self, frames: &[SampleFrame]) -> Vec<LineOutcome> {
        frames.iter().map(|f| self.deconvolve(f)).collect()
    }

    /// Preferred batch size; 1 for line-at-a-time backends.
    fn batch_size(&self) -> usize {
        1
    }

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Returns the `fraction` percentile of `values` (copies and sorts).
fn percentile(values: &[u8], fraction: f64) -> f32 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((sorted.len() - 1) as f64 * fraction).round() as usize;
    sorted[idx] as f32
}

/// Scalar CPU backend, one line at a time.
pub struct CpuDeconvolver {
    config: Arc<LineConfig>,
    template: PreambleTemplate,
    /// Gaussian integration width in samples.
    sigma: f64,
    /// Half-width of the integration window in whole samples.
    radius: isize,
}

impl CpuDeconvolver {
    pub fn new(config: Arc<LineConfig>) -> Self {
        let template = PreambleTemplate::new(&config);
        let sigma = config.samples_per_bit * defaults::BIT_SIGMA_FRACTION;
        let radius = (2.0 * sigma).ceil() as isize;
        Self {
            config,
            template,
            sigma,
            radius,
        }
    }

    /// Estimates the black level from the pre-CRI region.
    ///
    /// A low percentile rather than the mean, so that sync spikes and
    /// dropout glitches in the margin cannot pull the estimate up.
    fn black_level(&self, samples: &[u8]) -> f32 {
        let end = self.config.cri_window.0.clamp(16, samples.len());
        percentile(&samples[..end], 0.25)
    }

    /// Estimates logic-high amplitude over the preamble region.
    fn amplitude(&self, samples: &[u8], black: f32) -> f32 {
        match self.config.threshold {
            ThresholdMode::Fixed { amplitude } => amplitude,
            ThresholdMode::Adaptive => {
                let (start, end) = self.config.cri_window;
                let span = (PREAMBLE_BITS as f64 * self.config.samples_per_bit) as usize;
                let stop = (end + span).min(samples.len());
                let high = percentile(&samples[start..stop], 0.95);
                (high - black).max(1.0)
            }
        }
    }

    /// Normalizes raw samples to the [0, 1] logic range.
    fn normalize(&self, samples: &[u8]) -> Vec<f32> {
        let black = self.black_level(samples);
        let amplitude = self.amplitude(samples, black);
        samples
            .iter()
            .map(|&s| self.config.gain.apply((s as f32 - black) / amplitude))
            .collect()
    }

    /// Integrates the soft value of the bit centered at `center`.
    fn soft_bit(&self, normalized: &[f32], center: f64) -> f32 {
        let mid = center.round() as isize;
        let mut acc = 0.0f64;
        let mut weight_sum = 0.0f64;
        for j in (mid - self.radius)..=(mid + self.radius) {
            if j < 0 || j as usize >= normalized.len() {
                continue;
            }
            let d = j as f64 - center;
            let w = (-d * d / (2.0 * self.sigma * self.sigma)).exp();
            acc += w * normalized[j as usize] as f64;
            weight_sum += w;
        }
        if weight_sum > 0.0 {
            (acc / weight_sum) as f32
        } else {
            0.0
        }
    }

    /// Applies the profile's symmetric inverse kernel, clamping at edges.
    fn sharpen(&self, soft: &[f32; LINE_BITS]) -> [f32; LINE_BITS] {
        let kernel = &self.config.kernel;
        let half = (kernel.len() / 2) as isize;
        std::array::from_fn(|k| {
            let mut acc = 0.0f32;
            for (j, &coeff) in kernel.iter().enumerate() {
                let idx = (k as isize + j as isize - half).clamp(0, LINE_BITS as isize - 1);
                acc += coeff * soft[idx as usize];
            }
            acc
        })
    }
}

impl Deconvolve for CpuDeconvolver {
    fn deconvolve(&self, frame: &SampleFrame) -> LineOutcome {
        debug_assert_eq!(frame.samples.len(), self.config.samples_per_line);

        let normalized = self.normalize(&frame.samples);

        let fix = match self.template.locate(
            &normalized,
            self.config.cri_window,
            self.config.reject_ratio,
        ) {
            Some(fix) => fix,
            None => {
                return LineOutcome::NoLine {
                    frame_index: frame.index,
                }
            }
        };

        // Soft value for each payload bit, centered after the preamble.
        let spb = self.config.samples_per_bit;
        let mut soft = [0.0f32; LINE_BITS];
        for (k, slot) in soft.iter_mut().enumerate() {
            let center = fix.bit0 + (PREAMBLE_BITS as f64 + k as f64 + 0.5) * spb;
            *slot = self.soft_bit(&normalized, center);
        }

        let sharpened = self.sharpen(&soft);

        // Slice and pack, LSB first; byte confidence is its weakest bit.
        let mut bytes = [0u8; LINE_BYTES];
        let mut confidence = [0.0f32; LINE_BYTES];
        for byte in 0..LINE_BYTES {
            let mut value = 0u8;
            let mut min_conf = 1.0f32;
            for bit in 0..8 {
                let s = sharpened[byte * 8 + bit];
                if s >= 0.5 {
                    value |= 1 << bit;
                }
                min_conf = min_conf.min(((s - 0.5).abs() * 2.0).clamp(0.0, 1.0));
            }
            bytes[byte] = value;
            confidence[byte] = min_conf;
        }

        LineOutcome::Line(RawLine {
            bytes,
            confidence,
            frame_index: frame.index,
        })
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}
