//! Capture device profiles and line configuration.
//!
//! A [`DeviceProfile`] fully describes the sample geometry of one capture
//! device: sample rate, samples per line, the window where the clock run-in
//! may start, the gain curve, the deconvolution kernel, and the rejection
//! threshold. Profiles are data, not code; adding a capture device means
//! adding a record to the registry or loading one from a TOML file.

use crate::defaults;
use crate::error::{Result, VbitextError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Gain curve applied to normalized sample amplitudes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GainCurve {
    /// Identity mapping; normalization alone is sufficient.
    Linear,
    /// Piecewise-linear lookup table over the [0, 1] amplitude range.
    Lut { points: Vec<f32> },
}

impl GainCurve {
    /// Maps a normalized amplitude through the curve.
    ///
    /// Inputs outside [0, 1] are clamped before lookup so that overshoot
    /// from noisy captures cannot index out of the table.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            GainCurve::Linear => x,
            GainCurve::Lut { points } => {
                if points.len() < 2 {
                    return x;
                }
                let clamped = x.clamp(0.0, 1.0);
                let pos = clamped * (points.len() - 1) as f32;
                let lo = pos.floor() as usize;
                let hi = (lo + 1).min(points.len() - 1);
                let frac = pos - lo as f32;
                points[lo] + (points[hi] - points[lo]) * frac
            }
        }
    }
}

/// How the slicer scales sample amplitude to the [0, 1] logic range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Estimate signal amplitude per line from the CRI region.
    Adaptive,
    /// Use a fixed amplitude in sample units (for captures with known gain).
    Fixed { amplitude: f32 },
}

/// Static description of one capture device's VBI sample geometry.
///
/// Field order matters for the TOML form: the enum fields serialize as
/// tables and must follow the plain values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceProfile {
    /// Registry key, e.g. `bt8x8_pal`.
    pub name: String,
    /// ADC sample rate in Hz.
    pub sample_rate: f64,
    /// Samples captured per scanline.
    pub samples_per_line: usize,
    /// Teletext bit rate in Hz.
    pub bit_rate: f64,
    /// Peak-to-sidelobe ratio below which a line is rejected.
    pub reject_ratio: f32,
    /// Sample range searched for the start of the clock run-in.
    pub cri_window: (usize, usize),
    /// Symmetric inverse kernel applied to the soft-bit sequence.
    pub kernel: Vec<f32>,
    /// Gain curve applied after black-level normalization.
    pub gain: GainCurve,
    /// Amplitude scaling mode.
    pub threshold: ThresholdMode,
}

fn bt8x8_pal() -> DeviceProfile {
    DeviceProfile {
        name: "bt8x8_pal".to_string(),
        sample_rate: 35_468_950.0,
        samples_per_line: 2048,
        bit_rate: defaults::BIT_RATE,
        cri_window: (60, 130),
        gain: GainCurve::Linear,
        kernel: defaults::INVERSE_KERNEL.to_vec(),
        threshold: ThresholdMode::Adaptive,
        reject_ratio: defaults::REJECT_RATIO,
    }
}

fn cx88_pal() -> DeviceProfile {
    DeviceProfile {
        name: "cx88_pal".to_string(),
        sample_rate: 35_468_950.0,
        samples_per_line: 2048,
        cri_window: (70, 140),
        ..bt8x8_pal()
    }
}

fn saa7134_pal() -> DeviceProfile {
    DeviceProfile {
        name: "saa7134_pal".to_string(),
        sample_rate: 31_250_000.0,
        samples_per_line: 1824,
        cri_window: (50, 120),
        ..bt8x8_pal()
    }
}

static REGISTRY: OnceLock<BTreeMap<String, DeviceProfile>> = OnceLock::new();

/// Built-in device profiles keyed by name.
pub fn registry() -> &'static BTreeMap<String, DeviceProfile> {
    REGISTRY.get_or_init(|| {
        let mut map = BTreeMap::new();
        for profile in [bt8x8_pal(), cx88_pal(), saa7134_pal()] {
            map.insert(profile.name.clone(), profile);
        }
        map
    })
}

/// Looks up a built-in profile by name.
pub fn profile_by_name(name: &str) -> Result<DeviceProfile> {
    registry()
        .get(name)
        .cloned()
        .ok_or_else(|| VbitextError::UnknownProfile {
            name: name.to_string(),
        })
}

/// Loads a single profile record from a TOML file.
///
/// The file holds one profile table; missing fields are an error rather
/// than silently defaulted, since a wrong geometry decodes nothing.
pub fn profile_from_file(path: &Path) -> Result<DeviceProfile> {
    let contents = fs::read_to_string(path)?;
    let profile: DeviceProfile = toml::from_str(&contents)?;
    profile.validate()?;
    Ok(profile)
}

impl DeviceProfile {
    /// Checks that the profile's geometry is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate <= 0.0 {
            return Err(VbitextError::InvalidProfile {
                field: "sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.bit_rate <= 0.0 {
            return Err(VbitextError::InvalidProfile {
                field: "bit_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.samples_per_line == 0 {
            return Err(VbitextError::InvalidProfile {
                field: "samples_per_line".to_string(),
                message: "must be nonzero".to_string(),
            });
        }
        if self.cri_window.0 >= self.cri_window.1 {
            return Err(VbitextError::InvalidProfile {
                field: "cri_window".to_string(),
                message: format!(
                    "start {} must be below end {}",
                    self.cri_window.0, self.cri_window.1
                ),
            });
        }
        if self.cri_window.1 >= self.samples_per_line {
            return Err(VbitextError::InvalidProfile {
                field: "cri_window".to_string(),
                message: "end exceeds samples per line".to_string(),
            });
        }
        if self.kernel.is_empty() || self.kernel.len() % 2 == 0 {
            return Err(VbitextError::InvalidProfile {
                field: "kernel".to_string(),
                message: "must have odd length".to_string(),
            });
        }
        // The whole preamble plus payload must fit after the latest
        // possible line start.
        let samples_per_bit = self.sample_rate / self.bit_rate;
        let line_span = (defaults::PREAMBLE_BITS + defaults::LINE_BITS) as f64 * samples_per_bit;
        if self.cri_window.1 as f64 + line_span > self.samples_per_line as f64 {
            return Err(VbitextError::InvalidProfile {
                field: "samples_per_line".to_string(),
                message: "too short for a full teletext line at this bit rate".to_string(),
            });
        }
        Ok(())
    }
}

/// Geometry overrides taken from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryOverrides {
    pub sample_rate: Option<f64>,
    pub samples_per_line: Option<usize>,
}

/// Resolved per-capture line configuration, shared read-only by every stage.
#[derive(Debug, Clone)]
pub struct LineConfig {
    pub samples_per_line: usize,
    pub sample_rate: f64,
    pub bit_rate: f64,
    /// Derived: samples per transmitted bit.
    pub samples_per_bit: f64,
    pub cri_window: (usize, usize),
    pub gain: GainCurve,
    pub kernel: Vec<f32>,
    pub threshold: ThresholdMode,
    pub reject_ratio: f32,
}

impl LineConfig {
    /// Builds a line configuration from a profile plus CLI overrides.
    pub fn from_profile(profile: &DeviceProfile, overrides: GeometryOverrides) -> Result<Arc<Self>> {
        let mut profile = profile.clone();
        if let Some(rate) = overrides.sample_rate {
            profile.sample_rate = rate;
        }
        if let Some(len) = overrides.samples_per_line {
            profile.samples_per_line = len;
        }
        profile.validate()?;

        Ok(Arc::new(Self {
            samples_per_line: profile.samples_per_line,
            sample_rate: profile.sample_rate,
            bit_rate: profile.bit_rate,
            samples_per_bit: profile.sample_rate / profile.bit_rate,
            cri_window: profile.cri_window,
            gain: profile.gain,
            kernel: profile.kernel,
            threshold: profile.threshold,
            reject_ratio: profile.reject_ratio,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_default_profile() {
        assert!(registry().contains_key(defaults::DEVICE_PROFILE));
    }

    #[test]
    fn test_profile_by_name_unknown() {
        let err = profile_by_name("bt9x9").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_bt8x8_samples_per_bit() {
        let profile = profile_by_name("bt8x8_pal").unwrap();
        let config = LineConfig::from_profile(&profile, GeometryOverrides::default()).unwrap();
        // The classic bt8x8 geometry: ~5.112 samples per bit.
        assert!((config.samples_per_bit - 5.112).abs() < 0.01);
    }

    #[test]
    fn test_all_builtin_profiles_validate() {
        for profile in registry().values() {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_overrides_apply() {
        let profile = profile_by_name("bt8x8_pal").unwrap();
        let config = LineConfig::from_profile(
            &profile,
            GeometryOverrides {
                sample_rate: Some(35_000_000.0),
                samples_per_line: Some(2200),
            },
        )
        .unwrap();
        assert_eq!(config.samples_per_line, 2200);
        assert!((config.sample_rate - 35_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_short_line() {
        let mut profile = profile_by_name("bt8x8_pal").unwrap();
        profile.samples_per_line = 1024;
        profile.cri_window = (60, 130);
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_validate_rejects_even_kernel() {
        let mut profile = profile_by_name("bt8x8_pal").unwrap();
        profile.kernel = vec![0.5, 0.5];
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_gain_curve_linear_identity() {
        let curve = GainCurve::Linear;
        assert_eq!(curve.apply(0.3), 0.3);
        assert_eq!(curve.apply(-1.0), -1.0);
    }

    #[test]
    fn test_gain_curve_lut_interpolates() {
        let curve = GainCurve::Lut {
            points: vec![0.0, 0.5, 1.0],
        };
        assert!((curve.apply(0.0) - 0.0).abs() < 1e-6);
        assert!((curve.apply(0.25) - 0.25).abs() < 1e-6);
        assert!((curve.apply(1.0) - 1.0).abs() < 1e-6);
        // Out-of-range input clamps instead of extrapolating.
        assert!((curve.apply(1.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_profile_toml_round_trip() {
        let profile = profile_by_name("bt8x8_pal").unwrap();
        let text = toml::to_string(&profile).unwrap();
        let parsed: DeviceProfile = toml::from_str(&text).unwrap();
        assert_eq!(parsed, profile);
    }
}
