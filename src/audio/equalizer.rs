//! Equalizer gain model and presets.
//!
//! The signal-chain side lives in `dsp`; this module only holds the
//! configuration the chain ramps towards.

use std::time::Duration;

use tracing::{debug, warn};

/// Number of fixed bands.
pub const BAND_COUNT: usize = 9;

/// Band center frequencies in Hz, low to high, one octave apart.
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    63.0, 125.0, 250.0, 500.0, 1_000.0, 2_000.0, 4_000.0, 8_000.0, 16_000.0,
];

pub const MIN_GAIN_DB: f32 = -12.0;
pub const MAX_GAIN_DB: f32 = 12.0;

/// Time over which gain and bypass changes are interpolated in the signal path.
pub const GAIN_RAMP: Duration = Duration::from_millis(30);

/// Clamp a gain into the supported range. NaN becomes flat.
pub fn clamp_gain(gain_db: f32) -> f32 {
    if gain_db.is_nan() {
        return 0.0;
    }
    let clamped = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
    if clamped != gain_db {
        debug!(requested = gain_db, clamped, "band gain clamped");
    }
    clamped
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualizerBand {
    pub id: usize,
    /// Center frequency in Hz. Fixed per band.
    pub frequency: f32,
    /// Gain in dB, within `MIN_GAIN_DB..=MAX_GAIN_DB`.
    pub gain: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EqualizerConfig {
    pub enabled: bool,
    pub bands: Vec<EqualizerBand>,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self::from_gains(false, &[])
    }
}

impl EqualizerConfig {
    /// Build the fixed band layout from positional gains. Missing gains are
    /// flat, extra ones are ignored, all are clamped.
    pub fn from_gains(enabled: bool, gains: &[f32]) -> Self {
        let bands = BAND_FREQUENCIES
            .iter()
            .enumerate()
            .map(|(id, &frequency)| EqualizerBand {
                id,
                frequency,
                gain: gains.get(id).copied().map(clamp_gain).unwrap_or(0.0),
            })
            .collect();
        Self { enabled, bands }
    }

    pub fn gains(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.gain).collect()
    }

    pub fn is_flat(&self) -> bool {
        self.bands.iter().all(|b| b.gain == 0.0)
    }
}

/// A named gain vector, applied positionally.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub gains: &'static [f32],
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "flat",
        gains: &[0.0; BAND_COUNT],
    },
    Preset {
        name: "bass-boost",
        gains: &[6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    },
    Preset {
        name: "treble-boost",
        gains: &[0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0],
    },
    Preset {
        name: "vocal",
        gains: &[-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0],
    },
    Preset {
        name: "rock",
        gains: &[5.0, 3.0, 1.0, -1.0, -2.0, 0.0, 2.0, 4.0, 5.0],
    },
    Preset {
        name: "electronic",
        gains: &[5.0, 4.0, 1.0, 0.0, -2.0, 1.0, 2.0, 4.0, 5.0],
    },
    Preset {
        name: "acoustic",
        gains: &[3.0, 3.0, 2.0, 1.0, 1.0, 1.0, 2.0, 3.0, 2.0],
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Owns the live `EqualizerConfig`.
#[derive(Debug, Clone, Default)]
pub struct Equalizer {
    config: EqualizerConfig,
}

impl Equalizer {
    pub fn new(config: EqualizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EqualizerConfig {
        &self.config
    }

    /// Set one band's gain, clamped. Returns `false` for an unknown band.
    pub fn update_band(&mut self, band_id: usize, gain_db: f32) -> bool {
        match self.config.bands.get_mut(band_id) {
            Some(band) => {
                band.gain = clamp_gain(gain_db);
                true
            }
            None => {
                warn!(band_id, "ignoring gain for unknown equalizer band");
                false
            }
        }
    }

    /// Map `values` onto the bands positionally and enable the equalizer.
    ///
    /// A shorter vector leaves the trailing bands as they are.
    pub fn apply_preset(&mut self, values: &[f32]) {
        for (band, &gain) in self.config.bands.iter_mut().zip(values) {
            band.gain = clamp_gain(gain);
        }
        self.config.enabled = true;
    }

    pub fn apply_named_preset(&mut self, name: &str) -> bool {
        match find_preset(name) {
            Some(preset) => {
                self.apply_preset(preset.gains);
                true
            }
            None => {
                warn!(name, "unknown equalizer preset");
                false
            }
        }
    }

    /// Bypass or re-insert the filters. Gains are kept either way.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn replace(&mut self, config: EqualizerConfig) {
        self.config = config;
    }
}
