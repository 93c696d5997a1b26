use serde::{Deserialize, Serialize};

use crate::audio::{BAND_COUNT, FadeCurve, LoopMode, MAX_GAIN_DB, MIN_GAIN_DB};

use super::SettingsError;

/// Longest accepted crossfade, in whole seconds.
pub const MAX_CROSSFADE_SECONDS: u32 = 12;

/// Top-level engine settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/tonearm/config.toml` or `~/.config/tonearm/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `TONEARM__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub playback: PlaybackSettings,
    pub equalizer: EqualizerSettings,
    pub library: LibrarySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Master volume applied at startup, 0.0 to 1.0.
    pub default_volume: f32,
    /// Crossfade duration between consecutive tracks (seconds, 0 to 12).
    /// Set to 0 to disable crossfade.
    pub crossfade_seconds: u32,
    /// Shape of the complementary crossfade ramps.
    pub crossfade_curve: FadeCurve,
    /// Fade-out duration when quitting (milliseconds).
    /// Set to 0 to stop immediately.
    pub quit_fade_out_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            crossfade_seconds: 0,
            crossfade_curve: FadeCurve::Linear,
            quit_fade_out_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Whether shuffle starts enabled.
    pub shuffle: bool,
    /// Default loop mode.
    pub loop_mode: LoopModeSetting,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopModeSetting {
    #[default]
    #[serde(alias = "no_loop", alias = "noloop")]
    NoLoop,
    #[serde(
        alias = "loopall",
        alias = "loop_all",
        alias = "repeat-all",
        alias = "loop-around"
    )]
    LoopAll,
    #[serde(alias = "loopone", alias = "loop_one", alias = "repeat-one")]
    LoopOne,
}

impl From<LoopModeSetting> for LoopMode {
    fn from(value: LoopModeSetting) -> Self {
        match value {
            LoopModeSetting::NoLoop => LoopMode::NoLoop,
            LoopModeSetting::LoopAll => LoopMode::LoopAll,
            LoopModeSetting::LoopOne => LoopMode::LoopOne,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerSettings {
    /// Whether the band filters are in the signal path.
    pub enabled: bool,
    /// Gain per band in dB, low to high frequency. Exactly one entry per band.
    pub bands: Vec<f32>,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bands: vec![0.0; BAND_COUNT],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            extensions: vec!["mp3".into(), "flac".into(), "wav".into(), "ogg".into()],
            follow_links: true,
            include_hidden: true,
            recursive: true,
            max_depth: None,
        }
    }
}

impl Settings {
    /// Perform range checks on loaded settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let volume = self.audio.default_volume;
        if !(0.0..=1.0).contains(&volume) {
            return Err(SettingsError::Invalid(format!(
                "audio.default_volume must be within 0..=1, got {volume}"
            )));
        }
        if self.audio.crossfade_seconds > MAX_CROSSFADE_SECONDS {
            return Err(SettingsError::Invalid(format!(
                "audio.crossfade_seconds must be <= {MAX_CROSSFADE_SECONDS}, got {}",
                self.audio.crossfade_seconds
            )));
        }
        if self.equalizer.bands.len() != BAND_COUNT {
            return Err(SettingsError::Invalid(format!(
                "equalizer.bands must have {BAND_COUNT} entries, got {}",
                self.equalizer.bands.len()
            )));
        }
        if let Some(g) = self
            .equalizer
            .bands
            .iter()
            .find(|g| !(MIN_GAIN_DB..=MAX_GAIN_DB).contains(*g))
        {
            return Err(SettingsError::Invalid(format!(
                "equalizer band gain {g} dB is outside {MIN_GAIN_DB}..={MAX_GAIN_DB}"
            )));
        }
        Ok(())
    }
}
