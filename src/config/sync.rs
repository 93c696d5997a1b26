use tracing::info;

use crate::audio::{BAND_COUNT, FadeCurve, clamp_gain};

use super::SettingsError;
use super::load::SettingsStore;
use super::schema::{LoopModeSetting, MAX_CROSSFADE_SECONDS, Settings};

/// Something that can take a committed `Settings` snapshot live.
///
/// Implementations must apply the whole snapshot as one step so playback never
/// observes a half-applied draft.
pub trait ApplySettings {
    fn apply_settings(&mut self, settings: &Settings);
}

/// A partial edit staged onto the draft. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub default_volume: Option<f32>,
    pub crossfade_seconds: Option<u32>,
    pub crossfade_curve: Option<FadeCurve>,
    pub equalizer_enabled: Option<bool>,
    /// `(band index, gain dB)` pairs, applied in order.
    pub band_gains: Vec<(usize, f32)>,
    /// Positional preset gains; shorter vectors leave trailing bands alone.
    pub preset: Option<Vec<f32>>,
    pub shuffle: Option<bool>,
    pub loop_mode: Option<LoopModeSetting>,
}

/// Field names that differ between two settings snapshots.
pub fn changed_fields(a: &Settings, b: &Settings) -> Vec<String> {
    let mut out = Vec::new();
    if a.audio.default_volume != b.audio.default_volume {
        out.push("audio.default_volume".to_string());
    }
    if a.audio.crossfade_seconds != b.audio.crossfade_seconds {
        out.push("audio.crossfade_seconds".to_string());
    }
    if a.audio.crossfade_curve != b.audio.crossfade_curve {
        out.push("audio.crossfade_curve".to_string());
    }
    if a.audio.quit_fade_out_ms != b.audio.quit_fade_out_ms {
        out.push("audio.quit_fade_out_ms".to_string());
    }
    if a.playback.shuffle != b.playback.shuffle {
        out.push("playback.shuffle".to_string());
    }
    if a.playback.loop_mode != b.playback.loop_mode {
        out.push("playback.loop_mode".to_string());
    }
    if a.equalizer.enabled != b.equalizer.enabled {
        out.push("equalizer.enabled".to_string());
    }
    let bands = a.equalizer.bands.len().max(b.equalizer.bands.len());
    for i in 0..bands {
        if a.equalizer.bands.get(i) != b.equalizer.bands.get(i) {
            out.push(format!("equalizer.bands[{i}]"));
        }
    }
    if a.library != b.library {
        out.push("library".to_string());
    }
    out
}

/// The last committed settings plus an editable draft.
///
/// The draft lives on the caller's side; nothing reaches the engine until
/// `commit`.
pub struct SettingsSync<S: SettingsStore> {
    store: S,
    committed: Settings,
    draft: Settings,
}

impl<S: SettingsStore> SettingsSync<S> {
    /// Load from `store`, falling back to defaults on any failure.
    pub fn load(store: S) -> Self {
        let committed = Settings::load_or_default(&store);
        Self {
            store,
            draft: committed.clone(),
            committed,
        }
    }

    pub fn committed(&self) -> &Settings {
        &self.committed
    }

    pub fn draft(&self) -> &Settings {
        &self.draft
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply `patch` to the draft only, clamping values into range.
    pub fn stage(&mut self, patch: SettingsPatch) {
        let d = &mut self.draft;
        if let Some(v) = patch.default_volume {
            d.audio.default_volume = v.clamp(0.0, 1.0);
        }
        if let Some(s) = patch.crossfade_seconds {
            d.audio.crossfade_seconds = s.min(MAX_CROSSFADE_SECONDS);
        }
        if let Some(c) = patch.crossfade_curve {
            d.audio.crossfade_curve = c;
        }
        if let Some(e) = patch.equalizer_enabled {
            d.equalizer.enabled = e;
        }
        d.equalizer.bands.resize(BAND_COUNT, 0.0);
        if let Some(preset) = patch.preset {
            for (band, gain) in d.equalizer.bands.iter_mut().zip(preset) {
                *band = clamp_gain(gain);
            }
            d.equalizer.enabled = true;
        }
        for (i, gain) in patch.band_gains {
            if let Some(band) = d.equalizer.bands.get_mut(i) {
                *band = clamp_gain(gain);
            }
        }
        if let Some(s) = patch.shuffle {
            d.playback.shuffle = s;
        }
        if let Some(m) = patch.loop_mode {
            d.playback.loop_mode = m;
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved_fields().is_empty()
    }

    pub fn unsaved_fields(&self) -> Vec<String> {
        changed_fields(&self.committed, &self.draft)
    }

    /// Throw the draft away and start again from the committed settings.
    pub fn discard(&mut self) {
        self.draft = self.committed.clone();
    }

    /// Persist the draft, then hand it to `target` in one step.
    ///
    /// On a persistence failure nothing is applied and the draft is kept so
    /// the caller can retry.
    pub fn commit(&mut self, target: &mut impl ApplySettings) -> Result<(), SettingsError> {
        self.draft.validate()?;
        self.store.save(&self.draft)?;
        target.apply_settings(&self.draft);

        let changed = self.unsaved_fields();
        self.committed = self.draft.clone();
        info!(?changed, "settings committed");
        Ok(())
    }
}
