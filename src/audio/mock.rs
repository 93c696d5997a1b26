//! A recording `AudioBackend` for engine tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::library::Track;

use super::backend::{AudioBackend, BackendEvent, SourceId};
use super::crossfade::GainRamp;
use super::equalizer::EqualizerConfig;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Open { source: SourceId, track: String, generation: u64 },
    Play(SourceId),
    Pause(SourceId),
    Seek(SourceId, Duration),
    Release(SourceId),
    SetGain(SourceId, f32),
    Ramp(SourceId, GainRamp),
    Volume(f32),
    Equalizer(EqualizerConfig),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockSource {
    pub track: String,
    pub generation: u64,
    pub playing: bool,
    pub gain: f32,
    pub ramp: Option<GainRamp>,
}

#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    pub calls: Vec<Call>,
    pub sources: HashMap<SourceId, MockSource>,
    pub released: HashSet<SourceId>,
    /// Report `Ready` for every opened source on the next poll.
    pub auto_ready: bool,
    /// Track ids whose loads fail.
    pub failing: HashSet<String>,
    pending: Vec<BackendEvent>,
    next_id: SourceId,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            auto_ready: true,
            next_id: 1,
            ..Self::default()
        }
    }

    /// Sources are reported only through `ready`/`fail`.
    pub fn manual() -> Self {
        Self {
            auto_ready: false,
            ..Self::new()
        }
    }

    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::new()
        }
    }

    pub fn ready(&mut self, source: SourceId) {
        let generation = self.sources.get(&source).map_or(0, |s| s.generation);
        self.pending.push(BackendEvent::Ready { source, generation });
    }

    pub fn fail(&mut self, source: SourceId, reason: &str) {
        let generation = self.sources.get(&source).map_or(0, |s| s.generation);
        self.pending.push(BackendEvent::Failed {
            source,
            generation,
            reason: reason.to_string(),
        });
    }

    pub fn push_event(&mut self, event: BackendEvent) {
        self.pending.push(event);
    }

    /// Live (not released) sources that are playing.
    pub fn playing(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self
            .sources
            .iter()
            .filter(|(id, s)| s.playing && !self.released.contains(id))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn last_opened(&self) -> Option<SourceId> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Open { source, .. } => Some(*source),
            _ => None,
        })
    }

    pub fn opened_tracks(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Open { track, .. } => Some(track.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn source_for(&self, track: &str) -> Option<SourceId> {
        let mut ids: Vec<SourceId> = self
            .sources
            .iter()
            .filter(|(id, s)| s.track == track && !self.released.contains(id))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids.pop()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Volume(v) => Some(*v),
            _ => None,
        })
    }
}

impl AudioBackend for MockBackend {
    fn open(&mut self, track: &Track, generation: u64) -> SourceId {
        let id = self.next_id;
        self.next_id += 1;
        self.calls.push(Call::Open {
            source: id,
            track: track.id.clone(),
            generation,
        });
        self.sources.insert(
            id,
            MockSource {
                track: track.id.clone(),
                generation,
                playing: false,
                gain: 1.0,
                ramp: None,
            },
        );
        if self.failing.contains(&track.id) {
            self.fail(id, "unsupported stream");
        } else if self.auto_ready {
            self.ready(id);
        }
        id
    }

    fn play(&mut self, source: SourceId) {
        self.calls.push(Call::Play(source));
        if let Some(s) = self.sources.get_mut(&source) {
            s.playing = true;
        }
    }

    fn pause(&mut self, source: SourceId) {
        self.calls.push(Call::Pause(source));
        if let Some(s) = self.sources.get_mut(&source) {
            s.playing = false;
        }
    }

    fn seek(&mut self, source: SourceId, position: Duration) {
        self.calls.push(Call::Seek(source, position));
    }

    fn release(&mut self, source: SourceId) {
        self.calls.push(Call::Release(source));
        self.released.insert(source);
        self.pending.retain(|e| match e {
            BackendEvent::Ready { source: s, .. }
            | BackendEvent::Failed { source: s, .. }
            | BackendEvent::Ended { source: s } => *s != source,
        });
        if let Some(s) = self.sources.get_mut(&source) {
            s.playing = false;
        }
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        self.calls.push(Call::SetGain(source, gain));
        if let Some(s) = self.sources.get_mut(&source) {
            s.gain = gain;
            s.ramp = None;
        }
    }

    fn schedule_gain_ramp(&mut self, source: SourceId, ramp: GainRamp) {
        self.calls.push(Call::Ramp(source, ramp));
        if let Some(s) = self.sources.get_mut(&source) {
            s.ramp = Some(ramp);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.calls.push(Call::Volume(volume));
    }

    fn set_equalizer(&mut self, config: &EqualizerConfig) {
        self.calls.push(Call::Equalizer(config.clone()));
    }

    fn poll_events(&mut self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.pending)
    }
}
