//! Audio-related small types and handles.
//!
//! This module defines common enums and type aliases used by the
//! audio subsystem (looping mode, commands, playback state, events and the
//! shared status handle).

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use crate::config::Settings;
use crate::library::{Track, TrackId};

use super::crossfade::FadeCurve;
use super::equalizer::EqualizerConfig;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LoopMode {
    /// Do not wrap at the end of the current queue.
    #[default]
    NoLoop,
    /// Wrap around to the start of the current queue.
    LoopAll,
    /// Repeat the current song when it ends.
    LoopOne,
}

impl LoopMode {
    /// Whether manual and automatic advancing wrap around the queue ends.
    pub fn wraps(self) -> bool {
        self == LoopMode::LoopAll
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Transport state. Exactly one holds at any time.
///
/// Positions are in seconds on the track's transport clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading {
        track: Track,
    },
    Playing {
        track: Track,
        position: f64,
    },
    Paused {
        track: Track,
        position: f64,
    },
    CrossfadingOut {
        from: Track,
        to: Track,
        elapsed: f64,
    },
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading { .. } => "loading",
            PlaybackState::Playing { .. } => "playing",
            PlaybackState::Paused { .. } => "paused",
            PlaybackState::CrossfadingOut { .. } => "crossfading",
        }
    }

    /// The track the listener considers "now playing".
    ///
    /// During a crossfade that is still the outgoing track.
    pub fn track(&self) -> Option<&Track> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Loading { track }
            | PlaybackState::Playing { track, .. }
            | PlaybackState::Paused { track, .. } => Some(track),
            PlaybackState::CrossfadingOut { from, .. } => Some(from),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PlaybackState::Idle)
    }

    /// Same variant with the same track(s); positions are ignored.
    pub fn same_phase(&self, other: &PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, other) {
            (Idle, Idle) => true,
            (Loading { track: a }, Loading { track: b })
            | (Playing { track: a, .. }, Playing { track: b, .. })
            | (Paused { track: a, .. }, Paused { track: b, .. }) => a.id == b.id,
            (CrossfadingOut { from: a, to: b, .. }, CrossfadingOut { from: c, to: d, .. }) => {
                a.id == c.id && b.id == d.id
            }
            _ => false,
        }
    }
}

/// Notifications emitted by the engine to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The transport moved to a different phase or track.
    ///
    /// `elapsed` is how far into the now-playing track the audio actually is,
    /// which can be ahead of the transport clock right after a crossfade.
    StateChanged {
        previous: PlaybackState,
        current: PlaybackState,
        elapsed: f64,
    },
    /// A track's stream could not be loaded; the engine has moved on.
    TrackLoadFailed { track: Track, reason: String },
    /// The end of the queue was reached without repeat.
    QueueExhausted,
    QueueChanged { len: usize, shuffle: bool },
    Seeked { position: f64 },
    EqualizerChanged(EqualizerConfig),
    VolumeChanged(f32),
}

#[derive(Debug)]
pub enum AudioCmd {
    /// Replace the queue with `tracks` and start at `start` (first track if `None`).
    PlayTrack {
        tracks: Vec<Track>,
        start: Option<TrackId>,
        shuffle: bool,
    },
    /// Resume, or restart the queue's current track when idle.
    Play,
    Pause,
    Resume,
    /// Toggle pause/resume.
    TogglePause,
    /// Stop playback immediately.
    Stop,
    /// Skip to the next track.
    Next,
    /// Go to the previous track.
    Prev,
    /// Seek to an absolute position in seconds.
    Seek(f64),
    /// Seek by the specified number of seconds (positive or negative).
    SeekBy(f64),
    SetShuffle(bool),
    ToggleShuffle,
    /// Set the loop mode used by the player.
    SetLoopMode(LoopMode),
    RemoveTracks(Vec<TrackId>),
    UpdateBand { band: usize, gain_db: f32 },
    ApplyPreset(Vec<f32>),
    SetEqualizerEnabled(bool),
    SetVolume(f32),
    SetCrossfade(u32),
    SetCrossfadeCurve(FadeCurve),
    /// Apply a committed settings snapshot in one step.
    ApplySettings(Box<Settings>),
    /// Register a new event subscriber.
    Subscribe(Sender<PlayerEvent>),
    /// Quit the engine thread, fading out over `fade_out_ms` milliseconds.
    Quit { fade_out_ms: u64 },
}

/// Runtime playback information shared with callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackInfo {
    pub state: PlaybackState,
    pub shuffle: bool,
    pub loop_mode: LoopMode,
    pub volume: f32,
    pub crossfade_seconds: u32,
    pub queue_len: usize,
    pub equalizer: EqualizerConfig,
}

pub type PlaybackHandle = Arc<Mutex<PlaybackInfo>>;
