//! The seam between the transport and whatever actually renders audio.
//!
//! The engine only *configures* sources: it opens them, starts and pauses
//! them, and schedules gain ramps and equalizer parameters. Implementations
//! must return quickly from every call; loading happens in the background and
//! is reported through `poll_events`.

use std::time::Duration;

use crate::library::Track;

use super::crossfade::GainRamp;
use super::equalizer::EqualizerConfig;

/// Handle to one opened source. Never reused within a backend.
pub type SourceId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The source opened under `generation` is decoded and can play.
    Ready { source: SourceId, generation: u64 },
    /// The source opened under `generation` could not be loaded.
    Failed {
        source: SourceId,
        generation: u64,
        reason: String,
    },
    /// A playing source ran out of audio.
    Ended { source: SourceId },
}

pub trait AudioBackend {
    /// Start loading `track` in the background. The source starts paused at
    /// unity gain and is reported `Ready` or `Failed` tagged with `generation`.
    fn open(&mut self, track: &Track, generation: u64) -> SourceId;

    fn play(&mut self, source: SourceId);

    fn pause(&mut self, source: SourceId);

    fn seek(&mut self, source: SourceId, position: Duration);

    /// Stop and forget a source. Its pending events are dropped.
    fn release(&mut self, source: SourceId);

    /// Jump to `gain`, cancelling any ramp in progress.
    fn set_gain(&mut self, source: SourceId, gain: f32);

    /// Replace any ramp in progress with `ramp`, starting on the next buffer.
    fn schedule_gain_ramp(&mut self, source: SourceId, ramp: GainRamp);

    /// Master volume, applied on top of per-source gain.
    fn set_volume(&mut self, volume: f32);

    /// New equalizer targets for every source, current and future.
    fn set_equalizer(&mut self, config: &EqualizerConfig);

    /// Drain what happened since the last call.
    fn poll_events(&mut self) -> Vec<BackendEvent>;
}
