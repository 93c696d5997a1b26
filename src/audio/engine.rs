//! The transport state machine.
//!
//! `Engine` owns the queue, the equalizer and the crossfade scheduler and
//! drives an `AudioBackend`. It never blocks on I/O: loads are started on the
//! backend and finish later as `BackendEvent`s, which are matched against the
//! current generation so that completions of superseded loads are dropped.
//!
//! Time only moves through `tick`. The engine thread calls it every few tens
//! of milliseconds; tests call it directly.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::{ApplySettings, MAX_CROSSFADE_SECONDS, Settings};
use crate::library::{Track, TrackId};

use super::backend::{AudioBackend, BackendEvent, SourceId};
use super::crossfade::{CrossfadeScheduler, FadeCurve, FadeProgress};
use super::equalizer::{Equalizer, EqualizerConfig};
use super::error::EngineError;
use super::queue::{Queue, Removal};
use super::types::{Direction, LoopMode, PlaybackInfo, PlaybackState, PlayerEvent};

/// How long before the crossfade window the next track starts loading.
const PRELOAD_LEAD: f64 = 10.0;

const QUIT_FADE_STEPS: u32 = 20;

/// The next track, opened paused ahead of its crossfade.
#[derive(Debug, Clone)]
struct Preload {
    track: Track,
    source: SourceId,
    ready: bool,
}

pub struct Engine<B: AudioBackend> {
    backend: B,
    queue: Queue,
    equalizer: Equalizer,
    crossfade: CrossfadeScheduler,
    loop_mode: LoopMode,
    volume: f32,
    shuffle: bool,
    state: PlaybackState,
    generation: u64,
    /// Source of the now-playing track; the outgoing one during a crossfade.
    current: Option<SourceId>,
    preload: Option<Preload>,
    /// Seconds the current source had already played when its `Playing`
    /// state was entered (non-zero right after a crossfade).
    lead_in: f64,
    /// Clock position of the outgoing track at the start of the fade window.
    fade_origin: f64,
    /// How far into the window the active fade was when the incoming source
    /// started playing.
    fade_offset: f64,
    start_paused: bool,
    crossfade_suppressed: bool,
    /// The incoming source of the active fade ran out before the fade did.
    incoming_ended: bool,
    /// Successor that already failed to load ahead of time; skipped at the
    /// track boundary instead of being opened again.
    failed_next: Option<TrackId>,
    consecutive_failures: usize,
    subscribers: Vec<Sender<PlayerEvent>>,
    rng: StdRng,
}

impl<B: AudioBackend> Engine<B> {
    pub fn new(backend: B, settings: &Settings) -> Self {
        Self::with_rng(backend, settings, StdRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic shuffles, for tests.
    pub fn with_seed(backend: B, settings: &Settings, seed: u64) -> Self {
        Self::with_rng(backend, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut backend: B, settings: &Settings, rng: StdRng) -> Self {
        let equalizer = EqualizerConfig::from_gains(
            settings.equalizer.enabled,
            &settings.equalizer.bands,
        );
        let volume = settings.audio.default_volume.clamp(0.0, 1.0);
        backend.set_volume(volume);
        backend.set_equalizer(&equalizer);

        Self {
            backend,
            queue: Queue::default(),
            equalizer: Equalizer::new(equalizer),
            crossfade: CrossfadeScheduler::new(
                settings.audio.crossfade_seconds.min(MAX_CROSSFADE_SECONDS),
                settings.audio.crossfade_curve,
            ),
            loop_mode: settings.playback.loop_mode.into(),
            volume,
            shuffle: settings.playback.shuffle,
            state: PlaybackState::Idle,
            generation: 0,
            current: None,
            preload: None,
            lead_in: 0.0,
            fade_origin: 0.0,
            fade_offset: 0.0,
            start_paused: false,
            crossfade_suppressed: false,
            incoming_ended: false,
            failed_next: None,
            consecutive_failures: 0,
            subscribers: Vec::new(),
            rng,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn equalizer(&self) -> &EqualizerConfig {
        self.equalizer.config()
    }

    pub fn crossfade(&self) -> &CrossfadeScheduler {
        &self.crossfade
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// How far into the now-playing track the audio is, in seconds.
    pub fn elapsed(&self) -> f64 {
        match &self.state {
            PlaybackState::Playing { position, .. } | PlaybackState::Paused { position, .. } => {
                position + self.lead_in
            }
            PlaybackState::CrossfadingOut { elapsed, .. } => self.fade_origin + elapsed,
            _ => 0.0,
        }
    }

    pub fn info(&self) -> PlaybackInfo {
        PlaybackInfo {
            state: self.state.clone(),
            shuffle: self.shuffle,
            loop_mode: self.loop_mode,
            volume: self.volume,
            crossfade_seconds: self.crossfade.seconds(),
            queue_len: self.queue.len(),
            equalizer: self.equalizer.config().clone(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn add_subscriber(&mut self, tx: Sender<PlayerEvent>) {
        self.subscribers.push(tx);
    }

    fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Enter `next`, notifying subscribers unless only a position changed.
    fn transition(&mut self, next: PlaybackState) {
        let previous = std::mem::replace(&mut self.state, next);
        if previous.same_phase(&self.state) {
            return;
        }
        info!(
            from = previous.name(),
            to = self.state.name(),
            track = ?self.state.track().map(|t| &t.id),
            "transport"
        );
        let event = PlayerEvent::StateChanged {
            previous,
            current: self.state.clone(),
            elapsed: self.elapsed(),
        };
        self.emit(event);
    }

    fn emit_queue_changed(&mut self) {
        let event = PlayerEvent::QueueChanged {
            len: self.queue.len(),
            shuffle: self.shuffle,
        };
        self.emit(event);
    }

    fn discard_preload(&mut self) {
        if let Some(preload) = self.preload.take() {
            self.backend.release(preload.source);
        }
    }

    /// Release every source and forget any fade in flight.
    fn release_all(&mut self) {
        self.incoming_ended = false;
        if let Some(fade) = self.crossfade.take() {
            self.backend.release(fade.outgoing);
            self.backend.release(fade.incoming);
        }
        if let Some(source) = self.current.take() {
            self.backend.release(source);
        }
        self.discard_preload();
    }

    /// Abandon whatever is playing and start loading `track`.
    fn start_loading(&mut self, track: Track) {
        self.release_all();
        self.generation += 1;
        let source = self.backend.open(&track, self.generation);
        debug!(track = %track.id, source, generation = self.generation, "open");
        self.current = Some(source);
        self.lead_in = 0.0;
        self.crossfade_suppressed = false;
        self.failed_next = None;
        self.transition(PlaybackState::Loading { track });
    }

    /// Begin playing a source that is decoded and paused at 0.
    fn start_ready(&mut self, track: Track, source: SourceId) {
        self.current = Some(source);
        self.lead_in = 0.0;
        self.crossfade_suppressed = false;
        self.consecutive_failures = 0;
        if std::mem::take(&mut self.start_paused) {
            self.transition(PlaybackState::Paused {
                track,
                position: 0.0,
            });
        } else {
            self.backend.play(source);
            self.transition(PlaybackState::Playing {
                track,
                position: 0.0,
            });
        }
    }

    fn current_wraps(&self) -> bool {
        self.loop_mode.wraps()
    }

    /// Cancel the active fade in favour of the incoming track, which ends up
    /// at position 0 and full gain. Returns that track.
    fn cancel_crossfade(&mut self) -> Option<Track> {
        let fade = self.crossfade.cancel(&mut self.backend)?;
        self.current = Some(fade.incoming);
        self.lead_in = 0.0;
        self.crossfade_suppressed = false;
        Some(fade.to)
    }

    /// Cancel the active fade in favour of the outgoing track, which keeps
    /// playing where it is. Crossfading stays off until the next track.
    fn abort_crossfade(&mut self) -> Option<Track> {
        let fade = self.crossfade.abort(&mut self.backend)?;
        self.incoming_ended = false;
        self.queue.advance(Direction::Previous, self.current_wraps());
        self.crossfade_suppressed = true;
        let position = self.fade_origin + fade.elapsed() - self.lead_in;
        self.transition(PlaybackState::Playing {
            track: fade.from,
            position,
        });
        Some(fade.to)
    }

    /// Cancel a running fade and settle on `Playing(to, 0)`, or `Paused` when
    /// `paused`. Returns false when no fade was running.
    fn settle_crossfade(&mut self, paused: bool) -> bool {
        let Some(track) = self.cancel_crossfade() else {
            return false;
        };
        if std::mem::take(&mut self.incoming_ended) {
            // Nothing left of the incoming stream to settle on.
            self.transition(PlaybackState::Playing {
                track,
                position: 0.0,
            });
            self.start_paused = paused;
            self.on_track_end();
            return true;
        }
        if paused {
            if let Some(source) = self.current {
                self.backend.pause(source);
            }
            self.transition(PlaybackState::Paused {
                track,
                position: 0.0,
            });
        } else {
            self.transition(PlaybackState::Playing {
                track,
                position: 0.0,
            });
        }
        true
    }

    fn can_crossfade(&self) -> bool {
        self.crossfade.is_enabled()
            && !self.crossfade_suppressed
            && self.loop_mode != LoopMode::LoopOne
    }

    /// Open the next track ahead of the crossfade window.
    fn maybe_preload(&mut self, track: &Track, position: f64) {
        if !self.can_crossfade() {
            return;
        }
        let Some(window) = self.crossfade.window_start(track.duration_seconds()) else {
            return;
        };
        if position < window - PRELOAD_LEAD {
            return;
        }
        let Some(next) = self
            .queue
            .peek(Direction::Next, self.current_wraps())
            .cloned()
        else {
            return;
        };
        if let Some(preload) = &self.preload {
            if preload.track.id == next.id {
                return;
            }
            self.discard_preload();
        }
        let source = self.backend.open(&next, self.generation);
        debug!(track = %next.id, source, "preloading next track");
        self.preload = Some(Preload {
            track: next,
            source,
            ready: false,
        });
    }

    /// Start fading into the preloaded track if the window has been reached.
    fn maybe_begin_crossfade(&mut self, from: &Track, position: f64) -> bool {
        if !self.can_crossfade() {
            return false;
        }
        let duration = from.duration_seconds();
        let Some(window) = self.crossfade.window_start(duration) else {
            return false;
        };
        if position < window || position >= duration {
            return false;
        }
        let Some(preload) = self.preload.clone() else {
            return false;
        };
        if !preload.ready {
            return false;
        }
        let Some(outgoing) = self.current else {
            return false;
        };
        let Some(to) = self
            .queue
            .advance(Direction::Next, self.current_wraps())
            .cloned()
        else {
            return false;
        };
        if to.id != preload.track.id {
            // The queue changed under the preload.
            self.queue.advance(Direction::Previous, self.current_wraps());
            self.discard_preload();
            return false;
        }
        self.preload = None;

        let fade_elapsed = position - window;
        self.fade_origin = window;
        self.fade_offset = fade_elapsed;
        self.crossfade.begin(
            &mut self.backend,
            from.clone(),
            to.clone(),
            outgoing,
            preload.source,
            duration - window,
            fade_elapsed,
        );
        self.transition(PlaybackState::CrossfadingOut {
            from: from.clone(),
            to,
            elapsed: fade_elapsed,
        });
        true
    }

    fn finish_crossfade(&mut self, overshoot: f64) {
        let Some(fade) = self.crossfade.complete(&mut self.backend) else {
            return;
        };
        self.current = Some(fade.incoming);
        self.lead_in = (fade.elapsed() - overshoot - self.fade_offset).max(0.0);
        self.crossfade_suppressed = false;
        self.consecutive_failures = 0;
        self.transition(PlaybackState::Playing {
            track: fade.to,
            position: overshoot,
        });
        if std::mem::take(&mut self.incoming_ended) {
            self.on_track_end();
        }
    }

    /// The now-playing track ran out.
    fn on_track_end(&mut self) {
        let Some(track) = self.state.track().cloned() else {
            return;
        };
        if self.loop_mode == LoopMode::LoopOne {
            debug!(track = %track.id, "repeating track");
            self.start_loading(track);
            return;
        }

        let mut next = self
            .queue
            .advance(Direction::Next, self.current_wraps())
            .cloned();
        let failed = self.failed_next.take();
        if next.as_ref().is_some_and(|t| Some(&t.id) == failed.as_ref()) {
            debug!(track = ?failed, "skipping track that already failed to load");
            next = self
                .queue
                .advance(Direction::Next, self.current_wraps())
                .cloned();
        }
        match next {
            Some(next) => match self.preload.take() {
                Some(preload) if preload.track.id == next.id => {
                    if let Some(source) = self.current.take() {
                        self.backend.release(source);
                    }
                    if preload.ready {
                        self.start_ready(next, preload.source);
                    } else {
                        self.current = Some(preload.source);
                        self.lead_in = 0.0;
                        self.crossfade_suppressed = false;
                        self.transition(PlaybackState::Loading { track: next });
                    }
                }
                other => {
                    self.preload = other;
                    self.start_loading(next);
                }
            },
            None => {
                info!("queue exhausted");
                self.halt();
                self.emit(PlayerEvent::QueueExhausted);
            }
        }
    }

    /// Release everything and go idle without touching the queue.
    fn halt(&mut self) {
        self.release_all();
        self.generation += 1;
        self.lead_in = 0.0;
        self.start_paused = false;
        self.failed_next = None;
        self.transition(PlaybackState::Idle);
    }

    /// Advance the transport clock by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        self.pump_backend();
        let dt = dt.max(0.0);

        match self.state.clone() {
            PlaybackState::Playing { track, position } => {
                let position = position + dt;
                let elapsed = position + self.lead_in;
                self.maybe_preload(&track, elapsed);
                if self.maybe_begin_crossfade(&track, elapsed) {
                    return;
                }
                if track.has_known_duration() && elapsed >= track.duration_seconds() {
                    self.on_track_end();
                    return;
                }
                self.state = PlaybackState::Playing { track, position };
            }
            PlaybackState::CrossfadingOut { from, to, .. } => match self.crossfade.advance(dt) {
                Some(FadeProgress::Running { elapsed }) => {
                    self.state = PlaybackState::CrossfadingOut { from, to, elapsed };
                }
                Some(FadeProgress::Complete { overshoot }) => self.finish_crossfade(overshoot),
                None => {
                    warn!("crossfade state without an active fade");
                    self.transition(PlaybackState::Playing {
                        track: to,
                        position: 0.0,
                    });
                }
            },
            PlaybackState::Idle | PlaybackState::Loading { .. } | PlaybackState::Paused { .. } => {}
        }
    }

    /// Drain and handle everything the backend reported.
    pub fn pump_backend(&mut self) {
        for event in self.backend.poll_events() {
            self.handle_backend_event(event);
        }
    }

    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Ready { source, generation } => {
                if generation != self.generation {
                    debug!(source, generation, "stale load completion");
                    return;
                }
                if let Some(preload) = self.preload.as_mut().filter(|p| p.source == source) {
                    preload.ready = true;
                    return;
                }
                if self.current == Some(source) {
                    if let PlaybackState::Loading { track } = self.state.clone() {
                        self.start_ready(track, source);
                    }
                }
            }
            BackendEvent::Failed {
                source,
                generation,
                reason,
            } => {
                if generation != self.generation {
                    debug!(source, generation, "stale load failure");
                    return;
                }
                self.on_load_failed(source, reason);
            }
            BackendEvent::Ended { source } => {
                if self
                    .crossfade
                    .active()
                    .is_some_and(|fade| fade.incoming == source)
                {
                    self.incoming_ended = true;
                    return;
                }
                if self.current != Some(source) {
                    return;
                }
                match &self.state {
                    PlaybackState::Playing { .. } => self.on_track_end(),
                    PlaybackState::CrossfadingOut { .. } => {
                        // Outgoing stream was shorter than its metadata.
                        self.finish_crossfade(0.0);
                    }
                    _ => {}
                }
            }
        }
    }

    fn on_load_failed(&mut self, source: SourceId, reason: String) {
        if self.preload.as_ref().is_some_and(|p| p.source == source) {
            if let Some(preload) = self.preload.take() {
                warn!(track = %preload.track.id, %reason, "next track failed to load");
                self.backend.release(source);
                self.crossfade_suppressed = true;
                self.failed_next = Some(preload.track.id.clone());
                self.emit(PlayerEvent::TrackLoadFailed {
                    track: preload.track,
                    reason,
                });
            }
            return;
        }

        if self
            .crossfade
            .active()
            .is_some_and(|fade| fade.incoming == source)
        {
            if let Some(track) = self.abort_crossfade() {
                warn!(track = %track.id, %reason, "incoming track failed during crossfade");
                self.failed_next = Some(track.id.clone());
                self.emit(PlayerEvent::TrackLoadFailed { track, reason });
            }
            return;
        }

        if self.current != Some(source) {
            return;
        }
        let PlaybackState::Loading { track } = self.state.clone() else {
            return;
        };
        warn!(track = %track.id, %reason, "track failed to load");
        let paused = self.start_paused;
        self.halt();
        self.emit(PlayerEvent::TrackLoadFailed { track, reason });

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.queue.len() {
            warn!(
                failures = self.consecutive_failures,
                "no playable track left in the queue"
            );
            self.consecutive_failures = 0;
            self.emit(PlayerEvent::QueueExhausted);
            return;
        }
        match self
            .queue
            .advance(Direction::Next, self.current_wraps())
            .cloned()
        {
            Some(next) => {
                self.start_paused = paused;
                self.start_loading(next);
            }
            None => self.emit(PlayerEvent::QueueExhausted),
        }
    }

    /// Replace the queue and start loading its first (or `start`) track.
    ///
    /// Interrupts whatever is playing. Nothing changes when the queue cannot
    /// be built.
    pub fn play_track(
        &mut self,
        tracks: Vec<Track>,
        start: Option<&str>,
        shuffle: bool,
    ) -> Result<(), EngineError> {
        let queue = Queue::new(tracks, start, shuffle, &mut self.rng)?;
        let Some(first) = queue.current().cloned() else {
            return Err(EngineError::EmptyQueue);
        };
        self.queue = queue;
        self.shuffle = shuffle;
        self.start_paused = false;
        self.consecutive_failures = 0;
        self.emit_queue_changed();
        self.start_loading(first);
        Ok(())
    }

    /// Resume when paused, restart the queue's current track when idle.
    pub fn play(&mut self) {
        match &self.state {
            PlaybackState::Idle => {
                if let Some(track) = self.queue.current().cloned() {
                    self.start_paused = false;
                    self.consecutive_failures = 0;
                    self.start_loading(track);
                }
            }
            _ => self.resume(),
        }
    }

    pub fn pause(&mut self) {
        match self.state.clone() {
            PlaybackState::Loading { .. } => self.start_paused = true,
            PlaybackState::Playing { track, position } => {
                if let Some(source) = self.current {
                    self.backend.pause(source);
                }
                self.transition(PlaybackState::Paused { track, position });
            }
            PlaybackState::CrossfadingOut { .. } => {
                self.settle_crossfade(true);
            }
            PlaybackState::Idle | PlaybackState::Paused { .. } => {}
        }
    }

    pub fn resume(&mut self) {
        match self.state.clone() {
            PlaybackState::Loading { .. } => self.start_paused = false,
            PlaybackState::Paused { track, position } => {
                if let Some(source) = self.current {
                    self.backend.play(source);
                }
                self.transition(PlaybackState::Playing { track, position });
            }
            _ => {}
        }
    }

    pub fn toggle_pause(&mut self) {
        match &self.state {
            PlaybackState::Playing { .. } | PlaybackState::CrossfadingOut { .. } => self.pause(),
            PlaybackState::Paused { .. } => self.resume(),
            PlaybackState::Loading { .. } => self.start_paused = !self.start_paused,
            PlaybackState::Idle => self.play(),
        }
    }

    pub fn stop(&mut self) {
        if self.state.is_idle() {
            return;
        }
        self.halt();
    }

    /// Seek the now-playing track to `position` seconds, clamped to the
    /// track. During a crossfade the seek only cancels the fade.
    pub fn seek(&mut self, position: f64) {
        match self.state.clone() {
            PlaybackState::Playing { track, .. } | PlaybackState::Paused { track, .. } => {
                let mut position = position.max(0.0);
                if track.has_known_duration() {
                    position = position.min(track.duration_seconds());
                }
                let Ok(target) = Duration::try_from_secs_f64(position) else {
                    debug!(position, "seek target out of range");
                    return;
                };
                if let Some(source) = self.current {
                    self.backend.seek(source, target);
                }
                self.lead_in = 0.0;
                self.state = match self.state.clone() {
                    PlaybackState::Paused { track, .. } => PlaybackState::Paused { track, position },
                    _ => PlaybackState::Playing { track, position },
                };
                self.emit(PlayerEvent::Seeked { position });
            }
            PlaybackState::CrossfadingOut { .. } => {
                if self.settle_crossfade(false) {
                    self.emit(PlayerEvent::Seeked { position: 0.0 });
                }
            }
            PlaybackState::Idle | PlaybackState::Loading { .. } => {
                debug!(position, "seek ignored while nothing is playing");
            }
        }
    }

    pub fn seek_by(&mut self, delta: f64) {
        self.seek(self.elapsed() + delta);
    }

    pub fn next(&mut self) {
        match &self.state {
            PlaybackState::Idle => {}
            PlaybackState::CrossfadingOut { .. } => {
                self.settle_crossfade(false);
            }
            _ => {
                self.consecutive_failures = 0;
                match self
                    .queue
                    .advance(Direction::Next, self.current_wraps())
                    .cloned()
                {
                    Some(track) => {
                        self.start_paused = false;
                        self.start_loading(track);
                    }
                    None => {
                        self.halt();
                        self.emit(PlayerEvent::QueueExhausted);
                    }
                }
            }
        }
    }

    pub fn previous(&mut self) {
        match &self.state {
            PlaybackState::Idle => return,
            PlaybackState::CrossfadingOut { .. } => {
                self.settle_crossfade(false);
            }
            _ => {}
        }
        self.consecutive_failures = 0;
        if let Some(track) = self
            .queue
            .advance(Direction::Previous, self.current_wraps())
            .cloned()
        {
            self.start_paused = false;
            self.start_loading(track);
        }
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        if enabled == self.shuffle && enabled == self.queue.is_shuffled() {
            return;
        }
        self.settle_crossfade(false);
        self.queue.set_shuffle(enabled, &mut self.rng);
        self.shuffle = enabled;
        self.discard_preload();
        self.emit_queue_changed();
    }

    pub fn toggle_shuffle(&mut self) {
        self.set_shuffle(!self.shuffle);
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        if mode == self.loop_mode {
            return;
        }
        self.loop_mode = mode;
        // The successor may be different now.
        self.discard_preload();
    }

    /// Drop tracks from the queue, moving on if the current one goes.
    pub fn remove_tracks(&mut self, ids: &[TrackId]) {
        let ids: HashSet<TrackId> = ids.iter().cloned().collect();

        if let PlaybackState::CrossfadingOut { from, to, .. } = &self.state {
            let (from_gone, to_gone) = (ids.contains(&from.id), ids.contains(&to.id));
            if to_gone && !from_gone {
                self.abort_crossfade();
            } else if from_gone {
                self.settle_crossfade(false);
            }
        }

        let removal = self.queue.remove_tracks(&ids, self.current_wraps());
        if removal == Removal::NoMatch {
            return;
        }
        self.discard_preload();
        debug!(?removal, remaining = self.queue.len(), "tracks removed");

        match removal {
            Removal::NoMatch | Removal::CurrentKept => {}
            Removal::Advanced => {
                if !self.state.is_idle() {
                    let paused = matches!(self.state, PlaybackState::Paused { .. });
                    if let Some(track) = self.queue.current().cloned() {
                        self.start_loading(track);
                        self.start_paused = paused;
                    }
                }
            }
            Removal::Exhausted | Removal::Emptied => {
                if !self.state.is_idle() {
                    self.halt();
                    self.emit(PlayerEvent::QueueExhausted);
                }
            }
        }
        self.emit_queue_changed();
    }

    fn push_equalizer(&mut self) {
        let config = self.equalizer.config().clone();
        self.backend.set_equalizer(&config);
        self.emit(PlayerEvent::EqualizerChanged(config));
    }

    pub fn update_band(&mut self, band_id: usize, gain_db: f32) {
        if self.equalizer.update_band(band_id, gain_db) {
            self.push_equalizer();
        }
    }

    pub fn apply_preset(&mut self, values: &[f32]) {
        self.equalizer.apply_preset(values);
        self.push_equalizer();
    }

    pub fn apply_named_preset(&mut self, name: &str) -> bool {
        let found = self.equalizer.apply_named_preset(name);
        if found {
            self.push_equalizer();
        }
        found
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        if self.equalizer.config().enabled == enabled {
            return;
        }
        self.equalizer.set_enabled(enabled);
        self.push_equalizer();
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() {
            self.volume
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume = volume;
        self.backend.set_volume(volume);
        self.emit(PlayerEvent::VolumeChanged(volume));
    }

    /// Takes effect from the next track boundary; a running fade keeps its
    /// timing. 0 disables crossfading.
    pub fn set_crossfade_seconds(&mut self, seconds: u32) {
        let seconds = seconds.min(MAX_CROSSFADE_SECONDS);
        self.crossfade.set_seconds(seconds);
        if seconds == 0 {
            self.discard_preload();
        }
    }

    pub fn set_crossfade_curve(&mut self, curve: FadeCurve) {
        self.crossfade.set_curve(curve);
    }

    /// Ramp the master volume down over `duration`, then stop. Blocks.
    pub fn fade_out(&mut self, duration: Duration) {
        if !self.state.is_idle() && !duration.is_zero() {
            let step = duration / QUIT_FADE_STEPS;
            for i in 1..=QUIT_FADE_STEPS {
                let t = i as f32 / QUIT_FADE_STEPS as f32;
                self.backend.set_volume(self.volume * (1.0 - t));
                thread::sleep(step);
            }
        }
        self.backend.set_volume(0.0);
        self.stop();
    }
}

impl<B: AudioBackend> ApplySettings for Engine<B> {
    fn apply_settings(&mut self, settings: &Settings) {
        self.set_volume(settings.audio.default_volume);
        self.set_crossfade_seconds(settings.audio.crossfade_seconds);
        self.set_crossfade_curve(settings.audio.crossfade_curve);
        self.set_loop_mode(settings.playback.loop_mode.into());
        self.set_shuffle(settings.playback.shuffle);

        let config = EqualizerConfig::from_gains(
            settings.equalizer.enabled,
            &settings.equalizer.bands,
        );
        if &config != self.equalizer.config() {
            self.equalizer.replace(config);
            self.push_equalizer();
        }
    }
}
