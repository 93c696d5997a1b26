use std::sync::mpsc::Receiver;
use std::thread;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::audio::{PlaybackState, PlayerEvent};
use crate::library::Track;

use super::{Activity, PresenceBridge};

/// What the bridge was last told.
#[derive(Debug, Clone, PartialEq)]
enum Notified {
    Nothing,
    Cleared,
    Track { track: Track, paused: bool },
}

/// Turns engine events into presence calls.
///
/// Only transitions that change what the listener sees reach the bridge:
/// a new track, a pause or resume, a seek, or playback stopping.
pub struct PresenceAdapter<P> {
    bridge: P,
    last: Notified,
}

impl<P: PresenceBridge> PresenceAdapter<P> {
    pub fn new(bridge: P) -> Self {
        Self {
            bridge,
            last: Notified::Nothing,
        }
    }

    pub fn bridge(&self) -> &P {
        &self.bridge
    }

    pub fn handle(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::StateChanged {
                current, elapsed, ..
            } => self.on_state(current, *elapsed),
            PlayerEvent::Seeked { position } => self.on_seek(*position),
            _ => {}
        }
    }

    fn on_state(&mut self, state: &PlaybackState, elapsed: f64) {
        match state {
            PlaybackState::Idle => {
                if self.last != Notified::Cleared {
                    self.clear();
                }
            }
            PlaybackState::Playing { track, .. } | PlaybackState::CrossfadingOut { from: track, .. } => {
                if !self.is_showing(track, false) {
                    self.update(track, elapsed, false);
                }
            }
            PlaybackState::Paused { track, .. } => {
                if !self.is_showing(track, true) {
                    self.update(track, elapsed, true);
                }
            }
            PlaybackState::Loading { .. } => {}
        }
    }

    fn on_seek(&mut self, position: f64) {
        if let Notified::Track { track, paused } = &self.last {
            let (track, paused) = (track.clone(), *paused);
            self.update(&track, position, paused);
        }
    }

    fn is_showing(&self, track: &Track, paused: bool) -> bool {
        matches!(&self.last, Notified::Track { track: t, paused: p } if t.id == track.id && *p == paused)
    }

    fn update(&mut self, track: &Track, elapsed: f64, paused: bool) {
        if !self.bridge.is_enabled() {
            return;
        }
        let activity = Activity::from_track(track, elapsed, paused);
        match self.bridge.update_activity(&activity) {
            Ok(()) => {
                debug!(track = %track.id, paused, "presence updated");
                self.last = Notified::Track {
                    track: track.clone(),
                    paused,
                };
            }
            Err(e) => warn!(error = %e, track = %track.id, "presence update failed"),
        }
    }

    fn clear(&mut self) {
        if !self.bridge.is_enabled() {
            return;
        }
        match self.bridge.clear_activity() {
            Ok(()) => {
                debug!("presence cleared");
                self.last = Notified::Cleared;
            }
            Err(e) => warn!(error = %e, "presence clear failed"),
        }
    }
}

/// Run an adapter over `events` on its own thread until the engine goes away.
pub fn spawn_presence<P>(bridge: P, events: Receiver<PlayerEvent>) -> JoinHandle<()>
where
    P: PresenceBridge + Send + 'static,
{
    thread::spawn(move || {
        let mut adapter = PresenceAdapter::new(bridge);
        for event in events {
            adapter.handle(&event);
        }
        debug!("presence thread exiting");
    })
}
