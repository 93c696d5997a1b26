use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{ApplySettings, Settings};
use crate::library::{Track, TrackId};

use super::backend::AudioBackend;
use super::crossfade::FadeCurve;
use super::equalizer::EqualizerConfig;
use super::error::EngineError;
use super::sink::RodioBackend;
use super::thread::spawn_audio_thread;
use super::types::{AudioCmd, LoopMode, PlaybackHandle, PlaybackInfo, PlayerEvent};

/// Handle to an engine running on its own thread.
///
/// Every method only enqueues a command; the engine applies them in order.
pub struct AudioPlayer {
    tx: Sender<AudioCmd>,
    playback: PlaybackHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPlayer {
    /// Start an engine on the default output device.
    pub fn spawn(settings: &Settings) -> Result<Self, EngineError> {
        let equalizer =
            EqualizerConfig::from_gains(settings.equalizer.enabled, &settings.equalizer.bands);
        Self::spawn_with(move || RodioBackend::open_default(&equalizer), settings)
    }

    /// Start an engine on a backend built by `make_backend` on the engine thread.
    pub fn spawn_with<F, B>(make_backend: F, settings: &Settings) -> Result<Self, EngineError>
    where
        F: FnOnce() -> Result<B, EngineError> + Send + 'static,
        B: AudioBackend + 'static,
    {
        let (tx, rx) = mpsc::channel::<AudioCmd>();
        let (started_tx, started_rx) = mpsc::sync_channel(1);
        let playback_info: PlaybackHandle = Arc::new(Mutex::new(PlaybackInfo::default()));

        let audio_handle = spawn_audio_thread(
            make_backend,
            settings.clone(),
            rx,
            playback_info.clone(),
            started_tx,
        );
        started_rx.recv().map_err(|_| EngineError::Disconnected)??;

        Ok(Self {
            tx,
            playback: playback_info,
            join: Mutex::new(Some(audio_handle)),
        })
    }

    pub fn playback_handle(&self) -> PlaybackHandle {
        self.playback.clone()
    }

    /// A copy of the latest published status.
    pub fn info(&self) -> PlaybackInfo {
        self.playback
            .lock()
            .map(|info| info.clone())
            .unwrap_or_default()
    }

    pub fn send(&self, cmd: AudioCmd) -> Result<(), EngineError> {
        self.tx.send(cmd).map_err(|_| EngineError::Disconnected)
    }

    /// Replace the queue. An empty list is rejected here, before it reaches
    /// the engine.
    pub fn play_track(
        &self,
        tracks: Vec<Track>,
        start: Option<TrackId>,
        shuffle: bool,
    ) -> Result<(), EngineError> {
        if tracks.is_empty() {
            return Err(EngineError::EmptyQueue);
        }
        if let Some(id) = &start {
            if !tracks.iter().any(|t| &t.id == id) {
                return Err(EngineError::UnknownTrack(id.clone()));
            }
        }
        self.send(AudioCmd::PlayTrack {
            tracks,
            start,
            shuffle,
        })
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::Play)
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::Pause)
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::Resume)
    }

    pub fn toggle_pause(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::TogglePause)
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::Stop)
    }

    pub fn next(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::Next)
    }

    pub fn previous(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::Prev)
    }

    pub fn seek(&self, position: f64) -> Result<(), EngineError> {
        self.send(AudioCmd::Seek(position))
    }

    pub fn seek_by(&self, delta: f64) -> Result<(), EngineError> {
        self.send(AudioCmd::SeekBy(delta))
    }

    pub fn set_shuffle(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(AudioCmd::SetShuffle(enabled))
    }

    pub fn toggle_shuffle(&self) -> Result<(), EngineError> {
        self.send(AudioCmd::ToggleShuffle)
    }

    pub fn set_loop_mode(&self, mode: LoopMode) -> Result<(), EngineError> {
        self.send(AudioCmd::SetLoopMode(mode))
    }

    pub fn remove_tracks(&self, ids: Vec<TrackId>) -> Result<(), EngineError> {
        self.send(AudioCmd::RemoveTracks(ids))
    }

    pub fn update_band(&self, band: usize, gain_db: f32) -> Result<(), EngineError> {
        self.send(AudioCmd::UpdateBand { band, gain_db })
    }

    pub fn apply_preset(&self, values: Vec<f32>) -> Result<(), EngineError> {
        self.send(AudioCmd::ApplyPreset(values))
    }

    pub fn set_equalizer_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(AudioCmd::SetEqualizerEnabled(enabled))
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.send(AudioCmd::SetVolume(volume))
    }

    pub fn set_crossfade_seconds(&self, seconds: u32) -> Result<(), EngineError> {
        self.send(AudioCmd::SetCrossfade(seconds))
    }

    pub fn set_crossfade_curve(&self, curve: FadeCurve) -> Result<(), EngineError> {
        self.send(AudioCmd::SetCrossfadeCurve(curve))
    }

    /// A new receiver of every `PlayerEvent` emitted from now on.
    pub fn subscribe(&self) -> Result<Receiver<PlayerEvent>, EngineError> {
        let (tx, rx) = mpsc::channel();
        self.send(AudioCmd::Subscribe(tx))?;
        Ok(rx)
    }

    /// Fade out, stop and wait for the engine thread to finish.
    pub fn quit_softly(&self, fade_out: Duration) {
        let _ = self.send(AudioCmd::Quit {
            fade_out_ms: fade_out.as_millis() as u64,
        });

        if let Ok(mut j) = self.join.lock() {
            if let Some(h) = j.take() {
                let _ = h.join();
            }
        }
    }
}

impl ApplySettings for AudioPlayer {
    fn apply_settings(&mut self, settings: &Settings) {
        let _ = self.send(AudioCmd::ApplySettings(Box::new(settings.clone())));
    }
}
