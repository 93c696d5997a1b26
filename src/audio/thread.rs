use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::{ApplySettings, Settings};

use super::backend::AudioBackend;
use super::engine::Engine;
use super::error::EngineError;
use super::types::{AudioCmd, PlaybackHandle};

/// How often the transport clock advances when no command arrives.
const TICK: Duration = Duration::from_millis(20);

/// Start the engine thread.
///
/// The backend is built on the thread itself since output streams are not
/// `Send`. Whether that worked is reported once on `started`.
pub(super) fn spawn_audio_thread<F, B>(
    make_backend: F,
    settings: Settings,
    rx: Receiver<AudioCmd>,
    playback_info: PlaybackHandle,
    started: SyncSender<Result<(), EngineError>>,
) -> JoinHandle<()>
where
    F: FnOnce() -> Result<B, EngineError> + Send + 'static,
    B: AudioBackend + 'static,
{
    thread::spawn(move || {
        let backend = match make_backend() {
            Ok(backend) => backend,
            Err(e) => {
                error!(error = %e, "audio backend unavailable");
                let _ = started.send(Err(e));
                return;
            }
        };
        let mut engine = Engine::new(backend, &settings);
        publish(&engine, &playback_info);
        let _ = started.send(Ok(()));

        run(&mut engine, &rx, &playback_info);
        debug!("audio thread exiting");
    })
}

/// Serve commands and advance the clock until `Quit` or until every sender
/// is gone.
pub(super) fn run<B: AudioBackend>(
    engine: &mut Engine<B>,
    rx: &Receiver<AudioCmd>,
    playback_info: &PlaybackHandle,
) {
    let mut last = Instant::now();
    loop {
        match rx.recv_timeout(TICK) {
            Ok(AudioCmd::Quit { fade_out_ms }) => {
                engine.fade_out(Duration::from_millis(fade_out_ms));
                publish(engine, playback_info);
                break;
            }
            Ok(cmd) => dispatch(engine, cmd),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                engine.stop();
                publish(engine, playback_info);
                break;
            }
        }

        let now = Instant::now();
        engine.tick((now - last).as_secs_f64());
        last = now;
        publish(engine, playback_info);
    }
}

fn dispatch<B: AudioBackend>(engine: &mut Engine<B>, cmd: AudioCmd) {
    match cmd {
        AudioCmd::PlayTrack {
            tracks,
            start,
            shuffle,
        } => {
            if let Err(e) = engine.play_track(tracks, start.as_deref(), shuffle) {
                warn!(error = %e, "play request rejected");
            }
        }
        AudioCmd::Play => engine.play(),
        AudioCmd::Pause => engine.pause(),
        AudioCmd::Resume => engine.resume(),
        AudioCmd::TogglePause => engine.toggle_pause(),
        AudioCmd::Stop => engine.stop(),
        AudioCmd::Next => engine.next(),
        AudioCmd::Prev => engine.previous(),
        AudioCmd::Seek(position) => engine.seek(position),
        AudioCmd::SeekBy(delta) => engine.seek_by(delta),
        AudioCmd::SetShuffle(enabled) => engine.set_shuffle(enabled),
        AudioCmd::ToggleShuffle => engine.toggle_shuffle(),
        AudioCmd::SetLoopMode(mode) => engine.set_loop_mode(mode),
        AudioCmd::RemoveTracks(ids) => engine.remove_tracks(&ids),
        AudioCmd::UpdateBand { band, gain_db } => engine.update_band(band, gain_db),
        AudioCmd::ApplyPreset(values) => engine.apply_preset(&values),
        AudioCmd::SetEqualizerEnabled(enabled) => engine.set_equalizer_enabled(enabled),
        AudioCmd::SetVolume(volume) => engine.set_volume(volume),
        AudioCmd::SetCrossfade(seconds) => engine.set_crossfade_seconds(seconds),
        AudioCmd::SetCrossfadeCurve(curve) => engine.set_crossfade_curve(curve),
        AudioCmd::ApplySettings(settings) => engine.apply_settings(&settings),
        AudioCmd::Subscribe(tx) => engine.add_subscriber(tx),
        // Handled by the loop.
        AudioCmd::Quit { .. } => {}
    }
}

fn publish<B: AudioBackend>(engine: &Engine<B>, playback_info: &PlaybackHandle) {
    if let Ok(mut info) = playback_info.lock() {
        *info = engine.info();
    }
}
