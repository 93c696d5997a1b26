//! `AudioBackend` on top of `rodio` sinks.
//!
//! Every opened source gets its own paused `Sink` connected to the shared
//! output mixer. Decoding (and, for `http(s)` stream URLs, fetching) happens
//! on a short-lived loader thread; the finished source is wrapped in the gain
//! and equalizer adapters and appended to its sink the next time the engine
//! polls for events.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::{debug, warn};

use crate::library::Track;

use super::backend::{AudioBackend, BackendEvent, SourceId};
use super::crossfade::GainRamp;
use super::equalizer::EqualizerConfig;
use super::error::{EngineError, LoadError};
use super::source::{EqualizerShared, Equalized, GainControl, Ramped};

type BoxedSource = Box<dyn Source + Send>;

struct Loaded {
    source: SourceId,
    generation: u64,
    result: Result<BoxedSource, LoadError>,
}

struct Slot {
    generation: u64,
    /// `None` until the loader has delivered the decoded stream.
    sink: Option<Sink>,
    gain: Arc<GainControl>,
    playing: bool,
    /// A seek requested before the stream was ready.
    pending_seek: Option<Duration>,
}

pub struct RodioBackend {
    stream: OutputStream,
    client: reqwest::blocking::Client,
    slots: HashMap<SourceId, Slot>,
    next_id: SourceId,
    equalizer: Arc<EqualizerShared>,
    volume: f32,
    loaded_tx: Sender<Loaded>,
    loaded_rx: Receiver<Loaded>,
}

impl RodioBackend {
    /// Open the default output device.
    pub fn open_default(equalizer: &EqualizerConfig) -> Result<Self, EngineError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| EngineError::Output(e.to_string()))?;
        // rodio logs to stderr when the stream is dropped.
        stream.log_on_drop(false);

        let (loaded_tx, loaded_rx) = mpsc::channel();
        Ok(Self {
            stream,
            client: reqwest::blocking::Client::new(),
            slots: HashMap::new(),
            next_id: 1,
            equalizer: Arc::new(EqualizerShared::new(equalizer.clone())),
            volume: 1.0,
            loaded_tx,
            loaded_rx,
        })
    }

    fn attach(&mut self, id: SourceId, source: BoxedSource) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            // Released while loading.
            return false;
        };
        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.set_volume(self.volume);
        let ramped = Ramped::new(source, slot.gain.clone());
        sink.append(Equalized::new(ramped, self.equalizer.clone()));

        if let Some(pos) = slot.pending_seek.take() {
            if let Err(e) = sink.try_seek(pos) {
                warn!(source = id, error = %e, "seek before start failed");
            }
        }
        if slot.playing {
            sink.play();
        }
        slot.sink = Some(sink);
        true
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Filesystem path of a local stream URL, with any `file://` scheme removed.
pub(super) fn local_path(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

/// Fetch (if remote) and decode `url` into a playable source.
pub(super) fn decode(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<BoxedSource, LoadError> {
    if is_remote(url) {
        let fetch = |source| LoadError::Fetch {
            url: url.to_string(),
            source,
        };
        let bytes = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(fetch)?;
        let decoder = Decoder::new(Cursor::new(bytes.to_vec()))?;
        Ok(Box::new(decoder))
    } else {
        let path = local_path(url);
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_string(),
            source,
        })?;
        let decoder = Decoder::new(BufReader::new(file))?;
        Ok(Box::new(decoder))
    }
}

impl AudioBackend for RodioBackend {
    fn open(&mut self, track: &Track, generation: u64) -> SourceId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                generation,
                sink: None,
                gain: Arc::new(GainControl::new(1.0)),
                playing: false,
                pending_seek: None,
            },
        );

        let tx = self.loaded_tx.clone();
        let client = self.client.clone();
        let url = track.stream_url.clone();
        debug!(source = id, generation, url = %url, "loading stream");
        thread::spawn(move || {
            let result = decode(&client, &url);
            let _ = tx.send(Loaded {
                source: id,
                generation,
                result,
            });
        });
        id
    }

    fn play(&mut self, source: SourceId) {
        if let Some(slot) = self.slots.get_mut(&source) {
            slot.playing = true;
            if let Some(sink) = &slot.sink {
                sink.play();
            }
        }
    }

    fn pause(&mut self, source: SourceId) {
        if let Some(slot) = self.slots.get_mut(&source) {
            slot.playing = false;
            if let Some(sink) = &slot.sink {
                sink.pause();
            }
        }
    }

    fn seek(&mut self, source: SourceId, position: Duration) {
        let Some(slot) = self.slots.get_mut(&source) else {
            return;
        };
        match &slot.sink {
            Some(sink) => {
                if let Err(e) = sink.try_seek(position) {
                    warn!(source, error = %e, "seek failed");
                }
            }
            None => slot.pending_seek = Some(position),
        }
    }

    fn release(&mut self, source: SourceId) {
        if let Some(sink) = self.slots.remove(&source).and_then(|slot| slot.sink) {
            sink.stop();
        }
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        if let Some(slot) = self.slots.get(&source) {
            slot.gain.schedule(GainRamp::immediate(gain));
        }
    }

    fn schedule_gain_ramp(&mut self, source: SourceId, ramp: GainRamp) {
        if let Some(slot) = self.slots.get(&source) {
            slot.gain.schedule(ramp);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        for sink in self.slots.values().filter_map(|s| s.sink.as_ref()) {
            sink.set_volume(volume);
        }
    }

    fn set_equalizer(&mut self, config: &EqualizerConfig) {
        self.equalizer.update(config);
    }

    fn poll_events(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();

        while let Ok(loaded) = self.loaded_rx.try_recv() {
            match loaded.result {
                Ok(source) => {
                    if self.attach(loaded.source, source) {
                        events.push(BackendEvent::Ready {
                            source: loaded.source,
                            generation: loaded.generation,
                        });
                    }
                }
                Err(e) => {
                    if self.slots.remove(&loaded.source).is_some() {
                        events.push(BackendEvent::Failed {
                            source: loaded.source,
                            generation: loaded.generation,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        for (&id, slot) in &mut self.slots {
            let Some(sink) = &slot.sink else { continue };
            if slot.playing && sink.empty() {
                slot.playing = false;
                debug!(source = id, generation = slot.generation, "stream ended");
                events.push(BackendEvent::Ended { source: id });
            }
        }

        events
    }
}
