//! MPRIS presence over the D-Bus session bus.
//!
//! `MprisBridge` is a `PresenceBridge`: activity updates land in shared state
//! read by the `org.mpris.MediaPlayer2.Player` interface, and transport
//! requests from desktop controls come back as `ControlCmd`s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc::Sender};
use std::time::{Duration, Instant};

use async_io::{Timer, block_on};
use tracing::{debug, warn};
use zbus::{Connection, interface};
use zvariant::{ObjectPath, OwnedValue, Value};

use crate::presence::{Activity, PresenceBridge, PresenceError};

const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const BUS_NAME: &str = "org.mpris.MediaPlayer2.tonearm";
/// How often pending property changes are pushed to the bus.
const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq)]
pub enum ControlCmd {
    Quit,
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Prev,
    /// Relative seek in seconds.
    SeekBy(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Status {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Default)]
struct SharedState {
    status: Status,
    activity: Option<Activity>,
    /// When `activity.elapsed_seconds` was last set.
    since: Option<Instant>,
    /// Bumped whenever the title changes, to build `mpris:trackid`.
    serial: u64,
}

impl SharedState {
    fn set_activity(&mut self, activity: &Activity) {
        let new_track = self
            .activity
            .as_ref()
            .is_none_or(|a| a.title != activity.title || a.subtitle != activity.subtitle);
        if new_track {
            self.serial += 1;
        }
        self.status = if activity.paused {
            Status::Paused
        } else {
            Status::Playing
        };
        self.activity = Some(activity.clone());
        self.since = Some(Instant::now());
    }

    fn clear(&mut self) {
        self.status = Status::Stopped;
        self.activity = None;
        self.since = None;
    }

    fn position_micros(&self) -> i64 {
        let Some(a) = &self.activity else {
            return 0;
        };
        let mut seconds = a.elapsed_seconds;
        if self.status == Status::Playing {
            if let Some(since) = self.since {
                seconds += since.elapsed().as_secs_f64();
            }
        }
        if a.duration_seconds > 0.0 {
            seconds = seconds.min(a.duration_seconds);
        }
        (seconds * 1_000_000.0) as i64
    }
}

#[derive(Debug, Default)]
struct Flags {
    enabled: AtomicBool,
    connected: AtomicBool,
    running: AtomicBool,
    dirty: AtomicBool,
    shutdown: AtomicBool,
}

/// Publishes now-playing over MPRIS.
pub struct MprisBridge {
    state: Arc<Mutex<SharedState>>,
    flags: Arc<Flags>,
}

impl MprisBridge {
    /// Start serving on the session bus. Control requests are sent on `tx`.
    pub fn spawn(tx: Sender<ControlCmd>) -> Self {
        let state = Arc::new(Mutex::new(SharedState::default()));
        let flags = Arc::new(Flags::default());
        flags.enabled.store(true, Ordering::SeqCst);
        flags.running.store(true, Ordering::SeqCst);

        let state_for_thread = state.clone();
        let flags_for_thread = flags.clone();
        std::thread::spawn(move || {
            block_on(serve(tx, state_for_thread, flags_for_thread.clone()));
            flags_for_thread.connected.store(false, Ordering::SeqCst);
            flags_for_thread.running.store(false, Ordering::SeqCst);
            debug!("mpris thread exiting");
        });

        Self { state, flags }
    }

    fn with_state(&self, f: impl FnOnce(&mut SharedState)) {
        if let Ok(mut s) = self.state.lock() {
            f(&mut s);
        }
        self.flags.dirty.store(true, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<(), PresenceError> {
        if self.flags.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PresenceError::NotConnected)
        }
    }
}

impl Drop for MprisBridge {
    fn drop(&mut self) {
        self.flags.shutdown.store(true, Ordering::SeqCst);
    }
}

impl PresenceBridge for MprisBridge {
    fn update_activity(&self, activity: &Activity) -> Result<(), PresenceError> {
        self.with_state(|s| s.set_activity(activity));
        self.reachable()
    }

    fn clear_activity(&self) -> Result<(), PresenceError> {
        self.with_state(SharedState::clear);
        self.reachable()
    }

    fn is_enabled(&self) -> bool {
        self.flags.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), PresenceError> {
        self.flags.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.with_state(SharedState::clear);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.flags.connected.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }
}

async fn serve(tx: Sender<ControlCmd>, state: Arc<Mutex<SharedState>>, flags: Arc<Flags>) {
    let connection = match Connection::session().await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "mpris: failed to connect to session bus");
            return;
        }
    };

    if let Err(e) = connection.request_name(BUS_NAME).await {
        warn!(error = %e, "mpris: failed to acquire name");
        return;
    }

    let object_server = connection.object_server();

    if let Err(e) = object_server
        .at(OBJECT_PATH, RootIface { tx: tx.clone() })
        .await
    {
        warn!(error = %e, "mpris: failed to register root iface");
        return;
    }

    if let Err(e) = object_server
        .at(OBJECT_PATH, PlayerIface { tx, state })
        .await
    {
        warn!(error = %e, "mpris: failed to register player iface");
        return;
    }

    let iface_ref = match object_server
        .interface::<_, PlayerIface>(OBJECT_PATH)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "mpris: player iface not found");
            return;
        }
    };

    flags.connected.store(true, Ordering::SeqCst);
    debug!(name = BUS_NAME, "mpris: serving");

    while !flags.shutdown.load(Ordering::SeqCst) {
        Timer::after(FLUSH_INTERVAL).await;
        if !flags.dirty.swap(false, Ordering::SeqCst) {
            continue;
        }
        let iface = iface_ref.get().await;
        let emitter = iface_ref.signal_emitter();
        if let Err(e) = iface.playback_status_changed(emitter).await {
            warn!(error = %e, "mpris: failed to signal playback status");
        }
        if let Err(e) = iface.metadata_changed(emitter).await {
            warn!(error = %e, "mpris: failed to signal metadata");
        }
    }
}

struct RootIface {
    tx: Sender<ControlCmd>,
}

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootIface {
    fn raise(&self) {
        // Headless.
    }

    fn quit(&self) {
        let _ = self.tx.send(ControlCmd::Quit);
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> &str {
        "tonearm"
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        vec!["file".to_string(), "http".to_string(), "https".to_string()]
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        vec![]
    }
}

struct PlayerIface {
    tx: Sender<ControlCmd>,
    state: Arc<Mutex<SharedState>>,
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerIface {
    fn next(&self) {
        let _ = self.tx.send(ControlCmd::Next);
    }

    fn previous(&self) {
        let _ = self.tx.send(ControlCmd::Prev);
    }

    fn play(&self) {
        let _ = self.tx.send(ControlCmd::Play);
    }

    fn pause(&self) {
        let _ = self.tx.send(ControlCmd::Pause);
    }

    fn play_pause(&self) {
        let _ = self.tx.send(ControlCmd::PlayPause);
    }

    fn stop(&self) {
        let _ = self.tx.send(ControlCmd::Stop);
    }

    /// `offset` is in microseconds.
    fn seek(&self, offset: i64) {
        let _ = self.tx.send(ControlCmd::SeekBy(offset as f64 / 1_000_000.0));
    }

    #[zbus(property)]
    fn playback_status(&self) -> &str {
        let Ok(s) = self.state.lock() else {
            return "Stopped";
        };
        match s.status {
            Status::Stopped => "Stopped",
            Status::Playing => "Playing",
            Status::Paused => "Paused",
        }
    }

    #[zbus(property)]
    fn position(&self) -> i64 {
        self.state.lock().map(|s| s.position_micros()).unwrap_or(0)
    }

    #[zbus(property)]
    fn can_control(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_play(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_pause(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_seek(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn metadata(&self) -> HashMap<String, OwnedValue> {
        let mut map = HashMap::new();
        let Ok(s) = self.state.lock() else {
            return map;
        };
        let Some(a) = &s.activity else {
            return map;
        };

        let track_id = format!("/org/tonearm/track/{}", s.serial);
        if let Ok(path) = ObjectPath::try_from(track_id.as_str()) {
            insert(&mut map, "mpris:trackid", Value::from(path));
        }
        insert(&mut map, "xesam:title", Value::from(a.title.clone()));
        if let Some(artist) = &a.artist {
            insert(&mut map, "xesam:artist", Value::from(vec![artist.clone()]));
        }
        if let Some(album) = &a.album {
            insert(&mut map, "xesam:album", Value::from(album.clone()));
        }
        if a.duration_seconds > 0.0 {
            let micros = (a.duration_seconds * 1_000_000.0) as i64;
            insert(&mut map, "mpris:length", Value::from(micros));
        }
        map
    }
}

fn insert(map: &mut HashMap<String, OwnedValue>, key: &str, value: Value<'_>) {
    match OwnedValue::try_from(value) {
        Ok(v) => {
            map.insert(key.to_string(), v);
        }
        Err(e) => debug!(key, error = %e, "mpris: metadata value dropped"),
    }
}
