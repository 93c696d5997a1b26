//! "Now playing" notifications for an external presence service.
//!
//! The engine never talks to a presence service directly. A
//! `PresenceAdapter` subscribes to `PlayerEvent`s and turns transport changes
//! into calls on a `PresenceBridge`.

use thiserror::Error;

use crate::library::Track;

mod adapter;

pub use adapter::{PresenceAdapter, spawn_presence};

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence service is not connected")]
    NotConnected,
    #[error("presence call failed: {0}")]
    Call(String),
}

/// What the presence service shows for the current track.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub title: String,
    /// "Artist - Album", whichever parts are known.
    pub subtitle: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub elapsed_seconds: f64,
    /// `0.0` when the length is unknown.
    pub duration_seconds: f64,
    pub paused: bool,
}

impl Activity {
    pub fn from_track(track: &Track, elapsed: f64, paused: bool) -> Self {
        let parts: Vec<&str> = [track.artist.as_deref(), track.album.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            title: track.name.clone(),
            subtitle: parts.join(" - "),
            artist: track.artist.clone(),
            album: track.album.clone(),
            elapsed_seconds: elapsed.max(0.0),
            duration_seconds: track.duration_seconds(),
            paused,
        }
    }
}

/// A presence service client.
///
/// Calls are fire-and-forget from the engine's point of view: the adapter
/// logs failures and carries on.
pub trait PresenceBridge {
    fn update_activity(&self, activity: &Activity) -> Result<(), PresenceError>;
    fn clear_activity(&self) -> Result<(), PresenceError>;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool) -> Result<(), PresenceError>;
    fn is_connected(&self) -> bool;
    fn is_running(&self) -> bool;
}

impl<P: PresenceBridge + ?Sized> PresenceBridge for std::sync::Arc<P> {
    fn update_activity(&self, activity: &Activity) -> Result<(), PresenceError> {
        (**self).update_activity(activity)
    }

    fn clear_activity(&self) -> Result<(), PresenceError> {
        (**self).clear_activity()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), PresenceError> {
        (**self).set_enabled(enabled)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}
