use std::time::Duration;

/// Opaque catalog key identifying a track.
pub type TrackId = String;

/// Durations coming from the catalog are expressed in 100ns ticks.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// An immutable track descriptor as handed out by a catalog.
///
/// Display metadata is only used for presence payloads and logging.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// Nominal length in 100ns ticks. Zero means the length is unknown.
    pub duration_ticks: u64,
    /// Local path (optionally `file://`-prefixed) or an `http(s)` URL.
    pub stream_url: String,
    pub name: String,
    pub album: Option<String>,
    pub artist: Option<String>,
}

impl Track {
    /// Nominal duration in seconds, `0.0` when unknown.
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ticks as f64 / TICKS_PER_SECOND as f64
    }

    pub fn has_known_duration(&self) -> bool {
        self.duration_ticks > 0
    }

    /// "Artist - Name", or just the name when there is no artist.
    pub fn display(&self) -> String {
        match self.artist.as_deref().map(str::trim) {
            Some(a) if !a.is_empty() => format!("{} - {}", a, self.name.trim()),
            _ => self.name.clone(),
        }
    }
}

pub fn ticks_from_duration(duration: Duration) -> u64 {
    (duration.as_nanos() / 100) as u64
}
