use thiserror::Error;

use crate::library::TrackId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot build a queue from zero tracks")]
    EmptyQueue,
    #[error("track {0} is not part of the queue")]
    UnknownTrack(TrackId),
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("engine thread is not running")]
    Disconnected,
}

/// Why a track's stream could not be made ready.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode stream: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),
}
