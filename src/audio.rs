//! Playback engine: queue, equalizer, crossfade scheduling and transport.
//!
//! `Engine` is the transport state machine. It owns the `Queue`, the
//! `Equalizer` and the `CrossfadeScheduler`, and drives an `AudioBackend`
//! which does the actual decoding and mixing. `AudioPlayer` runs an engine on
//! a dedicated thread and is what the rest of the application talks to.

mod backend;
mod crossfade;
mod dsp;
mod engine;
mod equalizer;
mod error;
mod player;
mod queue;
mod sink;
mod source;
mod thread;
mod types;

pub use backend::{AudioBackend, BackendEvent, SourceId};
pub use crossfade::{Crossfade, CrossfadeScheduler, FadeCurve, FadeProgress, GainRamp};
pub use dsp::EqualizerChain;
pub use engine::Engine;
pub use equalizer::*;
pub use error::{EngineError, LoadError};
pub use player::AudioPlayer;
pub use queue::{Queue, Removal};
pub use sink::RodioBackend;
pub use types::*;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(test)]
mod tests;
