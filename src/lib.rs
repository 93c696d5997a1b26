//! tonearm: a local playback engine.
//!
//! A queue, a transport state machine with crossfades and a 9-band
//! equalizer, settings persistence, and now-playing presence over MPRIS.

pub mod audio;
pub mod config;
pub mod library;
pub mod mpris;
pub mod presence;
pub mod runtime;
