//! Headless wiring: settings, catalog, engine, presence and controls.

use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;

use crate::audio::AudioPlayer;
use crate::config::{FileStore, Settings};
use crate::library::{Catalog, LocalCatalog};
use crate::mpris::{ControlCmd, MprisBridge};
use crate::presence::spawn_presence;

mod control;
mod logging;

pub use logging::{LOG_ENV, init_logging};

#[derive(Debug, Parser)]
#[command(name = "tonearm", version, about = "Play a music folder, album or playlist")]
pub struct Args {
    /// Music folder. Defaults to the current directory.
    #[arg(value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Album directory, relative to the music folder.
    #[arg(long, conflicts_with = "playlist")]
    pub album: Option<String>,

    /// `.m3u` playlist, relative to the music folder.
    #[arg(long)]
    pub playlist: Option<String>,

    /// Track id to start from.
    #[arg(long)]
    pub start: Option<String>,

    /// Start with shuffle on, whatever the settings say.
    #[arg(long)]
    pub shuffle: bool,

    /// Do not publish now-playing over MPRIS.
    #[arg(long)]
    pub no_presence: bool,

    /// Settings file. Defaults to `$TONEARM_CONFIG_PATH` or the XDG location.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let store = match &args.config {
        Some(path) => FileStore::at(path),
        None => FileStore::from_env(),
    };
    let mut settings = Settings::load_or_default(&store);
    if args.shuffle {
        settings.playback.shuffle = true;
    }

    let root = match args.root.clone() {
        Some(root) => root,
        None => std::env::current_dir().context("no current directory")?,
    };
    let catalog = LocalCatalog::new(&root, settings.library.clone());
    let tracks = match (&args.album, &args.playlist) {
        (_, Some(playlist)) => catalog
            .playlist_items(playlist)
            .with_context(|| format!("failed to read playlist {playlist}"))?,
        (Some(album), None) => catalog
            .album_items(album)
            .with_context(|| format!("failed to read album {album}"))?,
        (None, None) => catalog
            .album_items("")
            .with_context(|| format!("failed to scan {}", root.display()))?,
    };
    if tracks.is_empty() {
        bail!("no playable tracks under {}", root.display());
    }
    info!(count = tracks.len(), root = %root.display(), "queue loaded");

    let player = AudioPlayer::spawn(&settings).context("failed to open audio output")?;
    let events = player.subscribe()?;

    let (control_tx, control_rx) = mpsc::channel::<ControlCmd>();
    let presence = if args.no_presence {
        drop(control_tx);
        None
    } else {
        let bridge = Arc::new(MprisBridge::spawn(control_tx));
        Some(spawn_presence(bridge, player.subscribe()?))
    };

    player.play_track(tracks, args.start.clone(), settings.playback.shuffle)?;
    let result = control::control_loop(&player, &control_rx, &events);

    player.quit_softly(Duration::from_millis(settings.audio.quit_fade_out_ms));
    if let Some(handle) = presence {
        let _ = handle.join();
    }
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests;
