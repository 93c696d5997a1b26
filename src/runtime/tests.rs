use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use super::Args;
use super::control::{Flow, apply_control, control_loop, observe};
use crate::audio::mock::MockBackend;
use crate::audio::{AudioPlayer, PlaybackState, PlayerEvent};
use crate::config::Settings;
use crate::library::{TICKS_PER_SECOND, Track};
use crate::mpris::ControlCmd;

fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        duration_ticks: 200 * TICKS_PER_SECOND,
        stream_url: format!("/music/{id}.flac"),
        name: id.to_string(),
        album: None,
        artist: None,
    }
}

fn mock_player() -> AudioPlayer {
    AudioPlayer::spawn_with(|| Ok(MockBackend::new()), &Settings::default()).unwrap()
}

fn wait_for(player: &AudioPlayer, pred: impl Fn(&PlaybackState) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if pred(&player.info().state) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn now_playing(state: &PlaybackState) -> Option<&str> {
    match state {
        PlaybackState::Playing { track, .. } => Some(track.id.as_str()),
        _ => None,
    }
}

#[test]
fn args_parse_folder_and_flags() {
    let args = Args::try_parse_from(["tonearm", "/music", "--album", "Live", "--shuffle"]).unwrap();
    assert_eq!(args.root.as_deref(), Some(std::path::Path::new("/music")));
    assert_eq!(args.album.as_deref(), Some("Live"));
    assert!(args.shuffle);
    assert!(!args.no_presence);

    let args = Args::try_parse_from(["tonearm"]).unwrap();
    assert!(args.root.is_none());
}

#[test]
fn args_reject_album_with_playlist() {
    assert!(Args::try_parse_from(["tonearm", "--album", "a", "--playlist", "b.m3u"]).is_err());
}

#[test]
fn queue_exhausted_ends_the_session() {
    assert_eq!(observe(&PlayerEvent::QueueExhausted), Flow::Exit);
    assert_eq!(observe(&PlayerEvent::VolumeChanged(0.2)), Flow::Continue);
    assert_eq!(
        observe(&PlayerEvent::TrackLoadFailed {
            track: track("a"),
            reason: "gone".to_string()
        }),
        Flow::Continue
    );
}

#[test]
fn controls_drive_the_player() {
    let player = mock_player();
    player
        .play_track(vec![track("a"), track("b")], None, false)
        .unwrap();
    assert!(wait_for(&player, |s| now_playing(s) == Some("a")));

    assert_eq!(apply_control(&player, ControlCmd::Next).unwrap(), Flow::Continue);
    assert!(wait_for(&player, |s| now_playing(s) == Some("b")));

    apply_control(&player, ControlCmd::PlayPause).unwrap();
    assert!(wait_for(&player, |s| matches!(s, PlaybackState::Paused { .. })));

    apply_control(&player, ControlCmd::Stop).unwrap();
    assert!(wait_for(&player, PlaybackState::is_idle));

    assert_eq!(apply_control(&player, ControlCmd::Quit).unwrap(), Flow::Exit);
    player.quit_softly(Duration::ZERO);
}

#[test]
fn control_loop_returns_on_quit_request() {
    let player = mock_player();
    let events = player.subscribe().unwrap();
    let (tx, rx) = mpsc::channel();
    tx.send(ControlCmd::Quit).unwrap();

    control_loop(&player, &rx, &events).unwrap();
    player.quit_softly(Duration::ZERO);
}

#[test]
fn control_loop_returns_when_queue_runs_out() {
    let player = mock_player();
    let (event_tx, events) = mpsc::channel();
    let (control_tx, controls) = mpsc::channel::<ControlCmd>();
    drop(control_tx);
    event_tx.send(PlayerEvent::QueueExhausted).unwrap();

    control_loop(&player, &controls, &events).unwrap();
    player.quit_softly(Duration::ZERO);
}

#[test]
fn control_loop_reports_a_vanished_engine() {
    let player = mock_player();
    let (event_tx, events) = mpsc::channel::<PlayerEvent>();
    let (_control_tx, controls) = mpsc::channel::<ControlCmd>();
    drop(event_tx);

    assert!(control_loop(&player, &controls, &events).is_err());
    player.quit_softly(Duration::ZERO);
}
