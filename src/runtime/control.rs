use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::{AudioPlayer, EngineError, PlayerEvent};
use crate::mpris::ControlCmd;

const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// Forward a desktop control request to the engine.
pub(crate) fn apply_control(player: &AudioPlayer, cmd: ControlCmd) -> Result<Flow, EngineError> {
    debug!(?cmd, "control");
    match cmd {
        ControlCmd::Quit => return Ok(Flow::Exit),
        ControlCmd::Play => player.play()?,
        ControlCmd::Pause => player.pause()?,
        ControlCmd::PlayPause => player.toggle_pause()?,
        ControlCmd::Stop => player.stop()?,
        ControlCmd::Next => player.next()?,
        ControlCmd::Prev => player.previous()?,
        ControlCmd::SeekBy(delta) => player.seek_by(delta)?,
    }
    Ok(Flow::Continue)
}

/// The headless player exits once the queue has run out.
pub(crate) fn observe(event: &PlayerEvent) -> Flow {
    match event {
        PlayerEvent::QueueExhausted => {
            info!("queue finished");
            Flow::Exit
        }
        PlayerEvent::TrackLoadFailed { track, reason } => {
            info!(track = %track.id, reason, "skipped unplayable track");
            Flow::Continue
        }
        _ => Flow::Continue,
    }
}

/// Serve control requests until a quit request, the end of the queue, or
/// the engine going away.
pub(crate) fn control_loop(
    player: &AudioPlayer,
    controls: &Receiver<ControlCmd>,
    events: &Receiver<PlayerEvent>,
) -> Result<(), EngineError> {
    loop {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    if observe(&event) == Flow::Exit {
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(EngineError::Disconnected),
            }
        }

        match controls.recv_timeout(POLL) {
            Ok(cmd) => {
                if apply_control(player, cmd)? == Flow::Exit {
                    return Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // No control surface; only engine events matter.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL),
        }
    }
}
