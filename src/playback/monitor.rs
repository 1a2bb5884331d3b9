//! Far-end activity tracking.
//!
//! [`PlaybackMonitor`] exposes one boolean, [`far_end_active`], that is true
//! exactly while a reply's synthesized audio is playing.  The flag is derived
//! from the monitor's single optional active playback, so it cannot flicker:
//! it flips on in [`begin`] and off in either [`on_finished`] (matching id) or
//! [`force_idle`], whichever comes first.  Every playback carries a
//! [`PlaybackId`]; a completion for any other id is stale and ignored, so a
//! playback produces exactly one true→false transition even when teardown
//! races its natural end.
//!
//! [`far_end_active`]: PlaybackMonitor::far_end_active
//! [`begin`]: PlaybackMonitor::begin
//! [`on_finished`]: PlaybackMonitor::on_finished
//! [`force_idle`]: PlaybackMonitor::force_idle

use std::sync::Arc;

use super::player::{AudioPlayer, PlaybackError, PlaybackHandle};

/// Identifies one playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(u64);

/// Receives the id of a playback that ended and how it ended.
pub type PlaybackCallback = Arc<dyn Fn(PlaybackId, Result<(), PlaybackError>) + Send + Sync>;

/// Outcome of [`PlaybackMonitor::begin`].
#[derive(Debug, PartialEq)]
pub enum PlaybackStart {
    /// Nothing to play; the far end is idle.
    NoAudio,
    /// Playback running; completion will be reported with this id.
    Started(PlaybackId),
    /// The player could not even start; the far end is idle.
    Failed(PlaybackError),
}

struct ActivePlayback {
    id: PlaybackId,
    handle: Box<dyn PlaybackHandle>,
}

pub struct PlaybackMonitor {
    player: Box<dyn AudioPlayer>,
    enabled: bool,
    active: Option<ActivePlayback>,
    next_id: u64,
    on_finished: PlaybackCallback,
}

impl PlaybackMonitor {
    pub fn new(player: Box<dyn AudioPlayer>, on_finished: PlaybackCallback) -> Self {
        Self {
            player,
            enabled: true,
            active: None,
            next_id: 0,
            on_finished,
        }
    }

    /// With playback disabled every reply is treated as carrying no audio.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn far_end_active(&self) -> bool {
        self.active.is_some()
    }

    /// Play a reply's audio, if it has any.
    ///
    /// A playback still running from an earlier reply is stopped first;
    /// callers that report playback edges should [`force_idle`] beforehand.
    ///
    /// [`force_idle`]: Self::force_idle
    pub fn begin(&mut self, audio: Option<Vec<u8>>) -> PlaybackStart {
        self.force_idle();

        let audio = match audio {
            Some(bytes) if self.enabled && !bytes.is_empty() => bytes,
            _ => return PlaybackStart::NoAudio,
        };

        self.next_id += 1;
        let id = PlaybackId(self.next_id);
        let notify = Arc::clone(&self.on_finished);
        let len = audio.len();

        match self.player.play(audio, Box::new(move |outcome| notify(id, outcome))) {
            Ok(handle) => {
                log::debug!("playback: started {id:?} ({len} bytes)");
                self.active = Some(ActivePlayback { id, handle });
                PlaybackStart::Started(id)
            }
            Err(e) => {
                log::warn!("playback: could not play reply audio: {e}");
                PlaybackStart::Failed(e)
            }
        }
    }

    /// Handle a completion.  Returns `true` if this ended the active playback.
    pub fn on_finished(&mut self, id: PlaybackId) -> bool {
        match &self.active {
            Some(active) if active.id == id => {
                self.active = None;
                log::debug!("playback: finished {id:?}");
                true
            }
            _ => {
                log::trace!("playback: ignoring stale completion {id:?}");
                false
            }
        }
    }

    /// Stop any playback and force the far end idle.  Returns `true` if a
    /// playback was cut short.
    pub fn force_idle(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                log::debug!("playback: stopping {:?}", active.id);
                active.handle.stop();
                true
            }
            None => false,
        }
    }
}

impl Drop for PlaybackMonitor {
    fn drop(&mut self) {
        self.force_idle();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
