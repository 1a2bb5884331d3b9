//! Far-end audio output via `rodio`.
//!
//! [`RodioPlayer`] decodes a synthesized reply (MP3 from the interview
//! service; WAV, FLAC and Vorbis also work) and plays it on the default
//! output device.  `rodio::OutputStream` is not `Send`, so each playback runs
//! on its own `reply-playback` thread.  [`RodioPlayer::play`] returns as soon
//! as that thread is spawned; opening the device and decoding happen there,
//! and their failures arrive through the completion callback.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Device(String),

    #[error("could not decode reply audio: {0}")]
    Decode(String),

    #[error("playback thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// AudioPlayer trait
// ---------------------------------------------------------------------------

/// Invoked exactly once when a playback ends: `Ok` after it drained or was
/// stopped, `Err` if the device or the decoder failed.
pub type PlaybackDone = Box<dyn FnOnce(Result<(), PlaybackError>) + Send>;

/// Owns the playback device.
pub trait AudioPlayer: Send {
    /// Start playing `audio` without waiting on the device.  An `Err` here
    /// means nothing was started and `on_done` is never called; anything
    /// that goes wrong later is passed to `on_done`.
    fn play(
        &mut self,
        audio: Vec<u8>,
        on_done: PlaybackDone,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError>;
}

/// A playback in progress.
pub trait PlaybackHandle: Send {
    /// Cut the playback short.
    fn stop(self: Box<Self>);
}

// ---------------------------------------------------------------------------
// RodioPlayer
// ---------------------------------------------------------------------------

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
pub struct RodioPlayer;

impl RodioPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl AudioPlayer for RodioPlayer {
    fn play(
        &mut self,
        audio: Vec<u8>,
        on_done: PlaybackDone,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        thread::Builder::new()
            .name("reply-playback".into())
            .spawn(move || on_done(play_to_end(audio, &stop_flag)))
            .map_err(|e| PlaybackError::Thread(e.to_string()))?;

        Ok(Box::new(RodioHandle { stop }))
    }
}

/// Runs on the playback thread until the sink drains or `stop` is raised.
fn play_to_end(audio: Vec<u8>, stop: &AtomicBool) -> Result<(), PlaybackError> {
    let (_stream, handle) =
        rodio::OutputStream::try_default().map_err(|e| PlaybackError::Device(e.to_string()))?;
    let sink = rodio::Sink::try_new(&handle).map_err(|e| PlaybackError::Device(e.to_string()))?;
    let source =
        rodio::Decoder::new(Cursor::new(audio)).map_err(|e| PlaybackError::Decode(e.to_string()))?;

    sink.append(source);
    while !sink.empty() {
        if stop.load(Ordering::Acquire) {
            sink.stop();
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

struct RodioHandle {
    stop: Arc<AtomicBool>,
}

impl PlaybackHandle for RodioHandle {
    fn stop(self: Box<Self>) {
        self.stop.store(true, Ordering::Release);
    }
}
