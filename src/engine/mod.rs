//! Voice turn-taking engine.
//!
//! Everything that mutates conversation state runs on one tokio task,
//! [`VoiceEngine::run`], which consumes a single queue of [`EngineEvent`]s.
//!
//! # Architecture
//!
//! ```text
//!  cpal thread ──Frame──────────────┐
//!  spawn_blocking ──MicrophoneReady─┤
//!  SilenceTimer ──SilenceElapsed────┤
//!  playback thread ──Finished───────┤
//!  ws reader/writer ──Transport─────┼──▶ mpsc ──▶ VoiceEngine::run ──▶ TurnController
//!  EngineHandle ──Command───────────┘                                     │
//!                                                                         ├─▶ SharedStatus
//!                                                                         ├─▶ volume (watch)
//!                                                                         └─▶ EngineNotice (mpsc)
//! ```
//!
//! Producers only enqueue; the controller reads segmenter, turn and far-end
//! state together inside one event, so no two updates interleave.  Nothing
//! on the loop waits on a device: the microphone is opened on the blocking
//! pool and playback reports back through its completion callback.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use interview_voice::audio::CpalMicrophone;
//! use interview_voice::config::AppConfig;
//! use interview_voice::engine::VoiceEngine;
//! use interview_voice::playback::RodioPlayer;
//! use interview_voice::transport::WsTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let mic = CpalMicrophone::new(None, config.audio.frame_ms);
//!     let (engine, mut notices) =
//!         VoiceEngine::new(config.clone(), Box::new(mic), Box::new(RodioPlayer::new()));
//!
//!     let transport = WsTransport::connect(
//!         &config.transport.url,
//!         Duration::from_secs(config.transport.connect_timeout_secs),
//!         engine.transport_callback(),
//!     )
//!     .await?;
//!
//!     let handle = engine.handle();
//!     tokio::spawn(engine.run(Box::new(transport)));
//!     handle.start()?;
//!
//!     while let Some(notice) = notices.recv().await {
//!         println!("{notice:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::audio::{AudioFrame, CaptureError, Microphone, OpenedMicrophone, TimerId};
use crate::config::{AppConfig, ConfigError, VadConfig};
use crate::playback::{AudioPlayer, PlaybackError, PlaybackId};
use crate::transport::{Transport, TransportCallback, TransportError, TransportEvent};

pub use controller::TurnController;
pub use state::{
    lock_status, new_shared_status, ConversationCursor, EngineStatus, SharedStatus, TurnState,
};

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors surfaced to the front end.
///
/// Device and transport problems are separate variants because the user
/// fixes them differently (grant mic access vs. check the connection).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("microphone unavailable: {0}")]
    Device(String),

    #[error("reply playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("the interview session has ended")]
    SessionEnded,

    #[error("engine is no longer running")]
    Stopped,
}

impl From<CaptureError> for EngineError {
    fn from(err: CaptureError) -> Self {
        EngineError::Device(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Events, commands, notices
// ---------------------------------------------------------------------------

/// Everything the engine task reacts to.
#[derive(Debug)]
pub enum EngineEvent {
    Frame(AudioFrame),
    MicrophoneReady(Result<OpenedMicrophone, CaptureError>),
    SilenceElapsed(TimerId),
    PlaybackFinished(PlaybackId, Result<(), PlaybackError>),
    Transport(TransportEvent),
    Command(EngineCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Configure(VadConfig),
    Start,
    Stop,
}

/// Why a closed segment was not sent.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscardReason {
    /// The interviewer held the floor when the user stopped speaking.
    Suppressed,
    /// Encoded size under `audio.min_segment_bytes`.
    TooShort { bytes: usize, min: usize },
    EncodingFailed(String),
}

/// Observable engine output, delivered in order.
///
/// Per-frame loudness is not a notice; watch
/// [`EngineHandle::volume`] for it.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotice {
    SpeechStarted,
    SpeechEnded,
    SegmentSent { bytes: usize, interview_step: u32 },
    SegmentDiscarded(DiscardReason),
    Reply {
        text: String,
        interview_step: u32,
        finished: bool,
        feedback: Option<String>,
    },
    PlaybackStarted,
    PlaybackFinished,
    Error(EngineError),
    SessionEnded { feedback: Option<String> },
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// Cloneable control surface for a running [`VoiceEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    status: SharedStatus,
    volume: watch::Receiver<f32>,
}

impl EngineHandle {
    /// Change the detection thresholds.  Out-of-range values are rejected
    /// here and never reach the engine.
    pub fn configure(&self, min_volume: f32, silence_duration: Duration) -> Result<(), EngineError> {
        let vad = VadConfig::new(min_volume, silence_duration)?;
        self.send(EngineCommand::Configure(vad))
    }

    /// Acquire the microphone and begin listening.  Device failures are
    /// reported as [`EngineNotice::Error`]; `start` may then be retried.
    pub fn start(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Start)
    }

    /// End the session.  Terminal.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Stop)
    }

    pub fn status(&self) -> EngineStatus {
        lock_status(&self.status).clone()
    }

    /// Loudness of the latest frame.  Only the newest value is kept, so a
    /// receiver that falls behind costs nothing.
    pub fn volume(&self) -> watch::Receiver<f32> {
        self.volume.clone()
    }

    pub fn shared_status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.events
            .send(EngineEvent::Command(command))
            .map_err(|_| EngineError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Where the controller publishes what it observes.
pub struct Outputs {
    pub status: SharedStatus,
    pub volume: watch::Sender<f32>,
    pub notices: mpsc::UnboundedSender<EngineNotice>,
}

// ---------------------------------------------------------------------------
// VoiceEngine
// ---------------------------------------------------------------------------

/// Owns the event queue until [`run`](Self::run) consumes it.
pub struct VoiceEngine {
    config: AppConfig,
    microphone: Box<dyn Microphone>,
    player: Box<dyn AudioPlayer>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    status: SharedStatus,
    volume_tx: watch::Sender<f32>,
    volume_rx: watch::Receiver<f32>,
    notices: mpsc::UnboundedSender<EngineNotice>,
}

impl VoiceEngine {
    pub fn new(
        config: AppConfig,
        microphone: Box<dyn Microphone>,
        player: Box<dyn AudioPlayer>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineNotice>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let (volume_tx, volume_rx) = watch::channel(0.0);
        let engine = Self {
            config,
            microphone,
            player,
            events_tx,
            events_rx,
            status: new_shared_status(),
            volume_tx,
            volume_rx,
            notices,
        };
        (engine, notices_rx)
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            events: self.events_tx.clone(),
            status: Arc::clone(&self.status),
            volume: self.volume_rx.clone(),
        }
    }

    /// Callback to hand to the transport so its events join the queue.
    pub fn transport_callback(&self) -> TransportCallback {
        let tx = self.events_tx.clone();
        Arc::new(move |event| {
            let _ = tx.send(EngineEvent::Transport(event));
        })
    }

    /// Process events until the session ends.
    ///
    /// Commands sent through an [`EngineHandle`] before `run` is called are
    /// queued and handled first.
    pub async fn run(self, transport: Box<dyn Transport>) {
        let Self {
            config,
            microphone,
            player,
            events_tx,
            mut events_rx,
            status,
            volume_tx,
            volume_rx: _,
            notices,
        } = self;

        let outputs = Outputs {
            status,
            volume: volume_tx,
            notices,
        };
        let mut controller =
            TurnController::new(&config, microphone, player, transport, events_tx, outputs);

        log::info!("engine: event loop running");
        while let Some(event) = events_rx.recv().await {
            controller.handle(event);
            if controller.turn().is_ended() {
                break;
            }
        }
        log::info!("engine: session over, event loop exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_and_transport_errors_are_distinct() {
        let device = EngineError::from(CaptureError::NoDevice);
        let transport = EngineError::from(TransportError::Closed("eof".into()));
        assert!(matches!(device, EngineError::Device(_)));
        assert!(matches!(transport, EngineError::Transport(_)));
        assert_ne!(device.to_string(), transport.to_string());
    }

    #[test]
    fn config_error_converts() {
        let err = EngineError::from(ConfigError::ZeroSilenceDuration);
        assert_eq!(
            err.to_string(),
            "invalid configuration: silence duration must be greater than zero"
        );
    }

    #[test]
    fn handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineHandle>();
    }
}
