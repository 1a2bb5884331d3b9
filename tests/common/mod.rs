//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use interview_voice::audio::{AudioFrame, CaptureError, FrameSink, Microphone, MicrophoneHandle};
use interview_voice::config::AppConfig;
use interview_voice::engine::{EngineHandle, EngineNotice};
use interview_voice::playback::{AudioPlayer, PlaybackDone, PlaybackError, PlaybackHandle};
use interview_voice::transport::{OutboundMessage, Reply, Transport, TransportError};

pub const SILENCE: Duration = Duration::from_millis(300);

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.vad.min_volume = 0.05;
    config.vad.silence_duration_ms = SILENCE.as_millis() as u64;
    config.audio.encodings = vec!["pcm16".into()];
    config.audio.min_segment_bytes = 1_000;
    config.interview.job_role = "Site Reliability Engineer".into();
    config
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Microphone whose frames are pushed by the test.
#[derive(Clone, Default)]
pub struct ScriptedMic {
    sink: Arc<Mutex<Option<FrameSink>>>,
    pub released: Arc<AtomicUsize>,
}

struct ScriptedHandle {
    sink: Arc<Mutex<Option<FrameSink>>>,
    released: Arc<AtomicUsize>,
}

impl Microphone for ScriptedMic {
    fn acquire(&self, sink: FrameSink) -> Result<Box<dyn MicrophoneHandle>, CaptureError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(ScriptedHandle {
            sink: Arc::clone(&self.sink),
            released: Arc::clone(&self.released),
        }))
    }
}

impl MicrophoneHandle for ScriptedHandle {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn release(self: Box<Self>) {
        self.sink.lock().unwrap().take();
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedMic {
    /// Push one 30 ms frame per volume, as the audio thread would.
    pub fn speak(&self, volumes: &[f32]) {
        let sink = self.sink.lock().unwrap().clone().expect("microphone acquired");
        for &v in volumes {
            sink(AudioFrame::new(vec![v; 480], 16_000));
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Pretends to play for a fixed time on the tokio clock.
#[derive(Clone)]
pub struct TimedPlayer {
    pub length: Duration,
    pub played: Arc<AtomicUsize>,
}

impl TimedPlayer {
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            played: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct TimedHandle(tokio::task::AbortHandle);

impl PlaybackHandle for TimedHandle {
    fn stop(self: Box<Self>) {
        self.0.abort();
    }
}

impl AudioPlayer for TimedPlayer {
    fn play(
        &mut self,
        _audio: Vec<u8>,
        on_done: PlaybackDone,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        self.played.fetch_add(1, Ordering::SeqCst);
        let length = self.length;
        let task = tokio::spawn(async move {
            tokio::time::sleep(length).await;
            on_done(Ok(()));
        });
        Ok(Box::new(TimedHandle(task.abort_handle())))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct CapturingTransport {
    pub sent: Arc<Mutex<Vec<OutboundMessage>>>,
    pub closed: Arc<AtomicUsize>,
}

impl Transport for CapturingTransport {
    fn send_segment(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn reply(text: &str, step: u32, finished: bool, audio: Option<Vec<u8>>) -> Reply {
    Reply {
        text: text.into(),
        interview_step: step,
        finished,
        feedback: finished.then(|| "Clear answers; quantify impact more.".to_string()),
        audio,
    }
}

/// Wait until the engine reports the microphone open.  The open happens on
/// the blocking pool, off the tokio clock.
pub async fn wait_listening(handle: &EngineHandle) {
    for _ in 0..5_000 {
        if handle.status().listening {
            return;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("engine never started listening");
}

/// Wait for the first notice matching `pred`, skipping the rest.
pub async fn expect_notice(
    notices: &mut mpsc::UnboundedReceiver<EngineNotice>,
    pred: impl Fn(&EngineNotice) -> bool,
) -> EngineNotice {
    let wait = async {
        while let Some(notice) = notices.recv().await {
            if pred(&notice) {
                return notice;
            }
        }
        panic!("notice channel closed");
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("timed out waiting for notice")
}
