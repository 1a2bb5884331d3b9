//! Capture session: microphone ownership and segment buffering.
//!
//! [`CaptureSession`] owns the microphone handle and at most one open
//! segment.  The turn controller drives it:
//!
//! * [`acquire`](CaptureSession::acquire) opens the device (idempotent); the
//!   engine instead opens it off-task through
//!   [`microphone`](CaptureSession::microphone) and hands the result to
//!   [`attach`](CaptureSession::attach),
//! * [`open`](CaptureSession::open) starts buffering frames (idempotent),
//! * [`close`](CaptureSession::close) resamples and encodes the buffered
//!   audio and yields the finished [`Segment`] exactly once,
//! * [`shutdown`](CaptureSession::shutdown) discards any open segment and
//!   releases the device.
//!
//! The session never touches the network; finished segments are returned to
//! the caller.

use std::sync::Arc;

use super::capture::{CaptureError, FrameSink, Microphone, MicrophoneHandle};
use super::encoding::{select_encoding, Encoding, EncodingError};
use super::frame::AudioFrame;
use super::resample::resample;
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One closed utterance, encoded and immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    encoding: Encoding,
    sample_rate: u32,
    frames: usize,
    duration_secs: f32,
    bytes: Vec<u8>,
}

impl Segment {
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Sample rate of the encoded audio.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of analysis frames captured into this segment.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }

    /// Encoded payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ---------------------------------------------------------------------------
// OpenSegment
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct OpenSegment {
    samples: Vec<f32>,
    sample_rate: Option<u32>,
    frames: usize,
    truncated: bool,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

pub struct CaptureSession {
    microphone: Arc<dyn Microphone>,
    handle: Option<Box<dyn MicrophoneHandle>>,
    open: Option<OpenSegment>,
    encoding: Encoding,
    target_sample_rate: u32,
    max_segment_secs: f32,
}

impl CaptureSession {
    /// Build a session around `microphone`.  The encoding is chosen once,
    /// here, from the configured preference list.
    pub fn new(microphone: Box<dyn Microphone>, config: &AudioConfig) -> Self {
        let encoding = select_encoding(&config.encodings);
        log::info!("capture: segments will be encoded as {}", encoding.name());
        Self {
            microphone: Arc::from(microphone),
            handle: None,
            open: None,
            encoding,
            target_sample_rate: config.target_sample_rate,
            max_segment_secs: config.max_segment_secs,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn is_acquired(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Device sample rate, once acquired.
    pub fn sample_rate(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.sample_rate())
    }

    /// Open the microphone and route its frames to `sink`.  No-op when the
    /// device is already held.  Blocks while the device opens.
    pub fn acquire(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = self.microphone.acquire(sink)?;
        self.attach(handle);
        Ok(())
    }

    /// The device factory, for opening it somewhere that may block.
    pub fn microphone(&self) -> Arc<dyn Microphone> {
        Arc::clone(&self.microphone)
    }

    /// Take ownership of a handle opened through [`microphone`].  A second
    /// handle while one is held is released straight away.
    ///
    /// [`microphone`]: Self::microphone
    pub fn attach(&mut self, handle: Box<dyn MicrophoneHandle>) {
        if self.handle.is_some() {
            log::debug!("capture: microphone already held; releasing duplicate");
            handle.release();
            return;
        }
        self.handle = Some(handle);
    }

    /// Begin buffering into a new segment.  No-op if one is already open.
    pub fn open(&mut self) {
        if self.open.is_none() {
            self.open = Some(OpenSegment::default());
            log::debug!("capture: segment opened");
        }
    }

    /// Append a frame to the open segment, if any.
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        let max_secs = self.max_segment_secs;
        let Some(seg) = self.open.as_mut() else {
            return;
        };

        let rate = *seg.sample_rate.get_or_insert(frame.sample_rate);
        let cap = (max_secs.max(0.0) * rate as f32) as usize;
        if seg.samples.len() + frame.samples.len() > cap {
            if !seg.truncated {
                log::warn!("capture: segment reached {max_secs:.0}s; dropping further audio");
                seg.truncated = true;
            }
            return;
        }

        seg.samples.extend_from_slice(&frame.samples);
        seg.frames += 1;
    }

    /// Finalize the open segment.
    ///
    /// Returns `Ok(None)` when nothing was open.  The buffer is taken before
    /// encoding, so a segment is yielded at most once even if encoding fails.
    pub fn close(&mut self) -> Result<Option<Segment>, EncodingError> {
        let Some(seg) = self.open.take() else {
            return Ok(None);
        };

        let source_rate = seg
            .sample_rate
            .or_else(|| self.sample_rate())
            .unwrap_or(self.target_sample_rate);
        let target_rate = if self.target_sample_rate == 0 {
            source_rate
        } else {
            self.target_sample_rate
        };

        let samples = resample(&seg.samples, source_rate, target_rate);
        let duration_secs = if target_rate == 0 {
            0.0
        } else {
            samples.len() as f32 / target_rate as f32
        };
        let bytes = self.encoding.encode(&samples, target_rate)?;

        log::debug!(
            "capture: segment closed ({} frames, {:.2}s, {} bytes)",
            seg.frames,
            duration_secs,
            bytes.len()
        );

        Ok(Some(Segment {
            encoding: self.encoding,
            sample_rate: target_rate,
            frames: seg.frames,
            duration_secs,
            bytes,
        }))
    }

    /// Drop the open segment without encoding it.
    pub fn discard(&mut self) -> bool {
        let had = self.open.take().is_some();
        if had {
            log::debug!("capture: open segment discarded");
        }
        had
    }

    /// Discard any open segment and release the microphone.
    pub fn shutdown(&mut self) {
        self.discard();
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeHandle {
        rate: u32,
        released: Arc<AtomicUsize>,
    }

    impl MicrophoneHandle for FakeHandle {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn release(self: Box<Self>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeMic {
        fail: bool,
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl Microphone for FakeMic {
        fn acquire(&self, _sink: FrameSink) -> Result<Box<dyn MicrophoneHandle>, CaptureError> {
            if self.fail {
                return Err(CaptureError::NoDevice);
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeHandle {
                rate: 16_000,
                released: Arc::clone(&self.released),
            }))
        }
    }

    struct Counters {
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    fn session(encodings: &[&str], fail: bool) -> (CaptureSession, Counters) {
        let acquired = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let mic = FakeMic {
            fail,
            acquired: Arc::clone(&acquired),
            released: Arc::clone(&released),
        };
        let config = AudioConfig {
            encodings: encodings.iter().map(|s| s.to_string()).collect(),
            max_segment_secs: 1.0,
            ..AudioConfig::default()
        };
        (
            CaptureSession::new(Box::new(mic), &config),
            Counters { acquired, released },
        )
    }

    fn noop_sink() -> FrameSink {
        Arc::new(|_| {})
    }

    fn frame(value: f32) -> AudioFrame {
        AudioFrame::new(vec![value; 480], 16_000)
    }

    #[test]
    fn close_without_open_is_noop() {
        let (mut s, _) = session(&["pcm16"], false);
        assert_eq!(s.close().unwrap(), None);
    }

    #[test]
    fn open_twice_is_same_as_once() {
        let (mut s, _) = session(&["pcm16"], false);
        s.open();
        s.push_frame(&frame(0.2));
        s.open();
        s.push_frame(&frame(0.2));

        let seg = s.close().unwrap().expect("segment");
        assert_eq!(seg.frames(), 2);
        assert_eq!(seg.len(), 2 * 480 * 2);
        assert_eq!(s.close().unwrap(), None);
    }

    #[test]
    fn frames_outside_a_segment_are_ignored() {
        let (mut s, _) = session(&["pcm16"], false);
        s.push_frame(&frame(0.5));
        s.open();
        let seg = s.close().unwrap().expect("segment");
        assert_eq!(seg.frames(), 0);
        assert!(seg.is_empty());
    }

    #[test]
    fn wav_segment_is_resampled_to_target() {
        let (mut s, _) = session(&["webm", "wav"], false);
        assert_eq!(s.encoding(), Encoding::Wav);

        s.open();
        // 48 kHz device frames → 16 kHz payload
        s.push_frame(&AudioFrame::new(vec![0.1; 1_440], 48_000));
        let seg = s.close().unwrap().expect("segment");

        assert_eq!(seg.sample_rate(), 16_000);
        assert_eq!(seg.len(), 44 + 480 * 2);
        assert!((seg.duration_secs() - 0.03).abs() < 1e-4);
    }

    #[test]
    fn long_segment_is_capped() {
        let (mut s, _) = session(&["pcm16"], false);
        s.open();
        // cap = 1 s = 16 000 samples = 33 full frames of 480
        for _ in 0..50 {
            s.push_frame(&frame(0.2));
        }
        let seg = s.close().unwrap().expect("segment");
        assert_eq!(seg.frames(), 33);
    }

    #[test]
    fn acquire_is_idempotent_and_shutdown_releases() {
        let (mut s, c) = session(&["pcm16"], false);
        s.acquire(noop_sink()).unwrap();
        s.acquire(noop_sink()).unwrap();
        assert!(s.is_acquired());
        assert_eq!(s.sample_rate(), Some(16_000));
        assert_eq!(c.acquired.load(Ordering::SeqCst), 1);

        s.open();
        s.push_frame(&frame(0.2));
        s.shutdown();
        assert!(!s.is_acquired());
        assert!(!s.is_open());
        assert_eq!(c.released.load(Ordering::SeqCst), 1);

        // Nothing left to yield after shutdown.
        assert_eq!(s.close().unwrap(), None);
    }

    #[test]
    fn acquire_failure_is_reported_and_retryable() {
        let (mut s, _) = session(&["pcm16"], true);
        assert!(matches!(s.acquire(noop_sink()), Err(CaptureError::NoDevice)));
        assert!(!s.is_acquired());
    }

    #[test]
    fn handle_opened_elsewhere_is_attached_once() {
        let (mut s, c) = session(&["pcm16"], false);
        let mic = s.microphone();
        let first = mic.acquire(noop_sink()).unwrap();
        let second = mic.acquire(noop_sink()).unwrap();

        s.attach(first);
        assert!(s.is_acquired());
        s.attach(second);
        assert_eq!(c.released.load(Ordering::SeqCst), 1);

        s.shutdown();
        assert_eq!(c.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_releases_device() {
        let (mut s, c) = session(&["pcm16"], false);
        s.acquire(noop_sink()).unwrap();
        drop(s);
        assert_eq!(c.released.load(Ordering::SeqCst), 1);
    }
}
