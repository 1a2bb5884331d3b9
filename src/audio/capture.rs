//! Microphone capture via `cpal`.
//!
//! [`CpalMicrophone`] implements [`Microphone`]: acquiring it opens the input
//! device and starts a stream whose callback re-slices device buffers into
//! fixed-size [`AudioFrame`]s and hands each one to a [`FrameSink`].
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream lives on a
//! dedicated `mic-capture` thread.  The returned [`MicrophoneHandle`] is
//! `Send`; dropping it (or calling [`MicrophoneHandle::release`]) signals
//! the thread to drop the stream and returns without waiting for it.
//!
//! Opening the device can take a noticeable while, so
//! [`Microphone::acquire`] is allowed to block; the engine calls it from
//! `tokio::task::spawn_blocking` and gets the handle back as an event.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::frame::{AudioFrame, FrameAssembler};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring the microphone.
///
/// All of them are recoverable: the caller may retry once the user fixed the
/// device or granted permission.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("capture thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// Microphone traits
// ---------------------------------------------------------------------------

/// Receives every analysis frame produced by an acquired microphone.
///
/// Called on the audio thread; implementations must not block.
pub type FrameSink = Arc<dyn Fn(AudioFrame) + Send + Sync>;

/// A source of microphone frames.
pub trait Microphone: Send + Sync {
    /// Open the device and start delivering frames to `sink`.  May block
    /// until the device is open.
    fn acquire(&self, sink: FrameSink) -> Result<Box<dyn MicrophoneHandle>, CaptureError>;
}

/// Ownership of an open microphone stream.
pub trait MicrophoneHandle: Send {
    /// Native sample rate of the delivered frames.
    fn sample_rate(&self) -> u32;

    /// Stop the stream and release the device.  Must not block.
    fn release(self: Box<Self>);
}

/// A handle opened off the engine task, travelling back to the session.
pub struct OpenedMicrophone(pub Box<dyn MicrophoneHandle>);

impl fmt::Debug for OpenedMicrophone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedMicrophone")
            .field("sample_rate", &self.0.sample_rate())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Production microphone backed by the default `cpal` host.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    device_name: Option<String>,
    frame_ms: u32,
}

impl CpalMicrophone {
    /// `device_name: None` selects the system default input device.
    pub fn new(device_name: Option<String>, frame_ms: u32) -> Self {
        Self {
            device_name,
            frame_ms,
        }
    }

    /// Names of the input devices on the default host.
    pub fn device_names() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|d| d.name().ok())
            .collect())
    }

    fn open_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.clone())),
        }
    }

    /// Runs on the capture thread: opens the stream and reports the outcome.
    fn build_stream(&self, sink: FrameSink) -> Result<(cpal::Stream, u32), CaptureError> {
        let device = self.open_device()?;
        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let mut assembler = FrameAssembler::new(sample_rate, channels, self.frame_ms);
        let on_error = |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    assembler.push(data, |frame| sink(frame));
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32_768.0).collect();
                    assembler.push(&converted, |frame| sink(frame));
                },
                on_error,
                None,
            )?,
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };

        stream.play()?;
        log::info!(
            "capture: microphone open ({sample_rate} Hz, {channels} ch, {sample_format:?})"
        );
        Ok((stream, sample_rate))
    }
}

impl Microphone for CpalMicrophone {
    fn acquire(&self, sink: FrameSink) -> Result<Box<dyn MicrophoneHandle>, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, CaptureError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let mic = self.clone();

        let thread = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match mic.build_stream(sink) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the handle asks us to stop (or is dropped).
                let _ = stop_rx.recv();
                drop(stream);
                log::info!("capture: microphone released");
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::Thread("capture thread exited early".into()));
            }
        };

        // Detached: the thread exits once it sees the stop signal.
        drop(thread);
        Ok(Box::new(CpalStreamHandle {
            sample_rate,
            stop_tx: Some(stop_tx),
        }))
    }
}

/// Keeps the capture thread (and its `cpal::Stream`) alive.
struct CpalStreamHandle {
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
}

impl CpalStreamHandle {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl MicrophoneHandle for CpalStreamHandle {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn release(mut self: Box<Self>) {
        self.stop();
    }
}

impl Drop for CpalStreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
