//! Near-end audio: microphone capture → frames → loudness → segmentation.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → FrameAssembler → AudioFrame (engine queue)
//!           → EnergyAnalyzer → SpeechSegmenter → SpeechStarted / SpeechEnded
//!           → CaptureSession open / close → Segment (resampled + encoded)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use interview_voice::audio::{loudness, AudioFrame};
//!
//! let frame = AudioFrame::new(vec![0.2_f32; 480], 16_000);
//! assert!((loudness(&frame.samples) - 0.2).abs() < 1e-6);
//! ```

pub mod capture;
pub mod encoding;
pub mod energy;
pub mod frame;
pub mod resample;
pub mod segmenter;
pub mod session;

pub use capture::{
    CaptureError, CpalMicrophone, FrameSink, Microphone, MicrophoneHandle, OpenedMicrophone,
};
pub use encoding::{select_encoding, Encoding, EncodingError};
pub use energy::{loudness, Amplitude, EnergyAnalyzer};
pub use frame::{AudioFrame, FrameAssembler};
pub use resample::{downmix, resample};
pub use segmenter::{
    SegmenterEvent, SilenceTimer, SpeechSegmenter, SpeechState, TimerCallback, TimerHandle,
    TimerId,
};
pub use session::{CaptureSession, Segment};
