//! Segment encodings and preference-list selection.
//!
//! The capture session walks the configured preference list and uses the
//! first encoding this build can produce.  Container formats a browser
//! recorder would offer (`webm`, `mp4`, `ogg`) are recognised but not
//! produced here, so they are skipped.  When nothing in the list is usable the
//! session falls back to headerless 16-bit PCM rather than failing.
//!
//! ```rust
//! use interview_voice::audio::{select_encoding, Encoding};
//!
//! let prefs = vec!["webm".to_string(), "wav".to_string()];
//! assert_eq!(select_encoding(&prefs), Encoding::Wav);
//! assert_eq!(select_encoding(&["mp4".to_string()]), Encoding::Pcm16);
//! ```

use std::io::Cursor;

use thiserror::Error;

// ---------------------------------------------------------------------------
// EncodingError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodingError {
    /// The named encoding cannot be produced by this build.
    #[error("encoding not supported: {0}")]
    Unsupported(String),

    /// WAV container writing failed.
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Payload format of a finished segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// RIFF/WAVE, mono, 16-bit signed PCM.
    Wav,
    /// Headerless little-endian 16-bit signed PCM.
    Pcm16,
}

impl Encoding {
    /// Resolve a configured encoding name (case-insensitive; MIME-style
    /// `audio/…` names are accepted).
    pub fn from_name(name: &str) -> Result<Self, EncodingError> {
        let lower = name.trim().to_ascii_lowercase();
        let short = lower.strip_prefix("audio/").unwrap_or(&lower);
        match short {
            "wav" | "wave" | "x-wav" => Ok(Encoding::Wav),
            "pcm16" | "pcm" | "raw" | "l16" => Ok(Encoding::Pcm16),
            _ => Err(EncodingError::Unsupported(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Wav => "wav",
            Encoding::Pcm16 => "pcm16",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Encoding::Wav => "audio/wav",
            Encoding::Pcm16 => "audio/L16",
        }
    }

    /// Encode mono `f32` samples at `sample_rate`.
    pub fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, EncodingError> {
        match self {
            Encoding::Wav => encode_wav(samples, sample_rate),
            Encoding::Pcm16 => Ok(encode_pcm16(samples)),
        }
    }
}

/// First supported encoding in `preferences`, or [`Encoding::Pcm16`] when
/// none is supported.
pub fn select_encoding(preferences: &[String]) -> Encoding {
    for name in preferences {
        match Encoding::from_name(name) {
            Ok(encoding) => return encoding,
            Err(e) => log::debug!("capture: skipping encoding preference: {e}"),
        }
    }
    log::warn!("capture: no supported encoding in {preferences:?}; sending raw pcm16");
    Encoding::Pcm16
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&to_i16(s).to_le_bytes());
    }
    out
}

fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, EncodingError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
