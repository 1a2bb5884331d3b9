//! `settings.toml`: one section per subsystem, plus range checks.
//!
//! Every section is `#[serde(default)]` so a partial `settings.toml` only
//! overrides the keys it names.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration value outside its accepted range.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("min_volume must be within [0.0, 1.0], got {0}")]
    MinVolumeOutOfRange(f32),

    #[error("silence duration must be greater than zero")]
    ZeroSilenceDuration,

    #[error("frame_ms must be between 5 and 200, got {0}")]
    FrameLength(u32),
}

// ---------------------------------------------------------------------------
// VadConfig
// ---------------------------------------------------------------------------

/// Thresholds for the energy-based speech segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Loudness (0.0 – 1.0) a frame must strictly exceed to count as speech.
    pub min_volume: f32,
    /// Continuous silence in milliseconds before speech is declared ended.
    pub silence_duration_ms: u64,
}

impl VadConfig {
    /// Build a validated config.
    pub fn new(min_volume: f32, silence_duration: Duration) -> Result<Self, ConfigError> {
        let cfg = Self {
            min_volume,
            silence_duration_ms: silence_duration.as_millis() as u64,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Hysteresis delay as a [`Duration`].
    pub fn silence_duration(&self) -> Duration {
        Duration::from_millis(self.silence_duration_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_volume) {
            return Err(ConfigError::MinVolumeOutOfRange(self.min_volume));
        }
        if self.silence_duration_ms == 0 {
            return Err(ConfigError::ZeroSilenceDuration);
        }
        Ok(())
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            min_volume: 0.1,
            silence_duration_ms: 2_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and segment packaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Analysis frame length in milliseconds.
    pub frame_ms: u32,
    /// Sample rate segments are resampled to before encoding.
    pub target_sample_rate: u32,
    /// Encoding names in order of preference.  The first one this build
    /// supports wins; raw PCM is used when none match.
    pub encodings: Vec<String>,
    /// Encoded segments shorter than this are dropped as clicks or breaths.
    pub min_segment_bytes: usize,
    /// Hard cap on a single segment's length in seconds.
    pub max_segment_secs: f32,
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=200).contains(&self.frame_ms) {
            return Err(ConfigError::FrameLength(self.frame_ms));
        }
        Ok(())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            frame_ms: 30,
            target_sample_rate: 16_000,
            encodings: vec!["webm".into(), "wav".into()],
            min_segment_bytes: 3_000,
            max_segment_secs: 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Far-end playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Play synthesized replies.  When `false` every reply is handled as if
    /// it carried no audio.
    pub enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Connection to the remote dialogue service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint of the interview service.
    pub url: String,
    /// Seconds to wait for the WebSocket handshake.
    pub connect_timeout_secs: u64,
    /// Consecutive failed sends after which the session is ended.
    pub max_send_failures: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/chat".into(),
            connect_timeout_secs: 10,
            max_send_failures: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// InterviewConfig
// ---------------------------------------------------------------------------

/// Interview context sent alongside every user segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    pub job_role: String,
    pub company_context: String,
    pub job_description: String,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            job_role: "Candidate".into(),
            company_context: "General".into(),
            job_description: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Everything in `settings.toml`.
///
/// ```rust,no_run
/// use interview_voice::config::AppConfig;
///
/// let mut config = AppConfig::load()?;
/// config.interview.job_role = "Backend Engineer".into();
/// config.save()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vad: VadConfig,
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    /// Dialogue service connection.
    pub transport: TransportConfig,
    pub interview: InterviewConfig,
}

impl AppConfig {
    /// [`load_from`](Self::load_from) the platform settings file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Parse and validate `path`.  A file that does not exist yet means a
    /// first run and yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("config: {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// [`save_to`](Self::save_to) the platform settings file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Write pretty TOML to `path`, creating its directory first.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    /// Check every section's ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vad.validate()?;
        self.audio.validate()
    }
}
