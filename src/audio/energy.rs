//! Per-frame loudness measure.
//!
//! [`loudness`] reduces one analysis frame to a single scalar in `[0.0, 1.0]`:
//! the mean absolute sample magnitude divided by the format's full-scale
//! magnitude.  It runs once per frame on the analysis loop, so it is a single
//! O(N) pass with no allocation.
//!
//! ```rust
//! use interview_voice::audio::loudness;
//!
//! assert_eq!(loudness::<f32>(&[]), 0.0);
//! assert!((loudness(&[0.5_f32, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
//! assert!((loudness(&[255_u8, 0]) - 0.5).abs() < 1e-6);
//! ```

// ---------------------------------------------------------------------------
// Amplitude
// ---------------------------------------------------------------------------

/// A sample type with a known full-scale magnitude.
pub trait Amplitude: Copy {
    /// Full-scale magnitude of this format.
    const FULL_SCALE: f32;

    /// Absolute magnitude of the sample in the format's native units.
    fn magnitude(self) -> f32;
}

impl Amplitude for f32 {
    const FULL_SCALE: f32 = 1.0;

    fn magnitude(self) -> f32 {
        self.abs()
    }
}

impl Amplitude for i16 {
    const FULL_SCALE: f32 = 32_768.0;

    fn magnitude(self) -> f32 {
        (self as f32).abs()
    }
}

/// Byte magnitudes (0–255), as produced by analyser-style byte buffers.
impl Amplitude for u8 {
    const FULL_SCALE: f32 = 255.0;

    fn magnitude(self) -> f32 {
        self as f32
    }
}

// ---------------------------------------------------------------------------
// loudness
// ---------------------------------------------------------------------------

/// `mean(|sample|) / full_scale`, clamped to `[0.0, 1.0]`.
///
/// An empty frame (the source had no data) reports `0.0`.
pub fn loudness<S: Amplitude>(frame: &[S]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s.magnitude()).sum();
    let volume = sum / frame.len() as f32 / S::FULL_SCALE;
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// EnergyAnalyzer
// ---------------------------------------------------------------------------

/// Stateless analyzer stage of the turn-taking pipeline.
///
/// Optional `gain` scales the measured loudness before clamping, for
/// microphones that run quiet.
#[derive(Debug, Clone, Copy)]
pub struct EnergyAnalyzer {
    gain: f32,
}

impl EnergyAnalyzer {
    pub fn new() -> Self {
        Self { gain: 1.0 }
    }

    pub fn with_gain(gain: f32) -> Self {
        Self { gain: gain.max(0.0) }
    }

    /// Loudness of one frame in `[0.0, 1.0]`.
    pub fn analyze<S: Amplitude>(&self, frame: &[S]) -> f32 {
        (loudness(frame) * self.gain).clamp(0.0, 1.0)
    }
}

impl Default for EnergyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
