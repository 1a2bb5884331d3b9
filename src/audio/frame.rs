//! Fixed-size analysis frames.
//!
//! cpal delivers buffers whose size depends on the host and device.  The
//! analysis loop wants one loudness value per fixed period, so
//! [`FrameAssembler`] downmixes each delivered buffer to mono and re-slices
//! the stream into [`AudioFrame`]s of exactly `frame_len` samples.

use super::resample::downmix;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One analysis period of mono `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Frame length in milliseconds.
    pub fn duration_ms(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 * 1_000.0 / self.sample_rate as f32
    }
}

/// Number of mono samples in a frame of `frame_ms` at `sample_rate`.
pub fn frame_len(sample_rate: u32, frame_ms: u32) -> usize {
    ((sample_rate as u64 * frame_ms as u64) / 1_000).max(1) as usize
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Re-slices interleaved device buffers into fixed-size mono frames.
#[derive(Debug)]
pub struct FrameAssembler {
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(sample_rate: u32, channels: u16, frame_ms: u32) -> Self {
        let frame_len = frame_len(sample_rate, frame_ms);
        Self {
            sample_rate,
            channels,
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Push one interleaved device buffer and hand every completed frame to
    /// `emit`, oldest first.  Leftover samples wait for the next buffer.
    pub fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(AudioFrame)) {
        if self.channels <= 1 {
            self.pending.extend_from_slice(interleaved);
        } else {
            self.pending
                .extend(downmix(interleaved, self.channels));
        }

        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let samples = std::mem::replace(&mut self.pending, rest);
            emit(AudioFrame::new(samples, self.sample_rate));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
