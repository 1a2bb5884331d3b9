//! Channel and rate conversion for outgoing segments.
//!
//! Device buffers are downmixed as they arrive (see
//! [`FrameAssembler`](super::FrameAssembler)); a closed segment is then
//! brought from the device rate to `audio.target_sample_rate` before it is
//! encoded.  Linear interpolation is plenty for speech headed to a
//! recogniser.

/// Average interleaved channels into one.  A trailing partial frame is
/// dropped; zero channels yields nothing.
///
/// ```rust
/// use interview_voice::audio::downmix;
///
/// assert_eq!(downmix(&[0.2_f32, 0.4, -1.0, 1.0], 2), vec![0.3, 0.0]);
/// ```
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let width = usize::from(channels);
    if width == 0 {
        return Vec::new();
    }
    interleaved
        .chunks_exact(width)
        .map(|frame| frame.iter().sum::<f32>() / width as f32)
        .collect()
}

/// Convert `samples` from `from_hz` to `to_hz`, keeping the duration.
///
/// The result holds `ceil(len * to_hz / from_hz)` samples.  Equal rates copy
/// the input; a zero rate or empty input yields nothing.
///
/// ```rust
/// use interview_voice::audio::resample;
///
/// // One 30 ms frame from a 48 kHz device.
/// assert_eq!(resample(&[0.0_f32; 1_440], 48_000, 16_000).len(), 480);
/// ```
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz {
        return samples.to_vec();
    }
    if samples.is_empty() || from_hz == 0 || to_hz == 0 {
        return Vec::new();
    }

    let out_len = (samples.len() as u64 * u64::from(to_hz)).div_ceil(u64::from(from_hz)) as usize;
    let step = f64::from(from_hz) / f64::from(to_hz);
    let last = samples.len() - 1;

    (0..out_len)
        .map(|n| {
            let pos = n as f64 * step;
            let i = (pos as usize).min(last);
            let next = (i + 1).min(last);
            let t = (pos - i as f64).clamp(0.0, 1.0) as f32;
            samples[i] + (samples[next] - samples[i]) * t
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn downmix_mono_is_a_copy() {
        assert_eq!(downmix(&[0.1, -0.2, 0.3], 1), vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn downmix_averages_each_frame() {
        let quad = [0.1_f32, 0.3, 0.5, 0.7, -1.0, -1.0, 1.0, 1.0];
        let mono = downmix(&quad, 4);
        assert_eq!(mono.len(), 2);
        assert!(close(mono[0], 0.4));
        assert!(close(mono[1], 0.0));
    }

    #[test]
    fn downmix_drops_partial_frame_and_handles_zero_channels() {
        assert_eq!(downmix(&[0.5, 0.5, 0.9], 2), vec![0.5]);
        assert!(downmix(&[0.5, 0.5], 0).is_empty());
    }

    #[test]
    fn segment_duration_survives_common_device_rates() {
        // Two seconds of speech at each rate becomes two seconds at 16 kHz.
        for rate in [8_000_u32, 22_050, 44_100, 48_000] {
            let segment = vec![0.0_f32; rate as usize * 2];
            assert_eq!(resample(&segment, rate, 16_000).len(), 32_000, "from {rate} Hz");
        }
    }

    #[test]
    fn upsampling_interpolates_between_samples() {
        let out = resample(&[0.0, 1.0], 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert!(close(out[0], 0.0));
        assert!(close(out[1], 0.5));
        assert!(close(out[2], 1.0));
        assert!(close(out[3], 1.0));
    }

    #[test]
    fn level_is_kept_when_downsampling() {
        let out = resample(&[-0.25_f32; 960], 48_000, 16_000);
        assert_eq!(out.len(), 320);
        assert!(out.iter().all(|&s| close(s, -0.25)));
    }

    #[test]
    fn degenerate_inputs() {
        assert!(resample(&[], 44_100, 16_000).is_empty());
        assert!(resample(&[0.5; 4], 0, 16_000).is_empty());
        assert!(resample(&[0.5; 4], 16_000, 0).is_empty());
        assert_eq!(resample(&[0.5, 0.25], 16_000, 16_000), vec![0.5, 0.25]);
    }
}
