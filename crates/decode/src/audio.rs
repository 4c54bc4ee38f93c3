use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Decoded PCM for one stem: interleaved `f32` frames behind an `Arc<[f32]>`.
///
/// Clones share the sample data, so handing a stem to the audio callback
/// and keeping it on the control side costs a refcount bump.
#[derive(Clone)]
pub struct StemAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl StemAudio {
    /// Wrap interleaved samples. Fails if `channels` is 0 or the sample
    /// count is not a whole number of frames.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> anyhow::Result<Self> {
        if channels == 0 {
            anyhow::bail!("stem audio needs at least one channel");
        }
        if sample_rate == 0 {
            anyhow::bail!("stem audio needs a non-zero sample rate");
        }
        if samples.len() % channels as usize != 0 {
            anyhow::bail!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            );
        }
        Ok(Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        })
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame index for a time in seconds, clamped to the material.
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        ((seconds * self.sample_rate as f64).round() as usize).min(self.frames())
    }

    pub fn secs_at(&self, frame: usize) -> f64 {
        frame as f64 / self.sample_rate as f64
    }

    /// Remix to `channels` output channels.
    ///
    /// Mono is copied to every output; anything else to mono is averaged;
    /// other mismatches map channel `n` to input `n % channels`.
    pub fn with_channels(&self, channels: u16) -> anyhow::Result<Self> {
        if channels == self.channels {
            return Ok(self.clone());
        }
        if channels == 0 {
            anyhow::bail!("cannot remix to zero channels");
        }

        let src = self.channels as usize;
        let dst = channels as usize;
        let mut out = Vec::with_capacity(self.frames() * dst);
        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                out.push(frame.iter().sum::<f32>() / src as f32);
            } else {
                out.extend((0..dst).map(|ch| frame[ch % src]));
            }
        }
        Self::new(out, self.sample_rate, channels)
    }

    /// Convert to `target_sample_rate` with sinc interpolation. Same-rate
    /// calls return a shared clone.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }
        if target_sample_rate == 0 {
            anyhow::bail!("cannot resample to 0 Hz");
        }
        if self.is_empty() {
            return Self::new(Vec::new(), target_sample_rate, self.channels);
        }

        let channels = self.channels as usize;
        let input_frames = self.frames();
        let ratio = target_sample_rate as f64 / self.sample_rate as f64;

        // rubato works on planar buffers.
        let mut planar = vec![Vec::with_capacity(input_frames); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, channels)?;
        let output = resampler.process(&planar, None)?;

        let output_frames = output.first().map_or(0, Vec::len);
        let mut interleaved = Vec::with_capacity(output_frames * channels);
        for frame in 0..output_frames {
            for channel in &output {
                interleaved.push(channel[frame]);
            }
        }

        tracing::trace!(
            from = self.sample_rate,
            to = target_sample_rate,
            input_frames,
            output_frames,
            "Resampled stem"
        );
        Self::new(interleaved, target_sample_rate, self.channels)
    }
}

impl std::fmt::Debug for StemAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StemAudio")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(frequency: f32, sample_rate: u32, seconds: f32, channels: u16) -> StemAudio {
        let frames = (sample_rate as f32 * seconds) as usize;
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let value = (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin();
            samples.extend(std::iter::repeat_n(value, channels as usize));
        }
        StemAudio::new(samples, sample_rate, channels).unwrap()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    #[test]
    fn test_new_rejects_bad_layouts() {
        assert!(StemAudio::new(vec![0.0], 44100, 0).is_err());
        assert!(StemAudio::new(vec![0.0; 5], 44100, 2).is_err());
        assert!(StemAudio::new(vec![0.0; 4], 0, 2).is_err());
        assert!(StemAudio::new(vec![0.0; 4], 44100, 2).is_ok());
    }

    #[test]
    fn test_clone_shares_samples() {
        let audio = StemAudio::new(vec![0.0; 1000], 44100, 2).unwrap();
        let copy = audio.clone();
        assert_eq!(Arc::strong_count(audio.samples_arc()), 2);
        assert_eq!(copy.frames(), 500);
    }

    #[test]
    fn test_frame_and_time_conversions() {
        let audio = StemAudio::new(vec![0.0; 48000 * 2], 48000, 2).unwrap();
        assert!((audio.duration_secs() - 1.0).abs() < 1e-9);
        assert_eq!(audio.frame_at(0.5), 24000);
        assert_eq!(audio.frame_at(-1.0), 0);
        assert_eq!(audio.frame_at(f64::NAN), 0);
        assert_eq!(audio.frame_at(3.0), 48000);
        assert!((audio.secs_at(12000) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_mono_is_spread_to_stereo() {
        let audio = StemAudio::new(vec![0.1, 0.2, 0.3], 44100, 1).unwrap();
        let stereo = audio.with_channels(2).unwrap();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.samples(), &[0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_stereo_is_averaged_to_mono() {
        let audio = StemAudio::new(vec![0.0, 1.0, 0.5, 0.5], 44100, 2).unwrap();
        let mono = audio.with_channels(1).unwrap();
        assert_eq!(mono.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_same_rate_resample_is_shared() {
        let audio = sine(440.0, 44100, 0.1, 2);
        let same = audio.resample(44100).unwrap();
        assert!(Arc::ptr_eq(audio.samples_arc(), same.samples_arc()));
    }

    #[test]
    fn test_resample_scales_length() {
        let audio = sine(440.0, 44100, 0.1, 2);
        let resampled = audio.resample(48000).unwrap();

        assert_eq!(resampled.sample_rate(), 48000);
        assert_eq!(resampled.channels(), 2);
        let expected = (audio.frames() as f64 * 48000.0 / 44100.0) as i64;
        let tolerance = (expected as f64 * 0.03) as i64;
        assert!(
            (resampled.frames() as i64 - expected).abs() <= tolerance,
            "expected ~{expected} frames, got {}",
            resampled.frames()
        );
    }

    #[test]
    fn test_resample_keeps_pitch() {
        let audio = sine(440.0, 44100, 0.1, 1);
        let resampled = audio.resample(48000).unwrap();

        let crossings = zero_crossings(resampled.samples());
        let estimated = crossings as f64 / (2.0 * resampled.duration_secs());
        assert!((estimated - 440.0).abs() < 22.0, "estimated {estimated} Hz");
    }

    #[test]
    fn test_resample_empty() {
        let audio = StemAudio::new(Vec::new(), 44100, 2).unwrap();
        let resampled = audio.resample(48000).unwrap();
        assert!(resampled.is_empty());
        assert_eq!(resampled.sample_rate(), 48000);
    }
}
