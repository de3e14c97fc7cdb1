//! Frame shaping for raw device input: downmix to mono, resample to the
//! capture rate, and cut the stream into fixed-size frames.

use crate::audio::codec::AudioFrame;

/// Average interleaved channels into one.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler.
///
/// Works on independent blocks, which is good enough for speech going to a
/// recognizer; there is no anti-alias filter.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = ((input.len() as f64) / ratio).floor() as usize;
    let last = input.len() - 1;

    (0..output_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = position.floor() as usize;
            let frac = (position - index as f64) as f32;
            let current = input[index.min(last)];
            let next = input[(index + 1).min(last)];
            current + (next - current) * frac
        })
        .collect()
}

/// Accumulates samples and emits frames of exactly `frame_size` samples.
#[derive(Debug)]
pub struct FrameAssembler {
    pending: Vec<f32>,
    frame_size: usize,
    sample_rate: u32,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            pending: Vec::with_capacity(frame_size * 2),
            frame_size,
            sample_rate,
        }
    }

    /// Append samples; returns every frame that became complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let full = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(full, self.sample_rate));
        }
        frames
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
