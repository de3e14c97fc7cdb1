//! # Output Mixer
//!
//! Sample-accurate voice mixer behind the sound-card playback output. Each
//! scheduled buffer becomes a voice pinned to a start frame on the device
//! clock; the render callback sums whatever voices overlap the frames it is
//! asked for. The device clock is simply the number of frames rendered so far.

use crate::audio::device::PlaybackHandle;
use std::sync::Arc;

#[derive(Debug)]
struct Voice {
    handle: PlaybackHandle,
    start_frame: u64,
    end_frame: u64,
    samples: Arc<[f32]>,
}

#[derive(Debug)]
pub struct Mixer {
    device_rate: u32,
    /// Source samples consumed per device frame
    step: f64,
    frames_rendered: u64,
    voices: Vec<Voice>,
    next_handle: u64,
}

impl Mixer {
    pub fn new(device_rate: u32, source_rate: u32) -> Self {
        let device_rate = device_rate.max(1);
        Self {
            device_rate,
            step: source_rate.max(1) as f64 / device_rate as f64,
            frames_rendered: 0,
            voices: Vec::new(),
            next_handle: 0,
        }
    }

    /// Seconds of audio rendered so far.
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.device_rate as f64
    }

    pub fn schedule(&mut self, samples: Arc<[f32]>, start_time: f64) -> PlaybackHandle {
        self.next_handle += 1;
        let handle = PlaybackHandle(self.next_handle);

        let start_frame = (start_time.max(0.0) * self.device_rate as f64).round() as u64;
        let length = (samples.len() as f64 / self.step).ceil() as u64;
        self.voices.push(Voice {
            handle,
            start_frame,
            end_frame: start_frame + length,
            samples,
        });
        handle
    }

    pub fn stop(&mut self, handle: PlaybackHandle) {
        self.voices.retain(|voice| voice.handle != handle);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Fill an interleaved output buffer and advance the clock.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);

        for frame in out.chunks_mut(channels) {
            let t = self.frames_rendered;
            let mut mixed = 0.0f32;
            for voice in &self.voices {
                if t < voice.start_frame || t >= voice.end_frame {
                    continue;
                }
                let index = ((t - voice.start_frame) as f64 * self.step) as usize;
                if let Some(sample) = voice.samples.get(index) {
                    mixed += *sample;
                }
            }
            frame.fill(mixed.clamp(-1.0, 1.0));
            self.frames_rendered += 1;
        }

        let now = self.frames_rendered;
        self.voices.retain(|voice| voice.end_frame > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_starts_on_its_frame() {
        let mut mixer = Mixer::new(10, 10);
        mixer.schedule(Arc::from(vec![0.5f32; 3]), 0.2);

        let mut out = vec![0.0f32; 6];
        mixer.render(&mut out, 1);

        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
        assert!((mixer.now() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_back_to_back_voices_have_no_gap() {
        let mut mixer = Mixer::new(10, 10);
        mixer.schedule(Arc::from(vec![0.25f32; 2]), 0.0);
        mixer.schedule(Arc::from(vec![0.75f32; 2]), 0.2);

        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out, 1);

        assert_eq!(out, vec![0.25, 0.25, 0.75, 0.75]);
    }

    #[test]
    fn test_stopped_voice_is_silent() {
        let mut mixer = Mixer::new(10, 10);
        let handle = mixer.schedule(Arc::from(vec![1.0f32; 4]), 0.0);
        mixer.stop(handle);
        mixer.stop(handle);

        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_upsampled_voice_fills_all_channels() {
        // 24kHz source on a 48kHz stereo device: every source sample covers
        // two device frames.
        let mut mixer = Mixer::new(48_000, 24_000);
        mixer.schedule(Arc::from(vec![0.1f32, 0.2]), 0.0);

        let mut out = vec![0.0f32; 8];
        mixer.render(&mut out, 2);

        assert_eq!(out, vec![0.1, 0.1, 0.1, 0.1, 0.2, 0.2, 0.2, 0.2]);
    }
}
