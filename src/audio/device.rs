//! # Audio Device Interfaces
//!
//! The engine never talks to a sound card directly. It sees a capture device
//! that hands out frame streams and a playback device that opens an output
//! with its own clock. Real hardware lives in `cpal_backend` (behind the
//! `device` feature); this module also carries the headless fallbacks used
//! when that feature is off.

use crate::audio::codec::AudioFrame;
use crate::error::VoiceError;
use std::sync::Arc;
use std::time::Instant;

/// Callback invoked once per captured frame, on the device's own thread.
pub type FrameCallback = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// Parameters a capture device is asked to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Output sample rate of delivered frames (the device resamples if needed)
    pub sample_rate: u32,
    /// Samples per delivered frame
    pub frame_size: usize,
}

/// A microphone (or anything that behaves like one).
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device. Fails with [`VoiceError::AccessDenied`] when the
    /// microphone is refused or missing.
    fn acquire(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, VoiceError>;
}

/// A live subscription to a capture device.
pub trait CaptureStream: Send {
    /// Install the frame callback. Frames delivered before a callback is
    /// installed are discarded.
    fn on_frame(&mut self, callback: FrameCallback);

    /// Stop delivering frames and give the device back. Idempotent.
    fn release(&mut self);
}

/// Identifies one scheduled buffer on a playback output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackHandle(pub u64);

/// Something that can open an output stream at a given sample rate.
pub trait PlaybackDevice: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackOutput>, VoiceError>;
}

/// An open output stream with a monotonically increasing clock.
pub trait PlaybackOutput: Send {
    /// Current position of the playback clock, in seconds.
    fn now(&self) -> f64;

    /// Queue samples to start at `start_time` on the playback clock.
    fn schedule_buffer(&mut self, samples: Arc<[f32]>, start_time: f64) -> PlaybackHandle;

    /// Silence a scheduled buffer, whether or not it has started. Stopping an
    /// unknown or finished handle is a no-op.
    fn stop(&mut self, handle: PlaybackHandle);
}

/// Capture device used when no audio backend is compiled in.
///
/// Every acquisition fails, which the session reports as a refused
/// microphone.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCapture;

impl CaptureDevice for UnavailableCapture {
    fn acquire(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, VoiceError> {
        Err(VoiceError::AccessDenied(
            "no capture backend compiled in (build with --features device)".to_string(),
        ))
    }
}

/// Playback device whose outputs keep time but produce no sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayback;

impl PlaybackDevice for SilentPlayback {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackOutput>, VoiceError> {
        Ok(Box::new(SilentOutput::new()))
    }
}

/// Output that advances a wall clock and discards audio.
#[derive(Debug)]
pub struct SilentOutput {
    opened_at: Instant,
    next_handle: u64,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self {
            opened_at: Instant::now(),
            next_handle: 0,
        }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackOutput for SilentOutput {
    fn now(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn schedule_buffer(&mut self, _samples: Arc<[f32]>, _start_time: f64) -> PlaybackHandle {
        self.next_handle += 1;
        PlaybackHandle(self.next_handle)
    }

    fn stop(&mut self, _handle: PlaybackHandle) {}
}

/// Device set chosen at startup.
pub struct AudioDevices {
    pub capture: Arc<dyn CaptureDevice>,
    pub playback: Arc<dyn PlaybackDevice>,
}

impl AudioDevices {
    /// Sound-card devices when the `device` feature is enabled, headless
    /// fallbacks otherwise.
    pub fn system_default() -> Self {
        #[cfg(feature = "device")]
        {
            Self {
                capture: Arc::new(crate::audio::cpal_backend::CpalCapture::default()),
                playback: Arc::new(crate::audio::cpal_backend::CpalPlayback::default()),
            }
        }
        #[cfg(not(feature = "device"))]
        {
            tracing::warn!("Built without the `device` feature: capture is unavailable, playback is silent");
            Self {
                capture: Arc::new(UnavailableCapture),
                playback: Arc::new(SilentPlayback),
            }
        }
    }
}
