//! # Audio Module
//!
//! Everything between the sound card and the wire.
//!
//! ## Key Components:
//! - **Codec**: float samples ⇄ 16-bit little-endian PCM ⇄ base64 wire chunks
//! - **Capture Pipeline**: microphone frames → codec → session outbound queue
//! - **Playback Scheduler**: decoded response chunks → gapless playback
//! - **Devices**: capture/playback interfaces, headless fallbacks and the
//!   `cpal` sound-card backend (behind the `device` feature)
//!
//! ## Audio Format Requirements:
//! - **Capture**: 16kHz mono, 4096-sample frames
//! - **Playback**: 24kHz mono
//! - **Bit Depth**: 16-bit PCM, little-endian signed integers

pub mod capture;      // Readiness gate + outbound forwarding
pub mod codec;        // PCM <-> base64 wire chunks
pub mod device;       // Device traits and headless fallbacks
pub mod playback;     // Gapless playback scheduling

#[cfg(feature = "device")]
pub mod cpal_backend; // Default sound card via cpal
#[cfg(feature = "device")]
pub mod frames;       // Downmix, resample, fixed-size framing
#[cfg(feature = "device")]
pub mod mixer;        // Sample-accurate output mixer

pub use capture::{CapturePipeline, OutboundGate};
pub use codec::{AudioFrame, PcmCodec, WireChunk};
pub use device::{
    AudioDevices, CaptureConfig, CaptureDevice, CaptureStream, PlaybackDevice, PlaybackHandle,
    PlaybackOutput,
};
pub use playback::{PlaybackScheduler, ScheduledUnit};
