//! # PCM Codec
//!
//! Converts between normalized float audio and the wire format used by the
//! live model: 16-bit signed little-endian PCM, base64 encoded, labelled with
//! a `audio/pcm;rate=<hz>` MIME type.
//!
//! ## Audio Format:
//! - **Capture direction**: 16kHz mono
//! - **Playback direction**: 24kHz mono
//! - **Bit Depth**: 16-bit PCM, little-endian
//!
//! The sample rate is fixed when the codec is built. A chunk that declares a
//! different rate, has an odd number of bytes, or is not valid base64 is
//! rejected with [`VoiceError::MalformedAudio`]; nothing is padded or
//! silently truncated.

use crate::error::VoiceError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::time::Duration;

/// Full scale of a 16-bit sample.
const PCM_SCALE: f32 = 32768.0;

/// A block of mono audio at a known sample rate.
///
/// Frames are immutable once built: the samples are only reachable through
/// read-only accessors, and ownership moves from capture to the send path.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Root-mean-square level of the frame, in [0, 1] for normalized input.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let energy: f32 = self.samples.iter().map(|s| s * s).sum();
        (energy / self.samples.len() as f32).sqrt()
    }
}

/// An encoded audio payload as it travels over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireChunk {
    /// Base64 text of 16-bit little-endian PCM.
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl WireChunk {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// The `rate=` parameter of the MIME type, if present and numeric.
    pub fn declared_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .map(str::trim)
            .find_map(|param| param.strip_prefix("rate="))
            .and_then(|rate| rate.trim().parse().ok())
    }
}

/// Encoder/decoder bound to one direction's sample rate.
///
/// ## Rust Concepts:
/// - **Copy**: the codec is just a number, so it is moved freely into capture
///   callbacks without cloning ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmCodec {
    sample_rate: u32,
}

impl PcmCodec {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Encode a frame for the wire.
    ///
    /// Samples outside [-1, 1] are clamped before quantization, so a hot
    /// microphone saturates instead of wrapping around.
    pub fn encode(&self, frame: &AudioFrame) -> WireChunk {
        WireChunk::new(STANDARD.encode(self.encode_pcm(frame.samples())), self.mime_type())
    }

    /// Quantize float samples to 16-bit little-endian bytes.
    pub fn encode_pcm(&self, samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            // Writing into a Vec cannot fail.
            let _ = bytes.write_i16::<LittleEndian>(float_to_pcm(sample));
        }
        bytes
    }

    /// Decode a wire chunk back into a frame at this codec's sample rate.
    pub fn decode(&self, chunk: &WireChunk) -> Result<AudioFrame, VoiceError> {
        if let Some(rate) = chunk.declared_rate() {
            if rate != self.sample_rate {
                return Err(VoiceError::MalformedAudio(format!(
                    "sample rate mismatch: expected {}, got {}",
                    self.sample_rate, rate
                )));
            }
        }

        let bytes = STANDARD
            .decode(chunk.data.as_bytes())
            .map_err(|e| VoiceError::MalformedAudio(format!("invalid base64 payload: {}", e)))?;

        self.decode_pcm(&bytes)
    }

    /// Decode raw 16-bit little-endian bytes.
    ///
    /// ## Validation:
    /// - empty payloads are rejected
    /// - an odd byte count means a sample was cut in half, which is an error
    pub fn decode_pcm(&self, bytes: &[u8]) -> Result<AudioFrame, VoiceError> {
        if bytes.is_empty() {
            return Err(VoiceError::MalformedAudio("empty audio payload".to_string()));
        }
        if bytes.len() % 2 != 0 {
            return Err(VoiceError::MalformedAudio(format!(
                "payload of {} bytes is not a whole number of 16-bit samples",
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let mut samples = Vec::with_capacity(bytes.len() / 2);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(pcm_to_float(sample));
        }

        Ok(AudioFrame::new(samples, self.sample_rate))
    }
}

/// Scale a 16-bit sample into [-1.0, 1.0).
pub fn pcm_to_float(sample: i16) -> f32 {
    sample as f32 / PCM_SCALE
}

/// Scale a float sample to 16 bits, rounding and saturating.
pub fn float_to_pcm(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * PCM_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
