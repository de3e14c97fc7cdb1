//! # Configuration Management
//!
//! This module handles loading and managing the voice host's configuration
//! from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: converts between these structs and TOML, JSON and environment values
//! - **#[serde(default, skip_serializing)]**: the API key can be read in but is
//!   never written back out (GET /api/v1/config never echoes it)
//! - **Result<T, E>**: loading and validation failures are returned, not panicked on
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST`, `PORT`, `GEMINI_API_KEY` / `API_KEY`
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_LIVE__VOICE`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::live::gemini::DEFAULT_ENDPOINT;

const MAX_OUTBOUND_QUEUE: usize = 1024;
const MAX_SAMPLE_RATE: u32 = 192_000;
const MAX_VISUALIZER_BARS: usize = 256;
const VISUALIZER_INTERVAL_MS: std::ops::RangeInclusive<u64> = 10..=10_000;

/// Main application configuration.
///
/// ## Sections:
/// - `server`: where the HTTP/WebSocket host listens
/// - `live`: which model and voice a session talks to
/// - `audio`: sample rates and capture frame size
/// - `visualizer`: shape and refresh rate of the level bars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub visualizer: VisualizerSettings,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: only the local UI can connect (default)
/// - `host = "0.0.0.0"`: accept connections from any address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Live model connection settings.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the `BidiGenerateContent` service
/// - `model`: model name sent in the setup frame
/// - `voice`: prebuilt voice used for synthesized replies
/// - `input_transcription` / `output_transcription`: ask the model for
///   transcripts of each side of the conversation
/// - `system_instruction`: persona prompt
/// - `api_key`: read from config or environment, never serialized
/// - `outbound_queue`: capacity of the per-session outbound audio queue;
///   frames beyond it are dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub system_instruction: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub outbound_queue: usize,
}

/// Audio format settings.
///
/// ## Defaults:
/// - capture at 16kHz in 4096-sample frames (~256 ms)
/// - playback at 24kHz, the rate the model speaks at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_size: usize,
}

/// Level meter settings. Bar values lie in `[floor, ceiling)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerSettings {
    pub bars: usize,
    pub interval_ms: u64,
    pub floor: u32,
    pub ceiling: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            live: LiveConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
                voice: "Zephyr".to_string(),
                input_transcription: true,
                output_transcription: true,
                system_instruction: "You are Lumina, a friendly and helpful real-time AI assistant. \
                    Keep responses naturally conversational and concise."
                    .to_string(),
                api_key: String::new(),
                outbound_queue: 32,
            },
            audio: AudioConfig {
                capture_sample_rate: 16_000,
                playback_sample_rate: 24_000,
                frame_size: 4096,
            },
            visualizer: VisualizerSettings {
                bars: 20,
                interval_ms: 100,
                floor: 10,
                ceiling: 50,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Apply the deployment-style `HOST` / `PORT` / API key variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: override server port
    /// - `APP_LIVE__VOICE=Puck`: override the voice
    /// - `GEMINI_API_KEY=...`: the live API key
    ///
    /// Nested keys use a double underscore so that field names containing a
    /// single underscore (`frame_size`) survive the mapping.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Some(key) = env::var("GEMINI_API_KEY").ok().or_else(|| env::var("API_KEY").ok()) {
            settings = settings.set_override("live.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - server port is not 0
    /// - endpoint is a `ws://` or `wss://` URL, model and voice are set
    /// - outbound queue holds between 1 and 1024 frames
    /// - sample rates lie in 1..=192000 Hz
    /// - a capture frame is non-empty and at most one second long
    /// - visualizer has 1..=256 bars, a 10..=10000 ms refresh interval and
    ///   `ceiling > floor`
    ///
    /// Every bound sizes a buffer the engine allocates, so nothing accepted
    /// here can exhaust memory. A missing API key is not a configuration
    /// error: the host still starts and each session start reports it.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !(self.live.endpoint.starts_with("ws://") || self.live.endpoint.starts_with("wss://")) {
            return Err(anyhow::anyhow!("Live endpoint must be a ws:// or wss:// URL"));
        }

        if self.live.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Live model cannot be empty"));
        }

        if self.live.voice.trim().is_empty() {
            return Err(anyhow::anyhow!("Voice name cannot be empty"));
        }

        if self.live.outbound_queue == 0 || self.live.outbound_queue > MAX_OUTBOUND_QUEUE {
            return Err(anyhow::anyhow!(
                "Outbound queue must hold between 1 and {} frames",
                MAX_OUTBOUND_QUEUE
            ));
        }

        for rate in [self.audio.capture_sample_rate, self.audio.playback_sample_rate] {
            if rate == 0 || rate > MAX_SAMPLE_RATE {
                return Err(anyhow::anyhow!(
                    "Sample rates must lie between 1 and {} Hz, got {}",
                    MAX_SAMPLE_RATE,
                    rate
                ));
            }
        }

        if self.audio.frame_size == 0 || self.audio.frame_size > self.audio.capture_sample_rate as usize {
            return Err(anyhow::anyhow!(
                "Capture frame size must be between 1 sample and one second ({} samples)",
                self.audio.capture_sample_rate
            ));
        }

        if self.visualizer.bars == 0 || self.visualizer.bars > MAX_VISUALIZER_BARS {
            return Err(anyhow::anyhow!(
                "Visualizer needs between 1 and {} bars",
                MAX_VISUALIZER_BARS
            ));
        }

        if !VISUALIZER_INTERVAL_MS.contains(&self.visualizer.interval_ms) {
            return Err(anyhow::anyhow!(
                "Visualizer interval must lie between {} and {} ms",
                VISUALIZER_INTERVAL_MS.start(),
                VISUALIZER_INTERVAL_MS.end()
            ));
        }

        if self.visualizer.ceiling <= self.visualizer.floor {
            return Err(anyhow::anyhow!("Visualizer ceiling must be above its floor"));
        }

        Ok(())
    }

    /// Whether a live API key is configured.
    pub fn has_api_key(&self) -> bool {
        !self.live.api_key.trim().is_empty()
    }

    /// Update configuration from a JSON string (used by PUT /api/v1/config).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON change, e.g.
    /// `{"live": {"voice": "Puck"}}`. Live, audio and visualizer changes take
    /// effect on the next session (the visualizer cadence immediately).
    ///
    /// ## Fixed at startup:
    /// - `server`: the listener is already bound, so any server key is rejected
    /// - `live.endpoint` and `live.api_key`: ignored
    ///
    /// Numbers must fit their field; an out-of-range value is an error, never
    /// truncated. The update is validated as a whole; on failure `self` is
    /// unchanged.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;
        let mut updated = self.clone();

        if partial_config.get("server").is_some() {
            return Err(anyhow::anyhow!(
                "Server settings are fixed at startup; restart with a new HOST/PORT instead"
            ));
        }

        if let Some(live) = partial_config.get("live") {
            if let Some(model) = live.get("model").and_then(|v| v.as_str()) {
                updated.live.model = model.to_string();
            }
            if let Some(voice) = live.get("voice").and_then(|v| v.as_str()) {
                updated.live.voice = voice.to_string();
            }
            if let Some(flag) = live.get("input_transcription").and_then(|v| v.as_bool()) {
                updated.live.input_transcription = flag;
            }
            if let Some(flag) = live.get("output_transcription").and_then(|v| v.as_bool()) {
                updated.live.output_transcription = flag;
            }
            if let Some(instruction) = live.get("system_instruction").and_then(|v| v.as_str()) {
                updated.live.system_instruction = instruction.to_string();
            }
            if let Some(queue) = read_int(live, "outbound_queue")? {
                updated.live.outbound_queue = queue;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = read_int(audio, "capture_sample_rate")? {
                updated.audio.capture_sample_rate = rate;
            }
            if let Some(rate) = read_int(audio, "playback_sample_rate")? {
                updated.audio.playback_sample_rate = rate;
            }
            if let Some(size) = read_int(audio, "frame_size")? {
                updated.audio.frame_size = size;
            }
        }

        if let Some(visualizer) = partial_config.get("visualizer") {
            if let Some(bars) = read_int(visualizer, "bars")? {
                updated.visualizer.bars = bars;
            }
            if let Some(interval) = read_int(visualizer, "interval_ms")? {
                updated.visualizer.interval_ms = interval;
            }
            if let Some(floor) = read_int(visualizer, "floor")? {
                updated.visualizer.floor = floor;
            }
            if let Some(ceiling) = read_int(visualizer, "ceiling")? {
                updated.visualizer.ceiling = ceiling;
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

/// Read an optional unsigned integer field, converting it to the field's type.
///
/// ## Rust Concepts:
/// - **TryFrom**: `4294983296` does not fit a `u32`, so it is an error rather
///   than silently wrapping the way an `as` cast would
fn read_int<T: TryFrom<u64>>(section: &serde_json::Value, key: &str) -> Result<Option<T>> {
    let Some(value) = section.get(key) else {
        return Ok(None);
    };
    let raw = value
        .as_u64()
        .ok_or_else(|| anyhow::anyhow!("{} must be a non-negative integer", key))?;
    T::try_from(raw)
        .map(Some)
        .map_err(|_| anyhow::anyhow!("{} value {} is out of range", key, raw))
}
