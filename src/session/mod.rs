//! # Voice Session
//!
//! The live session state machine and the pieces it coordinates.
//!
//! ## Key Components:
//! - **Engine**: the task that owns all session state
//! - **Controller**: cloneable command handle for the host
//! - **Transcript**: per-turn buffers and the append-only log
//! - **Visualizer**: cosmetic level bars
//! - **UI**: snapshot + event stream published to the presentation layer

pub mod controller;
pub mod engine;
pub mod transcript;
pub mod ui;
pub mod visualizer;

pub use controller::{StartOutcome, VoiceController};
pub use engine::{SessionId, VoiceConfig, VoiceEngine};
pub use transcript::{Speaker, TranscriptLine};
pub use ui::{SessionPhase, SessionStats, UiEvent, UiSnapshot};
