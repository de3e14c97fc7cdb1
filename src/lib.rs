//! # Lumina Voice
//!
//! Real-time voice conversation host: microphone audio is streamed to a live
//! speech model, its spoken replies are played back gap-free, and the
//! transcript plus a level meter are published to a UI over HTTP and
//! WebSocket.
//!
//! ## Module Map:
//! - **audio**: PCM codec, device interfaces, capture gate, playback scheduler
//! - **live**: transport contract and the Gemini Live WebSocket binding
//! - **session**: the engine state machine, transcript, visualizer, UI surface
//! - **config** / **state** / **error**: ambient host plumbing
//! - **handlers** / **health** / **websocket**: the HTTP surface

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod live;
pub mod session;
pub mod state;
pub mod websocket;

#[cfg(test)]
mod testing;
