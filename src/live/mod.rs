//! # Live Model Transport
//!
//! ## Key Components:
//! - **Transport**: the connector trait, link handle and event types the
//!   engine is written against
//! - **Protocol**: serde frames of the Gemini Live API
//! - **Gemini**: the WebSocket connector used in production

pub mod gemini;
pub mod protocol;
pub mod transport;

pub use gemini::GeminiLiveConnector;
pub use transport::{InboundEvent, InboundSink, LiveConnector, LiveSetup, OutboundMessage, TransportLink};
