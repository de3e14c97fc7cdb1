//! # HTTP Request Handlers
//!
//! - **config**: read and update the running configuration
//! - **voice**: inspect, start and stop the voice session

pub mod config;
pub mod voice;

pub use config::*;
pub use voice::*;
