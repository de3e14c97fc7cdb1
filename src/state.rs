//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<AppConfig>>
//! - **Arc**: every worker thread of the HTTP server holds a reference
//! - **RwLock**: many concurrent readers, one writer for `PUT /api/v1/config`
//!
//! ### VoiceController
//! The voice engine's state lives on its own task, not here. Handlers only
//! hold a cloneable controller that sends commands to that task and reads
//! its published snapshot, so no session state is ever locked by a handler.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::session::engine::VoiceConfig;
use crate::session::VoiceController;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::info;

/// The state shared by all request handlers.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: cloning only bumps reference counts; every clone
///   sees the same config and talks to the same engine
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Command handle onto the voice engine task
    pub voice: VoiceController,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, voice: VoiceController) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            voice,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately so readers never block each
    /// other for longer than the copy takes. A poisoned lock still holds a
    /// valid config (writers only ever assign whole values), so it is read
    /// through rather than propagated.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Validate and store a new configuration, then hand the voice settings
    /// to the engine for its next session.
    ///
    /// ## Error handling:
    /// - invalid configuration → `ValidationError`, nothing changes
    /// - engine gone → `Unavailable`, but the stored config is still updated
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), AppError> {
        new_config
            .validate()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let voice_config = VoiceConfig::from(&new_config);
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
        info!("Configuration updated");

        self.voice.reconfigure(voice_config)?;
        Ok(())
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
