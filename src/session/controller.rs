//! # Voice Controller
//!
//! Cloneable handle onto a running [`VoiceEngine`](crate::session::engine::VoiceEngine).
//! Commands are fire-and-forget messages on the engine's input channel; the
//! UI surface is read straight from the engine's publisher.

use crate::error::VoiceError;
use crate::session::engine::{Command, EngineInput, SessionId, VoiceConfig};
use crate::session::ui::{UiEvent, UiPublisher, UiSnapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is connecting
    Connecting(SessionId),
    /// A session was already connecting or active; nothing changed
    AlreadyRunning,
    /// The attempt failed and the engine is back to idle
    Failed(VoiceError),
}

#[derive(Debug, Clone)]
pub struct VoiceController {
    tx: mpsc::UnboundedSender<EngineInput>,
    ui: Arc<UiPublisher>,
}

impl VoiceController {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineInput>, ui: Arc<UiPublisher>) -> Self {
        Self { tx, ui }
    }

    fn send(&self, command: Command) -> Result<(), VoiceError> {
        self.tx
            .send(EngineInput::Command(command))
            .map_err(|_| VoiceError::EngineStopped)
    }

    /// Request a new session without waiting for the outcome.
    pub fn start(&self) -> Result<(), VoiceError> {
        self.send(Command::Start { reply: None })
    }

    /// Request a new session and wait until the engine has tried to open it.
    ///
    /// Returns once the session is `Connecting` (or the attempt failed); it
    /// does not wait for the remote handshake.
    pub async fn start_and_wait(&self) -> Result<StartOutcome, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { reply: Some(reply) })?;
        rx.await.map_err(|_| VoiceError::EngineStopped)
    }

    pub fn stop(&self) -> Result<(), VoiceError> {
        self.send(Command::Stop)
    }

    /// Replace the settings used by the next session.
    pub fn reconfigure(&self, config: VoiceConfig) -> Result<(), VoiceError> {
        self.send(Command::Reconfigure(config))
    }

    /// Tear down any session and end the engine task.
    pub fn shutdown(&self) -> Result<(), VoiceError> {
        self.send(Command::Shutdown)
    }

    pub fn snapshot(&self) -> UiSnapshot {
        self.ui.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<UiSnapshot> {
        self.ui.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.ui.subscribe()
    }

    pub fn is_engine_running(&self) -> bool {
        !self.tx.is_closed()
    }
}
