//! # Live Transport Interface
//!
//! The engine's view of the remote model: a connector that opens one
//! bidirectional link per session, an outbound audio queue, and a stream of
//! inbound events delivered back into the engine's input channel.

use crate::audio::codec::WireChunk;
use crate::error::VoiceError;
use crate::session::engine::{EngineInput, SessionId};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Per-session options sent when the link opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    /// e.g. `models/gemini-2.5-flash-native-audio-preview-12-2025`
    pub model: String,
    /// Prebuilt voice name, e.g. `Zephyr`
    pub voice: String,
    /// Always `AUDIO` for this engine
    pub response_modality: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub system_instruction: String,
    /// Capacity of this session's outbound audio queue
    pub outbound_queue: usize,
}

/// Messages the engine sends toward the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Audio(WireChunk),
}

/// Everything the transport can report back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Handshake finished, the model is listening
    Opened,
    AudioDelta(WireChunk),
    InputTranscriptDelta(String),
    OutputTranscriptDelta(String),
    TurnComplete,
    /// The model abandoned its in-flight reply
    Interrupted,
    Error(String),
    /// The link went away; `None` when no reason was given
    Closed(Option<String>),
}

impl InboundEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Opened => "opened",
            InboundEvent::AudioDelta(_) => "audio_delta",
            InboundEvent::InputTranscriptDelta(_) => "input_transcript_delta",
            InboundEvent::OutputTranscriptDelta(_) => "output_transcript_delta",
            InboundEvent::TurnComplete => "turn_complete",
            InboundEvent::Interrupted => "interrupted",
            InboundEvent::Error(_) => "error",
            InboundEvent::Closed(_) => "closed",
        }
    }
}

/// Where a transport delivers inbound events for one session.
///
/// Every event is tagged with the session it belongs to, so the engine can
/// ignore anything that arrives after that session was torn down.
#[derive(Debug, Clone)]
pub struct InboundSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<EngineInput>,
}

impl InboundSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver one event. Returns `false` once the engine is gone.
    pub fn send(&self, event: InboundEvent) -> bool {
        self.tx
            .send(EngineInput::Transport {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// The engine's half of an open link.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::Sender<OutboundMessage>,
    close: Option<oneshot::Sender<()>>,
}

impl TransportLink {
    pub fn new(outbound: mpsc::Sender<OutboundMessage>, close: oneshot::Sender<()>) -> Self {
        Self {
            outbound,
            close: Some(close),
        }
    }

    /// A handle onto the bounded outbound queue.
    pub fn sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.outbound.clone()
    }

    /// Ask the connection task to shut down. Idempotent.
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
            debug!("Transport close requested");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_none()
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens links to a live model.
///
/// `connect` returns as soon as the link exists; the handshake finishes in
/// the background and is reported as [`InboundEvent::Opened`] (or
/// `Error`/`Closed`) through `sink`.
pub trait LiveConnector: Send + Sync {
    fn connect(&self, setup: &LiveSetup, sink: InboundSink) -> Result<TransportLink, VoiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_events_with_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionId::new();
        let sink = InboundSink::new(session, tx);

        assert!(sink.send(InboundEvent::TurnComplete));
        match rx.try_recv().unwrap() {
            EngineInput::Transport { session: tagged, event } => {
                assert_eq!(tagged, session);
                assert_eq!(event, InboundEvent::TurnComplete);
            }
            _ => panic!("expected a transport event"),
        }

        drop(rx);
        assert!(!sink.send(InboundEvent::Opened));
    }

    #[test]
    fn test_link_close_is_idempotent() {
        let (outbound, _outbound_rx) = mpsc::channel(1);
        let (close_tx, mut close_rx) = oneshot::channel();
        let mut link = TransportLink::new(outbound, close_tx);

        link.close();
        link.close();
        assert!(link.is_closed());
        assert!(close_rx.try_recv().is_ok());
    }
}
