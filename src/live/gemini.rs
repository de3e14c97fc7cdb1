//! # Gemini Live Connector
//!
//! [`LiveConnector`] over the Gemini Live `BidiGenerateContent` WebSocket.
//!
//! ## Connection Task:
//! `connect` returns a [`TransportLink`] immediately and spawns one task per
//! session that:
//! 1. opens the socket and sends the `setup` frame
//! 2. forwards queued outbound audio as `realtimeInput` frames
//! 3. decodes server frames into [`InboundEvent`]s for the engine
//! 4. stops on the link's close signal, a socket error, or a remote close
//!
//! Socket failures are reported as `Error`, a remote close as `Closed`. A
//! close requested by the engine reports nothing.

use crate::error::VoiceError;
use crate::live::protocol::{decode_server_message, encode_audio, encode_setup};
use crate::live::transport::{
    InboundEvent, InboundSink, LiveConnector, LiveSetup, OutboundMessage, TransportLink,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Production endpoint of the live API.
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    endpoint: String,
    api_key: String,
}

impl GeminiLiveConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, separator, self.api_key)
    }
}

impl LiveConnector for GeminiLiveConnector {
    fn connect(&self, setup: &LiveSetup, sink: InboundSink) -> Result<TransportLink, VoiceError> {
        if self.api_key.trim().is_empty() {
            return Err(VoiceError::Transport(
                "no API key configured (set GEMINI_API_KEY)".to_string(),
            ));
        }

        let setup_frame = encode_setup(setup)
            .map_err(|e| VoiceError::Transport(format!("failed to encode setup: {}", e)))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(setup.outbound_queue.max(1));
        let (close_tx, close_rx) = oneshot::channel();

        info!(
            session = %sink.session(),
            endpoint = %self.endpoint,
            model = %setup.model,
            voice = %setup.voice,
            "Opening live connection"
        );
        tokio::spawn(run_connection(self.url(), setup_frame, sink, outbound_rx, close_rx));

        Ok(TransportLink::new(outbound_tx, close_tx))
    }
}

async fn run_connection(
    url: String,
    setup_frame: String,
    sink: InboundSink,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    mut close: oneshot::Receiver<()>,
) {
    let session = sink.session();

    let connected = tokio::select! {
        _ = &mut close => {
            debug!(%session, "Connection closed before the socket opened");
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            sink.send(InboundEvent::Error(format!("failed to connect: {}", e)));
            return;
        }
    };

    let (mut write, mut read) = socket.split();

    if let Err(e) = write.send(Message::Text(setup_frame)).await {
        sink.send(InboundEvent::Error(format!("failed to send setup: {}", e)));
        return;
    }
    debug!(%session, "Setup sent, waiting for setupComplete");

    loop {
        tokio::select! {
            _ = &mut close => {
                let _ = write.send(Message::Close(None)).await;
                let _ = write.close().await;
                debug!(%session, "Live connection closed locally");
                break;
            }
            message = outbound.recv() => match message {
                Some(OutboundMessage::Audio(chunk)) => {
                    let text = match encode_audio(&chunk) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(%session, error = %e, "Failed to encode audio frame");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        sink.send(InboundEvent::Error(format!("send failed: {}", e)));
                        break;
                    }
                }
                None => {
                    debug!(%session, "Outbound queue closed");
                    let _ = write.close().await;
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(&sink, &text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => deliver(&sink, &text),
                    Err(_) => warn!(%session, "Skipping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    info!(%session, reason = ?reason, "Live connection closed by server");
                    sink.send(InboundEvent::Closed(reason));
                    break;
                }
                // Ping/pong is answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.send(InboundEvent::Error(format!("receive failed: {}", e)));
                    break;
                }
                None => {
                    sink.send(InboundEvent::Closed(None));
                    break;
                }
            }
        }
    }
}

fn deliver(sink: &InboundSink, text: &str) {
    let message = match decode_server_message(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(session = %sink.session(), error = %e, "Skipping unparseable server frame");
            return;
        }
    };

    if let Some(time_left) = message.go_away() {
        warn!(session = %sink.session(), time_left, "Server announced disconnect");
    }

    for event in message.into_events() {
        if !sink.send(event) {
            return;
        }
    }
}
