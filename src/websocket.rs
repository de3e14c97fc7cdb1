//! # Voice UI WebSocket Handler
//!
//! Pushes the voice engine's UI events to a connected front-end and accepts
//! session commands from it. Clients connect to `/ws/voice`.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the server immediately sends a `snapshot` message with
//!    the full current UI state
//! 2. **Events**: `state`, `transcript`, `visualizer`, `warning` and `error`
//!    messages follow as the engine publishes them
//! 3. **Commands**: the client may send `start`, `stop` or `ping`
//! 4. **Heartbeat**: the server pings every 30 s and drops clients silent for 60 s
//!
//! ## Message Format:
//! All messages are JSON objects tagged by a `type` field. Audio never
//! crosses this socket; the engine talks to the sound card directly.

use crate::session::{SessionId, StartOutcome, UiEvent, UiSnapshot, VoiceController};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Commands a client can send.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a voice session
    Start,
    /// Stop the running voice session
    Stop,
    /// Latency probe, answered with `pong`
    Ping {
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

/// Messages the server sends that are not engine UI events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full UI state, sent on connect and after the client fell behind
    Snapshot { snapshot: UiSnapshot },
    /// Answer to a `start` command
    StartResult {
        status: &'static str,
        session_id: Option<SessionId>,
        error: Option<String>,
    },
    Pong { timestamp: Option<u64> },
    Ping { timestamp: u64 },
    /// Problem with the client's message itself
    Error { code: String, message: String },
}

impl ServerMessage {
    fn start_result(outcome: &StartOutcome) -> Self {
        match outcome {
            StartOutcome::Connecting(id) => ServerMessage::StartResult {
                status: "connecting",
                session_id: Some(*id),
                error: None,
            },
            StartOutcome::AlreadyRunning => ServerMessage::StartResult {
                status: "already_running",
                session_id: None,
                error: None,
            },
            StartOutcome::Failed(e) => ServerMessage::StartResult {
                status: "failed",
                session_id: None,
                error: Some(e.to_string()),
            },
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// WebSocket actor bridging one UI client to the voice engine.
///
/// ## Actor Model:
/// Each connection is an independent actor. It consumes two streams:
/// frames from the client and the engine's broadcast of UI events.
pub struct VoiceWebSocket {
    voice: VoiceController,
    last_heartbeat: Instant,
}

impl VoiceWebSocket {
    pub fn new(voice: VoiceController) -> Self {
        Self {
            voice,
            last_heartbeat: Instant::now(),
        }
    }

    fn send<T: Serialize>(&self, ctx: &mut ws::WebsocketContext<Self>, message: &T) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize WebSocket message: {}", e),
        }
    }

    fn send_snapshot(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let snapshot = self.voice.snapshot();
        self.send(ctx, &ServerMessage::Snapshot { snapshot });
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!("WebSocket error {}: {}", code, message);
        self.send(
            ctx,
            &ServerMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }

    fn handle_start(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let voice = self.voice.clone();
        let reply = async move { voice.start_and_wait().await }
            .into_actor(self)
            .map(|result, act, ctx| match result {
                Ok(outcome) => act.send(ctx, &ServerMessage::start_result(&outcome)),
                Err(e) => act.send_error(ctx, e.code(), &e.to_string()),
            });
        ctx.spawn(reply);
    }

    fn handle_stop(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Err(e) = self.voice.stop() {
            self.send_error(ctx, e.code(), &e.to_string());
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Start) => self.handle_start(ctx),
            Ok(ClientMessage::Stop) => self.handle_stop(ctx),
            Ok(ClientMessage::Ping { timestamp }) => {
                self.last_heartbeat = Instant::now();
                self.send(ctx, &ServerMessage::Pong { timestamp });
            }
            Err(err) => self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err)),
        }
    }
}

impl Actor for VoiceWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Subscribe to engine events, send the initial snapshot, start the heartbeat.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Voice WebSocket connection started");

        ctx.add_stream(BroadcastStream::new(self.voice.subscribe()));
        self.send_snapshot(ctx);

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            act.send(ctx, &ServerMessage::Ping { timestamp: now_millis() });
            ctx.ping(b"");
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Voice WebSocket connection stopped");
    }
}

/// Engine UI events, forwarded as-is.
impl StreamHandler<Result<UiEvent, BroadcastStreamRecvError>> for VoiceWebSocket {
    fn handle(&mut self, event: Result<UiEvent, BroadcastStreamRecvError>, ctx: &mut Self::Context) {
        match event {
            Ok(event) => self.send(ctx, &event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                debug!(missed, "WebSocket client fell behind, resending snapshot");
                self.send_snapshot(ctx);
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        info!("Voice engine event stream ended, closing WebSocket");
        ctx.stop();
    }
}

/// Frames from the client.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "unsupported", "Binary frames are not accepted on this socket");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Upgrades the request and hands the connection to a [`VoiceWebSocket`]
/// actor holding its own controller clone.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New voice WebSocket connection from: {:?}", req.connection_info().peer_addr());
    ws::start(VoiceWebSocket::new(app_state.voice.clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;

    #[test]
    fn test_client_message_parsing() {
        assert_eq!(serde_json::from_str::<ClientMessage>(r#"{"type":"start"}"#).unwrap(), ClientMessage::Start);
        assert_eq!(serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#).unwrap(), ClientMessage::Stop);
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping","timestamp":42}"#).unwrap(),
            ClientMessage::Ping { timestamp: Some(42) }
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping { timestamp: None }
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"record"}"#).is_err());
    }

    #[test]
    fn test_start_result_messages() {
        let failed = ServerMessage::start_result(&StartOutcome::Failed(VoiceError::AccessDenied("denied".into())));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["type"], "start_result");
        assert_eq!(json["status"], "failed");
        assert!(json["error"].as_str().unwrap().contains("denied"));

        let running = serde_json::to_value(ServerMessage::start_result(&StartOutcome::AlreadyRunning)).unwrap();
        assert_eq!(running["status"], "already_running");
        assert!(running["session_id"].is_null());
    }

    #[test]
    fn test_snapshot_message_shape() {
        let message = ServerMessage::Snapshot { snapshot: UiSnapshot::new(vec![10; 20]) };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["snapshot"]["phase"], "idle");
        assert_eq!(json["snapshot"]["active"], false);
        assert_eq!(json["snapshot"]["visualizer"].as_array().unwrap().len(), 20);
    }
}
