//! # Voice Session Engine
//!
//! The single serialization point of the voice pipeline. One tokio task owns
//! all session state and consumes one input channel fed by:
//! - the [`VoiceController`] (start, stop, reconfigure, shutdown)
//! - the transport's connection task (inbound events)
//! - playback timers (a scheduled unit finished)
//!
//! Because nothing else touches session state, no locks guard it.
//!
//! ## Lifecycle:
//! ```text
//! Idle/Closed --start--> Connecting --opened--> Active
//! Connecting|Active --stop--> Closed
//! Connecting|Active --error/closed--> Error --> Idle
//! ```
//!
//! ## Teardown Order:
//! 1. stop capture (gate closed, microphone released)
//! 2. stop every scheduled playback unit
//! 3. close the transport
//!
//! Every input carries the [`SessionId`] it belongs to; input for a session
//! that is no longer current is ignored.

use crate::audio::capture::CapturePipeline;
use crate::audio::codec::PcmCodec;
use crate::audio::device::{AudioDevices, CaptureConfig, PlaybackHandle};
use crate::audio::playback::{PlaybackScheduler, ScheduledUnit};
use crate::config::AppConfig;
use crate::error::VoiceError;
use crate::live::transport::{InboundEvent, InboundSink, LiveConnector, LiveSetup, TransportLink};
use crate::session::controller::{StartOutcome, VoiceController};
use crate::session::transcript::{TranscriptLog, TurnTranscript};
use crate::session::ui::{SessionPhase, SessionStats, UiPublisher, UiSnapshot};
use crate::session::visualizer::{Visualizer, VisualizerConfig};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Capacity of the UI event broadcast channel.
const UI_EVENT_CAPACITY: usize = 256;

/// Identifies one session from `start` to teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings a session is started with. Changing them never affects a
/// session that is already running.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub live: LiveSetup,
    pub capture: CaptureConfig,
    pub playback_sample_rate: u32,
    pub visualizer: VisualizerConfig,
}

impl From<&AppConfig> for VoiceConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            live: LiveSetup {
                model: config.live.model.clone(),
                voice: config.live.voice.clone(),
                response_modality: "AUDIO".to_string(),
                input_transcription: config.live.input_transcription,
                output_transcription: config.live.output_transcription,
                system_instruction: config.live.system_instruction.clone(),
                outbound_queue: config.live.outbound_queue,
            },
            capture: CaptureConfig {
                sample_rate: config.audio.capture_sample_rate,
                frame_size: config.audio.frame_size,
            },
            playback_sample_rate: config.audio.playback_sample_rate,
            visualizer: VisualizerConfig {
                bars: config.visualizer.bars,
                interval: Duration::from_millis(config.visualizer.interval_ms),
                floor: config.visualizer.floor,
                ceiling: config.visualizer.ceiling,
            },
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Requests from the controller.
#[derive(Debug)]
pub enum Command {
    Start {
        reply: Option<oneshot::Sender<StartOutcome>>,
    },
    Stop,
    Reconfigure(VoiceConfig),
    Shutdown,
}

/// Everything the engine task consumes.
#[derive(Debug)]
pub enum EngineInput {
    Command(Command),
    Transport {
        session: SessionId,
        event: InboundEvent,
    },
    PlaybackEnded {
        session: SessionId,
        handle: PlaybackHandle,
    },
}

/// The single live connection and everything it owns.
pub struct SessionHandle {
    id: SessionId,
    capture: CapturePipeline,
    link: TransportLink,
    playback: PlaybackScheduler,
    playback_codec: PcmCodec,
    turn: TurnTranscript,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Release everything in teardown order. Returns the capture counters
    /// (sent, dropped) so they can be folded into the engine's stats.
    fn teardown(mut self) -> (u64, u64) {
        self.capture.stop();
        let stopped = self.playback.stop_all();
        self.link.close();

        if !self.turn.is_empty() {
            debug!(session = %self.id, "Discarding unfinished turn");
            self.turn.discard();
        }
        debug!(session = %self.id, stopped, "Session torn down");

        let gate = self.capture.gate();
        (gate.frames_sent(), gate.frames_dropped())
    }
}

pub struct VoiceEngine {
    config: VoiceConfig,
    devices: AudioDevices,
    connector: Arc<dyn LiveConnector>,
    inputs: mpsc::UnboundedReceiver<EngineInput>,
    /// Weak so the engine's own handle never keeps its channel open
    self_tx: mpsc::WeakUnboundedSender<EngineInput>,
    session: Option<SessionHandle>,
    phase: SessionPhase,
    log: TranscriptLog,
    stats: SessionStats,
    visualizer: Visualizer,
    ui: Arc<UiPublisher>,
}

impl VoiceEngine {
    /// Build the engine and the controller that drives it. Nothing runs
    /// until [`VoiceEngine::run`] is spawned.
    pub fn new(
        config: VoiceConfig,
        devices: AudioDevices,
        connector: Arc<dyn LiveConnector>,
    ) -> (Self, VoiceController) {
        let (tx, inputs) = mpsc::unbounded_channel();
        let visualizer = Visualizer::new(config.visualizer);
        let ui = Arc::new(UiPublisher::new(
            UiSnapshot::new(visualizer.idle()),
            UI_EVENT_CAPACITY,
        ));

        let engine = Self {
            config,
            devices,
            connector,
            inputs,
            self_tx: tx.downgrade(),
            session: None,
            phase: SessionPhase::Idle,
            log: TranscriptLog::default(),
            stats: SessionStats::default(),
            visualizer,
            ui: Arc::clone(&ui),
        };
        (engine, VoiceController::new(tx, ui))
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(SessionHandle::id)
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.log
    }

    /// Stats across all sessions, including the running one's counters.
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        if let Some(session) = &self.session {
            stats.frames_sent += session.capture.gate().frames_sent();
            stats.frames_dropped += session.capture.gate().frames_dropped();
        }
        stats
    }

    /// Main loop. Ends on `Shutdown` or when every controller is dropped.
    pub async fn run(mut self) {
        let mut period = self.tick_period();
        let mut ticker = visualizer_ticker(period);

        info!("Voice engine started");
        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => {
                        if !self.handle(input) {
                            break;
                        }
                        if self.tick_period() != period {
                            period = self.tick_period();
                            ticker = visualizer_ticker(period);
                            debug!(?period, "Visualizer cadence changed");
                        }
                    }
                    None => break,
                },
                _ = ticker.tick(), if self.phase == SessionPhase::Active => {
                    self.refresh_visualizer();
                }
            }
        }

        if self.phase.is_running() {
            self.close_session(SessionPhase::Closed);
        }
        info!("Voice engine stopped");
    }

    /// Apply one input. Returns `false` when the engine should exit.
    pub fn handle(&mut self, input: EngineInput) -> bool {
        match input {
            EngineInput::Command(Command::Start { reply }) => {
                let outcome = self.start();
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            EngineInput::Command(Command::Stop) => self.stop(),
            EngineInput::Command(Command::Reconfigure(config)) => self.reconfigure(config),
            EngineInput::Command(Command::Shutdown) => {
                if self.phase.is_running() {
                    self.close_session(SessionPhase::Closed);
                }
                info!("Voice engine shutting down");
                return false;
            }
            EngineInput::Transport { session, event } => self.on_transport(session, event),
            EngineInput::PlaybackEnded { session, handle } => self.on_playback_ended(session, handle),
        }
        self.ui.set_stats(&self.stats());
        true
    }

    fn start(&mut self) -> StartOutcome {
        if self.phase.is_running() {
            info!(phase = %self.phase, "Start ignored, a session is already running");
            return StartOutcome::AlreadyRunning;
        }

        let id = SessionId::new();
        self.stats.sessions_started += 1;
        self.phase = SessionPhase::Connecting;
        self.ui.set_phase(SessionPhase::Connecting, Some(id));
        info!(session = %id, model = %self.config.live.model, "Starting voice session");

        match self.open_session(id) {
            Ok(session) => {
                self.session = Some(session);
                StartOutcome::Connecting(id)
            }
            Err(e) => {
                self.fail(id, e.clone());
                StartOutcome::Failed(e)
            }
        }
    }

    /// Acquire output, microphone and transport, in that order. Whatever was
    /// acquired is released again if a later step fails.
    fn open_session(&self, id: SessionId) -> Result<SessionHandle, VoiceError> {
        let tx = self.self_tx.upgrade().ok_or(VoiceError::EngineStopped)?;

        let output = self.devices.playback.open(self.config.playback_sample_rate)?;
        let mut stream = CapturePipeline::acquire(self.devices.capture.as_ref(), &self.config.capture)?;

        let link = match self.connector.connect(&self.config.live, InboundSink::new(id, tx)) {
            Ok(link) => link,
            Err(e) => {
                stream.release();
                return Err(e);
            }
        };

        let capture = CapturePipeline::attach(
            stream,
            PcmCodec::new(self.config.capture.sample_rate),
            link.sender(),
        );

        Ok(SessionHandle {
            id,
            capture,
            link,
            playback: PlaybackScheduler::new(output),
            playback_codec: PcmCodec::new(self.config.playback_sample_rate),
            turn: TurnTranscript::default(),
        })
    }

    fn stop(&mut self) {
        if !self.phase.is_running() {
            debug!(phase = %self.phase, "Stop ignored, no session running");
            return;
        }
        self.close_session(SessionPhase::Closed);
    }

    fn reconfigure(&mut self, config: VoiceConfig) {
        info!(
            model = %config.live.model,
            voice = %config.live.voice,
            "Voice configuration updated for the next session"
        );
        if config.visualizer != *self.visualizer.config() {
            self.visualizer = Visualizer::new(config.visualizer);
        }
        self.config = config;
    }

    fn on_transport(&mut self, session_id: SessionId, event: InboundEvent) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id) else {
            debug!(session = %session_id, kind = event.kind(), "Ignoring event from a stale session");
            return;
        };

        match event {
            InboundEvent::Opened => {
                if self.phase == SessionPhase::Connecting {
                    session.capture.open();
                    self.phase = SessionPhase::Active;
                    self.ui.set_phase(SessionPhase::Active, Some(session_id));
                    info!(session = %session_id, "Voice session active");
                }
            }
            InboundEvent::AudioDelta(chunk) => match session.playback_codec.decode(&chunk) {
                Ok(frame) => {
                    let unit = session.playback.enqueue(frame);
                    let ends_in = unit.start + unit.duration - session.playback.now();
                    self.stats.chunks_scheduled += 1;
                    self.schedule_completion(session_id, unit, ends_in);
                }
                Err(e) => {
                    self.stats.malformed_chunks += 1;
                    warn!(session = %session_id, error = %e, "Dropping inbound audio chunk");
                    self.ui.warning(&e);
                }
            },
            InboundEvent::InputTranscriptDelta(text) => session.turn.push_user(&text),
            InboundEvent::OutputTranscriptDelta(text) => session.turn.push_model(&text),
            InboundEvent::TurnComplete => {
                let lines = session.turn.complete(Utc::now());
                if !lines.is_empty() {
                    self.stats.turns_completed += 1;
                    self.log.append(lines.iter().cloned());
                    self.ui.append_transcript(lines);
                }
            }
            InboundEvent::Interrupted => {
                let stopped = session.playback.interrupt();
                self.stats.interruptions += 1;
                info!(session = %session_id, stopped, "Model reply interrupted");
            }
            InboundEvent::Error(cause) => self.fail(session_id, VoiceError::Transport(cause)),
            InboundEvent::Closed(reason) => {
                let cause = match reason {
                    Some(reason) => format!("connection closed: {}", reason),
                    None => "connection closed".to_string(),
                };
                self.fail(session_id, VoiceError::Transport(cause));
            }
        }
    }

    fn on_playback_ended(&mut self, session_id: SessionId, handle: PlaybackHandle) {
        match self.session.as_mut() {
            Some(session) if session.id == session_id => {
                session.playback.complete(handle);
            }
            _ => debug!(session = %session_id, "Ignoring playback completion from a stale session"),
        }
    }

    /// Post `PlaybackEnded` back into the engine once the unit has played.
    fn schedule_completion(&self, session: SessionId, unit: ScheduledUnit, ends_in: f64) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let delay = Duration::from_secs_f64(ends_in.max(0.0));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineInput::PlaybackEnded {
                session,
                handle: unit.handle,
            });
        });
    }

    /// Tear down the current session (if any) and publish the resting phase.
    fn close_session(&mut self, phase: SessionPhase) {
        if let Some(session) = self.session.take() {
            let id = session.id;
            let (sent, dropped) = session.teardown();
            self.stats.frames_sent += sent;
            self.stats.frames_dropped += dropped;
            info!(session = %id, frames_sent = sent, frames_dropped = dropped, "Voice session closed");
        }
        self.phase = phase;
        self.ui.set_phase(phase, None);
        self.ui.set_visualizer(self.visualizer.idle());
    }

    /// Fatal failure of a start attempt or a running session.
    fn fail(&mut self, session_id: SessionId, cause: VoiceError) {
        error!(session = %session_id, error = %cause, "Voice session failed");
        self.stats.sessions_failed += 1;
        self.ui.error(&cause);

        self.close_session(SessionPhase::Error);
        self.close_session(SessionPhase::Idle);
    }

    fn tick_period(&self) -> Duration {
        self.visualizer.config().interval.max(Duration::from_millis(1))
    }

    fn refresh_visualizer(&mut self) {
        let level = match &self.session {
            Some(session) => session.capture.gate().level(),
            None => 0.0,
        };
        let bars = self.visualizer.frame(level);
        self.ui.set_visualizer(bars);
    }
}

fn visualizer_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
