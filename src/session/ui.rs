//! # UI Surface
//!
//! What the presentation layer sees of the engine:
//! - a [`UiSnapshot`] kept current in a `watch` channel (late joiners read it
//!   once and are up to date)
//! - a stream of [`UiEvent`]s on a `broadcast` channel (incremental updates)
//!
//! Only the engine task publishes; any number of readers subscribe.

use crate::error::VoiceError;
use crate::session::engine::SessionId;
use crate::session::transcript::TranscriptLine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::{broadcast, watch};

/// Lifecycle position of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    Closed,
    Error,
}

impl SessionPhase {
    /// A session exists (or is being set up) in this phase.
    pub fn is_running(&self) -> bool {
        matches!(self, SessionPhase::Connecting | SessionPhase::Active)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Active => "active",
            SessionPhase::Closed => "closed",
            SessionPhase::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Counters kept across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub sessions_started: u64,
    pub sessions_failed: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub chunks_scheduled: u64,
    pub malformed_chunks: u64,
    pub interruptions: u64,
    pub turns_completed: u64,
}

/// A surfaced failure or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&VoiceError> for ErrorReport {
    fn from(error: &VoiceError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

/// Everything a UI needs to render the voice view.
#[derive(Debug, Clone, Serialize)]
pub struct UiSnapshot {
    pub phase: SessionPhase,
    pub active: bool,
    pub connecting: bool,
    pub session_id: Option<SessionId>,
    pub transcript: Vec<TranscriptLine>,
    pub visualizer: Vec<u32>,
    pub last_error: Option<ErrorReport>,
    pub stats: SessionStats,
}

impl UiSnapshot {
    pub fn new(visualizer: Vec<u32>) -> Self {
        Self {
            phase: SessionPhase::Idle,
            active: false,
            connecting: false,
            session_id: None,
            transcript: Vec::new(),
            visualizer,
            last_error: None,
            stats: SessionStats::default(),
        }
    }
}

/// Incremental updates pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    State {
        phase: SessionPhase,
        active: bool,
        connecting: bool,
        session_id: Option<SessionId>,
    },
    /// Lines appended to the transcript log
    Transcript { lines: Vec<TranscriptLine> },
    Visualizer { bars: Vec<u32> },
    /// Non-fatal problem, the session continues
    Warning { code: String, message: String },
    /// The session failed
    Error { code: String, message: String },
}

/// Publishing half of the UI surface, owned by the engine.
#[derive(Debug)]
pub struct UiPublisher {
    snapshot: watch::Sender<UiSnapshot>,
    events: broadcast::Sender<UiEvent>,
}

impl UiPublisher {
    pub fn new(initial: UiSnapshot, event_capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self { snapshot, events }
    }

    pub fn snapshot(&self) -> UiSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<UiSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// Publish a phase change. `active` and `connecting` are derived from the
    /// phase so they can never disagree with it.
    pub fn set_phase(&self, phase: SessionPhase, session_id: Option<SessionId>) {
        let active = phase == SessionPhase::Active;
        let connecting = phase == SessionPhase::Connecting;
        self.snapshot.send_modify(|snapshot| {
            snapshot.phase = phase;
            snapshot.active = active;
            snapshot.connecting = connecting;
            snapshot.session_id = session_id;
        });
        self.emit(UiEvent::State {
            phase,
            active,
            connecting,
            session_id,
        });
    }

    pub fn append_transcript(&self, lines: Vec<TranscriptLine>) {
        if lines.is_empty() {
            return;
        }
        self.snapshot
            .send_modify(|snapshot| snapshot.transcript.extend(lines.iter().cloned()));
        self.emit(UiEvent::Transcript { lines });
    }

    pub fn set_visualizer(&self, bars: Vec<u32>) {
        let changed = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.visualizer == bars {
                return false;
            }
            snapshot.visualizer = bars.clone();
            true
        });
        if changed {
            self.emit(UiEvent::Visualizer { bars });
        }
    }

    pub fn warning(&self, error: &VoiceError) {
        self.emit(UiEvent::Warning {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    /// Record and announce a session failure.
    pub fn error(&self, error: &VoiceError) {
        let report = ErrorReport::from(error);
        self.snapshot
            .send_modify(|snapshot| snapshot.last_error = Some(report.clone()));
        self.emit(UiEvent::Error {
            code: report.code,
            message: report.message,
        });
    }

    pub fn set_stats(&self, stats: &SessionStats) {
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.stats == *stats {
                return false;
            }
            snapshot.stats = stats.clone();
            true
        });
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine; the snapshot still carries the state.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::transcript::Speaker;

    fn publisher() -> UiPublisher {
        UiPublisher::new(UiSnapshot::new(vec![10; 20]), 16)
    }

    #[test]
    fn test_phase_drives_flags() {
        let ui = publisher();
        let mut events = ui.subscribe();

        ui.set_phase(SessionPhase::Connecting, Some(SessionId::new()));
        let snapshot = ui.snapshot();
        assert!(snapshot.connecting);
        assert!(!snapshot.active);

        ui.set_phase(SessionPhase::Active, snapshot.session_id);
        assert!(ui.snapshot().active);
        assert!(!ui.snapshot().connecting);

        assert!(matches!(events.try_recv().unwrap(), UiEvent::State { connecting: true, .. }));
        assert!(matches!(events.try_recv().unwrap(), UiEvent::State { active: true, .. }));
    }

    #[test]
    fn test_error_is_kept_in_snapshot() {
        let ui = publisher();
        ui.error(&VoiceError::Transport("socket reset".into()));

        let report = ui.snapshot().last_error.unwrap();
        assert_eq!(report.code, "transport_error");
        assert!(report.message.contains("socket reset"));
    }

    #[test]
    fn test_unchanged_visualizer_is_not_rebroadcast() {
        let ui = publisher();
        let mut events = ui.subscribe();

        ui.set_visualizer(vec![10; 20]);
        assert!(events.try_recv().is_err());

        ui.set_visualizer(vec![12; 20]);
        assert!(matches!(events.try_recv().unwrap(), UiEvent::Visualizer { .. }));
    }

    #[test]
    fn test_event_json_is_type_tagged() {
        let event = UiEvent::Transcript {
            lines: vec![TranscriptLine { speaker: Speaker::User, text: "Hello".into(), at: Utc::now() }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transcript");
        assert_eq!(json["lines"][0]["speaker"], "user");

        let json = serde_json::to_value(UiEvent::Warning { code: "malformed_audio".into(), message: "x".into() }).unwrap();
        assert_eq!(json["type"], "warning");
    }
}
