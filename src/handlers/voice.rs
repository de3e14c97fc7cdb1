//! # Voice Session Endpoints
//!
//! HTTP counterpart of the WebSocket commands, for clients that only poll.
//!
//! ## Routes:
//! - `GET  /api/v1/voice`: current UI snapshot (phase, transcript, level bars, last error)
//! - `POST /api/v1/voice/start`: open a session
//! - `POST /api/v1/voice/stop`: tear the session down

use crate::error::AppError;
use crate::session::StartOutcome;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

pub async fn get_voice(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.voice.snapshot()))
}

/// Start a session and report how the attempt went.
///
/// ## Responses:
/// - **202**: devices acquired, connection opening (`status: "connecting"`)
/// - **409**: a session is already connecting or active
/// - **503**: microphone refused, output missing or connection refused
pub async fn start_voice(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    match state.voice.start_and_wait().await? {
        StartOutcome::Connecting(session_id) => {
            info!(%session_id, "Voice session starting");
            Ok(HttpResponse::Accepted().json(json!({
                "status": "connecting",
                "session_id": session_id,
                "timestamp": chrono::Utc::now().to_rfc3339()
            })))
        }
        StartOutcome::AlreadyRunning => Err(AppError::Conflict(
            "a voice session is already running".to_string(),
        )),
        StartOutcome::Failed(error) => Err(error.into()),
    }
}

/// Stopping is always accepted; with no session running it changes nothing.
pub async fn stop_voice(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.voice.stop()?;
    Ok(HttpResponse::Accepted().json(json!({
        "status": "stopping",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::AudioDevices;
    use crate::config::AppConfig;
    use crate::session::{VoiceConfig, VoiceEngine};
    use crate::testing::{FakeCapture, FakeConnector, ManualPlayback};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn spawn_state(capture: FakeCapture) -> AppState {
        let config = AppConfig::default();
        let devices = AudioDevices {
            capture: Arc::new(capture),
            playback: Arc::new(ManualPlayback::default()),
        };
        let (engine, controller) = VoiceEngine::new(
            VoiceConfig::from(&config),
            devices,
            Arc::new(FakeConnector::default()),
        );
        tokio::spawn(engine.run());
        AppState::new(config, controller)
    }

    macro_rules! voice_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/voice", web::get().to(get_voice))
                    .route("/voice/start", web::post().to(start_voice))
                    .route("/voice/stop", web::post().to(stop_voice)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_start_then_conflict() {
        let app = voice_app!(spawn_state(FakeCapture::default()));

        let resp = test::call_service(&app, test::TestRequest::post().uri("/voice/start").to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "connecting");
        assert!(body["session_id"].is_string());

        let resp = test::call_service(&app, test::TestRequest::post().uri("/voice/start").to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_denied_microphone_is_unavailable() {
        let capture = FakeCapture::default();
        capture.deny();
        let app = voice_app!(spawn_state(capture));

        let resp = test::call_service(&app, test::TestRequest::post().uri("/voice/start").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"]["message"].as_str().unwrap().contains("microphone"));
    }

    #[actix_web::test]
    async fn test_snapshot_and_stop() {
        let app = voice_app!(spawn_state(FakeCapture::default()));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/voice").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["active"], false);

        let resp = test::call_service(&app, test::TestRequest::post().uri("/voice/stop").to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
}
