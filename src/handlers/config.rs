use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`
///
/// The API key is skipped during serialization; only whether one is set is
/// reported.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": serde_json::to_value(&config)?,
        "api_key_configured": config.has_api_key()
    })))
}

/// `PUT /api/v1/config` with a partial JSON body, e.g. `{"live": {"voice": "Puck"}}`.
///
/// Voice, audio and visualizer changes apply from the next session; a running
/// session keeps the settings it started with.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.update_config(current_config.clone())?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated; voice settings apply to the next session",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": serde_json::to_value(&current_config)?
    })))
}
