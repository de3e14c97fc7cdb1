//! # Lumina Voice - Main Application Entry Point
//!
//! Starts the voice engine task and the Actix-web server that exposes it.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: the HTTP server, the engine and the live connection all
//!   run on the same tokio runtime
//! - **Result<T, E>**: startup failures are returned from `main`, not panicked on
//! - **AtomicBool**: a process-wide shutdown flag set by the signal handlers
//!
//! ## Application Architecture:
//! - **config**: TOML file + environment variables
//! - **session**: the voice engine, driven through a `VoiceController`
//! - **live**: Gemini Live WebSocket connector
//! - **handlers** / **websocket**: HTTP and WebSocket endpoints
//! - **health**: service and session health

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use lumina_voice::audio::AudioDevices;
use lumina_voice::config::AppConfig;
use lumina_voice::live::GeminiLiveConnector;
use lumina_voice::session::{VoiceConfig, VoiceEngine};
use lumina_voice::state::AppState;
use lumina_voice::{handlers, health, websocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Starts the voice engine** on its own task with the chosen audio
///    devices and the live connector
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown**: stops the server, then tears down any
///    running session before exiting
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting lumina-voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!("Live model: {} (voice {})", config.live.model, config.live.voice);
    if !config.has_api_key() {
        warn!("No GEMINI_API_KEY configured; session starts will fail until one is set");
    }

    let devices = AudioDevices::system_default();
    let connector = GeminiLiveConnector::new(config.live.endpoint.clone(), config.live.api_key.clone());

    let (engine, controller) = VoiceEngine::new(VoiceConfig::from(&config), devices, Arc::new(connector));
    let engine_task = tokio::spawn(engine.run());

    let app_state = AppState::new(config.clone(), controller.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/voice", web::get().to(handlers::get_voice))
                    .route("/voice/start", web::post().to(handlers::start_voice))
                    .route("/voice/stop", web::post().to(handlers::stop_voice)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/ws/voice", web::get().to(websocket::voice_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    // Releases the microphone and closes the live connection if a session is up.
    if controller.shutdown().is_ok() {
        if let Err(e) = engine_task.await {
            error!("Voice engine task error: {}", e);
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// ## Environment Variables:
/// - `RUST_LOG`: e.g. "debug" or "lumina_voice=trace"
/// - If not set, defaults to "lumina_voice=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumina_voice=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and set the shutdown flag on either.
///
/// A handler that cannot be installed is logged and skipped; the other one
/// still works.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| error!("Failed to install SIGTERM handler: {}", e))
            .ok();
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| error!("Failed to install SIGINT handler: {}", e))
            .ok();

        let wait = |stream: Option<tokio::signal::unix::Signal>| async move {
            match stream {
                Some(mut stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = wait(sigterm) => info!("Received SIGTERM"),
            _ = wait(sigint) => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
