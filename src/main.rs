//! # Call Bridge - Main Application Entry Point
//!
//! Bridges phone calls from a telephony media stream into a realtime
//! speech-to-speech AI session, and keeps a per-caller history of what was
//! discussed.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (config.toml + `APP_` environment variables)
//! - **state**: Shared state, call slots and metrics
//! - **health**: Health and metrics endpoints
//! - **handlers**: Config and caller history HTTP endpoints
//! - **telephony**: `/incoming-call` webhook and the `/media-stream` socket
//! - **realtime**: Client for the realtime AI websocket
//! - **bridge**: Per-call orchestration between the two sockets
//! - **tools**: Function calls the AI can make during a call
//! - **context**: Context injected before the AI's first turn
//! - **summarizer**: Post-call summaries
//! - **history**: Per-caller JSONL storage
//! - **error**: Error types and HTTP error responses

mod bridge;
mod config;
mod context;
mod error;
mod handlers;
mod health;
mod history;
mod realtime;
mod state;
mod summarizer;
mod telephony;
mod tools;

#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if !config.has_api_key() {
        warn!("No OpenAI API key configured; calls will fail to reach the realtime service");
    }

    let app_state = AppState::build(config.clone())?;
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
            .wrap(tracing_actix_web::TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            // Dashboard history API
            .service(
                web::scope("/api")
                    .route("/conversations/{phone}", web::get().to(handlers::get_conversations))
                    .route("/logs/{phone}", web::get().to(handlers::get_logs))
                    .route("/stats/{phone}", web::get().to(handlers::get_stats)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/incoming-call", web::post().to(telephony::incoming_call))
            .route("/media-stream", web::get().to(telephony::media_stream))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // Open media streams are closed; their bridges still summarize.
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging filtered by `RUST_LOG`, defaulting to
/// `call_bridge=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
