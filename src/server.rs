use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderValue,
    response::Response,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tracing::{info, warn};

use crate::AppState;
use crate::config::{AppConfig, CorsConfig};
use crate::error::{Error, Result};
use crate::reply;
use crate::session::{Message, SessionStore};
use crate::stream::sse;

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let generator = reply::from_config(&config.reply)?;
    info!(
        name: "reply.backend.loaded",
        provider = %config.reply.provider,
        pacing_ms = config.stream.pacing_ms,
        "Reply backend configured"
    );

    let state = AppState::new(SessionStore::new(), generator, Arc::clone(&config));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Build the application router with CORS and request tracing applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/api/chat/stream", get(api_chat_stream))
        .route("/api/chat/history", get(api_chat_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.trim().parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Query parameters for the stream endpoint.
#[derive(Debug, Deserialize)]
struct StreamQuery {
    /// Caller-chosen conversation key.
    session_id: String,
    /// The question to answer.
    question: String,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    session_id: String,
}

/// GET /api/chat/stream - SSE stream of the reply, one character per event.
async fn api_chat_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response> {
    if query.session_id.trim().is_empty() {
        return Err(Error::BadRequest("session_id must not be blank".to_string()));
    }

    tracing::info!(
        session_id = %query.session_id,
        question_length = query.question.len(),
        "Starting SSE stream"
    );

    let frames = state
        .coordinator
        .start_exchange(&query.session_id, &query.question)
        .await?;

    Ok(sse::into_response(frames))
}

/// GET /api/chat/history - Messages recorded for a session.
async fn api_chat_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Message>> {
    Json(state.sessions.history(&query.session_id))
}
