//! HTTP intake surface.
//!
//! `GET /health` answers `ok`. `POST /mentions` accepts the same fields
//! as a Slack `app_mention` (`text`, `user`, `channel`, `ts`, `thread_ts`)
//! and runs them through the [`MentionProducer`], tagged as
//! [`MentionSource::Other`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::envelope::{MentionEvent, MentionSource};
use crate::relay::producer::MentionProducer;
use crate::{AppError, Result};

async fn health() -> &'static str {
    "ok"
}

async fn post_mention(
    State(producer): State<Arc<MentionProducer>>,
    Json(event): Json<MentionEvent>,
) -> (StatusCode, Json<Value>) {
    match producer
        .handle_event_from(&event, MentionSource::Other)
        .await
    {
        Ok(envelope) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "queued",
                "channel": envelope.channel_id(),
                "ts": envelope.timestamp(),
            })),
        ),
        Err(err @ AppError::Validation(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        ),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}

/// Build the intake router.
pub fn router(producer: Arc<MentionProducer>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mentions", post(post_mention))
        .with_state(producer)
}

/// Serve the intake router on `127.0.0.1:{port}` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Io` if the port cannot be bound.
pub async fn serve_http(
    producer: Arc<MentionProducer>,
    port: u16,
    ct: CancellationToken,
) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind http on {bind}: {err}")))?;
    serve_listener(listener, producer, ct).await
}

/// Serve the intake router on an already-bound listener until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    producer: Arc<MentionProducer>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(%local, "starting http intake");

    axum::serve(listener, router(producer))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("http intake shut down");
    Ok(())
}
