use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::engine::{SequencerEngine, TickOutcome};
use crate::sequence::Sequence;

/// Shared state for the handler routes.
pub struct AppContext {
    pub engine: SequencerEngine,
    pub started_at: Instant,
}

pub async fn start_server(ctx: Arc<AppContext>, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;
    let router = build_router(ctx);

    info!("sequencer listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/workflows/delayed-sequence", post(delayed_sequence))
        .with_state(ctx)
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
    }))
}

/// One tick: validate the delivered payload and hand it to the engine.
///
/// Validation failure is the caller's fault (400, never retried by us); a
/// step or scheduling failure is reported as 500 so the delivering broker
/// redelivers the identical tick.
async fn delayed_sequence(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Value>,
) -> Result<Json<TickOutcome>, (StatusCode, Json<Value>)> {
    let sequence = Sequence::parse(&body).map_err(|e| {
        error!(error = %e, "rejecting malformed sequence payload");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid sequence payload",
                "details": e.violations,
            })),
        )
    })?;

    match ctx.engine.tick(&sequence).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(error = %e, "tick failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}
