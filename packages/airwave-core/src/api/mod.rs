//! HTTP API for remote controllers.
//!
//! Thin axum surface over the session handle:
//! - `GET /health` — service identity and liveness
//! - `GET /session/state` — session state snapshot
//! - `POST /session/command` — protocol commands by string identifier
//! - `POST /session/player` — gated player commands
//!
//! Handlers delegate to [`SessionHandle`]; errors map to JSON responses via
//! [`AirwaveError`]'s `IntoResponse`.

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::constants::SERVICE_ID;
use crate::error::{AirwaveError, AirwaveResult};
use crate::services::{CommandResponse, PlayerCommand, SessionHandle, SessionState};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    session: SessionHandle,
}

impl ApiState {
    /// Creates API state around a session handle.
    #[must_use]
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

/// Builds the API router.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session/state", get(session_state))
        .route("/session/command", post(session_command))
        .route("/session/player", post(player_command))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    service: &'static str,
    version: &'static str,
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: SERVICE_ID,
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

async fn session_state(State(state): State<ApiState>) -> AirwaveResult<Json<SessionState>> {
    Ok(Json(state.session.state().await?))
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

async fn session_command(
    State(state): State<ApiState>,
    Json(request): Json<CommandRequest>,
) -> AirwaveResult<Json<CommandResponse>> {
    Ok(Json(state.session.execute(&request.command).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerCommandRequest {
    command: String,
    #[serde(default)]
    station_id: Option<String>,
}

#[derive(Serialize)]
struct AckResponse {
    ok: bool,
}

async fn player_command(
    State(state): State<ApiState>,
    Json(request): Json<PlayerCommandRequest>,
) -> AirwaveResult<Json<AckResponse>> {
    let command = match request.command.as_str() {
        "prepare" => PlayerCommand::Prepare,
        "playPause" => PlayerCommand::PlayPause,
        "play" => PlayerCommand::Play {
            station_id: request.station_id,
        },
        "pause" => PlayerCommand::Pause,
        "stop" => PlayerCommand::Stop,
        other => return Err(AirwaveError::UnknownCommand(other.to_string())),
    };
    state.session.player_command(command).await?;
    Ok(Json(AckResponse { ok: true }))
}
