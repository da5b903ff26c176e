//! Centralized error types for the Airwave core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::player::PlayerError;
use crate::storage::StorageError;

/// Application-wide error type for the Airwave engine.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AirwaveError {
    /// The backend player rejected or failed an operation.
    #[error("Player operation failed: {0}")]
    Player(String),

    /// Reading or writing the persisted state failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// An unknown or malformed session command was received.
    #[error("Unknown session command: {0}")]
    UnknownCommand(String),

    /// Requested station does not exist in the collection.
    #[error("Station not found: {0}")]
    StationNotFound(String),

    /// The playback session has shut down and no longer accepts commands.
    #[error("Playback session is not running")]
    SessionClosed,

    /// Engine configuration error (invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AirwaveError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Player(_) => "player_error",
            Self::Storage(_) => "storage_error",
            Self::UnknownCommand(_) => "unknown_command",
            Self::StationNotFound(_) => "station_not_found",
            Self::SessionClosed => "session_closed",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownCommand(_) => StatusCode::BAD_REQUEST,
            Self::StationNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for engine-wide operations.
pub type AirwaveResult<T> = Result<T, AirwaveError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for AirwaveError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PlayerError> for AirwaveError {
    fn from(err: PlayerError) -> Self {
        Self::Player(err.to_string())
    }
}

impl From<StorageError> for AirwaveError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
