use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::clients::ClientError;
use crate::sync::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<chess_core::ChessError> for AppError {
    fn from(e: chess_core::ChessError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<coach_engine::EngineError> for AppError {
    fn from(e: coach_engine::EngineError) -> Self {
        match e {
            coach_engine::EngineError::InvalidPosition(msg) => AppError::BadRequest(msg),
            other => AppError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotConfigured => AppError::ServiceUnavailable(e.to_string()),
            SyncError::GameNotFound => AppError::NotFound(e.to_string()),
            SyncError::Move(e) => AppError::BadRequest(e.to_string()),
            SyncError::GameFull | SyncError::NotYourTurn => AppError::BadRequest(e.to_string()),
            SyncError::Store(_) | SyncError::Decode(_) => AppError::BadGateway(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (status, Json(json!({ "detail": message }))).into_response()
    }
}
