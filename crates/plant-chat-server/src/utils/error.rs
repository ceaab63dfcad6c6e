use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::conversation::TurnStage;

/// Errors that end a chat turn unsuccessfully.
///
/// Retrieval and persistence failures never show up here; the orchestrator
/// logs and absorbs them.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Caller input rejected before any upstream call.
    #[error("{0}")]
    Validation(String),

    /// Embedding or completion API failure.
    #[error("{}", .stage.failure_message())]
    Upstream { stage: TurnStage, detail: String },
}

impl ChatError {
    pub fn upstream(stage: TurnStage, err: impl std::fmt::Display) -> Self {
        ChatError::Upstream {
            stage,
            detail: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Upstream error: {0}")]
    UpstreamError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            },
            ApiError::Chat(err) => {
                let status = err.status_code();
                match &err {
                    ChatError::Validation(msg) => tracing::warn!("Rejected chat turn: {}", msg),
                    ChatError::Upstream { stage, detail } => {
                        tracing::error!(stage = ?stage, "Chat turn failed: {}", detail)
                    }
                }
                (status, err.to_string())
            },
            ApiError::UpstreamError(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            },
        };

        let body = Json(ErrorResponse {
            success: false,
            error: message,
        });

        (status, body).into_response()
    }
}
