use crate::auth::CallerIdentity;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::services::ChatOrchestrator;
use crate::utils::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// `POST /api/chat`
pub async fn chat_handler(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Extension(CallerIdentity(caller_id)): Extension<CallerIdentity>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let start_time = Instant::now();

    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let response = orchestrator.handle_request(request, caller_id).await?;

    info!(
        "Chat request completed in {}ms: {} chunks, stored={}",
        start_time.elapsed().as_millis(),
        response.relevant_chunks.len(),
        response.ai_message_id.is_some()
    );

    Ok(Json(response))
}
