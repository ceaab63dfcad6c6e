use crate::models::chat::{SearchRequest, SearchResponse, SourceInfo};
use crate::services::RagService;
use crate::utils::error::ApiError;
use crate::utils::text::preview;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

const MAX_SEARCH_LIMIT: usize = 20;
const SEARCH_PREVIEW_CHARS: usize = 300;

/// `POST /api/search`: raw lesson retrieval without a completion.
pub async fn search_handler(
    State(rag_service): State<Arc<RagService>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query is required".to_string()));
    }

    let limit = request
        .limit
        .unwrap_or_else(|| rag_service.match_count())
        .clamp(1, MAX_SEARCH_LIMIT);
    let scope = request
        .scope_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| vec![s]);

    info!("Search request: scope={:?}, limit={}", scope, limit);

    let chunks = rag_service
        .search_text(query, scope, limit)
        .await
        .map_err(|e| {
            error!("Lesson search failed: {:#}", e);
            ApiError::UpstreamError("Search failed".to_string())
        })?;

    let results: Vec<SourceInfo> = chunks
        .into_iter()
        .map(|chunk| SourceInfo {
            preview: preview(&chunk.content, SEARCH_PREVIEW_CHARS),
            chunk_id: chunk.chunk_id,
            source_identifier: chunk.source_identifier,
            similarity: chunk.similarity,
        })
        .collect();

    let total = results.len();

    Ok(Json(SearchResponse {
        success: true,
        results,
        total,
    }))
}
