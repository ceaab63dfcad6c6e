use std::sync::Arc;
use axum::extract::FromRef;

use crate::auth::JwtManager;
use crate::database::DbPool;
use crate::services::{ChatOrchestrator, RagService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub rag_service: Arc<RagService>,
    pub db_pool: DbPool,
    /// `None` when no JWT secret is configured; every caller is then anonymous.
    pub jwt_manager: Option<Arc<JwtManager>>,
}

impl FromRef<AppState> for Arc<ChatOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for Arc<RagService> {
    fn from_ref(state: &AppState) -> Self {
        state.rag_service.clone()
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.db_pool.clone()
    }
}
