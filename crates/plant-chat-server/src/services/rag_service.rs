use crate::config::{RagConfig, RetrievalFallback};
use crate::database::{ContentChunk, PlantContext, Repository};
use anyhow::{Context, Result};
use pgvector::Vector;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::conversation::manager::{EmbeddingProvider, RetrievalProvider};

/// Read access to lesson content and plant state.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LessonStore: Send + Sync {
    async fn ranked_chunks(
        &self,
        embedding: Vec<f32>,
        scope: Option<Vec<String>>,
        match_threshold: f32,
        limit: usize,
    ) -> Result<Vec<ContentChunk>>;

    async fn recent_chunks(&self, scope: Option<Vec<String>>, limit: usize) -> Result<Vec<ContentChunk>>;

    async fn plant_context(&self, plant_id: Uuid) -> Result<Option<PlantContext>>;
}

#[async_trait::async_trait]
impl LessonStore for Repository {
    async fn ranked_chunks(
        &self,
        embedding: Vec<f32>,
        scope: Option<Vec<String>>,
        match_threshold: f32,
        limit: usize,
    ) -> Result<Vec<ContentChunk>> {
        self.search_lesson_chunks(Vector::from(embedding), scope.as_deref(), match_threshold, limit as i64)
            .await
    }

    async fn recent_chunks(&self, scope: Option<Vec<String>>, limit: usize) -> Result<Vec<ContentChunk>> {
        self.recent_lesson_chunks(scope.as_deref(), limit as i64).await
    }

    async fn plant_context(&self, plant_id: Uuid) -> Result<Option<PlantContext>> {
        self.get_plant_context(plant_id).await
    }
}

/// Re-check rows coming back from the database: drop anything outside
/// `scope`, clamp similarity to [0, 1], order best-first and cap at `limit`.
pub fn normalize_results(
    mut chunks: Vec<ContentChunk>,
    scope: Option<&[String]>,
    limit: usize,
) -> Vec<ContentChunk> {
    if let Some(scope) = scope {
        let before = chunks.len();
        chunks.retain(|c| scope.contains(&c.source_identifier));
        if chunks.len() < before {
            warn!("Dropped {} out-of-scope chunks", before - chunks.len());
        }
    }

    for chunk in &mut chunks {
        chunk.similarity = if chunk.similarity.is_nan() {
            0.0
        } else {
            chunk.similarity.clamp(0.0, 1.0)
        };
    }

    chunks.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
    chunks.truncate(limit);
    chunks
}

/// Lesson retrieval over pgvector with an optional most-recent fallback.
#[derive(Clone)]
pub struct RagService {
    store: Arc<dyn LessonStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    config: RagConfig,
}

impl RagService {
    pub fn new(
        store: Arc<dyn LessonStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedding_provider,
            config,
        }
    }

    pub fn match_count(&self) -> usize {
        self.config.match_count
    }

    /// Ranked chunks for an already embedded query.
    pub async fn retrieve_with_embedding(
        &self,
        embedding: &[f32],
        scope: Option<Vec<String>>,
        limit: usize,
    ) -> Result<Vec<ContentChunk>> {
        let ranked = self
            .store
            .ranked_chunks(embedding.to_vec(), scope.clone(), self.config.match_threshold, limit)
            .await;

        let rows = match (ranked, self.config.fallback) {
            (Ok(rows), _) => rows,
            (Err(e), RetrievalFallback::Recent) => {
                warn!("Ranked lesson search failed, using most recent chunks: {:#}", e);
                self.store
                    .recent_chunks(scope.clone(), limit)
                    .await
                    .context("Fallback lesson query failed")?
            }
            (Err(e), RetrievalFallback::Disabled) => return Err(e.context("Lesson search failed")),
        };

        let chunks = normalize_results(rows, scope.as_deref(), limit);
        debug!("Retrieved {} chunks (scope={:?})", chunks.len(), scope);
        Ok(chunks)
    }

    /// Embed `query` and retrieve; both failures propagate.
    pub async fn search_text(
        &self,
        query: &str,
        scope: Option<Vec<String>>,
        limit: usize,
    ) -> Result<Vec<ContentChunk>> {
        info!("Lesson search: {} chars, scope={:?}, limit={}", query.len(), scope, limit);

        let embedding = self
            .embedding_provider
            .embed(query)
            .await
            .context("Failed to embed search query")?;

        self.retrieve_with_embedding(&embedding, scope, limit).await
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for RagService {
    async fn search(
        &self,
        embedding: &[f32],
        scope: Option<Vec<String>>,
        match_count: usize,
    ) -> Result<Vec<ContentChunk>> {
        self.retrieve_with_embedding(embedding, scope, match_count).await
    }

    async fn plant_context(&self, plant_id: &str) -> Result<Option<PlantContext>> {
        let id = Uuid::parse_str(plant_id)
            .with_context(|| format!("Invalid plant id: {}", plant_id))?;
        self.store.plant_context(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::manager::MockEmbeddingProvider;

    fn chunk(id: &str, lesson: &str, similarity: f32) -> ContentChunk {
        ContentChunk {
            chunk_id: id.to_string(),
            source_identifier: lesson.to_string(),
            content: format!("content {}", id),
            similarity,
        }
    }

    fn config(fallback: RetrievalFallback) -> RagConfig {
        RagConfig {
            match_count: 3,
            match_threshold: 0.5,
            preview_chars: 300,
            max_context_chars: 4000,
            history_window: 5,
            fallback,
        }
    }

    fn service(store: MockLessonStore, fallback: RetrievalFallback) -> RagService {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![0.1, 0.2]));
        RagService::new(Arc::new(store), Arc::new(embedder), config(fallback))
    }

    #[test]
    fn test_normalize_drops_out_of_scope_rows() {
        let rows = vec![
            chunk("a", "lessonA", 0.9),
            chunk("b", "lessonB", 0.95),
            chunk("c", "lessonA", 0.6),
        ];
        let scope = vec!["lessonA".to_string()];
        let result = normalize_results(rows, Some(&scope), 10);

        assert!(result.iter().all(|c| c.source_identifier == "lessonA"));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_normalize_sorts_clamps_and_truncates() {
        let rows = vec![
            chunk("low", "l", 0.51),
            chunk("over", "l", 1.2),
            chunk("mid", "l", 0.7),
            chunk("neg", "l", -0.3),
        ];
        let result = normalize_results(rows, None, 3);

        let ids: Vec<&str> = result.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["over", "mid", "low"]);
        assert_eq!(result[0].similarity, 1.0);
    }

    #[test]
    fn test_normalize_empty_scope_returns_nothing() {
        let rows = vec![chunk("a", "lessonA", 0.9)];
        assert!(normalize_results(rows, Some(&[][..]), 3).is_empty());
    }

    #[tokio::test]
    async fn test_ranked_results_pass_through_threshold_and_scope() {
        let mut store = MockLessonStore::new();
        store
            .expect_ranked_chunks()
            .withf(|_, scope, threshold, limit| {
                scope.as_deref() == Some(&["lessonA".to_string()][..]) && *threshold == 0.5 && *limit == 3
            })
            .returning(|_, _, _, _| {
                Ok(vec![
                    chunk("a", "lessonA", 0.8),
                    chunk("x", "lessonZ", 0.99),
                    chunk("b", "lessonA", 0.9),
                ])
            });
        store.expect_recent_chunks().times(0);

        let rag = service(store, RetrievalFallback::Recent);
        let result = rag
            .search(&[0.1, 0.2], Some(vec!["lessonA".to_string()]), 3)
            .await
            .unwrap();

        let ids: Vec<&str> = result.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_recent_fallback_on_ranked_failure() {
        let mut store = MockLessonStore::new();
        store
            .expect_ranked_chunks()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("operator does not exist: vector <=> vector")));
        store
            .expect_recent_chunks()
            .times(1)
            .returning(|_, _| Ok(vec![chunk("r1", "lessonA", 0.0), chunk("r2", "lessonA", 0.0)]));

        let rag = service(store, RetrievalFallback::Recent);
        let result = rag.search(&[0.1], Some(vec!["lessonA".to_string()]), 3).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|c| c.similarity == 0.0));
    }

    #[tokio::test]
    async fn test_no_fallback_propagates_error() {
        let mut store = MockLessonStore::new();
        store
            .expect_ranked_chunks()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("connection refused")));
        store.expect_recent_chunks().times(0);

        let rag = service(store, RetrievalFallback::Disabled);
        assert!(rag.search(&[0.1], None, 3).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_plant_id_is_an_error() {
        let mut store = MockLessonStore::new();
        store.expect_plant_context().times(0);

        let rag = service(store, RetrievalFallback::Recent);
        assert!(rag.plant_context("not-a-uuid").await.is_err());
    }

    #[tokio::test]
    async fn test_search_text_embeds_then_searches() {
        let mut store = MockLessonStore::new();
        store
            .expect_ranked_chunks()
            .withf(|embedding, _, _, limit| embedding == &vec![0.1, 0.2] && *limit == 5)
            .returning(|_, _, _, _| Ok(vec![chunk("a", "lessonA", 0.7)]));

        let rag = service(store, RetrievalFallback::Recent);
        let result = rag.search_text("aphids", None, 5).await.unwrap();
        assert_eq!(result[0].chunk_id, "a");
    }
}
