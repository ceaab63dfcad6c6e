/// manager.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{AiSource, ContentChunk, Message, NewMessage, PlantContext};
use crate::models::chat::{ChatMessage, ChatRequest, ChatResponse, SourceInfo};
use crate::utils::error::ChatError;

use super::context_builder::ContextBuilder;
use super::types::{Completion, TurnStage, TurnTracker};

/// Trait for embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Trait for retrieval service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Top `match_count` chunks by descending similarity, restricted to
    /// `scope` when given.
    async fn search(
        &self,
        embedding: &[f32],
        scope: Option<Vec<String>>,
        match_count: usize,
    ) -> Result<Vec<ContentChunk>>;

    async fn plant_context(&self, plant_id: &str) -> Result<Option<PlantContext>>;
}

/// Trait for LLM service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;
}

/// Trait for chat message persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn record(&self, message: NewMessage) -> Result<Uuid>;
    async fn touch_thread(&self, thread_id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn recent_messages(&self, thread_id: Uuid, limit: usize) -> Result<Vec<Message>>;
}

/// Stored as the sender of user messages when the caller is unknown.
/// A `NULL` sender is reserved for assistant replies.
pub const ANONYMOUS_SENDER: &str = "anonymous";

/// A chat request that passed validation.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub request_id: String,
    pub message: String,
    pub thread_id: Option<Uuid>,
    pub scope: Option<Vec<String>>,
    pub history: Option<Vec<ChatMessage>>,
    pub include_sources: bool,
    pub sender_id: String,
    pub plant_id: Option<String>,
}

impl ChatTurn {
    /// Validate a raw request. `caller_id` (from a verified token) takes
    /// precedence over the caller-supplied `sender_id`; with neither the
    /// sender is [`ANONYMOUS_SENDER`].
    pub fn from_request(request: ChatRequest, caller_id: Option<String>) -> Result<Self, ChatError> {
        let message = request
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ChatError::Validation("message is required".to_string()))?;

        let thread_id = non_blank(request.thread_id);
        let scope_id = non_blank(request.scope_id);

        if thread_id.is_none() && scope_id.is_none() {
            return Err(ChatError::Validation(
                "thread_id or scope_id is required".to_string(),
            ));
        }

        let thread_id = thread_id
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|_| ChatError::Validation("thread_id must be a valid UUID".to_string()))?;

        Ok(Self {
            request_id: Uuid::new_v4().to_string(),
            message,
            thread_id,
            scope: scope_id.map(|id| vec![id]),
            history: request.conversation_history,
            include_sources: request.include_sources,
            sender_id: caller_id
                .or_else(|| non_blank(request.sender_id))
                .unwrap_or_else(|| ANONYMOUS_SENDER.to_string()),
            plant_id: non_blank(request.plant_id),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Runs one retrieval-augmented chat turn:
/// embed -> retrieve -> assemble -> complete -> persist.
///
/// Embedding and completion failures end the turn. Retrieval, plant lookup,
/// history loading and persistence failures are logged and absorbed.
pub struct ChatOrchestrator {
    context_builder: ContextBuilder,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    retrieval_provider: Arc<dyn RetrievalProvider>,
    llm_provider: Arc<dyn LlmProvider>,
    message_store: Arc<dyn MessageStore>,
    match_count: usize,
}

impl ChatOrchestrator {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        retrieval_provider: Arc<dyn RetrievalProvider>,
        llm_provider: Arc<dyn LlmProvider>,
        message_store: Arc<dyn MessageStore>,
        context_builder: ContextBuilder,
        match_count: usize,
    ) -> Self {
        Self {
            context_builder,
            embedding_provider,
            retrieval_provider,
            llm_provider,
            message_store,
            match_count,
        }
    }

    pub async fn handle_request(
        &self,
        request: ChatRequest,
        caller_id: Option<String>,
    ) -> Result<ChatResponse, ChatError> {
        match ChatTurn::from_request(request, caller_id) {
            Ok(turn) => self.handle_turn(turn).await,
            Err(e) => {
                let mut tracker = TurnTracker::new("unvalidated");
                tracker.advance(TurnStage::Errored);
                Err(e)
            }
        }
    }

    pub async fn handle_turn(&self, turn: ChatTurn) -> Result<ChatResponse, ChatError> {
        let mut tracker = TurnTracker::new(turn.request_id.clone());

        info!(
            request_id = %turn.request_id,
            "Chat turn: thread={:?}, scope={:?}, message_len={}, sender={}",
            turn.thread_id,
            turn.scope,
            turn.message.len(),
            turn.sender_id
        );

        // ===== EMBEDDING =====
        tracker.advance(TurnStage::Embedding);
        let embedding = match self.embedding_provider.embed(&turn.message).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(request_id = %tracker.request_id(), stage = ?tracker.stage(), "Embedding failed: {:#}", e);
                tracker.advance(TurnStage::Errored);
                return Err(ChatError::upstream(TurnStage::Embedding, format!("{:#}", e)));
            }
        };

        // ===== RETRIEVAL (+ plant lookup) =====
        tracker.advance(TurnStage::Retrieving);
        let (chunks, plant) = tokio::join!(
            self.retrieve(&turn, &embedding),
            self.lookup_plant(&turn),
        );
        let history = self.resolve_history(&turn).await;

        // ===== ASSEMBLY =====
        tracker.advance(TurnStage::Assembling);
        let context = self.context_builder.assemble(&chunks, plant.as_ref());
        let messages = self.context_builder.build_messages(&context, &history, &turn.message);
        debug!(
            request_id = %turn.request_id,
            "Prompt assembled: {} sources, {} context chars, {} messages",
            chunks.len(),
            context.len(),
            messages.len()
        );

        // ===== COMPLETION =====
        tracker.advance(TurnStage::Completing);
        let completion = match self.llm_provider.complete(&messages).await {
            Ok(c) if !c.text.trim().is_empty() => c,
            Ok(_) => {
                warn!(request_id = %tracker.request_id(), stage = ?tracker.stage(), "Completion returned no text");
                tracker.advance(TurnStage::Errored);
                return Err(ChatError::upstream(TurnStage::Completing, "empty completion"));
            }
            Err(e) => {
                warn!(request_id = %tracker.request_id(), stage = ?tracker.stage(), "Completion failed: {:#}", e);
                tracker.advance(TurnStage::Errored);
                return Err(ChatError::upstream(TurnStage::Completing, format!("{:#}", e)));
            }
        };

        // ===== PERSISTENCE =====
        tracker.advance(TurnStage::Persisting);
        let relevant_chunks: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();

        let (student_message_id, ai_message_id) = match turn.thread_id {
            Some(thread_id) => {
                self.persist_turn(thread_id, &turn, &completion.text, &relevant_chunks)
                    .await
            }
            None => {
                debug!(request_id = %turn.request_id, "No thread_id, skipping persistence");
                (None, None)
            }
        };

        let sources = turn.include_sources.then(|| {
            chunks
                .iter()
                .map(|c| SourceInfo {
                    chunk_id: c.chunk_id.clone(),
                    source_identifier: c.source_identifier.clone(),
                    similarity: c.similarity,
                    preview: self.context_builder.preview(&c.content),
                })
                .collect()
        });

        tracker.advance(TurnStage::Responded);

        Ok(ChatResponse {
            success: true,
            message: completion.text,
            relevant_chunks,
            student_message_id,
            ai_message_id,
            usage: completion.usage,
            sources,
        })
    }

    /// Retrieval is a soft dependency: errors yield an empty chunk set.
    async fn retrieve(&self, turn: &ChatTurn, embedding: &[f32]) -> Vec<ContentChunk> {
        match self
            .retrieval_provider
            .search(embedding, turn.scope.clone(), self.match_count)
            .await
        {
            Ok(mut chunks) => {
                chunks.truncate(self.match_count);
                debug!(request_id = %turn.request_id, "Retrieved {} chunks", chunks.len());
                chunks
            }
            Err(e) => {
                warn!(
                    request_id = %turn.request_id,
                    "Retrieval failed, continuing without lesson context: {:#}", e
                );
                Vec::new()
            }
        }
    }

    async fn lookup_plant(&self, turn: &ChatTurn) -> Option<PlantContext> {
        let plant_id = turn.plant_id.as_deref()?;

        match self.retrieval_provider.plant_context(plant_id).await {
            Ok(plant) => plant,
            Err(e) => {
                warn!(request_id = %turn.request_id, "Plant context lookup failed for {}: {:#}", plant_id, e);
                None
            }
        }
    }

    /// Request history wins; otherwise the thread's latest messages.
    async fn resolve_history(&self, turn: &ChatTurn) -> Vec<ChatMessage> {
        if let Some(history) = &turn.history {
            return history.clone();
        }

        let Some(thread_id) = turn.thread_id else {
            return Vec::new();
        };

        match self
            .message_store
            .recent_messages(thread_id, self.context_builder.history_window())
            .await
        {
            Ok(messages) => messages
                .into_iter()
                .map(|m| {
                    if m.is_from_ai() {
                        ChatMessage::assistant(m.content)
                    } else {
                        ChatMessage::user(m.content)
                    }
                })
                .collect(),
            Err(e) => {
                warn!(request_id = %turn.request_id, "Failed to load thread history: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Best-effort writes; returns the ids of the rows that were stored.
    async fn persist_turn(
        &self,
        thread_id: Uuid,
        turn: &ChatTurn,
        reply: &str,
        relevant_chunks: &[String],
    ) -> (Option<Uuid>, Option<Uuid>) {
        let student = NewMessage {
            thread_id,
            sender_id: Some(turn.sender_id.clone()),
            content: turn.message.clone(),
            relevant_chunks: relevant_chunks.to_vec(),
            ai_sources: None,
        };

        let ai_sources = (!relevant_chunks.is_empty()).then(|| {
            relevant_chunks
                .iter()
                .map(|id| AiSource { chunk_id: id.clone() })
                .collect()
        });

        let ai = NewMessage {
            thread_id,
            sender_id: None,
            content: reply.to_string(),
            relevant_chunks: relevant_chunks.to_vec(),
            ai_sources,
        };

        let student_message_id = match self.message_store.record(student).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(request_id = %turn.request_id, "Failed to store student message: {:#}", e);
                None
            }
        };

        let ai_message_id = match self.message_store.record(ai).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(request_id = %turn.request_id, "Failed to store AI message: {:#}", e);
                None
            }
        };

        if let Err(e) = self.message_store.touch_thread(thread_id, Utc::now()).await {
            error!(request_id = %turn.request_id, "Failed to update thread {}: {:#}", thread_id, e);
        }

        (student_message_id, ai_message_id)
    }
}
