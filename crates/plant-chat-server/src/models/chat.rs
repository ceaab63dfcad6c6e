use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===== LLM MESSAGES =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user" or "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }

    pub fn is_conversational(&self) -> bool {
        self.role == "user" || self.role == "assistant"
    }
}

// ===== REQUEST MODELS =====

/// Body of `POST /api/chat`. Everything is optional at the serde level so
/// that missing fields become validation errors with the regular error shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub include_sources: bool,
    /// Attribution used when no valid bearer token is present.
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub plant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub chunk_id: String,
    pub source_identifier: String,
    pub similarity: f32,
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub relevant_chunks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceInfo>>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<SourceInfo>,
    pub total: usize,
}
