use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Lesson content chunk as returned by a similarity query.
/// The stored embedding is never read back; `similarity` is computed per query.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ContentChunk {
    pub chunk_id: String,
    pub source_identifier: String,
    pub content: String,
    pub similarity: f32,
}

/// Current state of a student's plant, used as extra prompt context.
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PlantContext {
    pub nickname: Option<String>,
    pub growth_stage: Option<String>,
    pub health_score: Option<i32>,
    pub days_since_start: Option<i32>,
}

impl PlantContext {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none()
            && self.growth_stage.is_none()
            && self.health_score.is_none()
            && self.days_since_start.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSource {
    pub chunk_id: String,
}

/// Stored chat message. `sender_id` is `None` only for assistant replies;
/// unidentified students are stored as `"anonymous"`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Option<String>,
    pub content: String,
    pub relevant_chunks: Vec<String>,
    pub ai_sources: Option<Json<Vec<AiSource>>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_from_ai(&self) -> bool {
        self.sender_id.is_none()
    }
}

/// Insert payload for a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub thread_id: Uuid,
    pub sender_id: Option<String>,
    pub content: String,
    pub relevant_chunks: Vec<String>,
    pub ai_sources: Option<Vec<AiSource>>,
}
