use super::{ContentChunk, DbPool, Message, NewMessage, PlantContext};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::types::Json;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ============ LESSON CONTENT ============

    /// Cosine-similarity search over lesson chunks.
    /// `scope = None` searches every lesson.
    pub async fn search_lesson_chunks(
        &self,
        query_embedding: Vector,
        scope: Option<&[String]>,
        match_threshold: f32,
        limit: i64,
    ) -> Result<Vec<ContentChunk>> {
        let chunks = sqlx::query_as::<_, ContentChunk>(
            r#"SELECT
                id::text AS chunk_id,
                lesson_id AS source_identifier,
                content,
                (1 - (embedding <=> $1))::float4 AS similarity
               FROM lesson_chunks
               WHERE ($2::text[] IS NULL OR lesson_id = ANY($2))
                 AND 1 - (embedding <=> $1) >= $3
               ORDER BY embedding <=> $1
               LIMIT $4"#
        )
        .bind(query_embedding)
        .bind(scope.map(|s| s.to_vec()))
        .bind(match_threshold as f64)
        .bind(limit)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} lesson chunks (scope={:?})", chunks.len(), scope);

        Ok(chunks)
    }

    /// Most recently ingested chunks in scope, unranked (`similarity = 0`).
    pub async fn recent_lesson_chunks(
        &self,
        scope: Option<&[String]>,
        limit: i64,
    ) -> Result<Vec<ContentChunk>> {
        let chunks = sqlx::query_as::<_, ContentChunk>(
            r#"SELECT
                id::text AS chunk_id,
                lesson_id AS source_identifier,
                content,
                0.0::float4 AS similarity
               FROM lesson_chunks
               WHERE ($1::text[] IS NULL OR lesson_id = ANY($1))
               ORDER BY created_at DESC
               LIMIT $2"#
        )
        .bind(scope.map(|s| s.to_vec()))
        .bind(limit)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(chunks)
    }

    /// Plant state for prompt context; `None` when the plant does not exist.
    pub async fn get_plant_context(&self, plant_id: Uuid) -> Result<Option<PlantContext>> {
        let plant = sqlx::query_as::<_, PlantContext>(
            r#"SELECT
                nickname,
                growth_stage,
                health_score,
                (CURRENT_DATE - started_at::date)::int4 AS days_since_start
               FROM plants
               WHERE id = $1"#
        )
        .bind(plant_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(plant)
    }

    // ============ CHAT PERSISTENCE ============

    /// Append a message to a thread. Never deduplicates.
    pub async fn insert_message(&self, message: &NewMessage) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO chat_messages (thread_id, sender_id, content, relevant_chunks, ai_sources)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#
        )
        .bind(message.thread_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(&message.relevant_chunks)
        .bind(message.ai_sources.as_ref().map(Json))
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(id)
    }

    pub async fn touch_thread(&self, thread_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE chat_threads SET last_message_at = $2 WHERE id = $1")
            .bind(thread_id)
            .bind(at)
            .execute(self.pool.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            warn!("Thread {} not found while updating last_message_at", thread_id);
        }

        Ok(())
    }

    /// Last `limit` messages of a thread, oldest first.
    pub async fn recent_thread_messages(&self, thread_id: Uuid, limit: i64) -> Result<Vec<Message>> {
        let mut messages = sqlx::query_as::<_, Message>(
            r#"SELECT id, thread_id, sender_id, content, relevant_chunks, ai_sources, created_at
               FROM chat_messages
               WHERE thread_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        messages.reverse();
        Ok(messages)
    }

    // ============ SCHEMA ============

    /// Create the tables this service reads and writes. Startup only.
    pub async fn ensure_chat_tables(&self, embedding_dimension: usize) -> Result<()> {
        let pool = self.pool.get_pool();

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS lesson_chunks (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                lesson_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding vector({embedding_dimension}) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )"#
        ))
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_threads (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                student_id TEXT,
                teacher_id TEXT,
                last_message_at TIMESTAMP WITH TIME ZONE
            )"#
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_messages (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                thread_id UUID NOT NULL REFERENCES chat_threads(id),
                sender_id TEXT,
                content TEXT NOT NULL,
                relevant_chunks TEXT[] NOT NULL DEFAULT '{}',
                ai_sources JSONB,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )"#
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS plants (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                nickname TEXT,
                growth_stage TEXT,
                health_score INT,
                started_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )"#
        )
        .execute(pool)
        .await?;

        // Indices
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_lesson_chunks_lesson ON lesson_chunks(lesson_id)").execute(pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_messages_thread ON chat_messages(thread_id, created_at)").execute(pool).await?;

        debug!("Chat tables ensured");
        Ok(())
    }
}
