use crate::database::{Message, NewMessage, Repository};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::conversation::manager::MessageStore;

/// Chat message persistence backed by Postgres.
#[derive(Clone)]
pub struct MessageService {
    repository: Arc<Repository>,
}

impl MessageService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl MessageStore for MessageService {
    async fn record(&self, message: NewMessage) -> Result<Uuid> {
        self.repository.insert_message(&message).await
    }

    async fn touch_thread(&self, thread_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.repository.touch_thread(thread_id, at).await
    }

    async fn recent_messages(&self, thread_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        self.repository.recent_thread_messages(thread_id, limit as i64).await
    }
}
