//! Chat turn orchestration
//!
//! One request becomes one turn: embed the question, retrieve lesson chunks,
//! assemble the prompt, call the completion API and persist both messages.

mod context_builder;
pub mod manager;
pub mod types;

pub use context_builder::ContextBuilder;
pub use manager::{
    ChatOrchestrator, ChatTurn, EmbeddingProvider, LlmProvider, MessageStore, RetrievalProvider,
};
pub use types::{Completion, TurnStage, TurnTracker};
