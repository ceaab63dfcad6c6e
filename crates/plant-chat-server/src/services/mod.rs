pub mod conversation;
pub mod embedding_service;
pub mod llm_service;
pub mod message_service;
pub mod rag_service;

pub use conversation::ChatOrchestrator;
pub use embedding_service::EmbeddingService;
pub use llm_service::LlmService;
pub use message_service::MessageService;
pub use rag_service::RagService;
