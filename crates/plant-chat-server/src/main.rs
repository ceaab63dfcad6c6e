use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use plant_chat_server::auth::JwtManager;
use plant_chat_server::config::Settings;
use plant_chat_server::database::{DbPool, Repository};
use plant_chat_server::services::conversation::ContextBuilder;
use plant_chat_server::services::{
    ChatOrchestrator, EmbeddingService, LlmService, MessageService, RagService,
};
use plant_chat_server::utils::logger::init_logger;
use plant_chat_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logger(&settings.logging)?;
    info!("Starting plant chat server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database pool
    let db_pool = DbPool::new(&settings.database).await?;
    info!("Database connection established");

    let repository = Arc::new(Repository::new(db_pool.clone()));

    if settings.database.ensure_schema {
        repository
            .ensure_chat_tables(settings.embedding.dimension)
            .await?;
        info!("Chat schema ensured");
    }

    // Initialize services
    let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone()));
    let llm_service = Arc::new(LlmService::new(settings.llm.clone()));
    let message_service = Arc::new(MessageService::new(repository.clone()));

    let rag_service = Arc::new(RagService::new(
        repository.clone(),
        embedding_service.clone(),
        settings.rag.clone(),
    ));

    let context_builder = ContextBuilder::new(settings.prompts.system_prompt.clone(), &settings.rag);

    let orchestrator = Arc::new(ChatOrchestrator::new(
        embedding_service,
        rag_service.clone(),
        llm_service,
        message_service,
        context_builder,
        settings.rag.match_count,
    ));

    let jwt_manager = if settings.auth.jwt_secret.is_empty() {
        info!("No JWT secret configured, all callers are anonymous");
        None
    } else {
        Some(Arc::new(JwtManager::new(&settings.auth.jwt_secret)))
    };

    let app = build_router(AppState {
        orchestrator,
        rag_service,
        db_pool: db_pool.clone(),
        jwt_manager,
    });

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
