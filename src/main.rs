use ragchat::api::{self, app_state::AppState};
use ragchat::config::loader::ConfigLoader;
use ragchat::index::{ExtensionLoader, RecursiveChunker, create_embedding_model};
use ragchat::models::report::LoadReport;
use ragchat::observability::{ObservabilityState, create_observability_router, init_tracing};
use ragchat::services::{
    GenerationOrchestrator, KnowledgeRegistry, OrchestratorSettings, PromptTemplates,
    create_text_generator,
};
use ragchat::storage::ChatSessionStore;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load()?;
    ConfigLoader::validate(&config)?;

    let _log_guard = init_tracing(&config.logging)?;
    info!("Starting ragchat ({})...", config.environment);
    info!("Configuration loaded successfully");

    let embedding_model = create_embedding_model(&config.embedding, &config.embeddings_dir()).await?;
    info!(
        "Embedding model initialized: {} (backend: {}, dimension: {})",
        config.embedding.model_name,
        config.embedding.backend,
        embedding_model.dimension()
    );

    let (registry, sources_report) = KnowledgeRegistry::load(
        config.storage.knowledge_root.clone(),
        embedding_model,
        Arc::new(RecursiveChunker::new(
            config.retrieval.chunk_size,
            config.retrieval.chunk_overlap,
        )),
        Arc::new(ExtensionLoader::default()),
        config.retrieval.top_k,
    )
    .await?;
    let registry = Arc::new(registry);
    info!("Knowledge registry initialized");

    let (store, sessions_report) = ChatSessionStore::load_all(config.storage.sessions_dir.clone()).await?;
    let store = Arc::new(store);
    info!("Chat session store initialized");

    let mut report = LoadReport::default();
    report.merge(sessions_report);
    report.merge(sources_report);
    if !report.is_clean() {
        warn!("{} items were skipped during startup", report.skipped.len());
    }

    let generator = create_text_generator(&config.generation)?;
    info!(
        "Text generator initialized: {} (backend: {})",
        config.generation.model_name, config.generation.backend
    );

    let orchestrator = GenerationOrchestrator::new(
        store.clone(),
        registry.clone(),
        generator,
        PromptTemplates::new(&config.prompts)?,
        config.generation.parameters,
        OrchestratorSettings::from(&config.generation),
    );

    let app_state = AppState::new(store.clone(), registry.clone(), orchestrator);
    info!("Application state created");

    // 创建可观测性状态并集成路由
    let observability_state = Arc::new(ObservabilityState::new(
        store,
        registry,
        report,
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    let api_router = api::create_router_with_limit(app_state, config.server.max_request_size);
    let router = create_observability_router(observability_state).merge(api_router);
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
