use crate::services::knowledge::KnowledgeRegistry;
use crate::services::orchestrator::GenerationOrchestrator;
use crate::storage::chat_store::ChatSessionStore;
use std::sync::Arc;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    /// Chat session store
    pub store: Arc<ChatSessionStore>,
    /// Knowledge source registry
    pub registry: Arc<KnowledgeRegistry>,
    /// Generation pipeline
    pub orchestrator: Arc<GenerationOrchestrator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("orchestrator", &"Arc<GenerationOrchestrator>")
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(
        store: Arc<ChatSessionStore>,
        registry: Arc<KnowledgeRegistry>,
        orchestrator: GenerationOrchestrator,
    ) -> Self {
        Self {
            store,
            registry,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
