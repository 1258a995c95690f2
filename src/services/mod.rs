//! 服务模块

pub mod generation;
pub mod knowledge;
pub mod orchestrator;
pub mod prompt;

pub use generation::{FragmentStream, OllamaGenerator, TextGenerator, create_text_generator};
pub use knowledge::{KnowledgeRegistry, KnowledgeSource, SourceStatus};
pub use orchestrator::{FragmentJoin, GenerationHandle, GenerationOrchestrator, OrchestratorSettings};
pub use prompt::{PromptTemplates, clean_title};
