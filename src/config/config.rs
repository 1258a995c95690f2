use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::params::ModelParameters;
use crate::services::orchestrator::FragmentJoin;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_request_size: 10 * 1024 * 1024,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 会话文件目录
    pub sessions_dir: PathBuf,
    /// 知识库根目录，包含 `knowladge/` 和 `embeddings/`
    pub knowledge_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("./chats"),
            knowledge_root: PathBuf::from("./database"),
        }
    }
}

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding 后端类型: "ollama" 或 "simple"
    pub backend: String,
    /// 模型名称
    pub model_name: String,
    /// 向量维度
    pub dimension: usize,
    /// 批处理大小
    pub batch_size: usize,
    /// Ollama 服务器地址
    pub ollama_url: String,
    /// Ollama 请求超时（秒）
    pub ollama_timeout: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "simple".into(),
            model_name: "nomic-embed-text".into(),
            dimension: 384,
            batch_size: 32,
            ollama_url: "http://localhost:11434".into(),
            ollama_timeout: 60,
        }
    }
}

/// 文本生成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// 生成后端类型，目前只有 "ollama"
    pub backend: String,
    /// 模型名称
    pub model_name: String,
    /// Ollama 服务器地址
    pub ollama_url: String,
    /// 单次生成请求超时（秒）
    pub timeout_secs: u64,
    /// 会话标题生成超时（秒）
    pub title_timeout_secs: u64,
    /// 片段拼接方式
    pub fragment_join: FragmentJoin,
    /// 启动时的生成参数
    pub parameters: ModelParameters,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".into(),
            model_name: "llama3".into(),
            ollama_url: "http://localhost:11434".into(),
            timeout_secs: 300,
            title_timeout_secs: 30,
            fragment_join: FragmentJoin::default(),
            parameters: ModelParameters::default(),
        }
    }
}

/// 检索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 每个知识库返回的段落数
    pub top_k: usize,
    /// 分块大小（字符）
    pub chunk_size: usize,
    /// 相邻分块重叠（字符）
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 1,
            chunk_size: 400,
            chunk_overlap: 100,
        }
    }
}

/// 提示词模板配置（minijinja 语法）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// 回答模板，可用变量 `context`、`question`、`chat_name`
    pub answer_template: String,
    /// 标题模板，可用变量 `question`
    pub title_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            answer_template: DEFAULT_ANSWER_TEMPLATE.into(),
            title_template: DEFAULT_TITLE_TEMPLATE.into(),
        }
    }
}

const DEFAULT_ANSWER_TEMPLATE: &str = "You are a helpful assistant in the conversation \"{{ chat_name }}\".
Use the following context to answer the question. If the context does not help, answer from your own knowledge.

Context: {{ context }}

Question: {{ question }}

Answer:";

const DEFAULT_TITLE_TEMPLATE: &str = "Write a short name (at most five words) for a chat that starts with the question below.
Reply with the name only, in the form \"Chat Name: <name>\".

Question: {{ question }}

Chat Name:";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录，按天滚动
    pub log_dir: Option<PathBuf>,
    /// 日志文件名前缀
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
            file_prefix: "ragchat.log".into(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 嵌入模型配置
    pub embedding: EmbeddingConfig,
    /// 文本生成配置
    pub generation: GenerationConfig,
    /// 检索配置
    pub retrieval: RetrievalConfig,
    /// 提示词模板
    pub prompts: PromptConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompts: PromptConfig::default(),
            logging: LoggingConfig {
                level: "debug".into(),
                ..LoggingConfig::default()
            },
            app_name: "ragchat".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config
    }

    /// 共享嵌入模型产物目录
    pub fn embeddings_dir(&self) -> PathBuf {
        self.storage
            .knowledge_root
            .join(crate::services::knowledge::EMBEDDINGS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.storage.sessions_dir, PathBuf::from("./chats"));
        assert_eq!(config.retrieval.top_k, 1);
        assert_eq!(config.retrieval.chunk_size, 400);
        assert_eq!(config.retrieval.chunk_overlap, 100);
        assert_eq!(config.generation.fragment_join, FragmentJoin::Spaced);
        assert_eq!(config.generation.parameters, ModelParameters::default());
        assert_eq!(
            config.embeddings_dir(),
            PathBuf::from("./database").join("embeddings")
        );
    }

    #[test]
    fn test_production_overrides() {
        let config = AppConfig::production();
        assert_eq!(config.environment, "production");
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.structured);
    }
}
