//! 嵌入模型服务

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::config::EmbeddingConfig;
use crate::error::{AppError, Result};

/// 词表文件名，位于 `<kb_root>/embeddings/` 下
pub const WORD_TABLE_FILE: &str = "embeddings.json";

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// 本地嵌入模型
///
/// 词表中的词使用词向量，未收录的词按 FNV-1a 哈希落入固定维度（feature hashing），
/// 因此同一文本在不同进程中总是得到相同向量。
pub struct SimpleEmbeddingModel {
    embeddings: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl SimpleEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            embeddings: HashMap::new(),
            dimension,
        }
    }

    /// 从目录加载词表，文件不存在时返回空词表模型
    pub async fn load(dir: &Path, dimension: usize) -> Result<Self> {
        let mut model = Self::new(dimension);
        let path = dir.join(WORD_TABLE_FILE);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(model);
        }

        let raw = tokio::fs::read_to_string(&path).await?;
        let table: HashMap<String, Vec<f32>> =
            serde_json::from_str(&raw).map_err(|e| AppError::LoadCorrupt {
                path: path.display().to_string(),
                cause: e.to_string(),
            })?;
        for (word, embedding) in &table {
            if embedding.len() != dimension {
                return Err(AppError::Embedding(format!(
                    "word '{}' has dimension {}, expected {}",
                    word,
                    embedding.len(),
                    dimension
                )));
            }
            model.add_word_embedding(word, embedding);
        }
        info!("Loaded {} word embeddings from {}", table.len(), path.display());
        Ok(model)
    }

    pub fn add_word_embedding(&mut self, word: &str, embedding: &[f32]) {
        if embedding.len() == self.dimension {
            self.embeddings
                .insert(word.to_lowercase(), embedding.to_vec());
        }
    }

    fn fnv1a(word: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }
}

#[async_trait]
impl EmbeddingModel for SimpleEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut sum = vec![0.0; self.dimension];
        if self.dimension == 0 {
            return Ok(sum);
        }

        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);

        for word in words {
            match self.embeddings.get(&word) {
                Some(embedding) => {
                    for (i, val) in embedding.iter().enumerate() {
                        sum[i] += val;
                    }
                }
                None => {
                    let hash = Self::fnv1a(&word);
                    let slot = (hash % self.dimension as u64) as usize;
                    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
                    sum[slot] += sign;
                }
            }
        }

        Ok(sum)
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let embedding = self.encode(text).await?;
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Ollama Embedding 模型客户端
pub struct OllamaEmbeddingModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.ollama_timeout))
            .build()?;

        Ok(Self {
            client,
            model_name: config.model_name.clone(),
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn embed(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
                "truncate": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Ollama embedding failed: {}",
                error_text
            )));
        }

        let embed_response: OllamaEmbedResponse = response.json().await?;
        if let Some(bad) = embed_response
            .embeddings
            .iter()
            .find(|e| e.len() != self.dimension)
        {
            return Err(AppError::Embedding(format!(
                "Ollama returned dimension {}, expected {}",
                bad.len(),
                self.dimension
            )));
        }
        Ok(embed_response.embeddings)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(vec![text]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Ollama returned no embedding".into()))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Ollama 支持批量输入，但为了稳定性，分批处理
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embed(chunk.to_vec()).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 根据配置创建共享嵌入模型
///
/// `artifacts_dir` 为 `<kb_root>/embeddings`，simple 后端从中读取词表。
pub async fn create_embedding_model(
    config: &EmbeddingConfig,
    artifacts_dir: &Path,
) -> Result<Arc<dyn EmbeddingModel>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbeddingModel::new(config)?)),
        "simple" => Ok(Arc::new(
            SimpleEmbeddingModel::load(artifacts_dir, config.dimension).await?,
        )),
        other => Err(AppError::Config(format!(
            "unknown embedding backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_simple_embedding_model() {
        let model = SimpleEmbeddingModel::new(384);
        let model: Box<dyn EmbeddingModel> = Box::new(model);

        let result = model.encode("hello world").await.unwrap();
        assert_eq!(result.len(), 384);
        assert_eq!(model.dimension(), 384);
        assert!(result.iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn test_simple_embedding_is_deterministic_and_case_insensitive() {
        let model = SimpleEmbeddingModel::new(64);

        let a = model.encode("Rust ownership rules").await.unwrap();
        let b = model.encode("rust OWNERSHIP, rules!").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_batch_encoding() {
        let model = SimpleEmbeddingModel::new(384);
        let model: Box<dyn EmbeddingModel> = Box::new(model);

        let texts = vec!["hello", "world", "test"];
        let results = model.encode_batch(&texts).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.len() == 384));
    }

    #[tokio::test]
    async fn test_word_table_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(WORD_TABLE_FILE),
            r#"{"cat": [1.0, 0.0, 0.0], "dog": [0.0, 1.0, 0.0]}"#,
        )
        .unwrap();

        let model = SimpleEmbeddingModel::load(dir.path(), 3).await.unwrap();
        assert_eq!(model.encode("cat").await.unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(model.encode("cat dog").await.unwrap(), vec![1.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_word_table_with_wrong_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(WORD_TABLE_FILE), r#"{"cat": [1.0, 0.0]}"#).unwrap();

        let result = SimpleEmbeddingModel::load(dir.path(), 3).await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_ollama_embedding_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embeddings": [[0.5, 0.5, 0.0]]})),
            )
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            backend: "ollama".into(),
            ollama_url: server.uri(),
            dimension: 3,
            ..Default::default()
        };
        let model = OllamaEmbeddingModel::new(&config).unwrap();

        assert_eq!(model.encode("hi").await.unwrap(), vec![0.5, 0.5, 0.0]);
    }

    #[tokio::test]
    async fn test_ollama_error_status_is_embedding_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            backend: "ollama".into(),
            ollama_url: server.uri(),
            dimension: 3,
            ..Default::default()
        };
        let model = OllamaEmbeddingModel::new(&config).unwrap();

        let err = model.encode("hi").await.unwrap_err();
        assert!(matches!(err, AppError::Embedding(msg) if msg.contains("model not loaded")));
    }
}
