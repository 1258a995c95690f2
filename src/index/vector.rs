//! 向量索引服务
//!
//! 每个知识库目录下保存一个 `index.json`，包含维度、段落文本和向量。
//! 检索为暴力余弦相似度。

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::index::embedding::EmbeddingModel;

/// 索引文件名
pub const INDEX_FILE: &str = "index.json";

/// 检索命中的段落
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 追加段落并持久化，返回追加数量
    async fn add_texts(&self, texts: &[String]) -> Result<usize>;
    /// 返回与查询最相近的 k 个段落，按相似度降序
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
    /// 索引目录被外部移动后更新保存位置
    fn relocate(&self, dir: PathBuf);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    text: String,
    vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// 基于文件的平铺向量索引
pub struct FlatVectorStore {
    dir: RwLock<PathBuf>,
    embedding_model: Arc<dyn EmbeddingModel>,
    entries: RwLock<Vec<IndexEntry>>,
}

impl FlatVectorStore {
    /// 打开已有索引，维度与嵌入模型不一致视为不兼容
    pub async fn open(dir: &Path, embedding_model: Arc<dyn EmbeddingModel>) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::LoadCorrupt {
                path: path.display().to_string(),
                cause: e.to_string(),
            })?;
        let file: IndexFile = serde_json::from_str(&raw).map_err(|e| AppError::LoadCorrupt {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;

        let dimension = embedding_model.dimension();
        if file.dimension != dimension
            || file.entries.iter().any(|e| e.vector.len() != dimension)
        {
            return Err(AppError::LoadCorrupt {
                path: path.display().to_string(),
                cause: format!(
                    "index dimension {} does not match embedding dimension {}",
                    file.dimension, dimension
                ),
            });
        }

        Ok(Self {
            dir: RwLock::new(dir.to_path_buf()),
            embedding_model,
            entries: RwLock::new(file.entries),
        })
    }

    /// 从段落构建新索引并写入目录（目录不存在时创建）
    pub async fn create(
        dir: &Path,
        embedding_model: Arc<dyn EmbeddingModel>,
        texts: &[String],
    ) -> Result<Self> {
        if texts.is_empty() {
            return Err(AppError::VectorIndex(
                "cannot build an index from zero passages".into(),
            ));
        }

        let entries = Self::embed(embedding_model.as_ref(), texts).await?;
        tokio::fs::create_dir_all(dir).await?;
        Self::write(dir, embedding_model.dimension(), &entries).await?;

        Ok(Self {
            dir: RwLock::new(dir.to_path_buf()),
            embedding_model,
            entries: RwLock::new(entries),
        })
    }

    async fn embed(model: &dyn EmbeddingModel, texts: &[String]) -> Result<Vec<IndexEntry>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = model.encode_batch(&refs).await?;
        if vectors.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(texts
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(text, vector)| IndexEntry { text, vector })
            .collect())
    }

    async fn write(dir: &Path, dimension: usize, entries: &[IndexEntry]) -> Result<()> {
        let body = serde_json::to_string(&IndexFile {
            dimension,
            entries: entries.to_vec(),
        })?;
        let path = dir.join(INDEX_FILE);
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn add_texts(&self, texts: &[String]) -> Result<usize> {
        if texts.is_empty() {
            return Ok(0);
        }

        let new_entries = Self::embed(self.embedding_model.as_ref(), texts).await?;
        let mut combined = self.entries.read().clone();
        combined.extend(new_entries);

        // 先落盘，成功后再替换内存中的条目
        let dir = self.dir.read().clone();
        Self::write(&dir, self.embedding_model.dimension(), &combined).await?;
        *self.entries.write() = combined;

        Ok(texts.len())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let query_vector = self.embedding_model.encode(query).await?;
        if query_vector.len() != self.embedding_model.dimension() {
            return Err(AppError::VectorIndex(format!(
                "query dimension {} does not match index dimension {}",
                query_vector.len(),
                self.embedding_model.dimension()
            )));
        }

        let mut results: Vec<Passage> = self
            .entries
            .read()
            .iter()
            .map(|entry| Passage {
                text: entry.text.clone(),
                score: Self::cosine_similarity(&query_vector, &entry.vector),
            })
            .collect();

        // 稳定排序，同分时保持插入顺序
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);

        Ok(results)
    }

    fn relocate(&self, dir: PathBuf) {
        *self.dir.write() = dir;
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::embedding::SimpleEmbeddingModel;

    fn model() -> Arc<dyn EmbeddingModel> {
        Arc::new(SimpleEmbeddingModel::new(256))
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatVectorStore::create(
            dir.path(),
            model(),
            &texts(&[
                "the borrow checker enforces ownership",
                "tokio is an async runtime",
            ]),
        )
        .await
        .unwrap();

        let results = store.similarity_search("async runtime", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "tokio is an async runtime");
        assert!(dir.path().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_add_texts_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatVectorStore::create(dir.path(), model(), &texts(&["first passage"]))
            .await
            .unwrap();

        store.add_texts(&texts(&["second passage"])).await.unwrap();
        assert_eq!(store.len(), 2);

        let reopened = FlatVectorStore::open(dir.path(), model()).await.unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[tokio::test]
    async fn test_add_texts_failure_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatVectorStore::create(dir.path(), model(), &texts(&["only"]))
            .await
            .unwrap();
        store.relocate(dir.path().join("missing"));

        assert!(store.add_texts(&texts(&["extra"])).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        FlatVectorStore::create(dir.path(), model(), &texts(&["text"]))
            .await
            .unwrap();

        let other: Arc<dyn EmbeddingModel> = Arc::new(SimpleEmbeddingModel::new(8));
        let result = FlatVectorStore::open(dir.path(), other).await;
        assert!(matches!(result, Err(AppError::LoadCorrupt { .. })));
    }

    #[tokio::test]
    async fn test_create_from_nothing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = FlatVectorStore::create(&dir.path().join("kb"), model(), &[]).await;
        assert!(result.is_err());
        assert!(!dir.path().join("kb").exists());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert_eq!(FlatVectorStore::cosine_similarity(&a, &b), 1.0);
        assert_eq!(FlatVectorStore::cosine_similarity(&a, &c), 0.0);
    }
}
