//! 知识库服务
//!
//! `KnowledgeSource` 是单个可独立启停的检索后端；`KnowledgeRegistry` 持有全部知识库，
//! 共享一个嵌入模型，负责聚合检索以及重命名、删除、追加、从文档创建等变更操作。
//! 每个变更操作独立成败，失败不会影响其他知识库。

use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::index::{DocumentLoader, EmbeddingModel, FlatVectorStore, TextChunker, VectorStore};
use crate::models::report::{LoadReport, SkippedKind};
use crate::security::validation::validators::{validate_passage, validate_source_name};

/// 知识库目录名（沿用既有磁盘布局的拼写）
pub const KNOWLEDGE_DIR: &str = "knowladge";

/// 共享嵌入模型产物目录名
pub const EMBEDDINGS_DIR: &str = "embeddings";

/// 知识库状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceStatus {
    pub name: String,
    pub active: bool,
}

/// 单个知识库
pub struct KnowledgeSource {
    name: RwLock<String>,
    active: AtomicBool,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl KnowledgeSource {
    /// 创建处于激活状态的知识库
    pub fn new(name: &str, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            name: RwLock::new(name.to_string()),
            active: AtomicBool::new(true),
            store,
            top_k: top_k.max(1),
        }
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> SourceStatus {
        SourceStatus {
            name: self.name(),
            active: self.is_active(),
        }
    }

    /// 检索最相近的段落并以单个空格拼接
    ///
    /// 未激活时直接返回空串且不访问索引；检索出错时记录日志并返回空串。
    pub async fn query(&self, text: &str) -> String {
        if !self.is_active() {
            return String::new();
        }

        match self.store.similarity_search(text, self.top_k).await {
            Ok(passages) => passages
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join(" "),
            Err(e) => {
                warn!("Knowledge source {} query failed: {}", self.name(), e);
                String::new()
            }
        }
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }
}

impl std::fmt::Debug for KnowledgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeSource")
            .field("name", &self.name())
            .field("active", &self.is_active())
            .field("passages", &self.store.len())
            .finish()
    }
}

/// 知识库注册表
pub struct KnowledgeRegistry {
    root: PathBuf,
    sources: RwLock<Vec<Arc<KnowledgeSource>>>,
    embedding_model: Arc<dyn EmbeddingModel>,
    chunker: Arc<dyn TextChunker>,
    loader: Arc<dyn DocumentLoader>,
    top_k: usize,
    // 串行化所有变更操作，读操作不等待它
    mutation_lock: Mutex<()>,
}

impl KnowledgeRegistry {
    /// 创建空注册表
    pub fn new(
        root: impl Into<PathBuf>,
        embedding_model: Arc<dyn EmbeddingModel>,
        chunker: Arc<dyn TextChunker>,
        loader: Arc<dyn DocumentLoader>,
        top_k: usize,
    ) -> Self {
        Self {
            root: root.into(),
            sources: RwLock::new(Vec::new()),
            embedding_model,
            chunker,
            loader,
            top_k,
            mutation_lock: Mutex::new(()),
        }
    }

    /// 加载 `<root>/knowladge/` 下的全部知识库
    ///
    /// 子目录按名称排序加载；打不开的索引记录并跳过，其余照常加载。
    pub async fn load(
        root: impl Into<PathBuf>,
        embedding_model: Arc<dyn EmbeddingModel>,
        chunker: Arc<dyn TextChunker>,
        loader: Arc<dyn DocumentLoader>,
        top_k: usize,
    ) -> Result<(Self, LoadReport)> {
        let registry = Self::new(root, embedding_model, chunker, loader, top_k);
        let knowledge_dir = registry.knowledge_dir();
        info!("Loading knowledge sources from {}", knowledge_dir.display());
        tokio::fs::create_dir_all(&knowledge_dir).await?;

        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&knowledge_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut report = LoadReport::default();
        let mut loaded = Vec::new();
        for dir in dirs {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                report.skip(SkippedKind::KnowledgeSource, dir.display().to_string(), "non UTF-8 name");
                continue;
            };
            match FlatVectorStore::open(&dir, registry.embedding_model.clone()).await {
                Ok(store) => {
                    info!("Loaded knowledge source {} ({} passages)", name, store.len());
                    loaded.push(Arc::new(KnowledgeSource::new(
                        &name,
                        Arc::new(store),
                        registry.top_k,
                    )));
                }
                Err(e) => {
                    warn!("Skipping knowledge source {}: {}", name, e);
                    report.skip(SkippedKind::KnowledgeSource, dir.display().to_string(), e.to_string());
                }
            }
        }

        report.sources_loaded = loaded.len();
        info!(
            "Loaded {} knowledge sources ({} skipped)",
            report.sources_loaded,
            report.skipped.len()
        );
        *registry.sources.write() = loaded;
        Ok((registry, report))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.root.join(KNOWLEDGE_DIR)
    }

    fn source_dir(&self, name: &str) -> PathBuf {
        self.knowledge_dir().join(name)
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// 注册一个已构建的知识库，名称重复时失败
    fn register(&self, source: KnowledgeSource) -> Result<()> {
        let mut sources = self.sources.write();
        let name = source.name();
        if sources.iter().any(|s| s.name() == name) {
            return Err(AppError::Validation(format!(
                "knowledge source {} already exists",
                name
            )));
        }
        sources.push(Arc::new(source));
        Ok(())
    }

    /// 按名称查找
    pub fn get(&self, name: &str) -> Option<Arc<KnowledgeSource>> {
        self.sources.read().iter().find(|s| s.name() == name).cloned()
    }

    /// 当前全部知识库的快照，保持注册顺序
    fn snapshot(&self) -> Vec<Arc<KnowledgeSource>> {
        self.sources.read().clone()
    }

    /// 全部知识库的状态，按注册顺序
    pub fn status(&self) -> Vec<SourceStatus> {
        self.snapshot().iter().map(|s| s.status()).collect()
    }

    /// 激活或停用知识库，重复设置同一状态视为成功
    pub fn set_active(&self, name: &str, active: bool) -> Result<()> {
        let source = self
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("knowledge source {}", name)))?;
        if active {
            source.activate();
        } else {
            source.deactivate();
        }
        info!(
            "Knowledge source {} {}",
            name,
            if active { "activated" } else { "deactivated" }
        );
        Ok(())
    }

    /// 聚合全部知识库的检索结果
    ///
    /// 各知识库并发检索，结果按注册顺序以单个空格拼接，空结果不参与拼接。
    pub async fn aggregate(&self, query: &str) -> String {
        let sources = self.snapshot();
        let answers = join_all(sources.iter().map(|s| s.query(query))).await;
        answers
            .into_iter()
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 重命名知识库
    ///
    /// 先重命名目录，成功后再更新内存中的名称，目录重命名失败时内存不变。
    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let fail = |cause: String| {
            error!("Knowledge source rename {} -> {} failed: {}", old, new, cause);
            AppError::RenameFailed {
                old: old.to_string(),
                new: new.to_string(),
                cause,
            }
        };

        let source = self
            .get(old)
            .ok_or_else(|| fail("unknown knowledge source".into()))?;
        if old == new {
            return Ok(());
        }
        validate_source_name(new).map_err(|e| fail(e.to_string()))?;
        if self.get(new).is_some() {
            return Err(fail("name already in use".into()));
        }

        let from = self.source_dir(old);
        let to = self.source_dir(new);
        if tokio::fs::try_exists(&to).await.map_err(|e| fail(e.to_string()))? {
            return Err(fail(format!("directory {} already exists", to.display())));
        }
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| fail(e.to_string()))?;

        source.store.relocate(to);
        source.set_name(new);
        info!("Knowledge source renamed {} -> {}", old, new);
        Ok(())
    }

    /// 删除知识库目录和内存条目
    pub async fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let fail = |cause: String| {
            error!("Knowledge source {} was not removed: {}", name, cause);
            AppError::RemoveFailed {
                target: name.to_string(),
                cause,
            }
        };

        let source = self
            .get(name)
            .ok_or_else(|| fail("unknown knowledge source".into()))?;
        tokio::fs::remove_dir_all(self.source_dir(name))
            .await
            .map_err(|e| fail(e.to_string()))?;

        self.sources.write().retain(|s| !Arc::ptr_eq(s, &source));
        info!("Knowledge source {} removed", name);
        Ok(())
    }

    /// 把一段原始文本作为单个段落追加到知识库
    pub async fn append_text(&self, name: &str, text: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let fail = |cause: String| append_failed(name, cause);

        let source = self
            .get(name)
            .ok_or_else(|| fail("unknown knowledge source".into()))?;
        validate_passage(text).map_err(|e| fail(e.to_string()))?;
        source
            .store
            .add_texts(&[text.to_string()])
            .await
            .map_err(|e| fail(e.to_string()))?;

        info!("Added text to knowledge source {}", name);
        Ok(())
    }

    /// 抽取并分块文档后追加到知识库
    pub async fn append_document(&self, name: &str, document: &Path) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let fail = |cause: String| append_failed(name, cause);

        let source = self
            .get(name)
            .ok_or_else(|| fail("unknown knowledge source".into()))?;
        let chunks = self
            .extract_chunks(document)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let added = source
            .store
            .add_texts(&chunks)
            .await
            .map_err(|e| fail(e.to_string()))?;

        info!(
            "Added {} chunks from {} to knowledge source {}",
            added,
            document.display(),
            name
        );
        Ok(())
    }

    /// 从文档创建新的知识库并注册为激活状态
    ///
    /// 任一步骤失败都不会注册半成品，已写入的目录会被清理。
    pub async fn create_from_document(&self, name: &str, document: &Path) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        let fail = |cause: String| {
            error!(
                "Knowledge source {} was not created from {}: {}",
                name,
                document.display(),
                cause
            );
            AppError::CreateFailed {
                target: name.to_string(),
                cause,
            }
        };

        validate_source_name(name).map_err(|e| fail(e.to_string()))?;
        if self.get(name).is_some() {
            return Err(fail("name already in use".into()));
        }
        let dir = self.source_dir(name);
        if tokio::fs::try_exists(&dir).await.map_err(|e| fail(e.to_string()))? {
            return Err(fail(format!("directory {} already exists", dir.display())));
        }

        let chunks = self
            .extract_chunks(document)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let store = match FlatVectorStore::create(&dir, self.embedding_model.clone(), &chunks).await
        {
            Ok(store) => store,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                return Err(fail(e.to_string()));
            }
        };

        if let Err(e) = self.register(KnowledgeSource::new(name, Arc::new(store), self.top_k)) {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(fail(e.to_string()));
        }
        info!(
            "Knowledge source {} created from {} ({} chunks)",
            name,
            document.display(),
            chunks.len()
        );
        Ok(())
    }

    async fn extract_chunks(&self, document: &Path) -> Result<Vec<String>> {
        let text = self.loader.load(document).await?;
        let chunks = self.chunker.split(&text);
        if chunks.is_empty() {
            return Err(AppError::Validation(format!(
                "document {} produced no chunks",
                document.display()
            )));
        }
        Ok(chunks)
    }
}

fn append_failed(name: &str, cause: String) -> AppError {
    error!("Adding to knowledge source {} failed: {}", name, cause);
    AppError::AppendFailed {
        target: name.to_string(),
        cause,
    }
}

impl std::fmt::Debug for KnowledgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeRegistry")
            .field("root", &self.root)
            .field("sources", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{PlainTextLoader, RecursiveChunker, SimpleEmbeddingModel};

    fn model() -> Arc<dyn EmbeddingModel> {
        Arc::new(SimpleEmbeddingModel::new(256))
    }

    fn empty_registry(root: &Path) -> KnowledgeRegistry {
        KnowledgeRegistry::new(
            root,
            model(),
            Arc::new(RecursiveChunker::default()),
            Arc::new(PlainTextLoader),
            1,
        )
    }

    fn write_doc(dir: &Path, file: &str, text: &str) -> PathBuf {
        let path = dir.join(file);
        std::fs::write(&path, text).unwrap();
        path
    }

    async fn registry_with(root: &Path, sources: &[(&str, &str)]) -> KnowledgeRegistry {
        let registry = empty_registry(root);
        for (name, text) in sources {
            let doc = write_doc(root, &format!("{}.txt", name), text);
            registry.create_from_document(name, &doc).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_create_from_document_registers_active_source() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("rust", "ownership and borrowing")]).await;

        assert_eq!(
            registry.status(),
            vec![SourceStatus {
                name: "rust".into(),
                active: true
            }]
        );
        assert!(registry.knowledge_dir().join("rust").join("index.json").exists());
    }

    #[tokio::test]
    async fn test_create_failure_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = empty_registry(dir.path());

        let missing = dir.path().join("missing.txt");
        let result = registry.create_from_document("broken", &missing).await;

        assert!(matches!(result, Err(AppError::CreateFailed { .. })));
        assert!(registry.is_empty());
        assert!(!registry.knowledge_dir().join("broken").exists());
    }

    #[tokio::test]
    async fn test_create_with_duplicate_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("docs", "first corpus")]).await;
        let doc = write_doc(dir.path(), "other.txt", "second corpus");

        let result = registry.create_from_document("docs", &doc).await;
        assert!(matches!(result, Err(AppError::CreateFailed { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("docs", "first corpus")]).await;
        let store = FlatVectorStore::create(&dir.path().join("spare"), model(), &["spare".to_string()])
            .await
            .unwrap();

        let result = registry.register(KnowledgeSource::new("docs", Arc::new(store), 1));
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha text")]).await;

        registry.set_active("a", true).unwrap();
        assert!(registry.get("a").unwrap().is_active());

        registry.set_active("a", false).unwrap();
        registry.set_active("a", false).unwrap();
        assert!(!registry.get("a").unwrap().is_active());

        assert!(matches!(
            registry.set_active("missing", true),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_source_answers_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha text")]).await;
        let source = registry.get("a").unwrap();

        assert_eq!(source.query("alpha").await, "alpha text");
        source.deactivate();
        assert_eq!(source.query("alpha").await, "");
    }

    #[tokio::test]
    async fn test_aggregate_all_inactive_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            registry_with(dir.path(), &[("a", "alpha text"), ("b", "beta text")]).await;
        registry.set_active("a", false).unwrap();
        registry.set_active("b", false).unwrap();

        assert_eq!(registry.aggregate("alpha").await, "");
    }

    #[tokio::test]
    async fn test_aggregate_single_active_equals_its_query() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            registry_with(dir.path(), &[("a", "alpha text"), ("b", "beta text")]).await;
        registry.set_active("a", false).unwrap();

        let expected = registry.get("b").unwrap().query("beta").await;
        assert_eq!(registry.aggregate("beta").await, expected);
        assert_eq!(expected, "beta text");
    }

    #[tokio::test]
    async fn test_aggregate_follows_registry_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(
            dir.path(),
            &[("z", "zulu passage"), ("a", "alpha passage")],
        )
        .await;

        assert_eq!(
            registry.aggregate("passage").await,
            "zulu passage alpha passage"
        );
        assert_eq!(registry.aggregate("passage").await, registry.aggregate("passage").await);
    }

    #[tokio::test]
    async fn test_rename_moves_directory_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("old", "some text")]).await;

        registry.rename("old", "new").await.unwrap();
        assert!(registry.get("old").is_none());
        assert!(registry.get("new").is_some());
        assert!(registry.knowledge_dir().join("new").exists());
        assert!(!registry.knowledge_dir().join("old").exists());

        // 追加写入的是新目录
        registry.append_text("new", "more text").await.unwrap();
        let reloaded = FlatVectorStore::open(&registry.knowledge_dir().join("new"), model())
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn test_rename_to_taken_name_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha"), ("b", "beta")]).await;

        let result = registry.rename("a", "b").await;
        assert!(matches!(result, Err(AppError::RenameFailed { .. })));
        assert_eq!(
            registry.status().iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(registry.knowledge_dir().join("a").exists());
        assert!(registry.knowledge_dir().join("b").exists());
    }

    #[tokio::test]
    async fn test_rename_with_failed_directory_move_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha")]).await;
        std::fs::remove_dir_all(registry.knowledge_dir().join("a")).unwrap();

        let result = registry.rename("a", "b").await;
        assert!(matches!(result, Err(AppError::RenameFailed { .. })));
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_leaves_sources_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha")]).await;

        let result = registry.remove("nope").await;
        assert!(matches!(result, Err(AppError::RemoveFailed { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_deletes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha"), ("b", "beta")]).await;

        registry.remove("a").await.unwrap();
        assert_eq!(registry.status().len(), 1);
        assert!(!registry.knowledge_dir().join("a").exists());
    }

    #[tokio::test]
    async fn test_append_to_unknown_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = empty_registry(dir.path());
        let doc = write_doc(dir.path(), "doc.txt", "content");

        assert!(matches!(
            registry.append_text("ghost", "text").await,
            Err(AppError::AppendFailed { .. })
        ));
        assert!(matches!(
            registry.append_document("ghost", &doc).await,
            Err(AppError::AppendFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_append_document_adds_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a", "alpha")]).await;
        let doc = write_doc(dir.path(), "more.txt", "first part\n\nsecond part");

        registry.append_document("a", &doc).await.unwrap();
        let source = registry.get("a").unwrap();
        assert_eq!(source.store.len(), 2);
    }

    #[tokio::test]
    async fn test_load_skips_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            registry_with(dir.path(), &[("good", "fine text")]).await;
        }
        let broken = dir.path().join(KNOWLEDGE_DIR).join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("index.json"), "not an index").unwrap();

        let (registry, report) = KnowledgeRegistry::load(
            dir.path(),
            model(),
            Arc::new(RecursiveChunker::default()),
            Arc::new(PlainTextLoader),
            1,
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("good").is_some());
        assert_eq!(report.sources_loaded, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, SkippedKind::KnowledgeSource);
    }
}
