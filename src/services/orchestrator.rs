//! 生成编排服务
//!
//! 一次请求依次经过：解析会话 → 聚合检索上下文 → 渲染提示词 → 流式生成 → 持久化。
//! 返回给调用方的片段流是惰性的，被丢弃时生成请求随之取消且不写入任何内容。

use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::config::GenerationConfig;
use crate::error::{AppError, Result};
use crate::models::chat::ExchangePair;
use crate::models::params::{ModelParameters, ModelParametersUpdate};
use crate::security::validation::validators::validate_query;
use crate::services::generation::{FragmentStream, TextGenerator};
use crate::services::knowledge::KnowledgeRegistry;
use crate::services::prompt::{PromptTemplates, clean_title};
use crate::storage::chat_store::ChatSessionStore;

/// 片段累积方式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FragmentJoin {
    /// 每个片段后追加一个空格：`["Hel", "lo"]` → `"Hel lo "`
    #[default]
    Spaced,
    /// 原样拼接：`["Hel", "lo"]` → `"Hello"`
    Verbatim,
}

impl FragmentJoin {
    pub fn push(self, accumulated: &mut String, fragment: &str) {
        accumulated.push_str(fragment);
        if self == FragmentJoin::Spaced {
            accumulated.push(' ');
        }
    }
}

/// 编排设置
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub title_timeout: Duration,
    pub fragment_join: FragmentJoin,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            title_timeout: Duration::from_secs(30),
            fragment_join: FragmentJoin::Spaced,
        }
    }
}

impl From<&GenerationConfig> for OrchestratorSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            title_timeout: Duration::from_secs(config.title_timeout_secs),
            fragment_join: config.fragment_join,
        }
    }
}

/// 已解析会话的生成请求
pub struct GenerationHandle {
    pub chat_id: u64,
    pub chat_name: String,
    pub fragments: FragmentStream,
}

impl std::fmt::Debug for GenerationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHandle")
            .field("chat_id", &self.chat_id)
            .field("chat_name", &self.chat_name)
            .finish_non_exhaustive()
    }
}

/// 生成编排器
pub struct GenerationOrchestrator {
    store: Arc<ChatSessionStore>,
    registry: Arc<KnowledgeRegistry>,
    generator: Arc<dyn TextGenerator>,
    templates: PromptTemplates,
    params: RwLock<ModelParameters>,
    // 生成引擎同一时刻只服务一个请求，标题生成共用同一许可
    engine: Arc<Semaphore>,
    settings: OrchestratorSettings,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<ChatSessionStore>,
        registry: Arc<KnowledgeRegistry>,
        generator: Arc<dyn TextGenerator>,
        templates: PromptTemplates,
        params: ModelParameters,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            registry,
            generator,
            templates,
            params: RwLock::new(params),
            engine: Arc::new(Semaphore::new(1)),
            settings,
        }
    }

    /// 当前生成参数
    pub fn parameters(&self) -> ModelParameters {
        *self.params.read()
    }

    /// 更新生成参数，零值字段保持不变；校验失败时参数不变
    pub fn set_parameters(&self, update: &ModelParametersUpdate) -> Result<ModelParameters> {
        let mut params = self.params.write();
        let before = *params;
        params.apply(update)?;
        if before != *params {
            info!("Model parameters changed {:?} -> {:?}", before, *params);
        }
        Ok(*params)
    }

    /// 开始一次生成
    ///
    /// `session_id` 为 `None` 时先生成标题并创建新会话。会话解析、检索和提示词渲染
    /// 在返回前完成，失败直接返回错误；之后的生成和持久化在片段流被消费时进行。
    pub async fn start(&self, query: &str, session_id: Option<u64>) -> Result<GenerationHandle> {
        validate_query(query)?;

        let (chat_id, chat_name) = match session_id {
            Some(id) => (id, self.store.name(id)?),
            None => {
                let title = self.generate_title(query).await?;
                let id = self.store.create(&title);
                (id, title)
            }
        };

        let context = self.registry.aggregate(query).await;
        debug!("Retrieved {} characters of context for chat {}", context.len(), chat_id);
        let prompt = self.templates.render_answer(&context, query, &chat_name)?;

        let fragments = self.stream(chat_id, query.to_string(), prompt);
        Ok(GenerationHandle {
            chat_id,
            chat_name,
            fragments,
        })
    }

    fn stream(&self, chat_id: u64, query: String, prompt: String) -> FragmentStream {
        let store = self.store.clone();
        let generator = self.generator.clone();
        let engine = self.engine.clone();
        let params = self.parameters();
        let join = self.settings.fragment_join;

        Box::pin(async_stream::try_stream! {
            let _permit = engine
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            // 会话锁持有到持久化结束，期间对该会话的删除会等待
            let mut lease = store.lease(chat_id).await?;

            let mut fragments = generator.generate(prompt, params);
            let mut accumulated = String::new();
            let mut count = 0usize;
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment.inspect_err(|e| {
                    warn!("Generation for chat {} failed after {} fragments: {}", chat_id, count, e);
                })?;
                join.push(&mut accumulated, &fragment);
                count += 1;
                yield fragment;
            }

            store
                .commit(&mut lease, ExchangePair::new(query, accumulated))
                .await?;
            info!("Chat {} answered with {} fragments", chat_id, count);
        })
    }

    async fn generate_title(&self, query: &str) -> Result<String> {
        let prompt = self.templates.render_title(query)?;
        let _permit = self
            .engine
            .acquire()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let collect = async {
            let mut raw = String::new();
            let mut fragments = self.generator.generate(prompt, ModelParameters::title());
            while let Some(fragment) = fragments.next().await {
                raw.push_str(&fragment?);
            }
            Ok::<_, AppError>(raw)
        };

        let raw = tokio::time::timeout(self.settings.title_timeout, collect)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "title generation exceeded {}s",
                    self.settings.title_timeout.as_secs()
                ))
            })??;

        Ok(clean_title(&raw))
    }
}
