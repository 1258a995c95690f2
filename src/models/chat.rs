use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// 一轮问答
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangePair {
    /// 用户输入
    pub user: String,
    /// 模型回复，磁盘格式中字段名为 `bot`
    #[serde(rename = "bot")]
    pub response: String,
}

impl ExchangePair {
    pub fn new(user: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            response: response.into(),
        }
    }
}

/// 会话摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: u64,
    pub name: String,
}

/// 会话文件的磁盘格式
#[derive(Debug, Serialize, Deserialize)]
struct ChatFile {
    chat_name: String,
    id: u64,
    #[serde(default)]
    chat_history: Vec<ExchangePair>,
}

/// 会话实体
///
/// `id` 创建后不可变，并唯一对应一个 `<root>/<id>.json` 文件。
/// 从磁盘加载的会话保留其原始路径。
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: u64,
    name: String,
    history: Vec<ExchangePair>,
    path: Option<PathBuf>,
}

impl ChatSession {
    /// 创建空历史的新会话，首次追加前不写文件
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            history: Vec::new(),
            path: None,
        }
    }

    /// 从会话文件加载
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::LoadCorrupt {
                path: path.display().to_string(),
                cause: e.to_string(),
            })?;
        let file: ChatFile = serde_json::from_str(&raw).map_err(|e| AppError::LoadCorrupt {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            id: file.id,
            name: file.chat_name,
            history: file.chat_history,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &[ExchangePair] {
        &self.history
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 追加一轮问答并整体写回文件
    ///
    /// 写入失败时撤销内存中的追加，磁盘上的旧内容保持不变。
    pub async fn append(&mut self, pair: ExchangePair, root: &Path) -> Result<PathBuf> {
        self.history.push(pair);
        match self.persist(root).await {
            Ok(path) => Ok(path),
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    /// 序列化整个会话，先写临时文件再原子替换
    async fn persist(&mut self, root: &Path) -> Result<PathBuf> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => root.join(format!("{}.json", self.id)),
        };

        let body = serde_json::to_string(&ChatFile {
            chat_name: self.name.clone(),
            id: self.id,
            chat_history: self.history.clone(),
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        self.path = Some(path.clone());
        Ok(path)
    }
}
