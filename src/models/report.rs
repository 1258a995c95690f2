//! 启动加载报告
//!
//! 会话和知识库按条目隔离加载，损坏的条目被跳过并记录在这里。

use serde::Serialize;

/// 被跳过的条目类型
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkippedKind {
    ChatSession,
    KnowledgeSource,
}

/// 单个被跳过的条目
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedItem {
    pub kind: SkippedKind,
    pub path: String,
    pub reason: String,
}

/// 启动加载报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub sessions_loaded: usize,
    pub sources_loaded: usize,
    pub skipped: Vec<SkippedItem>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn skip(&mut self, kind: SkippedKind, path: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedItem {
            kind,
            path: path.into(),
            reason: reason.into(),
        });
    }

    /// 合并另一份报告
    pub fn merge(&mut self, other: LoadReport) {
        self.sessions_loaded += other.sessions_loaded;
        self.sources_loaded += other.sources_loaded;
        self.skipped.extend(other.skipped);
    }
}
