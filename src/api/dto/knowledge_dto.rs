//! 知识库 DTO

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::services::knowledge::SourceStatus;

/// 知识库状态列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStatusResponse {
    pub data: Vec<SourceStatus>,
}

/// 按名称操作知识库（启用、停用、删除）
#[derive(Debug, Deserialize)]
pub struct SourceNameRequest {
    pub name: String,
}

/// 重命名请求
#[derive(Debug, Deserialize)]
pub struct RenameSourceRequest {
    pub old_name: String,
    pub new_name: String,
}

/// 追加文本请求
#[derive(Debug, Deserialize)]
pub struct AppendTextRequest {
    pub name: String,
    pub text: String,
}

/// 文档请求，用于追加文档和从文档创建知识库
///
/// `document_path` 是服务端本地路径。
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub name: String,
    pub document_path: PathBuf,
}
