//! 错误处理模块
//!
//! 定义应用程序的错误类型和错误处理逻辑。知识库的变更类错误携带目标名称和
//! 底层原因，边界层只暴露成功/失败，原因写入日志和响应的 `error` 字段。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 资源不存在（会话 ID 或知识库名称）
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 知识库重命名失败
    #[error("重命名失败 {old} -> {new}: {cause}")]
    RenameFailed {
        old: String,
        new: String,
        cause: String,
    },

    /// 删除失败（知识库目录或会话文件）
    #[error("删除失败 {target}: {cause}")]
    RemoveFailed { target: String, cause: String },

    /// 向知识库追加内容失败
    #[error("追加内容失败 {target}: {cause}")]
    AppendFailed { target: String, cause: String },

    /// 从文档创建知识库失败
    #[error("创建知识库失败 {target}: {cause}")]
    CreateFailed { target: String, cause: String },

    /// 持久化数据损坏或不兼容
    #[error("数据损坏 {path}: {cause}")]
    LoadCorrupt { path: String, cause: String },

    /// 文本生成引擎错误
    #[error("文本生成失败: {0}")]
    GenerationFailed(String),

    /// 参数验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 连接错误
    #[error("连接错误: {0}")]
    Connection(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 向量索引错误
    #[error("向量索引错误: {0}")]
    VectorIndex(String),

    /// 嵌入模型错误
    #[error("嵌入模型错误: {0}")]
    Embedding(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Connection(e.to_string())
        }
    }
}

impl From<minijinja::Error> for AppError {
    fn from(e: minijinja::Error) -> Self {
        AppError::Internal(format!("template: {}", e))
    }
}

/// Axum response implementation for AppError
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = (&self).into();
        let body = Json(ErrorResponse::new(&code, &self.to_string()));
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
    /// 详细信息
    pub details: Option<String>,
}

impl ErrorResponse {
    /// 创建新错误响应
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}

/// HTTP 状态码映射
impl From<&AppError> for (u16, String) {
    fn from(err: &AppError) -> (u16, String) {
        match err {
            AppError::NotFound(_) => (404, "NOT_FOUND".to_string()),
            AppError::Validation(_) => (400, "BAD_REQUEST".to_string()),
            AppError::Timeout(_) => (504, "TIMEOUT".to_string()),
            AppError::Connection(_) => (503, "SERVICE_UNAVAILABLE".to_string()),
            AppError::RenameFailed { .. } => (409, "RENAME_FAILED".to_string()),
            AppError::RemoveFailed { .. } => (500, "REMOVE_FAILED".to_string()),
            AppError::AppendFailed { .. } => (500, "APPEND_FAILED".to_string()),
            AppError::CreateFailed { .. } => (500, "CREATE_FAILED".to_string()),
            AppError::GenerationFailed(_) => (502, "GENERATION_FAILED".to_string()),
            AppError::VectorIndex(_) => (500, "INDEX_ERROR".to_string()),
            AppError::Embedding(_) => (500, "EMBEDDING_ERROR".to_string()),
            _ => (500, "INTERNAL_ERROR".to_string()),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
