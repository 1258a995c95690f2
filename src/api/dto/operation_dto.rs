//! 操作结果 DTO

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// 变更操作的统一响应
///
/// `success` 保持布尔语义，失败时 `error` 携带具体原因。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}

impl OperationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, err: &AppError) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(err.to_string()),
        }
    }

    /// 把操作结果转换为 HTTP 响应，失败时状态码沿用错误映射
    pub fn from_result(result: Result<()>, message: impl Into<String>) -> Response {
        let message = message.into();
        match result {
            Ok(()) => (StatusCode::OK, Json(Self::ok(message))).into_response(),
            Err(err) => {
                let (status, _code): (u16, String) = (&err).into();
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(Self::failed(message, &err))).into_response()
            }
        }
    }
}
