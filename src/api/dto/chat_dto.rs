//! 会话 DTO

use serde::Deserialize;

use crate::error::{AppError, Result};

/// 线上表示“新会话”的 id
pub const NEW_CHAT_ID: i64 = -1;

/// 返回会话 id 的响应头
pub const CHAT_ID_HEADER: &str = "x-chat-id";

fn new_chat_id() -> i64 {
    NEW_CHAT_ID
}

/// 流式生成请求
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    /// 用户问题
    pub text: String,
    /// 会话 id，-1 表示新建会话
    #[serde(default = "new_chat_id")]
    pub id: i64,
}

impl StreamRequest {
    /// 解析会话 id，`None` 表示新建会话
    pub fn session_id(&self) -> Result<Option<u64>> {
        match self.id {
            NEW_CHAT_ID => Ok(None),
            id if id >= 0 => Ok(Some(id as u64)),
            id => Err(AppError::Validation(format!("invalid chat id {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id() {
        let parse = |json: &str| serde_json::from_str::<StreamRequest>(json).unwrap().session_id();

        assert_eq!(parse(r#"{"text": "hi", "id": -1}"#).unwrap(), None);
        assert_eq!(parse(r#"{"text": "hi"}"#).unwrap(), None);
        assert_eq!(parse(r#"{"text": "hi", "id": 7}"#).unwrap(), Some(7));
        assert!(parse(r#"{"text": "hi", "id": -5}"#).is_err());
    }
}
