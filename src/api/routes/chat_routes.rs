//! Chat Routes
//!
//! 定义会话和流式生成相关的 API 路由。

use crate::api::handlers::chat_handler::*;
use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::api::app_state::AppState;

/// 创建会话路由器
pub fn create_chat_router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_chats))
        .route("/chats/:id/history", get(get_history))
        .route("/chats/:id", delete(remove_chat))
        .route("/stream", post(stream))
}
