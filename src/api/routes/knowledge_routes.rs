//! Knowledge Routes
//!
//! 定义知识库相关的 API 路由。

use crate::api::handlers::knowledge_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建知识库路由器
pub fn create_knowledge_router() -> Router<AppState> {
    Router::new()
        .route("/knowledge", get(list_sources))
        .route("/knowledge/activate", post(activate_source))
        .route("/knowledge/deactivate", post(deactivate_source))
        .route("/knowledge/rename", post(rename_source))
        .route("/knowledge/remove", post(remove_source))
        .route("/knowledge/text", post(append_text))
        .route("/knowledge/document", post(append_document))
        .route("/knowledge/create", post(create_source))
}
