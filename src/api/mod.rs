//! API 模块
//!
//! 提供 REST API 支持。

pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::api::dto::chat_dto::CHAT_ID_HEADER;
use crate::security::middleware::security_headers_middleware;
use axum::{Router, extract::DefaultBodyLimit, http::HeaderName};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// 默认请求体上限
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    create_router_with_limit(app_state, DEFAULT_BODY_LIMIT)
}

pub fn create_router_with_limit(app_state: AppState, body_limit: usize) -> Router {
    let api = Router::new()
        .merge(routes::params_routes::create_params_router())
        .merge(routes::knowledge_routes::create_knowledge_router())
        .merge(routes::chat_routes::create_chat_router());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(CHAT_ID_HEADER)]);

    Router::new()
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(body_limit))
        // Add security headers middleware to all routes
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
