//! Params Routes
//!
//! 定义生成参数相关的 API 路由。

use crate::api::handlers::params_handler::*;
use axum::{Router, routing::get};

use crate::api::app_state::AppState;

/// 创建参数路由器
pub fn create_params_router() -> Router<AppState> {
    Router::new().route("/params", get(get_params).post(set_params))
}
