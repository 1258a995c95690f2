//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod chat_handler;
pub mod knowledge_handler;
pub mod params_handler;

pub use chat_handler::*;
pub use knowledge_handler::*;
pub use params_handler::*;
