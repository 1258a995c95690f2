//! Ragchat - 检索增强对话服务
//!
//! 维护持久化的对话会话，聚合多个可独立启停的知识库的检索结果，
//! 把生成的文本流式返回给调用方，并在生成结束后把本轮问答写入会话历史。

pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;
