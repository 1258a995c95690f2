//! 存储层模块
//!
//! 会话以 JSON 文件形式保存在会话目录下，每个会话一个 `<id>.json`。

pub mod chat_store;

pub use chat_store::{ChatSessionStore, SessionLease, allocate_id};
