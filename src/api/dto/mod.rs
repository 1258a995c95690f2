//! DTO 模块
//!
//! 数据传输对象，用于 API 请求和响应的序列化。

pub mod chat_dto;
pub mod knowledge_dto;
pub mod operation_dto;
pub mod params_dto;

pub use chat_dto::*;
pub use knowledge_dto::*;
pub use operation_dto::*;
pub use params_dto::*;
