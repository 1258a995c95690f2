//! 核心数据模型模块
//!
//! 定义会话、问答记录、生成参数和启动加载报告。

pub mod chat;
pub mod params;
pub mod report;

pub use chat::{ChatSession, ChatSummary, ExchangePair};
pub use params::{ModelParameters, ModelParametersUpdate};
pub use report::{LoadReport, SkippedItem, SkippedKind};
