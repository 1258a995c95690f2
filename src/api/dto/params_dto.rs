//! 生成参数 DTO

use serde::{Deserialize, Serialize};

use crate::models::params::ModelParameters;

/// 参数更新响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetParamsResponse {
    pub params_set: bool,
    pub params: ModelParameters,
}
