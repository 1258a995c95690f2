//! 生成参数模型

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// 采样参数
///
/// 进程内唯一实例，由参数更新请求原地修改。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelParameters {
    /// 最大生成 token 数
    pub max_new_tokens: u32,
    /// 温度，取值 (0, 1]
    pub temperature: f32,
    /// top-k 采样
    pub top_k: u32,
    /// nucleus 采样，取值 (0, 1]
    pub top_p: f32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.3,
            top_k: 50,
            top_p: 0.95,
        }
    }
}

impl ModelParameters {
    /// 会话标题生成使用的固定参数
    pub fn title() -> Self {
        Self {
            max_new_tokens: 24,
            temperature: 0.15,
            top_k: 10,
            top_p: 0.92,
        }
    }

    /// 检查参数是否在合法范围内
    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(AppError::Validation("max_new_tokens must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(AppError::Validation("top_k must be > 0".into()));
        }
        check_unit_interval("temperature", self.temperature)?;
        check_unit_interval("top_p", self.top_p)
    }

    /// 应用一次更新，零值字段保持不变
    ///
    /// 先在副本上校验，失败时原值不受影响。
    pub fn apply(&mut self, update: &ModelParametersUpdate) -> Result<()> {
        let mut next = *self;
        if update.max_new_tokens != 0 {
            next.max_new_tokens = update.max_new_tokens;
        }
        if update.temperature != 0.0 {
            next.temperature = update.temperature;
        }
        if update.top_k != 0 {
            next.top_k = update.top_k;
        }
        if update.top_p != 0.0 {
            next.top_p = update.top_p;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn check_unit_interval(field: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be in (0, 1], got {}",
            field, value
        )))
    }
}

/// 参数更新请求，0 表示不修改
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ModelParametersUpdate {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unchanged() {
        let mut params = ModelParameters::default();
        params
            .apply(&ModelParametersUpdate {
                top_k: 20,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(params.top_k, 20);
        assert_eq!(params.max_new_tokens, 512);
        assert_eq!(params.temperature, 0.3);
        assert_eq!(params.top_p, 0.95);
    }

    #[test]
    fn test_out_of_range_update_is_rejected_without_mutation() {
        let mut params = ModelParameters::default();
        let result = params.apply(&ModelParametersUpdate {
            max_new_tokens: 64,
            temperature: 1.5,
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(params, ModelParameters::default());
    }

    #[test]
    fn test_title_parameters_are_tighter() {
        let title = ModelParameters::title();
        let answer = ModelParameters::default();
        assert!(title.validate().is_ok());
        assert!(title.temperature < answer.temperature);
        assert!(title.top_k < answer.top_k);
        assert!(title.max_new_tokens < answer.max_new_tokens);
    }
}
