//! 文本生成服务
//!
//! `TextGenerator` 把一次生成请求暴露为片段流；生产实现通过 Ollama 的
//! `/api/generate` 流式接口（NDJSON，每行一个 JSON 对象）获取片段。

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::config::GenerationConfig;
use crate::error::{AppError, Result};
use crate::models::params::ModelParameters;

/// 生成片段流，出错时流以错误结束
pub type FragmentStream = BoxStream<'static, Result<String>>;

pub trait TextGenerator: Send + Sync {
    /// 发起一次生成；流被丢弃时底层请求随之取消
    fn generate(&self, prompt: String, params: ModelParameters) -> FragmentStream;
}

/// Ollama 文本生成客户端
pub struct OllamaGenerator {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model_name: config.model_name.clone(),
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_body(&self, prompt: &str, params: &ModelParameters) -> serde_json::Value {
        serde_json::json!({
            "model": self.model_name,
            "prompt": prompt,
            "stream": true,
            "options": {
                "num_predict": params.max_new_tokens,
                "temperature": params.temperature,
                "top_k": params.top_k,
                "top_p": params.top_p
            }
        })
    }
}

fn generation_failed(e: impl std::fmt::Display) -> AppError {
    AppError::GenerationFailed(e.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::GenerationFailed(format!("HTTP {}: {}", status, body)))
}

/// 解析一行 NDJSON，返回 (片段, 是否结束)
fn parse_line(line: &[u8]) -> Result<Option<(String, bool)>> {
    let line = std::str::from_utf8(line).map_err(generation_failed)?.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: GenerateChunk = serde_json::from_str(line).map_err(generation_failed)?;
    if let Some(error) = chunk.error {
        return Err(AppError::GenerationFailed(error));
    }
    Ok(Some((chunk.response, chunk.done)))
}

impl TextGenerator for OllamaGenerator {
    fn generate(&self, prompt: String, params: ModelParameters) -> FragmentStream {
        let request = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(&prompt, &params));

        Box::pin(async_stream::try_stream! {
            let response = request.send().await.map_err(generation_failed)?;
            let response = ensure_success(response).await?;

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;
            while let Some(chunk) = bytes.next().await {
                buffer.extend_from_slice(&chunk.map_err(generation_failed)?);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some((fragment, done)) = parse_line(&line)? {
                        if !fragment.is_empty() {
                            yield fragment;
                        }
                        if done {
                            finished = true;
                        }
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                if let Some((fragment, done)) = parse_line(&buffer)? {
                    if !fragment.is_empty() {
                        yield fragment;
                    }
                    finished = done;
                }
            }
            if !finished {
                Err(AppError::GenerationFailed("stream ended before completion".into()))?;
            }
            debug!("Generation stream completed");
        })
    }
}

/// 根据配置创建生成后端
pub fn create_text_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => Err(AppError::Config(format!(
            "unknown generation backend: {}",
            other
        ))),
    }
}
