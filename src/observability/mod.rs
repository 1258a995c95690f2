//! 可观测性模块
//!
//! 提供结构化日志初始化和健康检查。

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;
use crate::error::{AppError, Result};
use crate::models::report::LoadReport;
use crate::services::knowledge::KnowledgeRegistry;
use crate::storage::chat_store::ChatSessionStore;

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<HealthCheck>,
    /// 启动时被跳过的会话和知识库
    pub startup: LoadReport,
}

/// 单个健康检查项
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
}

impl HealthCheck {
    fn new(name: &str, healthy: bool, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            message: Some(message),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// 应用状态（用于健康检查）
#[derive(Clone)]
pub struct ObservabilityState {
    pub store: Arc<ChatSessionStore>,
    pub registry: Arc<KnowledgeRegistry>,
    pub report: Arc<LoadReport>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(
        store: Arc<ChatSessionStore>,
        registry: Arc<KnowledgeRegistry>,
        report: LoadReport,
        version: String,
    ) -> Self {
        Self {
            store,
            registry,
            report: Arc::new(report),
            start_time: Utc::now(),
            version,
        }
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }

    /// 检查存储目录是否仍然可用
    pub async fn run_checks(&self) -> Vec<HealthCheck> {
        let sessions_dir = self.store.root().to_path_buf();
        let knowledge_dir = self.registry.knowledge_dir();

        let sessions_ok = tokio::fs::metadata(&sessions_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let knowledge_ok = tokio::fs::metadata(&knowledge_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        let active = self.registry.status().iter().filter(|s| s.active).count();
        vec![
            HealthCheck::new(
                "sessions",
                sessions_ok,
                format!("{} sessions in {}", self.store.len(), sessions_dir.display()),
            ),
            HealthCheck::new(
                "knowledge",
                knowledge_ok,
                format!(
                    "{} sources ({} active) in {}",
                    self.registry.len(),
                    active,
                    knowledge_dir.display()
                ),
            ),
        ]
    }
}

// ===== Health Check Handlers =====

/// 获取完整健康状态
///
/// 启动时跳过了条目但存储可用时状态为 `degraded`，仍返回 200。
pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.run_checks().await;
    let all_healthy = checks.iter().all(HealthCheck::is_healthy);

    let status = match (all_healthy, state.report.is_clean()) {
        (false, _) => "unhealthy",
        (true, false) => "degraded",
        (true, true) => "healthy",
    };

    let health_status = HealthStatus {
        status: status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        checks,
        startup: state.report.as_ref().clone(),
    };

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_status))
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// 就绪检查（存储目录可用）
pub async fn readiness(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.run_checks().await;

    if checks.iter().all(HealthCheck::is_healthy) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

/// 版本信息端点
pub async fn version(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Structured Logging =====

/// 初始化结构化日志
///
/// `RUST_LOG` 优先于配置中的级别。配置了 `log_dir` 时额外写入按天滚动的日志文件，
/// 返回的 guard 需要保持到进程退出，否则缓冲中的日志会丢失。
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Config(format!("invalid log level {}: {}", config.level, e)))?;

    let stdout_layer = if config.structured {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_line_number(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("failed to set tracing subscriber: {}", e)))?;

    Ok(guard)
}
