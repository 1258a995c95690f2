use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "RAGCHAT_";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 优先级从低到高：
    /// 1. 内置默认值
    /// 2. ./ragchat.toml
    /// 3. 环境变量（`RAGCHAT_SERVER__PORT=9000`）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置，文件不存在时只使用默认值和环境变量
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.embedding.dimension == 0 {
            return Err(ConfigValidationError::InvalidDimension);
        }

        if config.retrieval.top_k == 0 {
            return Err(ConfigValidationError::InvalidTopK);
        }

        if config.retrieval.chunk_size == 0
            || config.retrieval.chunk_overlap >= config.retrieval.chunk_size
        {
            return Err(ConfigValidationError::InvalidChunking {
                size: config.retrieval.chunk_size,
                overlap: config.retrieval.chunk_overlap,
            });
        }

        if config.storage.sessions_dir.as_os_str().is_empty() {
            return Err(ConfigValidationError::InvalidPath("storage.sessions_dir".into()));
        }

        if config.storage.knowledge_root.as_os_str().is_empty() {
            return Err(ConfigValidationError::InvalidPath("storage.knowledge_root".into()));
        }

        config
            .generation
            .parameters
            .validate()
            .map_err(|e| ConfigValidationError::InvalidParameters(e.to_string()))?;

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("向量维度无效，必须大于 0")]
    InvalidDimension,

    #[error("检索 top_k 无效，必须大于 0")]
    InvalidTopK,

    #[error("分块配置无效: chunk_size={size}, chunk_overlap={overlap}")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("配置路径无效: {0}")]
    InvalidPath(String),

    #[error("默认生成参数无效: {0}")]
    InvalidParameters(String),
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("ragchat.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = ConfigLoader::load_from("does-not-exist.toml")?;
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.retrieval.top_k, 1);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "ragchat.toml",
                r#"
                [server]
                port = 9000

                [storage]
                sessions_dir = "/var/lib/ragchat/chats"

                [generation]
                fragment_join = "verbatim"
                "#,
            )?;
            jail.set_env("RAGCHAT_RETRIEVAL__TOP_K", "3");
            jail.set_env("RAGCHAT_GENERATION__PARAMETERS__TEMPERATURE", "0.7");

            let config = ConfigLoader::load()?;
            assert_eq!(config.server.port, 9000);
            assert_eq!(
                config.storage.sessions_dir,
                PathBuf::from("/var/lib/ragchat/chats")
            );
            assert_eq!(
                config.generation.fragment_join,
                crate::services::orchestrator::FragmentJoin::Verbatim
            );
            assert_eq!(config.retrieval.top_k, 3);
            assert!((config.generation.parameters.temperature - 0.7).abs() < f32::EPSILON);
            // 未覆盖的字段保持默认值
            assert_eq!(config.storage.knowledge_root, PathBuf::from("./database"));
            Ok(())
        });
    }

    #[test]
    fn test_validate() {
        let config = AppConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());

        let mut bad_port = AppConfig::default();
        bad_port.server.port = 0;
        assert!(matches!(
            ConfigLoader::validate(&bad_port),
            Err(ConfigValidationError::InvalidPort)
        ));

        let mut bad_chunking = AppConfig::default();
        bad_chunking.retrieval.chunk_overlap = 400;
        assert!(matches!(
            ConfigLoader::validate(&bad_chunking),
            Err(ConfigValidationError::InvalidChunking { .. })
        ));

        let mut bad_params = AppConfig::default();
        bad_params.generation.parameters.top_p = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&bad_params),
            Err(ConfigValidationError::InvalidParameters(_))
        ));
    }
}
