// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

const MB: u64 = 1024 * 1024;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 后端接口配置
    #[serde(default)]
    pub api: ApiConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 运行环境
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiEnvironment {
    /// 本地开发
    Development,
    /// 测试环境
    Testing,
    /// 生产环境
    #[default]
    Production,
}

impl ApiEnvironment {
    /// 环境默认的服务地址
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ApiEnvironment::Development => "http://localhost:8000",
            ApiEnvironment::Testing => "http://127.0.0.1:8000",
            ApiEnvironment::Production => "http://api.yuntucv.com",
        }
    }

    /// 环境名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ApiEnvironment::Development => "本地开发",
            ApiEnvironment::Testing => "测试环境",
            ApiEnvironment::Production => "生产环境",
        }
    }
}

/// 后端接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 运行环境
    #[serde(default)]
    pub environment: ApiEnvironment,
    /// 覆盖环境默认地址（为空时使用环境默认值）
    #[serde(default)]
    pub base_url: Option<String>,
    /// API 版本
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// 单个请求超时（秒），超时视为传输失败
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: ApiEnvironment::default(),
            base_url: None,
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// 指定服务地址的配置（测试或自定义部署）
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// 实际使用的服务地址（去掉末尾斜杠）
    pub fn resolved_base_url(&self) -> String {
        let base = match self.base_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url.trim(),
            _ => self.environment.default_base_url(),
        };
        base.trim_end_matches('/').to_string()
    }

    /// API 基础路径，如 http://api.yuntucv.com/api/v1
    pub fn api_base(&self) -> String {
        format!("{}/api/{}", self.resolved_base_url(), self.api_version)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分片大小 (MB)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 大文件阈值 (MB)，大于等于该值使用分片上传
    #[serde(default = "default_large_file_threshold_mb")]
    pub large_file_threshold_mb: u64,
    /// 计算 MD5 时的读取窗口 (MB)
    #[serde(default = "default_hash_window_mb")]
    pub hash_window_mb: u64,
    /// 最大同时上传文件数
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    /// 单个分片最多尝试次数
    #[serde(default = "default_chunk_retry_limit")]
    pub chunk_retry_limit: u32,
    /// 分片重试间隔（毫秒，固定间隔）
    #[serde(default = "default_chunk_retry_delay_ms")]
    pub chunk_retry_delay_ms: u64,
    /// 小文件直接上传最多尝试次数（1 表示不重试）
    #[serde(default = "default_direct_upload_attempts")]
    pub direct_upload_attempts: u32,
    /// 上传前是否进行秒传检测
    #[serde(default = "default_instant_upload")]
    pub instant_upload: bool,
}

fn default_chunk_size_mb() -> u64 {
    5
}

fn default_large_file_threshold_mb() -> u64 {
    5
}

fn default_hash_window_mb() -> u64 {
    2
}

fn default_max_concurrent_files() -> usize {
    3
}

fn default_chunk_retry_limit() -> u32 {
    3
}

fn default_chunk_retry_delay_ms() -> u64 {
    1000
}

fn default_direct_upload_attempts() -> u32 {
    1
}

fn default_instant_upload() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            large_file_threshold_mb: default_large_file_threshold_mb(),
            hash_window_mb: default_hash_window_mb(),
            max_concurrent_files: default_max_concurrent_files(),
            chunk_retry_limit: default_chunk_retry_limit(),
            chunk_retry_delay_ms: default_chunk_retry_delay_ms(),
            direct_upload_attempts: default_direct_upload_attempts(),
            instant_upload: default_instant_upload(),
        }
    }
}

impl UploadConfig {
    /// 分片大小（字节）
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size_mb.max(1) * MB
    }

    /// 大文件阈值（字节，至少 1MB）
    pub fn large_file_threshold(&self) -> u64 {
        self.large_file_threshold_mb.max(1) * MB
    }

    /// MD5 读取窗口（字节）
    pub fn hash_window(&self) -> u64 {
        self.hash_window_mb.max(1) * MB
    }

    /// 并发上限（至少 1）
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_files.max(1)
    }

    /// 分片尝试次数（至少 1）
    pub fn chunk_attempts(&self) -> u32 {
        self.chunk_retry_limit.max(1)
    }

    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_delay_ms)
    }

    /// 直接上传尝试次数（至少 1）
    pub fn direct_attempts(&self) -> u32 {
        self.direct_upload_attempts.max(1)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                // 尝试保存默认配置
                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_upload_config() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size(), 5 * MB);
        assert_eq!(config.large_file_threshold(), 5 * MB);
        assert_eq!(config.hash_window(), 2 * MB);
        assert_eq!(config.concurrency(), 3);
        assert_eq!(config.chunk_attempts(), 3);
        assert_eq!(config.chunk_retry_delay(), Duration::from_secs(1));
        assert_eq!(config.direct_attempts(), 1);
        assert!(config.instant_upload);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = UploadConfig {
            chunk_size_mb: 0,
            large_file_threshold_mb: 0,
            max_concurrent_files: 0,
            chunk_retry_limit: 0,
            direct_upload_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.chunk_size(), MB);
        assert_eq!(config.large_file_threshold(), MB);
        assert_eq!(config.concurrency(), 1);
        assert_eq!(config.chunk_attempts(), 1);
        assert_eq!(config.direct_attempts(), 1);
    }

    #[test]
    fn test_api_base_resolution() {
        let config = ApiConfig::default();
        assert_eq!(config.api_base(), "http://api.yuntucv.com/api/v1");

        let config = ApiConfig {
            environment: ApiEnvironment::Development,
            ..Default::default()
        };
        assert_eq!(config.api_base(), "http://localhost:8000/api/v1");

        let config = ApiConfig::with_base_url("http://10.0.0.2:9000/");
        assert_eq!(config.api_base(), "http://10.0.0.2:9000/api/v1");

        let config = ApiConfig {
            base_url: Some("  ".to_string()),
            environment: ApiEnvironment::Testing,
            ..Default::default()
        };
        assert_eq!(config.resolved_base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [api]
            environment = "development"

            [upload]
            max_concurrent_files = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.api.environment, ApiEnvironment::Development);
        assert_eq!(config.api.api_version, "v1");
        assert_eq!(config.upload.max_concurrent_files, 5);
        assert_eq!(config.upload.chunk_size_mb, 5);
        assert_eq!(config.log.level, "info");
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let path = path.to_str().unwrap();

        let mut config = AppConfig::default();
        config.upload.chunk_retry_delay_ms = 250;
        config.api.base_url = Some("http://example.test".to_string());
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.upload.chunk_retry_delay_ms, 250);
        assert_eq!(loaded.api.resolved_base_url(), "http://example.test");
    }

    #[tokio::test]
    async fn test_load_or_default_writes_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let config = AppConfig::load_or_default(path_str).await;
        assert_eq!(config.upload.max_concurrent_files, 3);
        assert!(path.exists());
    }
}
