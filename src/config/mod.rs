// 配置管理模块

use crate::uploader::{
    Authorization, ChunkTransport, ManagerOptions, MimeRegistry, PathPicker, RemoteLinkPicker,
    ScanOptions, UploadOptions, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SIZE,
    DEFAULT_SINGLE_CHUNK_LIMIT, DEFAULT_UPLOAD_LIMIT,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub uploader: UploaderConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
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

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// 分片上传地址
    #[serde(default)]
    pub url: String,
    /// HTTP 方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 认证信息，`"Bearer xxx"` 或 `{ token = "xxx" }`
    #[serde(default)]
    pub authorization: Option<Authorization>,
    /// 分片大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 图片是否整体作为一个分片发送
    #[serde(default = "default_single_chunk_images")]
    pub single_chunk_images: bool,
    /// 整体发送的图片大小上限（字节）
    #[serde(default = "default_single_chunk_limit")]
    pub single_chunk_limit: u64,
    /// 最多跟踪的上传数
    #[serde(default = "default_upload_limit")]
    pub upload_limit: i64,
    /// 单文件大小上限（字节）
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// 允许的扩展名，不配置表示不限制
    #[serde(default)]
    pub accept: Option<Vec<String>>,
    /// 每个分片的最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 重试间隔（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 额外的扩展名 -> MIME 映射
    #[serde(default)]
    pub mime_types: HashMap<String, String>,
    /// 远程链接导入地址
    #[serde(default)]
    pub import_endpoint: Option<String>,
    /// 展开目录时跟随符号链接
    #[serde(default)]
    pub follow_symlinks: bool,
    /// 调试模式，日志级别提升到 debug
    #[serde(default)]
    pub debug: bool,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_single_chunk_images() -> bool {
    true
}

fn default_single_chunk_limit() -> u64 {
    DEFAULT_SINGLE_CHUNK_LIMIT
}

fn default_upload_limit() -> i64 {
    DEFAULT_UPLOAD_LIMIT
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            authorization: None,
            chunk_size: default_chunk_size(),
            single_chunk_images: default_single_chunk_images(),
            single_chunk_limit: default_single_chunk_limit(),
            upload_limit: default_upload_limit(),
            max_size: default_max_size(),
            accept: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            mime_types: HashMap::new(),
            import_endpoint: None,
            follow_symlinks: false,
            debug: false,
        }
    }
}

impl UploaderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// 单个上传的参数
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            url: self.url.clone(),
            method: self.method.to_uppercase(),
            authorization: self.authorization.clone(),
            chunk_size: self.chunk_size,
            single_chunk_images: self.single_chunk_images,
            single_chunk_limit: self.single_chunk_limit,
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// 上传管理器参数
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            upload: self.upload_options(),
            upload_limit: self.upload_limit,
            max_size: self.max_size,
            accept: self.accept.clone(),
        }
    }

    /// 内置表加上配置中的额外映射
    pub fn mime_registry(&self) -> MimeRegistry {
        let registry = MimeRegistry::new();
        for (extension, mime_type) in &self.mime_types {
            registry.register(extension, mime_type);
        }
        registry
    }

    /// 本地路径选择器
    pub fn path_picker(&self) -> PathPicker {
        PathPicker::with_scan_options(ScanOptions {
            skip_hidden: true,
            follow_symlinks: self.follow_symlinks,
            ..Default::default()
        })
    }

    /// 远程链接选择器，未配置导入地址时返回 None
    pub fn link_picker(
        &self,
        service: &str,
        transport: Arc<dyn ChunkTransport>,
        mimes: Arc<MimeRegistry>,
    ) -> Option<RemoteLinkPicker> {
        let endpoint = self
            .import_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())?;

        Some(
            RemoteLinkPicker::new(service, endpoint, transport, mimes)
                .with_authorization(self.authorization.clone()),
        )
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            anyhow::bail!("上传地址未配置");
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            anyhow::bail!("上传地址必须以 http:// 或 https:// 开头: {}", self.url);
        }

        match self.method.to_uppercase().as_str() {
            "POST" | "PUT" => {}
            other => anyhow::bail!("不支持的 HTTP 方法: {}", other),
        }

        if self.chunk_size == 0 {
            anyhow::bail!("分片大小必须大于 0");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("最大尝试次数必须大于 0");
        }

        Ok(())
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

    /// 加载配置，失败时使用默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                // 日志系统此时尚未初始化
                eprintln!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        self.uploader.validate().context("上传配置无效")
    }
}
