//! 配置管理模块
//!
//! 引擎配置以 YAML 存储，所有字段都有默认值：缺失的文件或缺失的段落
//! 都会回落到 `Default`。

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// 指定配置文件路径的环境变量
pub const CONFIG_ENV_VAR: &str = "RELAYCAST_CONFIG";

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 日志输出
    pub logging: LoggingConfig,
    /// 重试预算
    pub retry: RetryConfig,
    /// 步骤级日志
    pub step_logging: StepLoggingConfig,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter 指令，例如 `info` 或 `relaycast_processor=debug`
    pub level: String,
    /// 是否输出 ANSI 颜色
    pub ansi: bool,
    /// 是否输出 target
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            target: false,
        }
    }
}

/// 重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 失败计数达到该值后不再重试
    pub max_failures: u32,
    /// 首次重试前的等待时间（毫秒）
    pub backoff_ms: u64,
    /// 每次重试等待时间的倍率
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            backoff_ms: 50,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_failures == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_failures 必须大于 0".to_string(),
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_multiplier 不能小于 1.0: {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// 步骤级日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepLoggingConfig {
    pub enabled: bool,
    pub level: String,
}

impl Default for StepLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl StepLoggingConfig {
    /// 解析为 tracing 日志级别
    pub fn tracing_level(&self) -> Result<Level, ConfigError> {
        parse_level(&self.level)
    }
}

/// 解析日志级别名称（大小写不敏感）
pub fn parse_level(name: &str) -> Result<Level, ConfigError> {
    name.trim()
        .parse::<Level>()
        .map_err(|_| ConfigError::Invalid(format!("未知日志级别: {name}")))
}

impl RelayConfig {
    /// 从 YAML 文本解析配置，空文本视为默认配置
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.step_logging.tracing_level()?;
        Ok(())
    }
}

/// 默认配置路径：优先读取 `RELAYCAST_CONFIG`，否则使用用户配置目录
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaycast")
        .join("config.yaml")
}

/// 加载配置文件，文件不存在时返回默认配置
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("[CONFIG] {} 不存在，使用默认配置", path.display());
        return Ok(RelayConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = RelayConfig::from_yaml_str(&content)?;
    tracing::info!("[CONFIG] 已加载配置: {}", path.display());
    Ok(config)
}
