//! 核心类型和工具模块
//!
//! 包含 config、errors、logger 等各 crate 共用的基础功能

pub mod config;
pub mod errors;
pub mod logger;

pub use config::{
    default_config_path, load_config, parse_level, LoggingConfig, RelayConfig, RetryConfig,
    StepLoggingConfig, CONFIG_ENV_VAR,
};
pub use errors::ConfigError;
