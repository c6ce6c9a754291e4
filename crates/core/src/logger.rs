//! 日志初始化模块
//!
//! 安装全局 tracing subscriber。`RUST_LOG` 存在时优先于配置中的级别。

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 根据配置构建过滤器
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// 安装全局 fmt subscriber
///
/// 只有第一次调用生效，之后的调用返回 `false`。
pub fn init(config: &LoggingConfig) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_ansi(config.ansi)
        .with_target(config.target)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("[LOGGER] 日志已初始化 level={}", config.level);
    }
    installed
}
