//! 配置相关错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML 解析失败
    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// 字段取值不合法
    #[error("配置无效: {0}")]
    Invalid(String),
}

