//! 管道构建错误

use thiserror::Error;

/// 构建管道时的配置错误
///
/// 这些错误只会在组装阶段出现，执行阶段的失败由状态自身携带（见 `failure`）。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("管道至少需要一个步骤: {pipeline}")]
    EmptyPipeline { pipeline: String },
    #[error("锚点步骤不存在: {step}")]
    UnknownAnchor { step: String },
    #[error("步骤名称重复: {step}")]
    DuplicateStep { step: String },
}

impl PipelineError {
    pub(crate) fn empty(pipeline: impl Into<String>) -> Self {
        PipelineError::EmptyPipeline {
            pipeline: pipeline.into(),
        }
    }
}
