//! 管道步骤模块
//!
//! 基于 trait 的步骤定义与按阶段排序的步骤注册表

pub mod registry;
mod traits;

pub use registry::{PipelinePhase, StepRegistry};
pub use traits::{named_step, PipelineStep};
