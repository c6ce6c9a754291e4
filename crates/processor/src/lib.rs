//! 异步短路管道引擎
//!
//! 以 `Step` 为统一计算单元，提供管道构建、组合子、处理链与失败重试约定。
//!
//! ## 模块结构
//!
//! - `step` - Step 类型与蹦床执行
//! - `pipeline` - 管道构建、短路执行、步骤日志
//! - `combinators` - bind / combine / bind_with / rebind
//! - `handler` - 首个命中即终止的处理链
//! - `failure` - 失败状态约定、`on_error` 与重试
//! - `steps` - trait 步骤与步骤注册表

pub mod combinators;
pub mod error;
pub mod failure;
pub mod handler;
pub mod named;
pub mod pipeline;
pub mod step;
pub mod steps;

pub use error::PipelineError;
pub use failure::{
    on_error, retry, CanFail, ExecutionStatus, FailureState, RetryPolicy, StepFailure, MAX_BACKOFF,
};
pub use handler::{
    candidate_async, candidate_fn, handled, not_handled, Candidate, HandlerChainBuilder,
    HandlerOutcome, HandlerState,
};
pub use named::{NamedStep, StepId};
pub use pipeline::{
    build, build_sync, build_with_step_logging, continue_always, predicate, PipelineBuilder,
    Predicate, StepEvent, StepFn, Traced,
};
pub use step::{Advance, BindNode, Next, Step, StepValue, Suspension};
pub use steps::{named_step, PipelinePhase, PipelineStep, StepRegistry};
