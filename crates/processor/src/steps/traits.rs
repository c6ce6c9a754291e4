//! 管道步骤 trait 定义

use crate::named::{NamedStep, StepId};
use crate::step::{Step, StepValue};
use async_trait::async_trait;
use std::sync::Arc;

/// 管道步骤 trait
///
/// 适合需要持有依赖（路由表、凭证池等）的步骤；无状态的步骤直接用 `Step::from_fn`。
#[async_trait]
pub trait PipelineStep<T: StepValue>: Send + Sync {
    async fn execute(&self, state: T) -> T;

    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// 把 trait 步骤转成 `NamedStep`，禁用的步骤退化为透传
pub fn named_step<T: StepValue>(step: Arc<dyn PipelineStep<T>>) -> NamedStep<T> {
    let id = StepId::from(step.name().to_string());
    if !step.is_enabled() {
        tracing::debug!("[STEP] {} 已禁用，使用透传", id);
        return NamedStep::new(id, Step::identity());
    }
    NamedStep::new(
        id,
        Step::from_async(move |state: T| {
            let step = Arc::clone(&step);
            async move { step.execute(state).await }
        }),
    )
}
