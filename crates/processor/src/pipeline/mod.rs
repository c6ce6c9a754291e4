//! 管道构建与执行
//!
//! 把一组共享同一状态类型的 Step 串成一个 Step：按顺序执行，
//! 每个步骤完成后检查终止条件，条件成立即短路返回。
//!
//! 提供两种形态：
//! - `build`：异步步骤；
//! - `build_sync`：纯同步函数，避免不需要挂起时的开销。
//!
//! 对同样的步骤序列与输入，两种形态的结果完全一致。

pub mod logging;

use crate::error::PipelineError;
use crate::step::{Advance, Next, Step, StepValue};
use std::sync::Arc;

pub use logging::{build_with_step_logging, StepEvent, Traced};

/// 终止条件，必须是纯函数
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// 同步步骤函数
pub type StepFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// 默认终止条件：永不终止，管道折叠全部步骤
pub fn continue_always<T>() -> Predicate<T> {
    Arc::new(|_| false)
}

pub fn predicate<T, F>(f: F) -> Predicate<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 构建异步管道
pub fn build<T: StepValue>(
    predicate: Option<Predicate<T>>,
    steps: Vec<Step<T, T>>,
) -> Result<Step<T, T>, PipelineError> {
    PipelineBuilder::new("pipeline")
        .terminate_when_opt(predicate)
        .steps(steps)
        .build()
}

/// 构建同步管道
pub fn build_sync<T: StepValue>(
    predicate: Option<Predicate<T>>,
    steps: Vec<StepFn<T>>,
) -> Result<Step<T, T>, PipelineError> {
    if steps.is_empty() {
        return Err(PipelineError::empty("sync pipeline"));
    }
    let steps: Arc<[StepFn<T>]> = steps.into();
    let predicate = predicate.unwrap_or_else(continue_always);
    tracing::debug!("[PIPELINE] 同步管道已构建 steps={}", steps.len());
    Ok(Step::from_fn(move |input| {
        let mut state = input;
        for step in steps.iter() {
            state = step(state);
            if predicate(&state) {
                break;
            }
        }
        state
    }))
}

/// 管道构建器
pub struct PipelineBuilder<T> {
    name: String,
    steps: Vec<Step<T, T>>,
    predicate: Option<Predicate<T>>,
}

impl<T: StepValue> PipelineBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            predicate: None,
        }
    }

    pub fn terminate_when<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(f));
        self
    }

    pub fn terminate_when_opt(mut self, predicate: Option<Predicate<T>>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn step(mut self, step: Step<T, T>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step<T, T>>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn step_fn<F>(self, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.step(Step::from_fn(f))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn build(self) -> Result<Step<T, T>, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::empty(self.name));
        }
        tracing::debug!(
            "[PIPELINE] 管道已构建 name={} steps={}",
            self.name,
            self.steps.len()
        );
        let driver = Driver {
            steps: self.steps.into(),
            predicate: self.predicate.unwrap_or_else(continue_always),
        };
        Ok(Step::continuation(move |input| driver.run_from(0, input)))
    }
}

/// 顺序执行器
///
/// 同步完成的步骤在 `run_from` 的循环里直接推进；某个步骤挂起时，
/// 等待它完成后把剩余步骤包装成新的 `Pending` 交回 trampoline。
struct Driver<T> {
    steps: Arc<[Step<T, T>]>,
    predicate: Predicate<T>,
}

impl<T> Clone for Driver<T> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T: StepValue> Driver<T> {
    fn run_from(&self, start: usize, input: T) -> Next<T, T> {
        let mut state = input;
        for (index, step) in self.steps.iter().enumerate().skip(start) {
            match step.clone().advance(state) {
                Advance::Done(output) => {
                    if (self.predicate)(&output) {
                        return Next::Ready(Step::Computed(output));
                    }
                    state = output;
                }
                Advance::Suspended(rest) => {
                    let driver = self.clone();
                    return Next::Suspended(Box::pin(async move {
                        let output = rest.finish().await;
                        if (driver.predicate)(&output) {
                            return Step::Computed(output);
                        }
                        driver.resume_at(index + 1, output)
                    }));
                }
            }
        }
        Next::Ready(Step::Computed(state))
    }

    fn resume_at(self, start: usize, state: T) -> Step<T, T> {
        if start >= self.steps.len() {
            return Step::Computed(state);
        }
        // trampoline 会用原始输入调用延续，这里忽略它，从挂起点的输出继续
        Step::continuation(move |_| self.run_from(start, state.clone()))
    }
}
