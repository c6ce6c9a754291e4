//! 步骤级日志执行策略
//!
//! 与 `build` 的执行语义完全相同，只是在每个步骤前后额外输出观测事件：
//! 进入步骤时 `entered`，步骤结束且未触发终止时 `exited`，
//! 触发终止条件时 `terminated`。日志在状态自带的 span 中输出。

use super::{continue_always, PipelineBuilder, Predicate};
use crate::combinators::{bind, map_output};
use crate::error::PipelineError;
use crate::named::{NamedStep, StepId};
use crate::step::{Step, StepValue};
use tracing::{Level, Span};

/// 可以提供日志句柄的状态
pub trait Traced {
    fn span(&self) -> &Span;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Entered,
    Exited,
    Terminated,
}

impl StepEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepEvent::Entered => "entered",
            StepEvent::Exited => "exited",
            StepEvent::Terminated => "terminated",
        }
    }
}

/// 构建带步骤日志的管道
pub fn build_with_step_logging<T>(
    level: Level,
    predicate: Option<Predicate<T>>,
    steps: Vec<NamedStep<T>>,
) -> Result<Step<T, T>, PipelineError>
where
    T: StepValue + Traced,
{
    if steps.is_empty() {
        return Err(PipelineError::empty("logged pipeline"));
    }
    let predicate = predicate.unwrap_or_else(continue_always);
    let instrumented: Vec<Step<T, T>> = steps
        .into_iter()
        .enumerate()
        .map(|(index, named)| instrument(level, index, named, predicate.clone()))
        .collect();
    PipelineBuilder::new("logged pipeline")
        .terminate_when_opt(Some(predicate))
        .steps(instrumented)
        .build()
}

fn instrument<T>(level: Level, index: usize, named: NamedStep<T>, predicate: Predicate<T>) -> Step<T, T>
where
    T: StepValue + Traced,
{
    let (id, step) = named.into_parts();
    let entered_id = id.clone();
    let announce = Step::from_fn(move |state: T| {
        record(level, &state, &entered_id, index, StepEvent::Entered);
        state
    });
    let run = bind(announce, move |_| step.clone());
    map_output(run, move |state: T| {
        let event = if predicate(&state) {
            StepEvent::Terminated
        } else {
            StepEvent::Exited
        };
        record(level, &state, &id, index, event);
        state
    })
}

fn record<T: Traced>(level: Level, state: &T, id: &StepId, index: usize, event: StepEvent) {
    let event = event.as_str();
    state.span().in_scope(|| match level {
        Level::ERROR => tracing::error!(step = %id, index, event, "[STEP] {event} {id}"),
        Level::WARN => tracing::warn!(step = %id, index, event, "[STEP] {event} {id}"),
        Level::INFO => tracing::info!(step = %id, index, event, "[STEP] {event} {id}"),
        Level::DEBUG => tracing::debug!(step = %id, index, event, "[STEP] {event} {id}"),
        _ => tracing::trace!(step = %id, index, event, "[STEP] {event} {id}"),
    });
}
