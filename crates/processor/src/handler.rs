//! 处理链
//!
//! 依次询问每个候选者，第一个给出结果的候选者终止整条链。
//! 完全由管道与组合子搭建：终止条件就是 `is_handled`。
//! 所有候选者都未处理时，最终状态保持未处理，由调用方提供兜底。

use crate::combinators::{bind_input, bind_with_input};
use crate::error::PipelineError;
use crate::named::{NamedStep, StepId};
use crate::pipeline::{build_with_step_logging, predicate, PipelineBuilder, Predicate, Traced};
use crate::step::{Step, StepValue};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{Level, Span};

/// 候选者的返回值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome<R> {
    NotHandled,
    Handled(R),
}

pub fn not_handled<R>() -> HandlerOutcome<R> {
    HandlerOutcome::NotHandled
}

pub fn handled<R>(result: R) -> HandlerOutcome<R> {
    HandlerOutcome::Handled(result)
}

/// 处理链状态：不可变输入 + 可选结果
///
/// 一旦进入已处理状态就不会再回到未处理，结果也不会再变化。
pub struct HandlerState<I, R> {
    input: Arc<I>,
    result: Option<R>,
}

impl<I, R: Clone> Clone for HandlerState<I, R> {
    fn clone(&self) -> Self {
        Self {
            input: Arc::clone(&self.input),
            result: self.result.clone(),
        }
    }
}

impl<I: fmt::Debug, R: fmt::Debug> fmt::Debug for HandlerState<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerState")
            .field("input", &self.input)
            .field("handled", &self.is_handled())
            .field("result", &self.result)
            .finish()
    }
}

impl<I, R> HandlerState<I, R> {
    /// 以未处理状态创建
    pub fn for_input(input: I) -> Self {
        Self {
            input: Arc::new(input),
            result: None,
        }
    }

    pub fn is_handled(&self) -> bool {
        self.result.is_some()
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_arc(&self) -> Arc<I> {
        Arc::clone(&self.input)
    }

    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<R> {
        self.result
    }

    /// 转为已处理；已经处理过的状态保持原结果
    pub fn handled(self, result: R) -> Self {
        if self.result.is_some() {
            return self;
        }
        Self {
            input: self.input,
            result: Some(result),
        }
    }

    pub fn apply(self, outcome: HandlerOutcome<R>) -> Self {
        match outcome {
            HandlerOutcome::Handled(result) => self.handled(result),
            HandlerOutcome::NotHandled => self,
        }
    }
}

impl<I: Traced, R> Traced for HandlerState<I, R> {
    fn span(&self) -> &Span {
        self.input.span()
    }
}

/// 候选者
#[async_trait]
pub trait Candidate<I, R>: Send + Sync
where
    I: Send + Sync + 'static,
    R: Send + 'static,
{
    async fn handle(&self, input: Arc<I>) -> HandlerOutcome<R>;

    fn name(&self) -> &str;
}

struct FnCandidate<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<I, R, F> Candidate<I, R> for FnCandidate<F>
where
    I: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&I) -> HandlerOutcome<R> + Send + Sync,
{
    async fn handle(&self, input: Arc<I>) -> HandlerOutcome<R> {
        (self.f)(input.as_ref())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct AsyncFnCandidate<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<I, R, F, Fut> Candidate<I, R> for AsyncFnCandidate<F>
where
    I: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(Arc<I>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerOutcome<R>> + Send + 'static,
{
    async fn handle(&self, input: Arc<I>) -> HandlerOutcome<R> {
        (self.f)(input).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 用同步函数构造候选者
pub fn candidate_fn<I, R, F>(name: impl Into<String>, f: F) -> Arc<dyn Candidate<I, R>>
where
    I: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&I) -> HandlerOutcome<R> + Send + Sync + 'static,
{
    Arc::new(FnCandidate {
        name: name.into(),
        f,
    })
}

/// 用异步函数构造候选者
pub fn candidate_async<I, R, F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Candidate<I, R>>
where
    I: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(Arc<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome<R>> + Send + 'static,
{
    Arc::new(AsyncFnCandidate {
        name: name.into(),
        f,
    })
}

/// 把询问步骤接到处理链状态上
fn ask<I, R>(name: StepId, question: Step<Arc<I>, HandlerOutcome<R>>) -> NamedStep<HandlerState<I, R>>
where
    I: Send + Sync + 'static,
    R: StepValue,
{
    let label = name.clone();
    let step = bind_with_input(
        bind_input(question, |state: HandlerState<I, R>| state.input_arc()),
        move |state, outcome| {
            if matches!(outcome, HandlerOutcome::Handled(_)) && !state.is_handled() {
                tracing::debug!("[HANDLER] 候选者 {} 已处理", label);
            }
            Step::Computed(state.apply(outcome))
        },
    );
    NamedStep::new(name, step)
}

/// 把候选者包装成处理链步骤
pub fn candidate_step<I, R>(candidate: Arc<dyn Candidate<I, R>>) -> NamedStep<HandlerState<I, R>>
where
    I: Send + Sync + 'static,
    R: StepValue,
{
    let name = StepId::from(candidate.name().to_string());
    let question = Step::from_async(move |input: Arc<I>| {
        let candidate = Arc::clone(&candidate);
        async move { candidate.handle(input).await }
    });
    ask(name, question)
}

fn is_handled<I, R>() -> Predicate<HandlerState<I, R>>
where
    I: Send + Sync + 'static,
    R: StepValue,
{
    predicate(|state: &HandlerState<I, R>| state.is_handled())
}

/// 处理链构建器
///
/// 同步候选者（`candidate_fn`）不经过异步调度，整条链可以同步完成。
pub struct HandlerChainBuilder<I, R> {
    name: String,
    steps: Vec<NamedStep<HandlerState<I, R>>>,
}

impl<I, R> HandlerChainBuilder<I, R>
where
    I: Send + Sync + 'static,
    R: StepValue,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn candidate(mut self, candidate: Arc<dyn Candidate<I, R>>) -> Self {
        self.steps.push(candidate_step(candidate));
        self
    }

    pub fn candidate_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&I) -> HandlerOutcome<R> + Send + Sync + 'static,
    {
        let question = Step::from_fn(move |input: Arc<I>| f(input.as_ref()));
        self.steps.push(ask(StepId::from(name.into()), question));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn build(self) -> Result<Step<HandlerState<I, R>, HandlerState<I, R>>, PipelineError> {
        PipelineBuilder::new(self.name)
            .terminate_when_opt(Some(is_handled()))
            .steps(self.steps.into_iter().map(NamedStep::into_step))
            .build()
    }

    /// 带步骤日志的处理链，日志输出在输入自带的 span 中
    pub fn build_with_step_logging(
        self,
        level: Level,
    ) -> Result<Step<HandlerState<I, R>, HandlerState<I, R>>, PipelineError>
    where
        I: Traced,
    {
        build_with_step_logging(level, Some(is_handled()), self.steps)
    }
}

/// 按顺序构建处理链
pub fn build<I, R>(
    candidates: Vec<Arc<dyn Candidate<I, R>>>,
) -> Result<Step<HandlerState<I, R>, HandlerState<I, R>>, PipelineError>
where
    I: Send + Sync + 'static,
    R: StepValue,
{
    candidates
        .into_iter()
        .fold(HandlerChainBuilder::new("handler chain"), |builder, c| {
            builder.candidate(c)
        })
        .build()
}

/// 执行处理链并取出结果
pub async fn run<I, R>(
    chain: &Step<HandlerState<I, R>, HandlerState<I, R>>,
    input: I,
) -> Option<R>
where
    I: Send + Sync + 'static,
    R: StepValue,
{
    chain
        .evaluate(HandlerState::for_input(input))
        .await
        .into_result()
}
