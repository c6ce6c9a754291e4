//! 动态 Pipeline 步骤注册表
//!
//! 允许在运行时注册、移除自定义 Pipeline 步骤，并按阶段和优先级排序。

use super::traits::{named_step, PipelineStep};
use crate::error::PipelineError;
use crate::named::{NamedStep, StepId};
use crate::pipeline::{build_with_step_logging, PipelineBuilder, Predicate, Traced};
use crate::step::{Step, StepValue};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Level;

/// Pipeline 阶段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    /// 在指定步骤之前执行
    Before(String),
    /// 在指定步骤之后执行
    After(String),
    /// 替换指定步骤
    Replace(String),
    /// 在所有步骤之前
    First,
    /// 在所有步骤之后
    Last,
}

impl PipelinePhase {
    fn anchor(&self) -> Option<&str> {
        match self {
            PipelinePhase::Before(name)
            | PipelinePhase::After(name)
            | PipelinePhase::Replace(name) => Some(name),
            PipelinePhase::First | PipelinePhase::Last => None,
        }
    }
}

/// 注册的步骤条目
struct RegisteredStep<T> {
    step: NamedStep<T>,
    phase: PipelinePhase,
    priority: i32,
}

/// Pipeline 步骤注册表
///
/// 核心步骤在创建时给定，动态步骤以核心步骤为锚点插入。
/// 同一锚点、同一阶段内按 priority 升序，priority 相同时保持注册顺序。
pub struct StepRegistry<T> {
    name: String,
    core_steps: Vec<NamedStep<T>>,
    dynamic_steps: Vec<RegisteredStep<T>>,
}

impl<T: StepValue> StepRegistry<T> {
    pub fn new(name: impl Into<String>, core_steps: Vec<NamedStep<T>>) -> Self {
        Self {
            name: name.into(),
            core_steps,
            dynamic_steps: Vec::new(),
        }
    }

    /// 运行时注册自定义步骤
    pub fn register(
        &mut self,
        step: NamedStep<T>,
        phase: PipelinePhase,
        priority: i32,
    ) -> Result<(), PipelineError> {
        if self.contains(step.id()) {
            return Err(PipelineError::DuplicateStep {
                step: step.id().to_string(),
            });
        }
        if let Some(anchor) = phase.anchor() {
            if !self.core_steps.iter().any(|core| is_named(core, anchor)) {
                return Err(PipelineError::UnknownAnchor {
                    step: anchor.to_string(),
                });
            }
        }
        tracing::debug!(
            "[PIPELINE] {} 注册步骤 {} phase={:?} priority={}",
            self.name,
            step.id(),
            phase,
            priority
        );
        self.dynamic_steps.push(RegisteredStep {
            step,
            phase,
            priority,
        });
        Ok(())
    }

    /// 注册 trait 步骤
    pub fn register_step(
        &mut self,
        step: Arc<dyn PipelineStep<T>>,
        phase: PipelinePhase,
        priority: i32,
    ) -> Result<(), PipelineError> {
        self.register(named_step(step), phase, priority)
    }

    /// 移除动态注册的步骤
    pub fn unregister(&mut self, step_name: &str) -> bool {
        let before = self.dynamic_steps.len();
        self.dynamic_steps.retain(|s| !is_named(&s.step, step_name));
        self.dynamic_steps.len() < before
    }

    pub fn len(&self) -> usize {
        self.ordered_steps().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按正确顺序返回所有步骤的引用
    pub fn ordered_steps(&self) -> Vec<&NamedStep<T>> {
        // 收集被替换的核心步骤名
        let replaced: HashSet<&str> = self
            .dynamic_steps
            .iter()
            .filter_map(|s| match &s.phase {
                PipelinePhase::Replace(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        let mut result: Vec<&NamedStep<T>> = self.in_phase(|p| *p == PipelinePhase::First);

        for core in &self.core_steps {
            let Some(core_name) = core.id().as_name() else {
                result.push(core);
                continue;
            };

            result.extend(self.in_phase(|p| matches!(p, PipelinePhase::Before(n) if n == core_name)));

            if replaced.contains(core_name) {
                result.extend(
                    self.in_phase(|p| matches!(p, PipelinePhase::Replace(n) if n == core_name)),
                );
            } else {
                result.push(core);
            }

            result.extend(self.in_phase(|p| matches!(p, PipelinePhase::After(n) if n == core_name)));
        }

        result.extend(self.in_phase(|p| *p == PipelinePhase::Last));
        result
    }

    /// 组装为普通管道
    pub fn build(&self, predicate: Option<Predicate<T>>) -> Result<Step<T, T>, PipelineError> {
        PipelineBuilder::new(self.name.clone())
            .terminate_when_opt(predicate)
            .steps(self.ordered_steps().into_iter().map(|named| named.step().clone()))
            .build()
    }

    /// 组装为带步骤日志的管道
    pub fn build_with_step_logging(
        &self,
        level: Level,
        predicate: Option<Predicate<T>>,
    ) -> Result<Step<T, T>, PipelineError>
    where
        T: Traced,
    {
        let steps = self.ordered_steps().into_iter().cloned().collect();
        build_with_step_logging(level, predicate, steps)
    }

    fn contains(&self, id: &StepId) -> bool {
        self.core_steps.iter().any(|s| s.id() == id)
            || self.dynamic_steps.iter().any(|s| s.step.id() == id)
    }

    fn in_phase<F>(&self, matches: F) -> Vec<&NamedStep<T>>
    where
        F: Fn(&PipelinePhase) -> bool,
    {
        let mut entries: Vec<&RegisteredStep<T>> = self
            .dynamic_steps
            .iter()
            .filter(|s| matches(&s.phase))
            .collect();
        entries.sort_by_key(|s| s.priority);
        entries.into_iter().map(|s| &s.step).collect()
    }
}

fn is_named<T: StepValue>(step: &NamedStep<T>, name: &str) -> bool {
    step.id().as_name() == Some(name)
}
