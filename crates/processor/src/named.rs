//! 带标识的步骤
//!
//! 标识只用于观测（日志、注册表排序），不影响执行语义。

use crate::step::{Step, StepValue};
use std::borrow::Cow;
use std::fmt;

/// 步骤标识：名称或事件 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepId {
    Name(Cow<'static, str>),
    Event(u64),
}

impl StepId {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            StepId::Name(name) => Some(name.as_ref()),
            StepId::Event(_) => None,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Name(name) => f.write_str(name),
            StepId::Event(id) => write!(f, "event#{id}"),
        }
    }
}

impl From<&'static str> for StepId {
    fn from(name: &'static str) -> Self {
        StepId::Name(Cow::Borrowed(name))
    }
}

impl From<String> for StepId {
    fn from(name: String) -> Self {
        StepId::Name(Cow::Owned(name))
    }
}

impl From<u64> for StepId {
    fn from(id: u64) -> Self {
        StepId::Event(id)
    }
}

/// 标识 + 步骤
pub struct NamedStep<T> {
    id: StepId,
    step: Step<T, T>,
}

impl<T: Clone> Clone for NamedStep<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            step: self.step.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for NamedStep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedStep")
            .field("id", &self.id)
            .field("step", &self.step)
            .finish()
    }
}

impl<T: StepValue> NamedStep<T> {
    pub fn new(id: impl Into<StepId>, step: Step<T, T>) -> Self {
        Self {
            id: id.into(),
            step,
        }
    }

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn step(&self) -> &Step<T, T> {
        &self.step
    }

    pub fn into_parts(self) -> (StepId, Step<T, T>) {
        (self.id, self.step)
    }

    pub fn into_step(self) -> Step<T, T> {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_id_display() {
        assert_eq!(StepId::from("auth").to_string(), "auth");
        assert_eq!(StepId::from("route".to_string()).to_string(), "route");
        assert_eq!(StepId::from(17u64).to_string(), "event#17");
        assert_eq!(StepId::from(3u64).as_name(), None);
    }

    #[tokio::test]
    async fn test_named_step_keeps_step_semantics() {
        let named = NamedStep::new("double", Step::from_fn(|x: u32| x * 2));
        assert_eq!(named.id().as_name(), Some("double"));
        assert_eq!(named.step().evaluate(21).await, 42);
    }
}
