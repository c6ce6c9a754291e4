//! 失败状态约定与重试组合子
//!
//! 状态类型实现 `CanFail` 后即可复用 `on_error` / `retry`：
//! 失败作为数据存放在状态里，而不是通过错误返回值传播。
//!
//! 约定：
//! - 失败计数只会递增，只有 `reset_failure_state` 会清零；
//! - `success` 清除错误但保留计数；
//! - 错误载荷当且仅当状态不是 Success 时存在。

use crate::combinators::bind;
use crate::step::{Step, StepValue};
use relaycast_core::RetryConfig;
use std::time::Duration;
use thiserror::Error;

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Success,
    TransientFailure,
    PermanentFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome<E> {
    Success,
    Transient(E),
    Permanent(E),
}

/// 失败簿记，嵌入到具体状态类型中
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureState<E> {
    outcome: Outcome<E>,
    failure_count: u32,
}

impl<E> Default for FailureState<E> {
    fn default() -> Self {
        Self {
            outcome: Outcome::Success,
            failure_count: 0,
        }
    }
}

impl<E> FailureState<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ExecutionStatus {
        match self.outcome {
            Outcome::Success => ExecutionStatus::Success,
            Outcome::Transient(_) => ExecutionStatus::TransientFailure,
            Outcome::Permanent(_) => ExecutionStatus::PermanentFailure,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Transient(e) | Outcome::Permanent(e) => Some(e),
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn succeed(self) -> Self {
        Self {
            outcome: Outcome::Success,
            failure_count: self.failure_count,
        }
    }

    /// # Panics
    ///
    /// 失败计数已达 `u32::MAX` 时 panic，计数不会停在上限。
    pub fn fail_transient(self, error: E) -> Self {
        Self {
            outcome: Outcome::Transient(error),
            failure_count: next_failure_count(self.failure_count),
        }
    }

    /// # Panics
    ///
    /// 同 `fail_transient`。
    pub fn fail_permanent(self, error: E) -> Self {
        Self {
            outcome: Outcome::Permanent(error),
            failure_count: next_failure_count(self.failure_count),
        }
    }

    pub fn reset(self) -> Self {
        Self::default()
    }
}

fn next_failure_count(count: u32) -> u32 {
    match count.checked_add(1) {
        Some(next) => next,
        None => panic!("[RETRY] 失败计数溢出 u32::MAX"),
    }
}

/// 可失败状态
///
/// 实现者只需提供读取与替换 `FailureState` 的方法，其余操作都有默认实现。
pub trait CanFail: Sized {
    type Error: Clone + Send + Sync + 'static;

    fn failure_state(&self) -> &FailureState<Self::Error>;

    fn with_failure_state(self, state: FailureState<Self::Error>) -> Self;

    fn status(&self) -> ExecutionStatus {
        self.failure_state().status()
    }

    fn error(&self) -> Option<&Self::Error> {
        self.failure_state().error()
    }

    fn failure_count(&self) -> u32 {
        self.failure_state().failure_count()
    }

    fn is_success(&self) -> bool {
        self.status() == ExecutionStatus::Success
    }

    fn success(self) -> Self {
        let next = self.failure_state().clone().succeed();
        self.with_failure_state(next)
    }

    fn transient_failure(self, error: Self::Error) -> Self {
        let next = self.failure_state().clone().fail_transient(error);
        self.with_failure_state(next)
    }

    fn permanent_failure(self, error: Self::Error) -> Self {
        let next = self.failure_state().clone().fail_permanent(error);
        self.with_failure_state(next)
    }

    fn reset_failure_state(self) -> Self {
        self.with_failure_state(FailureState::default())
    }
}

/// 通用错误载荷
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{code}] {message}")]
pub struct StepFailure {
    pub code: u16,
    pub message: String,
    pub retryable: bool,
}

impl StepFailure {
    pub fn transient(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    /// 对外映射的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        self.code
    }
}

/// 执行 `step`，结果不是 Success 时在失败状态上执行 `fallback` 并返回其结果
///
/// 不会重试 `step` 本身。
pub fn on_error<S>(step: Step<S, S>, fallback: Step<S, S>) -> Step<S, S>
where
    S: StepValue + CanFail,
{
    bind(step, move |state: S| {
        if state.is_success() {
            Step::identity()
        } else {
            tracing::debug!(
                "[RETRY] 步骤失败 status={:?} failures={}，执行回退",
                state.status(),
                state.failure_count()
            );
            fallback.clone()
        }
    })
}

/// 单次退避的上限
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// 失败计数达到该值后停止重试
    pub max_failures: u32,
    pub backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            backoff: Duration::from_millis(config.backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_failures: u32, backoff: Duration) -> Self {
        Self {
            max_failures,
            backoff,
            multiplier: 1.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 第 `failures` 次失败之后的等待时间，不超过 `MAX_BACKOFF`
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.backoff.as_secs_f64() * factor)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// 只有瞬时失败且仍在预算内才重试
    pub fn should_retry<S: CanFail>(&self, state: &S) -> bool {
        state.status() == ExecutionStatus::TransientFailure
            && state.failure_count() < self.max_failures
    }
}

/// 在瞬时失败时按策略重试 `step`
///
/// 由 `on_error` 组合而成：回退步骤等待退避时间后，把失败状态再次交给 `step`。
/// 永久失败或预算耗尽时返回最后的失败状态。
pub fn retry<S>(step: Step<S, S>, policy: RetryPolicy) -> Step<S, S>
where
    S: StepValue + CanFail,
{
    let again = step.clone();
    let backoff = Step::suspend(move |state: S| {
        let again = again.clone();
        async move {
            if !policy.should_retry(&state) {
                return Step::identity();
            }
            let delay = policy.delay_for(state.failure_count());
            tracing::info!(
                "[RETRY] 瞬时失败 failures={} 将在 {}ms 后重试",
                state.failure_count(),
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            retry(again, policy)
        }
    });
    on_error(step, backoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Job {
        value: i64,
        failure: FailureState<StepFailure>,
    }

    impl CanFail for Job {
        type Error = StepFailure;

        fn failure_state(&self) -> &FailureState<StepFailure> {
            &self.failure
        }

        fn with_failure_state(self, failure: FailureState<StepFailure>) -> Self {
            Self { failure, ..self }
        }
    }

    fn job(value: i64) -> Job {
        Job {
            value,
            failure: FailureState::new(),
        }
    }

    fn always_fails() -> Step<Job, Job> {
        Step::from_fn(|j: Job| j.transient_failure(StepFailure::transient(503, "upstream busy")))
    }

    fn always_succeeds(value: i64) -> Step<Job, Job> {
        Step::from_fn(move |j: Job| Job { value, ..j }.success())
    }

    #[test]
    fn test_error_present_iff_not_success() {
        let j = job(0);
        assert!(j.is_success() && j.error().is_none());
        let j = j.permanent_failure(StepFailure::permanent(400, "bad"));
        assert_eq!(j.status(), ExecutionStatus::PermanentFailure);
        assert_eq!(j.error().map(|e| e.status_code()), Some(400));
        let j = j.success();
        assert!(j.error().is_none());
        assert_eq!(j.failure_count(), 1);
        assert_eq!(j.reset_failure_state().failure_count(), 0);
    }

    #[test]
    fn test_step_failure_display() {
        assert_eq!(
            StepFailure::transient(503, "busy").to_string(),
            "[503] busy"
        );
    }

    proptest! {
        #[test]
        fn prop_failure_counter_monotonic(ops in prop::collection::vec(0u8..3, 0..40)) {
            let mut j = job(0);
            for op in ops {
                let before = j.failure_count();
                j = match op {
                    0 => j.transient_failure(StepFailure::transient(503, "t")),
                    1 => j.permanent_failure(StepFailure::permanent(500, "p")),
                    _ => j.success(),
                };
                match op {
                    0 | 1 => {
                        prop_assert_eq!(j.failure_count(), before + 1);
                        prop_assert!(j.error().is_some());
                    }
                    _ => {
                        prop_assert_eq!(j.failure_count(), before);
                        prop_assert!(j.error().is_none());
                    }
                }
            }
            prop_assert_eq!(j.reset_failure_state().failure_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_on_error_runs_fallback_once() {
        let step = on_error(always_fails(), always_succeeds(7));
        let out = step.evaluate(job(1)).await;
        assert!(out.is_success());
        assert_eq!(out.value, 7);
        assert_eq!(out.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_on_error_skips_fallback_on_success() {
        let step = on_error(always_succeeds(3), always_fails());
        let out = step.evaluate(job(1)).await;
        assert!(out.is_success());
        assert_eq!(out.failure_count(), 0);
    }

    #[test]
    fn test_delay_grows_with_multiplier() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10)).with_multiplier(2.0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    }

    #[test]
    fn test_delay_is_capped_for_large_failure_counts() {
        let config = RetryConfig {
            max_failures: 200,
            backoff_ms: 50,
            backoff_multiplier: 2.0,
        };
        assert!(config.validate().is_ok());
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.delay_for(100), MAX_BACKOFF);
        assert_eq!(policy.delay_for(u32::MAX), MAX_BACKOFF);
        assert!(policy.delay_for(5) < MAX_BACKOFF);
    }

    #[test]
    fn test_failure_count_never_sticks_at_limit() {
        let state: FailureState<StepFailure> = FailureState {
            outcome: Outcome::Success,
            failure_count: u32::MAX - 1,
        };
        let state = state.fail_transient(StepFailure::transient(503, "busy"));
        assert_eq!(state.failure_count(), u32::MAX);
    }

    #[test]
    #[should_panic(expected = "失败计数溢出")]
    fn test_failure_count_overflow_panics() {
        let state: FailureState<StepFailure> = FailureState {
            outcome: Outcome::Success,
            failure_count: u32::MAX,
        };
        let _ = state.fail_permanent(StepFailure::permanent(400, "bad"));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        assert_eq!(policy.max_failures, 3);
        assert_eq!(policy.backoff, Duration::from_millis(50));
    }

    fn flaky(failures_before_success: u32, attempts: Arc<AtomicU32>) -> Step<Job, Job> {
        Step::from_fn(move |j: Job| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < failures_before_success {
                j.transient_failure(StepFailure::transient(503, "busy"))
            } else {
                Job { value: 99, ..j }.success()
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let step = retry(
            flaky(2, attempts.clone()),
            RetryPolicy::new(5, Duration::from_millis(10)),
        );
        let out = step.evaluate(job(0)).await;
        assert!(out.is_success());
        assert_eq!(out.value, 99);
        assert_eq!(out.failure_count(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let step = retry(
            flaky(u32::MAX, attempts.clone()),
            RetryPolicy::new(3, Duration::from_millis(10)),
        );
        let out = step.evaluate(job(0)).await;
        assert_eq!(out.status(), ExecutionStatus::TransientFailure);
        assert_eq!(out.failure_count(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let step = retry(
            Step::from_fn(move |j: Job| {
                counter.fetch_add(1, Ordering::SeqCst);
                j.permanent_failure(StepFailure::permanent(400, "invalid"))
            }),
            RetryPolicy::new(5, Duration::from_millis(10)),
        );
        let out = step.evaluate(job(0)).await;
        assert_eq!(out.status(), ExecutionStatus::PermanentFailure);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
