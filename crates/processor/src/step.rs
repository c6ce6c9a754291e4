//! Step：惰性求值、栈安全的计算单元
//!
//! 一个 `Step<I, O>` 在任一时刻只有四种形态之一：
//!
//! - `Computed`：已经持有最终结果，求值直接返回；
//! - `Identity`：把输入原样作为输出（只能在 `I == O` 时构造）；
//! - `Pending`：挂起的延续，调用后得到下一个 Step（可能仍是 `Pending`）；
//! - `Bind`：先执行内层 Step，再由其输出决定下一个 Step。
//!
//! 求值由 trampoline 完成：同步返回的延续在同一个循环里逐层展开，
//! `Bind` 的后续部分压入显式的延续栈而不是调用栈，
//! 只有真正需要等待的延续才会 `.await`。因此任意长度、任意嵌套方向的同步链都不会增长调用栈。

use futures::future::BoxFuture;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// 可以在管道中流动的值
///
/// 状态按约定不可变：每次转换都产生新值，因此要求可克隆、可跨线程共享。
pub trait StepValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> StepValue for T {}

/// 延续被调用一次后的结果
pub enum Next<I, O> {
    /// 同步得到下一个 Step，trampoline 在当前循环中继续展开
    Ready(Step<I, O>),
    /// 需要等待异步依赖
    Suspended(BoxFuture<'static, Step<I, O>>),
}

type Continuation<I, O> = dyn Fn(I) -> Next<I, O> + Send + Sync;

/// 计算单元
pub enum Step<I, O> {
    Computed(O),
    Identity(fn(I) -> O),
    Pending(Arc<Continuation<I, O>>),
    Bind(BindNode<I, O>),
}

/// `Step::Bind` 的内容，中间类型已被擦除
pub struct BindNode<I, O> {
    node: Arc<dyn Bound<I, O>>,
}

impl<I, O> Clone for BindNode<I, O> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<I, O: Clone> Clone for Step<I, O> {
    fn clone(&self) -> Self {
        match self {
            Step::Computed(value) => Step::Computed(value.clone()),
            Step::Identity(f) => Step::Identity(*f),
            Step::Pending(k) => Step::Pending(Arc::clone(k)),
            Step::Bind(node) => Step::Bind(node.clone()),
        }
    }
}

impl<I, O: fmt::Debug> fmt::Debug for Step<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Computed(value) => f.debug_tuple("Computed").field(value).finish(),
            Step::Identity(_) => f.write_str("Identity"),
            Step::Pending(_) => f.write_str("Pending"),
            Step::Bind(_) => f.write_str("Bind"),
        }
    }
}

impl<T: StepValue> Step<T, T> {
    /// 原样透传输入
    pub fn identity() -> Self {
        Step::Identity(std::convert::identity)
    }
}

impl<I: StepValue, O: StepValue> Step<I, O> {
    pub fn computed(value: O) -> Self {
        Step::Computed(value)
    }

    /// 原始延续：直接决定同步继续还是挂起
    pub fn continuation<F>(f: F) -> Self
    where
        F: Fn(I) -> Next<I, O> + Send + Sync + 'static,
    {
        Step::Pending(Arc::new(f))
    }

    /// 同步延续，返回值由 trampoline 在同一轮循环中继续求值
    pub fn defer<F>(f: F) -> Self
    where
        F: Fn(I) -> Step<I, O> + Send + Sync + 'static,
    {
        Step::continuation(move |input| Next::Ready(f(input)))
    }

    /// 异步延续
    pub fn suspend<F, Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step<I, O>> + Send + 'static,
    {
        Step::continuation(move |input| Next::Suspended(Box::pin(f(input))))
    }

    /// 由同步函数构造
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Step::defer(move |input| Step::Computed(f(input)))
    }

    /// 由异步函数构造
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        Step::suspend(move |input| {
            let fut = f(input);
            async move { Step::Computed(fut.await) }
        })
    }

    /// 先执行 `step`，再用原始输入和它的输出得到下一个 Step，并在该输出上执行
    pub fn chain<M, F>(step: Step<I, M>, continuation: F) -> Self
    where
        M: StepValue,
        F: Fn(I, M) -> Step<M, O> + Send + Sync + 'static,
    {
        Step::Bind(BindNode {
            node: Arc::new(BindWith {
                step: Some(step),
                continuation: Arc::new(continuation),
            }),
        })
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Step::Computed(_))
    }

    /// 取出已计算的结果
    ///
    /// # Panics
    ///
    /// 不是 `Computed` 时 panic：调用方声明结果已存在却没有，说明组合子破坏了约定。
    pub fn expect_computed(self) -> O {
        match self {
            Step::Computed(value) => value,
            other => panic!(
                "[STEP] 期望已计算的 Step，实际为 {}",
                other.variant_name()
            ),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Step::Computed(_) => "Computed",
            Step::Identity(_) => "Identity",
            Step::Pending(_) => "Pending",
            Step::Bind(_) => "Bind",
        }
    }

    /// 同步地尽可能展开
    ///
    /// 连续的同步延续在这里迭代展开；遇到第一个需要等待的延续时，
    /// 把剩余部分连同输入一起交给调用方。
    pub fn advance(self, input: I) -> Advance<I, O> {
        let mut current = self;
        loop {
            match current {
                Step::Computed(value) => return Advance::Done(value),
                Step::Identity(f) => return Advance::Done(f(input)),
                Step::Pending(k) => match k(input.clone()) {
                    Next::Ready(next) => current = next,
                    Next::Suspended(pending) => {
                        return Advance::Suspended(Suspension {
                            pending: erase_future(pending),
                            input: Box::new(input),
                            frames: Vec::new(),
                            _types: PhantomData,
                        })
                    }
                },
                Step::Bind(bind) => {
                    let split = bind.node.split(input);
                    return drive(split.inner, split.input, vec![split.frame]);
                }
            }
        }
    }

    /// 消耗自身求值（trampoline）
    pub async fn resolve(self, input: I) -> O {
        match self.advance(input) {
            Advance::Done(value) => value,
            Advance::Suspended(rest) => rest.finish().await,
        }
    }

    /// 对输入求值，Step 本身可重复使用
    pub fn evaluate(&self, input: I) -> impl Future<Output = O> + Send + 'static {
        self.clone().resolve(input)
    }
}

/// `advance` 的结果
pub enum Advance<I, O> {
    Done(O),
    Suspended(Suspension<I, O>),
}

/// 挂起的剩余计算：等待中的 Step、它的输入，以及尚未执行的 bind 延续
pub struct Suspension<I, O> {
    pending: BoxFuture<'static, Erased>,
    input: Value,
    frames: Vec<Frame>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I: StepValue, O: StepValue> Suspension<I, O> {
    pub async fn finish(self) -> O {
        let mut rest = self;
        loop {
            let Suspension {
                pending,
                input,
                frames,
                ..
            } = rest;
            let next = pending.await;
            match drive(next, input, frames) {
                Advance::Done(value) => return value,
                Advance::Suspended(more) => rest = more,
            }
        }
    }
}

impl<I: StepValue, O: StepValue> Advance<I, O> {
    pub fn is_done(&self) -> bool {
        matches!(self, Advance::Done(_))
    }

    pub async fn finish(self) -> O {
        match self {
            Advance::Done(value) => value,
            Advance::Suspended(rest) => rest.finish().await,
        }
    }
}

type Value = Box<dyn Any + Send>;

/// 擦除了输入输出类型的 Step，调用一次得到下一阶段
type Erased = Box<dyn FnOnce(Value) -> Stage + Send>;

/// bind 的后续部分：拿到内层输出，给出下一个 Step 及其输入
type Frame = Box<dyn FnOnce(Value) -> (Erased, Value) + Send>;

enum Stage {
    Done(Value),
    Ready(Erased, Value),
    Suspended(BoxFuture<'static, Erased>, Value),
    Bind(Split),
}

struct Split {
    inner: Erased,
    input: Value,
    frame: Frame,
}

fn unbox<T: 'static>(value: Value) -> T {
    match value.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => panic!("[STEP] 延续栈中的值类型不符，期望 {}", type_name::<T>()),
    }
}

fn erase<I: StepValue, O: StepValue>(step: Step<I, O>) -> Erased {
    Box::new(move |input: Value| {
        let input: I = unbox(input);
        match step {
            Step::Computed(value) => Stage::Done(Box::new(value)),
            Step::Identity(f) => Stage::Done(Box::new(f(input))),
            Step::Pending(k) => match k(input.clone()) {
                Next::Ready(next) => Stage::Ready(erase(next), Box::new(input)),
                Next::Suspended(pending) => Stage::Suspended(erase_future(pending), Box::new(input)),
            },
            Step::Bind(bind) => Stage::Bind(bind.node.split(input)),
        }
    })
}

fn erase_future<I: StepValue, O: StepValue>(
    pending: BoxFuture<'static, Step<I, O>>,
) -> BoxFuture<'static, Erased> {
    Box::pin(async move { erase(pending.await) })
}

/// 延续栈上的主循环
///
/// 内层完成时弹出最近的 bind 延续；栈空时得到最终输出。
fn drive<I: StepValue, O: StepValue>(
    mut current: Erased,
    mut input: Value,
    mut frames: Vec<Frame>,
) -> Advance<I, O> {
    loop {
        match current(input) {
            Stage::Done(value) => match frames.pop() {
                Some(frame) => (current, input) = frame(value),
                None => return Advance::Done(unbox(value)),
            },
            Stage::Ready(next, same) => {
                current = next;
                input = same;
            }
            Stage::Suspended(pending, same) => {
                return Advance::Suspended(Suspension {
                    pending,
                    input: same,
                    frames,
                    _types: PhantomData,
                })
            }
            Stage::Bind(split) => {
                frames.push(split.frame);
                current = split.inner;
                input = split.input;
            }
        }
    }
}

trait Bound<I, O>: Send + Sync {
    fn split(&self, input: I) -> Split;

    fn take_nested(&mut self) -> Option<Box<dyn Nested>>;
}

/// 可以逐层拆开的 bind 节点，析构时用
trait Nested: Send {
    fn detach(&mut self) -> Option<Box<dyn Nested>>;
}

impl<I: 'static, O: 'static> Nested for Arc<dyn Bound<I, O>> {
    fn detach(&mut self) -> Option<Box<dyn Nested>> {
        Arc::get_mut(self).and_then(|node| node.take_nested())
    }
}

struct BindWith<I: StepValue, M: StepValue, O: StepValue> {
    // 只在析构时为 None
    step: Option<Step<I, M>>,
    continuation: Arc<dyn Fn(I, M) -> Step<M, O> + Send + Sync>,
}

impl<I: StepValue, M: StepValue, O: StepValue> Bound<I, O> for BindWith<I, M, O> {
    fn split(&self, input: I) -> Split {
        let Some(step) = self.step.clone() else {
            unreachable!("[STEP] bind 节点已析构");
        };
        let continuation = Arc::clone(&self.continuation);
        let original = input.clone();
        Split {
            inner: erase(step),
            input: Box::new(input),
            frame: Box::new(move |output: Value| {
                let output: M = unbox(output);
                let next = continuation(original, output.clone());
                (erase(next), Box::new(output) as Value)
            }),
        }
    }

    fn take_nested(&mut self) -> Option<Box<dyn Nested>> {
        match self.step.take() {
            Some(Step::Bind(bind)) => Some(Box::new(bind.node) as Box<dyn Nested>),
            _ => None,
        }
    }
}

// 左嵌套的 bind 链逐层拆开释放，析构深度与链长无关
impl<I: StepValue, M: StepValue, O: StepValue> Drop for BindWith<I, M, O> {
    fn drop(&mut self) {
        let mut nested = self.take_nested();
        while let Some(mut node) = nested {
            nested = node.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn countdown(n: u64) -> Step<u64, u64> {
        if n == 0 {
            Step::computed(0)
        } else {
            Step::defer(move |_| countdown(n - 1))
        }
    }

    fn chain_len(n: u64) -> Step<u64, u64> {
        // 每一层都是 Pending，最后一层把输入加上链长
        fn link(remaining: u64, total: u64) -> Step<u64, u64> {
            if remaining == 0 {
                Step::from_fn(move |x| x + total)
            } else {
                Step::defer(move |_| link(remaining - 1, total))
            }
        }
        link(n, n)
    }

    #[tokio::test]
    async fn test_computed_is_idempotent() {
        let step: Step<u64, u64> = Step::computed(42);
        for _ in 0..5 {
            assert_eq!(step.evaluate(7).await, 42);
        }
        assert!(step.is_computed());
    }

    #[tokio::test]
    async fn test_identity_returns_input() {
        let step: Step<String, String> = Step::identity();
        assert_eq!(step.evaluate("hello".to_string()).await, "hello");
    }

    #[tokio::test]
    async fn test_pending_chain_lengths() {
        for n in [1u64, 10, 10_000] {
            assert_eq!(chain_len(n).evaluate(1).await, n + 1);
        }
    }

    #[test]
    fn test_long_sync_chain_advances_without_runtime() {
        match countdown(100_000).advance(5) {
            Advance::Done(v) => assert_eq!(v, 0),
            Advance::Suspended(_) => panic!("synchronous chain must not suspend"),
        }
    }

    #[tokio::test]
    async fn test_suspended_continuation_resumes_with_same_input() {
        let step: Step<u64, u64> = Step::suspend(|x| async move {
            tokio::task::yield_now().await;
            Step::from_fn(move |y| x * 10 + y)
        });
        assert_eq!(step.evaluate(3).await, 33);
    }

    #[tokio::test]
    async fn test_continuation_runs_once_per_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let step: Step<u64, u64> = Step::from_fn(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x + 1
        });
        assert_eq!(step.evaluate(1).await, 2);
        assert_eq!(step.evaluate(2).await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_from_async() {
        let step: Step<u64, String> = Step::from_async(|x| async move { format!("v{x}") });
        assert!(matches!(step.clone().advance(1), Advance::Suspended(_)));
        assert_eq!(step.evaluate(9).await, "v9");
    }

    #[test]
    fn test_expect_computed() {
        assert_eq!(Step::<u8, u8>::computed(3).expect_computed(), 3);
    }

    #[test]
    #[should_panic(expected = "Pending")]
    fn test_expect_computed_panics_on_pending() {
        Step::<u8, u8>::from_fn(|x| x).expect_computed();
    }
}
