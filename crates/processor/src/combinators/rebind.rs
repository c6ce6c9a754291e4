//! 输入输出重绑定
//!
//! 让为内部状态 `S` 编写的步骤在外部状态 `T` 上工作：
//! 组合时显式传入投影 (`T -> S`) 与注入 (`(T, S) -> T`) 函数。

use super::bind::{bind, bind_with_input};
use crate::step::{Step, StepValue};

/// 先把输入从 `B` 映射为 `A` 再执行，结果原样透出
pub fn bind_input<A, B, O, F>(step: Step<A, O>, adapter: F) -> Step<B, O>
where
    A: StepValue,
    B: StepValue,
    O: StepValue,
    F: Fn(B) -> A + Send + Sync + 'static,
{
    match step {
        Step::Computed(value) => Step::Computed(value),
        step => bind(Step::from_fn(adapter), move |_| step.clone()),
    }
}

/// 映射输出
pub fn map_output<I, O, P, F>(step: Step<I, O>, f: F) -> Step<I, P>
where
    I: StepValue,
    O: StepValue,
    P: StepValue,
    F: Fn(O) -> P + Send + Sync + 'static,
{
    bind(step, move |output| Step::Computed(f(output)))
}

/// 把 `Step<S, S>` 提升为 `Step<T, T>`
///
/// `project` 从外部状态取出内部状态，`inject` 把执行后的内部状态写回外部状态。
pub fn rebind<S, T, P, J>(step: Step<S, S>, project: P, inject: J) -> Step<T, T>
where
    S: StepValue,
    T: StepValue,
    P: Fn(&T) -> S + Send + Sync + 'static,
    J: Fn(T, S) -> T + Send + Sync + 'static,
{
    bind_with_input(
        bind_input(step, move |outer: T| project(&outer)),
        move |outer, inner| Step::Computed(inject(outer, inner)),
    )
}
