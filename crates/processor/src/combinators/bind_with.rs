//! 辅助值绑定
//!
//! 把需要 `(state, extra)` 的步骤适配成只需要 `state` 的步骤：
//! 先由辅助步骤（以 state 的投影或默认值为种子）算出 `extra`，
//! 再执行元组步骤，最后只取回结果中的 state，辅助值被丢弃。
//! 多个辅助值之间相互独立，并发计算。

use super::bind::bind_with_input;
use super::combine::{combine_parallel, combine_parallel3};
use super::rebind::{bind_input, map_output};
use crate::step::{Step, StepValue};

/// 以 state 的投影作为辅助步骤的初始值
pub fn auxiliary<S, X0, X, F>(provider: Step<X0, X>, seed: F) -> Step<S, X>
where
    S: StepValue,
    X0: StepValue,
    X: StepValue,
    F: Fn(&S) -> X0 + Send + Sync + 'static,
{
    bind_input(provider, move |state: S| seed(&state))
}

/// 以默认值作为辅助步骤的初始值
pub fn auxiliary_default<S, X0, X>(provider: Step<X0, X>) -> Step<S, X>
where
    S: StepValue,
    X0: StepValue + Default,
    X: StepValue,
{
    bind_input(provider, |_: S| X0::default())
}

fn attach<S, X, P>(inner: Step<(S, X), P>, value: Step<S, X>) -> Step<S, P>
where
    S: StepValue,
    X: StepValue,
    P: StepValue,
{
    bind_with_input(value, move |state: S, _extra: X| {
        bind_input(inner.clone(), move |extra: X| (state.clone(), extra))
    })
}

/// 一个辅助值
pub fn bind_with<S, X, O, Z>(inner: Step<(S, X), (O, Z)>, value: Step<S, X>) -> Step<S, O>
where
    S: StepValue,
    X: StepValue,
    O: StepValue,
    Z: StepValue,
{
    map_output(attach(inner, value), |(state, _)| state)
}

/// 两个辅助值
pub fn bind_with2<S, X, Y, O, X2, Y2>(
    inner: Step<(S, X, Y), (O, X2, Y2)>,
    first: Step<S, X>,
    second: Step<S, Y>,
) -> Step<S, O>
where
    S: StepValue,
    X: StepValue,
    Y: StepValue,
    O: StepValue,
    X2: StepValue,
    Y2: StepValue,
{
    let values = bind_input(combine_parallel(first, second), |state: S| {
        (state.clone(), state)
    });
    let inner = bind_input(inner, |(state, (x, y)): (S, (X, Y))| (state, x, y));
    map_output(attach(inner, values), |(state, _, _)| state)
}

/// 三个辅助值
pub fn bind_with3<S, X, Y, W, O, X2, Y2, W2>(
    inner: Step<(S, X, Y, W), (O, X2, Y2, W2)>,
    first: Step<S, X>,
    second: Step<S, Y>,
    third: Step<S, W>,
) -> Step<S, O>
where
    S: StepValue,
    X: StepValue,
    Y: StepValue,
    W: StepValue,
    O: StepValue,
    X2: StepValue,
    Y2: StepValue,
    W2: StepValue,
{
    let values = bind_input(combine_parallel3(first, second, third), |state: S| {
        (state.clone(), state.clone(), state)
    });
    let inner = bind_input(inner, |(state, (x, y, w)): (S, (X, Y, W))| (state, x, y, w));
    map_output(attach(inner, values), |(state, _, _, _)| state)
}
