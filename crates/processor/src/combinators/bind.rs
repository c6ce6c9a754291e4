//! 顺序依赖：bind / choose

use crate::step::{Step, StepValue};

/// 先执行 `step`，再用它的输出决定下一个步骤，并以该输出为输入执行
pub fn bind<I, M, O, F>(step: Step<I, M>, continuation: F) -> Step<I, O>
where
    I: StepValue,
    M: StepValue,
    O: StepValue,
    F: Fn(M) -> Step<M, O> + Send + Sync + 'static,
{
    bind_with_input(step, move |_, output| continuation(output))
}

/// 同 `bind`，延续额外拿到原始输入
///
/// 后续部分交给 trampoline 的延续栈执行，嵌套任意层都不会增长调用栈。
pub fn bind_with_input<I, M, O, F>(step: Step<I, M>, continuation: F) -> Step<I, O>
where
    I: StepValue,
    M: StepValue,
    O: StepValue,
    F: Fn(I, M) -> Step<M, O> + Send + Sync + 'static,
{
    Step::chain(step, continuation)
}

/// 执行 `step` 后由 `selector` 根据输出挑选分支，分支在同一个输出上执行
pub fn choose<I, M, O, F>(step: Step<I, M>, selector: F) -> Step<I, O>
where
    I: StepValue,
    M: StepValue,
    O: StepValue,
    F: Fn(&M) -> Step<M, O> + Send + Sync + 'static,
{
    bind(step, move |output| selector(&output))
}
