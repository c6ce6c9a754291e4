//! 多步组合：把相互独立的计算拼成元组
//!
//! 输入是元组，每个子步骤只处理自己的槽位。顺序组合按槽位依次执行；
//! 并发组合先同步推进各分支，全部同步完成时不进入调度，否则等待全部分支结束。

use super::bind::bind_with_input;
use super::rebind::{bind_input, map_output};
use crate::step::{Advance, Next, Step, StepValue};
use futures::future::{join, join3};

/// 依次执行两个步骤
pub fn combine_sequential<A1, B1, A2, B2>(
    first: Step<A1, B1>,
    second: Step<A2, B2>,
) -> Step<(A1, A2), (B1, B2)>
where
    A1: StepValue,
    B1: StepValue,
    A2: StepValue,
    B2: StepValue,
{
    let first = bind_input(first, |(a1, _): (A1, A2)| a1);
    bind_with_input(first, move |(_, a2): (A1, A2), b1: B1| {
        let paired = map_output(second.clone(), move |b2| (b1.clone(), b2));
        bind_input(paired, move |_: B1| a2.clone())
    })
}

/// 依次执行三个步骤
pub fn combine_sequential3<A1, B1, A2, B2, A3, B3>(
    first: Step<A1, B1>,
    second: Step<A2, B2>,
    third: Step<A3, B3>,
) -> Step<(A1, A2, A3), (B1, B2, B3)>
where
    A1: StepValue,
    B1: StepValue,
    A2: StepValue,
    B2: StepValue,
    A3: StepValue,
    B3: StepValue,
{
    let nested = combine_sequential(combine_sequential(first, second), third);
    let flattened = map_output(nested, |((b1, b2), b3)| (b1, b2, b3));
    bind_input(flattened, |(a1, a2, a3)| ((a1, a2), a3))
}

/// 并发执行两个步骤
pub fn combine_parallel<A1, B1, A2, B2>(
    first: Step<A1, B1>,
    second: Step<A2, B2>,
) -> Step<(A1, A2), (B1, B2)>
where
    A1: StepValue,
    B1: StepValue,
    A2: StepValue,
    B2: StepValue,
{
    Step::continuation(move |(a1, a2): (A1, A2)| {
        match (first.clone().advance(a1), second.clone().advance(a2)) {
            (Advance::Done(b1), Advance::Done(b2)) => Next::Ready(Step::Computed((b1, b2))),
            (left, right) => Next::Suspended(Box::pin(async move {
                let (b1, b2) = join(left.finish(), right.finish()).await;
                Step::Computed((b1, b2))
            })),
        }
    })
}

/// 并发执行三个步骤
pub fn combine_parallel3<A1, B1, A2, B2, A3, B3>(
    first: Step<A1, B1>,
    second: Step<A2, B2>,
    third: Step<A3, B3>,
) -> Step<(A1, A2, A3), (B1, B2, B3)>
where
    A1: StepValue,
    B1: StepValue,
    A2: StepValue,
    B2: StepValue,
    A3: StepValue,
    B3: StepValue,
{
    Step::continuation(move |(a1, a2, a3): (A1, A2, A3)| {
        match (
            first.clone().advance(a1),
            second.clone().advance(a2),
            third.clone().advance(a3),
        ) {
            (Advance::Done(b1), Advance::Done(b2), Advance::Done(b3)) => {
                Next::Ready(Step::Computed((b1, b2, b3)))
            }
            (a, b, c) => Next::Suspended(Box::pin(async move {
                let outputs = join3(a.finish(), b.finish(), c.finish()).await;
                Step::Computed(outputs)
            })),
        }
    })
}
