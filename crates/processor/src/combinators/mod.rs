//! 组合子
//!
//! 无状态的 Step 构造函数，用于把不同状态形态的步骤组合到一起：
//!
//! - `bind` / `choose`：顺序依赖与动态选择；
//! - `combine_*`：把两三条独立的计算拼成元组，顺序或并发执行；
//! - `bind_with*`：先计算辅助值，再执行需要 `(state, extra)` 的步骤；
//! - `bind_input` / `map_output` / `rebind`：输入输出的投影与注入。

mod bind;
mod bind_with;
mod combine;
mod rebind;

pub use bind::{bind, bind_with_input, choose};
pub use bind_with::{auxiliary, auxiliary_default, bind_with, bind_with2, bind_with3};
pub use combine::{
    combine_parallel, combine_parallel3, combine_sequential, combine_sequential3,
};
pub use rebind::{bind_input, map_output, rebind};
