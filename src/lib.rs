//! relaycast
//!
//! 异步短路管道引擎的统一入口：重新导出核心配置与处理器，
//! 并提供基于处理链的请求闸门 `gate`。

pub mod gate;

pub use relaycast_core;
pub use relaycast_processor;

pub use gate::{Gate, GateDecision, GateRequest, GateRules};
pub use relaycast_core::{load_config, RelayConfig};
pub use relaycast_processor::*;
