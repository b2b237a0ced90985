//! # Runtime 模块
//!
//! 执行引擎核心。
//!
//! ## 模块结构
//!
//! - [`conductor`]：执行/挂起状态机
//! - [`engine`]：引擎本体、主循环与指令分发
//! - `flags`：存档保存的引擎标志、快进与自动模式
//! - `playback`：快进/自动模式与 Host 输入
//! - `snapshot`：存档快照的生成与恢复

pub mod conductor;
pub mod engine;
mod flags;
mod playback;
mod snapshot;

pub use conductor::{Conductor, ConductorStatus, EventHandler, HandlerAction, HandlerTable, events};
pub use engine::{Engine, LatestSaveMark};
pub use flags::{AutoMode, EngineFlags, RightClickConfig, SkipMode};
pub use snapshot::RestoreMode;

pub(crate) use playback::CH_OWNER;

#[cfg(test)]
mod tests;
