//! # VN Conductor
//!
//! 视觉小说脚本的指令引擎。
//!
//! ## 架构概述
//!
//! `vn-conductor` 不做渲染和音频解码。Host 提供脚本来源、资源加载器与存档存储，
//! 每帧推进时钟，并读取引擎维护的图层/音频状态自行呈现：
//!
//! ```text
//! Host                              Engine
//!   │                                  │
//!   │──── handle_input(EngineInput) ──►│ 触发 click / 按钮 / 右键处理器
//!   │──── tick(now) ──────────────────►│ 动画推进 → 到期唤醒 → 执行指令直到挂起
//!   │◄─── pages() / sounds() / ... ────│
//!   │                                  │
//! ```
//!
//! ## 使用示例
//!
//! ```ignore
//! use vn_conductor::{Engine, EngineConfig, EngineInput};
//!
//! let mut engine = Engine::new(EngineConfig::default(), Box::new(scripts))?
//!     .with_loader(Box::new(loader))
//!     .with_storage(Box::new(storage));
//! engine.start("first.txt")?;
//!
//! loop {
//!     engine.tick(now_ms())?;
//!     host.present(engine.pages(), engine.sounds());
//!     if clicked {
//!         engine.handle_input(EngineInput::PrimaryClick)?;
//!     }
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`script`]：脚本解析与执行游标（标签、存档点、宏、if/for、调用栈）
//! - [`tag`] / [`tags`]：指令模型、参数校验与内置指令
//! - [`expr`] / [`variables`]：表达式求值与四个变量作用域
//! - [`layer`] / [`sound`]：呈现状态（图层、动画、过渡、音频缓冲区）
//! - [`runtime`]：Conductor 状态机与引擎主循环
//! - [`save`] / [`storage`]：存档文档与持久化接口
//! - [`diagnostic`]：不执行脚本的静态检查

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod expr;
pub mod history;
pub mod input;
pub mod layer;
pub mod resource;
pub mod runtime;
pub mod save;
pub mod script;
pub mod sound;
pub mod storage;
pub mod tag;
pub mod tags;
pub mod value;
pub mod variables;

// 重导出核心类型
pub use config::EngineConfig;
pub use diagnostic::{
    Diagnostic, DiagnosticLevel, DiagnosticResult, ResourceReference, analyze_script,
    extract_resource_references,
};
pub use error::{ExprError, ParseError, ResourceError, SaveError, TagError, VnError, VnResult};
pub use history::{History, HistoryEvent};
pub use input::EngineInput;
pub use layer::{Layer, PageSide, Pages};
pub use resource::{
    LoadStatus, LoadToken, MemoryResourceLoader, MemoryScriptSource, ResourceInfo, ResourceKind,
    ResourceLoader, ScriptSource,
};
pub use runtime::{ConductorStatus, Engine, SkipMode};
pub use save::{SaveData, SlotMeta, SystemData};
pub use script::{ParsedScript, parse_script};
pub use storage::{MemoryStorage, SaveStorage};
pub use tag::{Tag, TagRegistry};
pub use value::{Value, ValueType};
pub use variables::VarScope;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let scripts = MemoryScriptSource::new().with("main.txt", "你好\n");
        let mut engine = Engine::new(EngineConfig::default(), Box::new(scripts))
            .unwrap()
            .with_loader(Box::new(MemoryResourceLoader::new()))
            .with_storage(Box::new(MemoryStorage::new()));
        engine.start("main.txt").unwrap();
        engine.tick(0).unwrap();
        engine.handle_input(EngineInput::PrimaryClick).unwrap();

        let parsed = parse_script("main.txt", ";jump label: nowhere\n").unwrap();
        let result = analyze_script(&parsed, engine.registry());
        assert!(result.has_errors());
    }
}
