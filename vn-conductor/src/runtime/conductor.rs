//! # Conductor 模块
//!
//! 执行/挂起状态机。等待状态全部以数据表示（状态枚举 + 待触发的事件处理器表），
//! 因此可以原样写入存档。
//!
//! ```text
//!            stop()                      sleep(tick, d, owner)
//! Running ─────────► Stopped   Running ───────────────────────► Sleeping
//!    ▲                  │                                          │
//!    └──── start() ◄────┘◄──── tick >= wake_tick / start() ◄───────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conductor 状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorStatus {
    Running,
    Stopped,
    Sleeping { wake_tick: u64, owner: String },
}

/// 事件处理器触发时执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerAction {
    /// 恢复执行
    Start,
    /// 隐藏等待图标后恢复执行（行末等待）
    StartHidingGlyph,
    /// 翻页：清空消息层后恢复执行
    PageBreak,
}

/// 一次性事件处理器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandler {
    pub owner: String,
    pub action: HandlerAction,
}

/// 事件名 → 处理器列表
pub type HandlerTable = BTreeMap<String, Vec<EventHandler>>;

/// 事件名常量
pub mod events {
    pub const CLICK: &str = "click";
    pub const TRANS: &str = "trans";
    pub const MOVE: &str = "move";
    pub const FRAME_ANIM: &str = "frameanim";
    pub const SOUND_STOP: &str = "soundstop";
    pub const SOUND_FADE: &str = "soundfade";
    pub const VIDEO: &str = "video";
    pub const BUTTON: &str = "button";
    pub const LOAD: &str = "load";
}

/// 执行状态机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conductor {
    status: ConductorStatus,
    handlers: HandlerTable,
}

impl Default for Conductor {
    fn default() -> Self {
        Self::new()
    }
}

impl Conductor {
    /// 新建的 Conductor 处于 Stopped 状态
    pub fn new() -> Self {
        Self {
            status: ConductorStatus::Stopped,
            handlers: HandlerTable::new(),
        }
    }

    pub fn status(&self) -> &ConductorStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == ConductorStatus::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.status == ConductorStatus::Stopped
    }

    pub fn is_sleeping(&self) -> bool {
        matches!(self.status, ConductorStatus::Sleeping { .. })
    }

    /// 当前睡眠的发起者
    pub fn sleep_owner(&self) -> Option<&str> {
        match &self.status {
            ConductorStatus::Sleeping { owner, .. } => Some(owner),
            _ => None,
        }
    }

    pub fn start(&mut self) {
        self.status = ConductorStatus::Running;
    }

    pub fn stop(&mut self) {
        self.status = ConductorStatus::Stopped;
    }

    /// 睡眠到 `tick + duration`
    pub fn sleep(&mut self, tick: u64, duration: u64, owner: impl Into<String>) {
        self.status = ConductorStatus::Sleeping {
            wake_tick: tick.saturating_add(duration),
            owner: owner.into(),
        };
    }

    /// 到时间则唤醒
    ///
    /// 唤醒时清除睡眠发起者注册的处理器（例如可跳过的 wait 注册的点击处理器）。
    /// 返回是否发生了唤醒。
    pub fn wake_if_due(&mut self, tick: u64) -> bool {
        let ConductorStatus::Sleeping { wake_tick, owner } = &self.status else {
            return false;
        };
        if tick < *wake_tick {
            return false;
        }
        let owner = owner.clone();
        self.clear_event_handler_by_name(&owner);
        self.start();
        true
    }

    /// 注册事件处理器
    ///
    /// 同一 owner 在同一事件上只保留一个处理器。
    pub fn add_event_handler(
        &mut self,
        event: &str,
        owner: impl Into<String>,
        action: HandlerAction,
    ) {
        let owner = owner.into();
        let list = self.handlers.entry(event.to_string()).or_default();
        list.retain(|h| h.owner != owner);
        list.push(EventHandler { owner, action });
    }

    /// 清除某个 owner 在所有事件上的处理器
    pub fn clear_event_handler_by_name(&mut self, owner: &str) {
        for list in self.handlers.values_mut() {
            list.retain(|h| h.owner != owner);
        }
        self.handlers.retain(|_, list| !list.is_empty());
    }

    pub fn clear_all_event_handlers(&mut self) {
        self.handlers.clear();
    }

    pub fn has_event_handler(&self, event: &str) -> bool {
        self.handlers.get(event).is_some_and(|list| !list.is_empty())
    }

    pub fn has_any_event_handler(&self) -> bool {
        !self.handlers.is_empty()
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// 取出整张处理器表（右键子程序挂起等待时使用）
    pub fn take_handlers(&mut self) -> HandlerTable {
        std::mem::take(&mut self.handlers)
    }

    pub fn set_handlers(&mut self, handlers: HandlerTable) {
        self.handlers = handlers;
    }

    /// 触发事件
    ///
    /// 取出该事件的所有处理器；每个被触发的 owner 在其他事件上的处理器也一并清除，
    /// 保证一次等待只被解除一次。返回需要执行的动作。
    pub fn trigger(&mut self, event: &str) -> Vec<HandlerAction> {
        let Some(fired) = self.handlers.remove(event) else {
            return Vec::new();
        };
        for handler in &fired {
            self.clear_event_handler_by_name(&handler.owner);
        }
        fired.into_iter().map(|h| h.action).collect()
    }

    /// 整体替换状态（读档）
    pub fn restore(&mut self, status: ConductorStatus, handlers: HandlerTable) {
        self.status = status;
        self.handlers = handlers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_and_wake() {
        let mut conductor = Conductor::new();
        conductor.start();
        conductor.sleep(100, 30, "ch");
        assert_eq!(conductor.sleep_owner(), Some("ch"));

        assert!(!conductor.wake_if_due(129));
        assert!(conductor.is_sleeping());
        assert!(conductor.wake_if_due(130));
        assert!(conductor.is_running());
    }

    #[test]
    fn test_wake_clears_owner_handlers() {
        let mut conductor = Conductor::new();
        conductor.sleep(0, 10, "wait");
        conductor.add_event_handler(events::CLICK, "wait", HandlerAction::Start);
        conductor.add_event_handler(events::CLICK, "other", HandlerAction::Start);

        conductor.wake_if_due(10);
        let remaining: Vec<_> = conductor.handlers()[events::CLICK]
            .iter()
            .map(|h| h.owner.as_str())
            .collect();
        assert_eq!(remaining, vec!["other"]);
    }

    #[test]
    fn test_trigger_is_one_shot() {
        let mut conductor = Conductor::new();
        conductor.add_event_handler(events::CLICK, "l", HandlerAction::StartHidingGlyph);
        conductor.add_event_handler(events::TRANS, "l", HandlerAction::Start);

        assert_eq!(
            conductor.trigger(events::CLICK),
            vec![HandlerAction::StartHidingGlyph]
        );
        // 同一 owner 的其他处理器也被清除
        assert!(!conductor.has_event_handler(events::TRANS));
        assert!(conductor.trigger(events::CLICK).is_empty());
    }

    #[test]
    fn test_add_replaces_same_owner() {
        let mut conductor = Conductor::new();
        conductor.add_event_handler(events::CLICK, "p", HandlerAction::Start);
        conductor.add_event_handler(events::CLICK, "p", HandlerAction::PageBreak);
        assert_eq!(conductor.trigger(events::CLICK), vec![HandlerAction::PageBreak]);
    }

    #[test]
    fn test_serialization() {
        let mut conductor = Conductor::new();
        conductor.sleep(5, 10, "wait");
        conductor.add_event_handler(events::CLICK, "wait", HandlerAction::Start);
        let json = serde_json::to_string(&conductor).unwrap();
        let back: Conductor = serde_json::from_str(&json).unwrap();
        assert_eq!(conductor, back);
    }
}
