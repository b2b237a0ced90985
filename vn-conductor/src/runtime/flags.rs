//! 引擎标志与播放模式

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::layer::PageSide;

/// 快进模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkipMode {
    #[default]
    Invalid,
    /// 快进到下一次点击等待（逐字显示中点击）
    UntilClickWait,
    /// 快进到下一个 `s`（`skip` 指令）
    UntilS,
    /// 按住 Ctrl 期间快进
    WhilePressingCtrl,
}

impl SkipMode {
    pub fn is_skipping(self) -> bool {
        self != SkipMode::Invalid
    }
}

/// 右键行为
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightClickConfig {
    pub enabled: bool,
    /// true 为 call，false 为 jump
    pub call: bool,
    pub file: Option<String>,
    pub label: Option<String>,
}

impl RightClickConfig {
    pub fn has_target(&self) -> bool {
        self.file.is_some() || self.label.is_some()
    }
}

/// 存档时保存的引擎标志
///
/// 只包含与执行位置无关、需要跨读档保持的设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFlags {
    pub message_layer: usize,
    /// 每个字符的显示间隔
    pub text_speed: u64,
    pub nowait: bool,
    pub history_output: bool,
    /// 图层指令默认操作的页
    pub current_page: PageSide,
    pub right_click: RightClickConfig,
}

impl EngineFlags {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            message_layer: config.message_layer,
            text_speed: config.char_delay,
            nowait: false,
            history_output: true,
            current_page: PageSide::Fore,
            right_click: RightClickConfig::default(),
        }
    }
}

/// 自动模式
///
/// 出现点击等待后经过 `interval`，合成一次点击并立即重新计时。不改变快进模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoMode {
    pub enabled: bool,
    pub interval: u64,
    armed_at: Option<u64>,
}

impl AutoMode {
    pub fn new(interval: u64) -> Self {
        Self {
            enabled: false,
            interval,
            armed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.enabled = true;
        self.armed_at = None;
    }

    pub fn stop(&mut self) {
        self.enabled = false;
        self.armed_at = None;
    }

    /// 每个 tick 调用；返回是否应当合成点击
    pub fn poll(&mut self, tick: u64, waiting_for_click: bool) -> bool {
        if !self.enabled || !waiting_for_click {
            self.armed_at = None;
            return false;
        }
        match self.armed_at {
            None => {
                self.armed_at = Some(tick);
                false
            }
            Some(armed) if tick.saturating_sub(armed) >= self.interval => {
                self.armed_at = Some(tick);
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_mode_fires_after_interval() {
        let mut auto = AutoMode::new(1000);
        assert!(!auto.poll(0, true));
        auto.start();
        assert!(!auto.poll(100, true));
        assert!(!auto.poll(1099, true));
        assert!(auto.poll(1100, true));
        // 立即重新计时
        assert!(!auto.poll(1200, true));
        assert!(auto.poll(2100, true));
    }

    #[test]
    fn test_auto_mode_resets_without_wait() {
        let mut auto = AutoMode::new(100);
        auto.start();
        auto.poll(0, true);
        auto.poll(50, false);
        assert!(!auto.poll(120, true));
        assert!(auto.poll(220, true));
    }
}
