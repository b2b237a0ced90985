//! # Input 模块
//!
//! Host 向引擎传递的语义化输入。引擎不接触鼠标/键盘事件本身。
//!
//! 时间流逝不是输入：Host 每帧调用 `Engine::tick(tick)` 推进时钟。

use serde::{Deserialize, Serialize};

use crate::layer::PageSide;

/// Host 向引擎传递的输入
///
/// - `PrimaryClick`：触发 `click` 处理器；在逐字显示中点击则跳到下一次点击等待
/// - `SecondaryClick`：右键（`rightclick` 设置的子程序）
/// - `CtrlDown` / `CtrlUp`：按住期间快进
/// - `ButtonClick`：点击某个图层上的按钮
/// - `SoundEnded`：非循环音频播放完毕
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineInput {
    PrimaryClick,
    SecondaryClick,
    CtrlDown,
    CtrlUp,
    ButtonClick {
        page: PageSide,
        layer: usize,
        button: usize,
    },
    SoundEnded {
        buf: usize,
    },
}

impl EngineInput {
    pub fn button(layer: usize, button: usize) -> Self {
        Self::ButtonClick {
            page: PageSide::Fore,
            layer,
            button,
        }
    }
}
