//! 快进、自动模式与 Host 输入
//!
//! 快进不中断任何东西：遇到点击等待时立即触发本应由点击触发的处理器。
//! 是否允许快进由最近经过的存档点是否已读决定。

use tracing::{debug, info};

use super::conductor::{HandlerAction, events};
use super::engine::{Engine, LatestSaveMark};
use super::flags::SkipMode;
use crate::error::VnResult;
use crate::input::EngineInput;
use crate::layer::GlyphState;
use crate::save::SystemData;
use crate::script::SuspendedWait;
use crate::tag::TagResult;

/// 逐字显示时 `ch` 的睡眠 owner
pub(crate) const CH_OWNER: &str = "ch";

impl Engine {
    // =========================================================================
    // 快进
    // =========================================================================

    fn latest_mark_read(&self) -> bool {
        self.latest_save_mark.as_ref().is_some_and(|mark| mark.was_read)
    }

    /// `skip` 指令：快进到下一个 `s`
    ///
    /// 只有最近的存档点已读，或允许快进未读内容时才生效。返回是否开始快进。
    pub fn start_skip_by_tag(&mut self) -> bool {
        if self.latest_mark_read() || self.config.skip_unread_by_tag {
            self.skip_mode = SkipMode::UntilS;
            true
        } else {
            debug!("最近的存档点未读，不允许快进");
            false
        }
    }

    /// 按下 Ctrl：按住期间快进
    pub fn start_skip_by_ctrl(&mut self) -> bool {
        if self.latest_mark_read() || self.config.skip_unread_by_ctrl {
            self.skip_mode = SkipMode::WhilePressingCtrl;
            self.fire(events::CLICK);
            true
        } else {
            false
        }
    }

    pub fn stop_skip(&mut self) {
        self.skip_mode = SkipMode::Invalid;
    }

    /// 经过存档点
    ///
    /// 记录已读状态；以不允许快进未读内容的模式快进时遇到未读存档点，快进结束。
    pub(crate) fn pass_save_mark(&mut self, name: &str) {
        let was_read = self.script.pass_save_mark(name);
        if self
            .system
            .read_marks
            .insert(SystemData::read_mark_key(self.script.file_path(), name))
        {
            self.system_dirty = true;
        }

        if !was_read {
            let stop = match self.skip_mode {
                SkipMode::UntilS => !self.config.skip_unread_by_tag,
                SkipMode::WhilePressingCtrl => !self.config.skip_unread_by_ctrl,
                _ => false,
            };
            if stop {
                info!(mark = name, "遇到未读存档点，停止快进");
                self.skip_mode = SkipMode::Invalid;
            }
        }
        self.latest_save_mark = Some(LatestSaveMark {
            name: name.to_string(),
            was_read,
        });
    }

    /// 是否应跳过逐字等待
    pub(crate) fn is_skipping_text(&self) -> bool {
        self.skip_mode.is_skipping() || self.flags.nowait
    }

    // =========================================================================
    // 点击等待
    // =========================================================================

    /// 停止执行并等待点击
    ///
    /// `UntilClickWait` 快进在这里结束；其他快进模式立即触发点击处理器。
    pub(crate) fn wait_click(&mut self, owner: &str, action: HandlerAction) -> TagResult {
        self.conductor.stop();
        self.conductor.add_event_handler(events::CLICK, owner, action);
        match self.skip_mode {
            SkipMode::Invalid => TagResult::Break,
            SkipMode::UntilClickWait => {
                self.skip_mode = SkipMode::Invalid;
                TagResult::Break
            }
            SkipMode::UntilS | SkipMode::WhilePressingCtrl => {
                self.fire(events::CLICK);
                TagResult::Continue
            }
        }
    }

    /// 是否正在等待点击
    pub fn is_waiting_click(&self) -> bool {
        self.conductor.has_event_handler(events::CLICK)
    }

    pub(crate) fn update_auto(&mut self, tick: u64) {
        let waiting = self.is_waiting_click() && !self.skip_mode.is_skipping();
        if self.auto.poll(tick, waiting) {
            debug!(tick, "自动模式：合成点击");
            self.fire(events::CLICK);
        }
    }

    pub fn start_auto_mode(&mut self) {
        self.auto.interval = self.config.auto_mode_interval;
        self.auto.start();
    }

    pub fn stop_auto_mode(&mut self) {
        self.auto.stop();
    }

    // =========================================================================
    // 输入
    // =========================================================================

    /// 处理 Host 输入
    ///
    /// 输入只改变状态；指令在下一次 `tick` 中继续执行。
    pub fn handle_input(&mut self, input: EngineInput) -> VnResult<()> {
        match self.dispatch_input(input) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn dispatch_input(&mut self, input: EngineInput) -> VnResult<()> {
        match input {
            EngineInput::PrimaryClick => self.on_primary_click(),
            EngineInput::SecondaryClick => self.on_secondary_click()?,
            EngineInput::CtrlDown => {
                self.ctrl_pressed = true;
                self.start_skip_by_ctrl();
            }
            EngineInput::CtrlUp => {
                self.ctrl_pressed = false;
                if self.skip_mode == SkipMode::WhilePressingCtrl {
                    self.skip_mode = SkipMode::Invalid;
                }
            }
            EngineInput::ButtonClick {
                page,
                layer,
                button,
            } => {
                let target = self.layer(page, layer)?.buttons.press(button).cloned();
                match target {
                    Some(target) => self.on_button(target)?,
                    None => debug!(layer, button, "按钮不存在或已锁定"),
                }
            }
            EngineInput::SoundEnded { buf } => {
                let fired = self.sound_mut(buf)?.notify_ended();
                for event in fired {
                    self.fire(event);
                }
            }
        }
        Ok(())
    }

    fn on_primary_click(&mut self) {
        if self.auto.enabled {
            self.stop_auto_mode();
        }
        if self.skip_mode == SkipMode::UntilS {
            self.skip_mode = SkipMode::Invalid;
        }

        if self.is_waiting_click() {
            self.fire(events::CLICK);
        } else if self.conductor.sleep_owner() == Some(CH_OWNER) {
            // 逐字显示中点击：快进到下一次点击等待
            self.skip_mode = SkipMode::UntilClickWait;
            self.conductor.start();
        }
    }

    /// 右键：只在等待点击时生效
    fn on_secondary_click(&mut self) -> VnResult<()> {
        let right_click = self.flags.right_click.clone();
        if !right_click.enabled || !right_click.has_target() || !self.conductor.is_stopped() {
            return Ok(());
        }
        let file = right_click.file.as_deref();
        let label = right_click.label.as_deref();
        if right_click.call {
            let suspended = self.suspend_wait();
            self.call_with(file, label, Some(suspended))?;
        } else {
            self.conductor.clear_all_event_handlers();
            self.jump(file, label, false)?;
        }
        self.set_glyph(GlyphState::Hidden);
        self.conductor.start();
        Ok(())
    }

    /// 子程序打断当前等待：取走处理器并记下等待图标，`return` 时恢复
    fn suspend_wait(&mut self) -> SuspendedWait {
        SuspendedWait {
            handlers: self.conductor.take_handlers(),
            glyph: self.glyph(),
        }
    }

    fn on_button(&mut self, target: crate::layer::ButtonTarget) -> VnResult<()> {
        if let Some(exp) = &target.exp {
            self.eval(exp)?;
        }
        let file = target.file.as_deref();
        let label = target.label.as_deref();
        if file.is_none() && label.is_none() {
            self.fire(events::BUTTON);
            return Ok(());
        }

        if target.call {
            let suspended = self.suspend_wait();
            self.call_with(file, label, Some(suspended))?;
        } else {
            self.conductor.clear_all_event_handlers();
            self.jump(file, label, true)?;
        }
        self.set_glyph(GlyphState::Hidden);
        self.conductor.start();
        Ok(())
    }
}
