//! 快照的生成与恢复
//!
//! 恢复分两步：先请求快照引用的全部图片/视频，全部加载完成后
//! （[`Engine::finish_restore`]）才应用快照。加载期间引擎不执行指令。

use tracing::{debug, info};

use super::conductor::{ConductorStatus, HandlerAction, events};
use super::engine::{Engine, LOAD_OWNER, LoadTarget};
use super::flags::SkipMode;
use crate::error::{SaveError, VnResult};
use crate::layer::{LayerSnapshot, PageSide};
use crate::save::{ConductorSnapshot, SaveData, SaveVersion, SavedStatus, SlotMeta};
use crate::storage::slot_key;
use crate::variables::VarScope;

/// 恢复范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// 槽位读档：执行位置、变量、表现全部恢复
    Full,
    /// 临时读档：只恢复表现（图层，可选音频）
    Presentation { sound: bool, to_back: bool },
}

#[derive(Debug, Clone)]
pub(crate) struct PendingRestore {
    pub data: SaveData,
    pub mode: RestoreMode,
}

impl Engine {
    /// 生成快照
    ///
    /// `include_game_data` 为 false 时（临时存档）不包含游戏变量与履历。
    pub fn generate_save_data(
        &self,
        mark_name: &str,
        comment: &str,
        tick: u64,
        include_game_data: bool,
    ) -> SaveData {
        let status = match self.conductor.status() {
            ConductorStatus::Running => SavedStatus::Running,
            ConductorStatus::Stopped => SavedStatus::Stopped,
            ConductorStatus::Sleeping { wake_tick, owner } => SavedStatus::Sleeping {
                remaining: wake_tick.saturating_sub(tick),
                owner: owner.clone(),
            },
        };

        SaveData {
            version: SaveVersion::current(),
            tick,
            mark_name: mark_name.to_string(),
            comment: comment.to_string(),
            message_text: self.message_text(),
            conductor: ConductorSnapshot {
                file_path: self.script.file_path().to_string(),
                script: self.script.state().clone(),
                status,
                handlers: self.conductor.handlers().clone(),
            },
            flags: self.flags.clone(),
            fore_layers: self.pages.fore.layers.iter().map(|l| l.store(tick)).collect(),
            back_layers: self.pages.back.layers.iter().map(|l| l.store(tick)).collect(),
            sounds: self.sounds.iter().map(|s| s.store(tick)).collect(),
            game_variables: include_game_data.then(|| self.variables.table(VarScope::Game).clone()),
            history: include_game_data.then(|| self.history.clone()),
        }
    }

    /// 经过存档点时记录快照，供之后的 `save` 使用
    ///
    /// `save` 写入的是存档点处的状态，而不是调用 `save` 时的状态，
    /// 因此快照只能在这里生成。
    pub(crate) fn record_save_point(&mut self, mark_name: &str, comment: &str, tick: u64) {
        self.latest_save_data = Some(self.generate_save_data(mark_name, comment, tick, true));
    }

    // =========================================================================
    // 槽位存档
    // =========================================================================

    /// 把最近存档点的快照写入槽位
    pub fn save(&mut self, slot: u32, screenshot: Option<String>) -> VnResult<()> {
        let data = self
            .latest_save_data
            .clone()
            .ok_or_else(|| SaveError::NotFound("尚未经过任何存档点".to_string()))?;
        let json = data.to_json()?;
        self.storage.write(&slot_key(slot), &json)?;
        self.system
            .slots
            .insert(slot, SlotMeta::now(data.comment.clone(), &data.message_text, screenshot));
        self.save_system_data()?;
        info!(slot, mark = %data.mark_name, "已存档");
        Ok(())
    }

    /// 从槽位读档
    pub fn load(&mut self, slot: u32, tick: u64) -> VnResult<()> {
        let key = slot_key(slot);
        let json = self
            .storage
            .read(&key)?
            .ok_or_else(|| SaveError::NotFound(key.clone()))?;
        let data = SaveData::from_json(&json)?;
        info!(slot, mark = %data.mark_name, "读档");
        self.begin_restore(data, RestoreMode::Full, tick)
    }

    pub fn copy_save(&mut self, from: u32, to: u32) -> VnResult<()> {
        let json = self
            .storage
            .read(&slot_key(from))?
            .ok_or_else(|| SaveError::NotFound(slot_key(from)))?;
        self.storage.write(&slot_key(to), &json)?;
        if let Some(meta) = self.system.slots.get(&from).cloned() {
            self.system.slots.insert(to, meta);
        }
        self.save_system_data()
    }

    pub fn delete_save(&mut self, slot: u32) -> VnResult<()> {
        self.storage.remove(&slot_key(slot))?;
        self.system.slots.remove(&slot);
        self.save_system_data()
    }

    // =========================================================================
    // 临时存档
    // =========================================================================

    /// 临时存档（只在内存中，不含游戏变量）
    pub fn temp_save(&mut self, slot: u32, tick: u64) {
        let data = self.generate_save_data("", "", tick, false);
        self.temp_saves.insert(slot, data);
        debug!(slot, "临时存档");
    }

    /// 临时读档：恢复表现，完成后继续执行
    pub fn temp_load(&mut self, slot: u32, sound: bool, to_back: bool, tick: u64) -> VnResult<()> {
        let data = self
            .temp_saves
            .get(&slot)
            .cloned()
            .ok_or_else(|| SaveError::NotFound(format!("临时存档 {}", slot)))?;
        self.conductor.stop();
        self.conductor
            .add_event_handler(events::LOAD, LOAD_OWNER, HandlerAction::Start);
        self.begin_restore(data, RestoreMode::Presentation { sound, to_back }, tick)
    }

    // =========================================================================
    // 恢复
    // =========================================================================

    pub(crate) fn begin_restore(&mut self, data: SaveData, mode: RestoreMode, tick: u64) -> VnResult<()> {
        self.pending_loads.clear();
        if mode == RestoreMode::Full {
            self.conductor.stop();
            self.conductor.clear_all_event_handlers();
        }

        for (kind, path) in data.resource_requests() {
            if !self.resources.contains_key(&path) {
                self.request(kind, &path, LoadTarget::Restore);
            }
        }
        self.pending_restore = Some(PendingRestore { data, mode });

        if self.pending_loads.is_empty() {
            self.finish_restore(tick)?;
        }
        Ok(())
    }

    /// 资源全部就绪后应用快照
    pub(crate) fn finish_restore(&mut self, tick: u64) -> VnResult<()> {
        let Some(PendingRestore { data, mode }) = self.pending_restore.take() else {
            return Ok(());
        };

        match mode {
            RestoreMode::Full => {
                self.restore_page(&data.fore_layers, PageSide::Fore)?;
                self.restore_page(&data.back_layers, PageSide::Back)?;
                self.pages.transition = None;
                self.restore_sounds(&data, tick);
                self.flags = data.flags.clone();
                if let Some(vars) = &data.game_variables {
                    self.variables.replace(VarScope::Game, vars.clone());
                }
                if let Some(history) = &data.history {
                    self.history = history.clone();
                }

                self.switch_file(&data.conductor.file_path, true)?;
                self.script.restore_state(data.conductor.script.clone());
                let status = match &data.conductor.status {
                    SavedStatus::Running => ConductorStatus::Running,
                    SavedStatus::Stopped => ConductorStatus::Stopped,
                    SavedStatus::Sleeping { remaining, owner } => ConductorStatus::Sleeping {
                        wake_tick: tick.saturating_add(*remaining),
                        owner: owner.clone(),
                    },
                };
                self.conductor.restore(status, data.conductor.handlers.clone());
                self.skip_mode = SkipMode::Invalid;
                info!(file = %data.conductor.file_path, mark = %data.mark_name, "读档完成");
                self.latest_save_data = Some(data);
            }
            RestoreMode::Presentation { sound, to_back } => {
                let side = if to_back { PageSide::Back } else { PageSide::Fore };
                self.restore_page(&data.fore_layers, side)?;
                if sound {
                    self.restore_sounds(&data, tick);
                }
                debug!(to_back, sound, "临时读档完成");
                self.fire(events::LOAD);
            }
        }
        Ok(())
    }

    fn restore_page(&mut self, snapshots: &[LayerSnapshot], side: PageSide) -> VnResult<()> {
        let cache = &self.resources;
        for (layer, snapshot) in self.pages.page_mut(side).layers.iter_mut().zip(snapshots) {
            layer.restore(snapshot, cache, true)?;
        }
        Ok(())
    }

    fn restore_sounds(&mut self, data: &SaveData, tick: u64) {
        for (buffer, snapshot) in self.sounds.iter_mut().zip(&data.sounds) {
            buffer.restore(snapshot, tick);
        }
    }
}
