//! # Engine 模块
//!
//! 引擎本体：持有 Conductor、当前 Script、指令注册表以及全部协作者
//! （图层、音频缓冲、变量、履历、存储、资源加载器）。
//!
//! ## 执行模型
//!
//! ```text
//! tick(t)
//!   1. 轮询等待中的资源加载（完成 → 应用 → 触发 "load"）
//!   2. 推进图层/过渡/音频 → 触发 move、trans、soundfade … 事件
//!   3. 自动模式：到时间则合成点击
//!   4. conduct(t)：Running 时循环 取指令 → 校验 → 执行，
//!      直到 Break、stop()/sleep() 或单 tick 指令上限
//! ```
//!
//! 任何错误都会停止 Conductor、记录到 `last_error` 并返回给 Host。

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::conductor::{Conductor, HandlerAction, events};
use super::flags::{AutoMode, EngineFlags, SkipMode};
use super::snapshot::PendingRestore;
use crate::config::EngineConfig;
use crate::error::{ResourceError, TagError, VnError, VnResult};
use crate::expr::{eval_condition, eval_str};
use crate::history::History;
use crate::layer::{GlyphState, Layer, PageSide, Pages};
use crate::resource::{LoadStatus, LoadToken, ResourceCache, ResourceKind, ResourceLoader, ScriptSource};
use crate::save::{SaveData, SystemData};
use crate::script::{ParsedScript, Script, SuspendedWait, parse_script};
use crate::sound::SoundBuffer;
use crate::storage::{MemoryStorage, SaveStorage};
use crate::tag::{Tag, TagRegistry, TagResult, substitute_entities, validate};
use crate::value::Value;
use crate::variables::{EvalScope, VarScope, VariableStore};

/// 正在执行的指令位置（用于给异步错误附加位置）
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagOrigin {
    pub file: String,
    pub line: usize,
    pub tag: String,
}

/// 资源加载完成后的去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadTarget {
    LayerImage { page: PageSide, layer: usize },
    LayerVideo { page: PageSide, layer: usize },
    /// 读档所需的资源
    Restore,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingLoad {
    pub token: LoadToken,
    pub path: String,
    pub target: LoadTarget,
    pub origin: Option<TagOrigin>,
}

/// 最近经过的存档点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestSaveMark {
    pub name: String,
    /// 经过之前是否已读
    pub was_read: bool,
}

/// 事件处理器的 owner：资源加载等待
pub(crate) const LOAD_OWNER: &str = "load";

/// 引擎
pub struct Engine {
    pub(crate) config: EngineConfig,
    registry: Arc<TagRegistry>,
    pub(crate) conductor: Conductor,
    pub(crate) script: Script,
    scripts: Box<dyn ScriptSource>,
    script_cache: BTreeMap<String, Arc<ParsedScript>>,
    loader: Box<dyn ResourceLoader>,
    pub(crate) resources: ResourceCache,
    pub(crate) pending_loads: Vec<PendingLoad>,
    pub(crate) pending_restore: Option<PendingRestore>,
    pub(crate) storage: Box<dyn SaveStorage>,
    pub(crate) variables: VariableStore,
    pub(crate) pages: Pages,
    pub(crate) sounds: Vec<SoundBuffer>,
    pub(crate) history: History,
    pub(crate) flags: EngineFlags,
    pub(crate) skip_mode: SkipMode,
    pub(crate) ctrl_pressed: bool,
    pub(crate) auto: AutoMode,
    pub(crate) latest_save_mark: Option<LatestSaveMark>,
    pub(crate) latest_save_data: Option<SaveData>,
    pub(crate) temp_saves: BTreeMap<u32, SaveData>,
    pub(crate) system: SystemData,
    /// 已读记录有变化，尚未写入存储
    pub(crate) system_dirty: bool,
    current_tag: Option<TagOrigin>,
    last_error: Option<VnError>,
    pub(crate) last_tick: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("file", &self.script.file_path())
            .field("cursor", &self.script.cursor())
            .field("status", self.conductor.status())
            .field("skip_mode", &self.skip_mode)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// 创建引擎
    ///
    /// 注册表在这里一次性构建；别名冲突在此时报错。
    pub fn new(config: EngineConfig, scripts: Box<dyn ScriptSource>) -> VnResult<Self> {
        config.validate().map_err(VnError::Config)?;
        let registry = TagRegistry::build(crate::tags::all())?;
        let empty = Arc::new(parse_script("", "")?);

        Ok(Self {
            registry: Arc::new(registry),
            conductor: Conductor::new(),
            script: Script::new(empty),
            scripts,
            script_cache: BTreeMap::new(),
            loader: Box::new(crate::resource::MemoryResourceLoader::new()),
            resources: ResourceCache::new(),
            pending_loads: Vec::new(),
            pending_restore: None,
            storage: Box::new(MemoryStorage::new()),
            variables: VariableStore::new(),
            pages: Pages::new(config.layer_count),
            sounds: (0..config.sound_buffer_count).map(SoundBuffer::new).collect(),
            history: History::new().with_max_events(config.history_max),
            flags: EngineFlags::from_config(&config),
            skip_mode: SkipMode::Invalid,
            ctrl_pressed: false,
            auto: AutoMode::new(config.auto_mode_interval),
            latest_save_mark: None,
            latest_save_data: None,
            temp_saves: BTreeMap::new(),
            system: SystemData::default(),
            system_dirty: false,
            current_tag: None,
            last_error: None,
            last_tick: 0,
            config,
        })
    }

    pub fn with_loader(mut self, loader: Box<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_storage(mut self, storage: Box<dyn SaveStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// 读取系统存档并从 `file` 开头开始执行
    pub fn start(&mut self, file: &str) -> VnResult<()> {
        self.load_system_data()?;
        self.jump(Some(file), None, false)?;
        self.conductor.start();
        Ok(())
    }

    // =========================================================================
    // 访问器
    // =========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn conductor(&self) -> &Conductor {
        &self.conductor
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn flags(&self) -> &EngineFlags {
        &self.flags
    }

    pub fn pages(&self) -> &Pages {
        &self.pages
    }

    pub fn sounds(&self) -> &[SoundBuffer] {
        &self.sounds
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn skip_mode(&self) -> SkipMode {
        self.skip_mode
    }

    pub fn auto_mode(&self) -> &AutoMode {
        &self.auto
    }

    pub fn latest_save_mark(&self) -> Option<&LatestSaveMark> {
        self.latest_save_mark.as_ref()
    }

    pub fn latest_save_data(&self) -> Option<&SaveData> {
        self.latest_save_data.as_ref()
    }

    pub fn system_data(&self) -> &SystemData {
        &self.system
    }

    pub fn last_error(&self) -> Option<&VnError> {
        self.last_error.as_ref()
    }

    /// 是否有等待中的加载或读档
    pub fn is_loading(&self) -> bool {
        !self.pending_loads.is_empty() || self.pending_restore.is_some()
    }

    pub fn layer(&self, page: PageSide, index: usize) -> Result<&Layer, ResourceError> {
        self.pages
            .page(page)
            .layers
            .get(index)
            .ok_or(ResourceError::LayerNotFound { layer: index })
    }

    pub fn layer_mut(&mut self, page: PageSide, index: usize) -> Result<&mut Layer, ResourceError> {
        self.pages
            .page_mut(page)
            .layers
            .get_mut(index)
            .ok_or(ResourceError::LayerNotFound { layer: index })
    }

    /// 表页的消息层
    pub fn message_layer_mut(&mut self) -> Result<&mut Layer, ResourceError> {
        let index = self.flags.message_layer;
        self.layer_mut(PageSide::Fore, index)
    }

    /// 消息层当前的文字
    pub fn message_text(&self) -> String {
        self.layer(PageSide::Fore, self.flags.message_layer)
            .map(|layer| layer.text.text.clone())
            .unwrap_or_default()
    }

    pub fn sound_mut(&mut self, index: usize) -> Result<&mut SoundBuffer, ResourceError> {
        self.sounds
            .get_mut(index)
            .ok_or(ResourceError::SoundBufferNotFound { index })
    }

    // =========================================================================
    // 表达式
    // =========================================================================

    /// 在当前变量与宏参数下求值
    pub fn eval(&mut self, source: &str) -> VnResult<Value> {
        let mut scope = EvalScope::new(&mut self.variables, self.script.macro_params());
        Ok(eval_str(source, &mut scope)?)
    }

    pub fn eval_condition(&mut self, source: &str) -> VnResult<bool> {
        let mut scope = EvalScope::new(&mut self.variables, self.script.macro_params());
        Ok(eval_condition(source, &mut scope)?)
    }

    // =========================================================================
    // 主循环
    // =========================================================================

    /// 推进一帧
    pub fn tick(&mut self, tick: u64) -> VnResult<()> {
        self.last_tick = tick;
        match self.step(tick) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn step(&mut self, tick: u64) -> VnResult<()> {
        self.poll_loads(tick)?;
        if self.pending_restore.is_some() {
            return Ok(());
        }
        self.update_collaborators(tick);
        self.update_auto(tick);
        self.conduct(tick)
    }

    /// 引擎级错误处理：停止执行并记录
    pub(crate) fn fail(&mut self, err: VnError) -> VnError {
        self.conductor.stop();
        error!(error = %err, "执行出错，已停止");
        self.last_error = Some(err.clone());
        err
    }

    fn update_collaborators(&mut self, tick: u64) {
        let mut fired = Vec::new();
        for layer in self
            .pages
            .fore
            .layers
            .iter_mut()
            .chain(self.pages.back.layers.iter_mut())
        {
            fired.extend(layer.update(tick));
        }
        if self.pages.update_transition(tick) {
            fired.push(events::TRANS);
        }
        for sound in &mut self.sounds {
            fired.extend(sound.update(tick));
        }
        for event in fired {
            self.fire(event);
        }
    }

    /// 执行指令直到挂起
    pub fn conduct(&mut self, tick: u64) -> VnResult<()> {
        self.conductor.wake_if_due(tick);

        let mut executed = 0usize;
        while self.conductor.is_running() && self.pending_restore.is_none() {
            let file = self.script.file_path().to_string();
            let Some(tag) = self.script.next_tag() else {
                debug!(file = %file, "到达指令序列末尾");
                self.conductor.stop();
                break;
            };

            executed += 1;
            if executed > self.config.max_tags_per_tick {
                let err: VnError = TagError::RunawayChain {
                    limit: self.config.max_tags_per_tick,
                }
                .into();
                return Err(err.in_script(&file, tag.line, &tag.name));
            }

            self.current_tag = Some(TagOrigin {
                file: file.clone(),
                line: tag.line,
                tag: tag.name.clone(),
            });
            let result = self
                .execute_tag(&tag, tick)
                .map_err(|e| e.in_script(&file, tag.line, &tag.name))?;
            if result == TagResult::Break {
                break;
            }
        }
        self.sync_system_data()
    }

    /// 查找并执行一条指令：注册的指令 → 宏 → 未知
    fn execute_tag(&mut self, tag: &Tag, tick: u64) -> VnResult<TagResult> {
        let registry = Arc::clone(&self.registry);
        let sigil = self.config.entity_sigil;

        if let Some(action) = registry.lookup(&tag.name) {
            let args = {
                let mut scope = EvalScope::new(&mut self.variables, self.script.macro_params());
                validate(action, tag, sigil, &mut scope)?
            };
            debug!(tag = %tag.name, line = tag.line, "执行指令");
            return (action.effect)(self, &args, tick);
        }

        if self.script.has_macro(&tag.name) {
            let params = {
                let mut scope = EvalScope::new(&mut self.variables, self.script.macro_params());
                substitute_entities(&tag.values, sigil, &mut scope)?
            };
            debug!(name = %tag.name, line = tag.line, "调用宏");
            self.script.call_macro(&tag.name, params)?;
            return Ok(TagResult::Continue);
        }

        if self.config.ignore_unknown_tags {
            warn!(tag = %tag.name, line = tag.line, "忽略未知指令");
            return Ok(TagResult::Continue);
        }
        Err(TagError::UnknownTag {
            name: tag.name.clone(),
        }
        .into())
    }

    /// 触发事件，执行被触发的处理器动作
    pub fn fire(&mut self, event: &str) {
        for action in self.conductor.trigger(event) {
            debug!(event, ?action, "事件触发");
            match action {
                HandlerAction::Start => {}
                HandlerAction::StartHidingGlyph => self.set_glyph(GlyphState::Hidden),
                HandlerAction::PageBreak => {
                    if let Ok(layer) = self.message_layer_mut() {
                        layer.text.clear();
                    }
                    if self.flags.history_output {
                        self.history.page_break();
                    }
                }
            }
            self.conductor.start();
        }
    }

    /// 消息层当前的等待图标
    pub fn glyph(&self) -> GlyphState {
        self.layer(PageSide::Fore, self.flags.message_layer)
            .map(|layer| layer.text.glyph)
            .unwrap_or_default()
    }

    pub(crate) fn set_glyph(&mut self, glyph: GlyphState) {
        if let Ok(layer) = self.message_layer_mut() {
            layer.text.glyph = glyph;
        }
    }

    /// 停止执行，等待某个事件
    pub(crate) fn wait_for(&mut self, event: &str, owner: &str) -> TagResult {
        self.conductor.stop();
        self.conductor.add_event_handler(event, owner, HandlerAction::Start);
        TagResult::Break
    }

    // =========================================================================
    // 跳转
    // =========================================================================

    fn parsed_script(&mut self, file: &str) -> VnResult<Arc<ParsedScript>> {
        if let Some(parsed) = self.script_cache.get(file) {
            return Ok(Arc::clone(parsed));
        }
        let text = self.scripts.load(file)?;
        let parsed = Arc::new(parse_script(file, &text)?);
        debug!(file, tags = parsed.tags.len(), "脚本已加载");
        self.script_cache.insert(file.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }

    /// 切换到另一个文件
    ///
    /// `reset` 为 true 时清空游标与栈（jump）；否则保留（跨文件 call/return）。
    pub(crate) fn switch_file(&mut self, file: &str, reset: bool) -> VnResult<()> {
        let parsed = self.parsed_script(file)?;
        let read_marks = self.system.read_marks_of(file);
        self.script.switch_file(parsed, read_marks, reset);
        Ok(())
    }

    /// 跳转
    ///
    /// 指定 `file` 时切换文件并重置执行状态；`label` 缺省时从文件开头执行。
    pub fn jump(&mut self, file: Option<&str>, label: Option<&str>, count_page: bool) -> VnResult<()> {
        if let Some(file) = file {
            self.switch_file(file, true)?;
        }
        if let Some(label) = label {
            self.script.go_to_label(label)?;
        }
        if count_page && self.flags.history_output {
            self.history.page_break();
        }
        debug!(file = self.script.file_path(), label, "跳转");
        Ok(())
    }

    /// 调用子程序
    pub fn call(&mut self, file: Option<&str>, label: Option<&str>) -> VnResult<()> {
        self.call_with(file, label, None)
    }

    pub(crate) fn call_with(
        &mut self,
        file: Option<&str>,
        label: Option<&str>,
        suspended: Option<SuspendedWait>,
    ) -> VnResult<()> {
        self.script.push_subroutine(suspended);
        if let Some(file) = file
            && file != self.script.file_path()
        {
            self.switch_file(file, false)?;
            self.script.go_to_start();
        }
        match label {
            Some(label) => self.script.go_to_label(label)?,
            None => self.script.go_to_start(),
        }
        debug!(file = self.script.file_path(), label, depth = self.script.call_depth(), "调用子程序");
        Ok(())
    }

    /// 从子程序或宏返回
    ///
    /// 调用时挂起的等待（右键、按钮打断了点击等待）在这里处理：
    /// `force_start` 时丢弃它并隐藏等待图标后继续执行；否则恢复等待。
    pub fn return_from(&mut self, force_start: bool) -> VnResult<TagResult> {
        let frame = self.script.return_from()?;
        if frame.return_file != self.script.file_path() {
            self.switch_file(&frame.return_file, false)?;
        }

        match frame.suspended {
            Some(_) if force_start => {
                self.set_glyph(GlyphState::Hidden);
                Ok(TagResult::Continue)
            }
            Some(wait) if !wait.handlers.is_empty() => {
                self.conductor.set_handlers(wait.handlers);
                self.set_glyph(wait.glyph);
                self.conductor.stop();
                Ok(TagResult::Break)
            }
            _ => {
                if force_start {
                    self.set_glyph(GlyphState::Hidden);
                }
                Ok(TagResult::Continue)
            }
        }
    }

    // =========================================================================
    // 资源加载
    // =========================================================================

    /// 请求加载图层图片；完成前 Conductor 等待 `load` 事件
    pub fn request_layer_image(&mut self, page: PageSide, layer: usize, file: &str) -> VnResult<TagResult> {
        self.layer(page, layer)?;
        if let Some(info) = self.resources.get(file).cloned() {
            self.layer_mut(page, layer)?.set_image(file, &info);
            return Ok(TagResult::Continue);
        }
        self.request(ResourceKind::Image, file, LoadTarget::LayerImage { page, layer });
        Ok(self.wait_for(events::LOAD, LOAD_OWNER))
    }

    pub fn request_layer_video(&mut self, page: PageSide, layer: usize, file: &str) -> VnResult<TagResult> {
        self.layer(page, layer)?;
        if let Some(info) = self.resources.get(file).cloned() {
            self.layer_mut(page, layer)?.set_video(file, &info);
            return Ok(TagResult::Continue);
        }
        self.request(ResourceKind::Video, file, LoadTarget::LayerVideo { page, layer });
        Ok(self.wait_for(events::LOAD, LOAD_OWNER))
    }

    pub(crate) fn request(&mut self, kind: ResourceKind, path: &str, target: LoadTarget) {
        let token = self.loader.request(kind, path);
        debug!(?kind, path, "请求加载资源");
        self.pending_loads.push(PendingLoad {
            token,
            path: path.to_string(),
            target,
            origin: self.current_tag.clone(),
        });
    }

    fn poll_loads(&mut self, tick: u64) -> VnResult<()> {
        if self.pending_loads.is_empty() && self.pending_restore.is_none() {
            return Ok(());
        }

        let mut still_pending = Vec::new();
        let mut completed = false;
        for load in std::mem::take(&mut self.pending_loads) {
            match self.loader.poll(load.token) {
                LoadStatus::Pending => still_pending.push(load),
                LoadStatus::Ready(info) => {
                    self.resources.insert(load.path.clone(), info.clone());
                    match load.target {
                        LoadTarget::LayerImage { page, layer } => {
                            self.layer_mut(page, layer)?.set_image(&load.path, &info);
                        }
                        LoadTarget::LayerVideo { page, layer } => {
                            self.layer_mut(page, layer)?.set_video(&load.path, &info);
                        }
                        LoadTarget::Restore => {}
                    }
                    completed = true;
                }
                LoadStatus::Failed(message) => {
                    self.pending_loads = still_pending;
                    return Err(Self::load_error(load, message));
                }
            }
        }
        self.pending_loads = still_pending;

        if self.pending_loads.is_empty() {
            if self.pending_restore.is_some() {
                self.finish_restore(tick)?;
            } else if completed {
                self.fire(events::LOAD);
            }
        }
        Ok(())
    }

    fn load_error(load: PendingLoad, message: String) -> VnError {
        let err: VnError = match load.target {
            LoadTarget::LayerVideo { .. } => ResourceError::Video {
                path: load.path,
                message,
            },
            _ => ResourceError::Image {
                path: load.path,
                message,
            },
        }
        .into();
        match load.origin {
            Some(origin) => err.in_script(&origin.file, origin.line, &origin.tag),
            None => err,
        }
    }

    // =========================================================================
    // 变量与系统存档
    // =========================================================================

    /// 从存储读取系统文档
    pub fn load_system_data(&mut self) -> VnResult<()> {
        if let Some(json) = self.storage.read(crate::storage::SYSTEM_KEY)? {
            self.system = SystemData::from_json(&json)?;
            self.variables
                .replace(VarScope::System, self.system.system_variables.clone());
        }
        Ok(())
    }

    /// 把系统变量与已读记录写入存储
    pub fn save_system_data(&mut self) -> VnResult<()> {
        self.system.system_variables = self.variables.table(VarScope::System).clone();
        let json = self.system.to_json()?;
        self.storage.write(crate::storage::SYSTEM_KEY, &json)?;
        self.system_dirty = false;
        Ok(())
    }

    /// 新的已读存档点或 `sf` 变量有变化时写入系统文档
    fn sync_system_data(&mut self) -> VnResult<()> {
        if self.system_dirty || self.variables.table(VarScope::System) != &self.system.system_variables {
            debug!(read_marks = self.system.read_marks.len(), "系统文档已更新");
            self.save_system_data()?;
        }
        Ok(())
    }
}
