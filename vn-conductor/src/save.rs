//! # Save 模块
//!
//! 存档文档的数据模型。
//!
//! - [`SaveData`]：一个完整的执行快照（槽位存档或内存中的临时存档）
//! - [`SystemData`]：跨槽位的系统文档（系统变量、已读存档点、槽位索引）
//!
//! 快照是封闭的值：只包含可重建的状态，不引用任何活动对象。
//! 等待状态（Conductor 状态 + 事件处理器表）本身就是数据，原样写入。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::SaveError;
use crate::history::History;
use crate::layer::LayerSnapshot;
use crate::resource::ResourceKind;
use crate::runtime::{EngineFlags, HandlerTable};
use crate::script::ScriptState;
use crate::sound::SoundBuffer;
use crate::variables::VarTable;

/// 存档格式版本
///
/// - MAJOR: 不兼容的格式变更
/// - MINOR: 向后兼容的新字段
pub const SAVE_VERSION_MAJOR: u32 = 1;
pub const SAVE_VERSION_MINOR: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersion {
    pub major: u32,
    pub minor: u32,
}

impl SaveVersion {
    pub fn current() -> Self {
        Self {
            major: SAVE_VERSION_MAJOR,
            minor: SAVE_VERSION_MINOR,
        }
    }

    /// major 相同即兼容
    pub fn is_compatible(&self) -> bool {
        self.major == SAVE_VERSION_MAJOR
    }

    fn check(&self) -> Result<(), SaveError> {
        if self.is_compatible() {
            Ok(())
        } else {
            Err(SaveError::IncompatibleVersion {
                save_version: self.to_string(),
                current_version: SaveVersion::current().to_string(),
            })
        }
    }
}

impl std::fmt::Display for SaveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for SaveVersion {
    fn default() -> Self {
        Self::current()
    }
}

/// 存档中的 Conductor 状态
///
/// 睡眠以剩余时间记录，读档时按读档时刻重新计算唤醒时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SavedStatus {
    Running,
    Stopped,
    Sleeping { remaining: u64, owner: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConductorSnapshot {
    pub file_path: String,
    pub script: ScriptState,
    pub status: SavedStatus,
    pub handlers: HandlerTable,
}

/// 执行快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub version: SaveVersion,
    pub tick: u64,
    pub mark_name: String,
    pub comment: String,
    /// 消息层的文字（用于槽位预览）
    pub message_text: String,
    pub conductor: ConductorSnapshot,
    pub flags: EngineFlags,
    pub fore_layers: Vec<LayerSnapshot>,
    pub back_layers: Vec<LayerSnapshot>,
    pub sounds: Vec<SoundBuffer>,
    /// 临时存档不包含游戏变量
    #[serde(default)]
    pub game_variables: Option<VarTable>,
    #[serde(default)]
    pub history: Option<History>,
}

impl SaveData {
    /// 读档前需要加载的资源（去重，保持首次出现顺序）
    pub fn resource_requests(&self) -> Vec<(ResourceKind, String)> {
        let mut seen = BTreeSet::new();
        self.fore_layers
            .iter()
            .chain(&self.back_layers)
            .flat_map(|layer| layer.resource_requests())
            .filter(|request| seen.insert(request.clone()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        serde_json::to_string_pretty(self).map_err(|e| SaveError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        let data: SaveData = serde_json::from_str(json)
            .map_err(|e| SaveError::DeserializationFailed(e.to_string()))?;
        data.version.check()?;
        Ok(data)
    }
}

/// 槽位索引中的一项（供存档界面浏览）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMeta {
    /// 本地时间，`%Y/%m/%d %H:%M:%S`
    pub date: String,
    pub comment: String,
    /// 消息文字摘录
    pub text: String,
    pub screenshot: Option<String>,
}

impl SlotMeta {
    pub fn now(comment: impl Into<String>, text: &str, screenshot: Option<String>) -> Self {
        Self {
            date: chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
            comment: comment.into(),
            text: excerpt(text, 40),
            screenshot,
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat: String = text.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        flat.to_string()
    } else {
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

/// 系统文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemData {
    pub version: SaveVersion,
    pub system_variables: VarTable,
    /// 已读存档点，`file#mark`
    pub read_marks: BTreeSet<String>,
    pub slots: BTreeMap<u32, SlotMeta>,
}

impl Default for SystemData {
    fn default() -> Self {
        Self {
            version: SaveVersion::current(),
            system_variables: VarTable::new(),
            read_marks: BTreeSet::new(),
            slots: BTreeMap::new(),
        }
    }
}

impl SystemData {
    pub fn read_mark_key(file: &str, mark: &str) -> String {
        format!("{}#{}", file, mark)
    }

    /// 某个文件的已读存档点名
    pub fn read_marks_of(&self, file: &str) -> BTreeSet<String> {
        let prefix = format!("{}#", file);
        self.read_marks
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        serde_json::to_string_pretty(self).map_err(|e| SaveError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        let data: SystemData = serde_json::from_str(json)
            .map_err(|e| SaveError::DeserializationFailed(e.to_string()))?;
        data.version.check()?;
        Ok(data)
    }
}
