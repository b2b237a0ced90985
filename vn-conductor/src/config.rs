//! # Config 模块
//!
//! 引擎配置。所有字段都有默认值，配置文件中缺失的字段使用默认值填充。

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 每个页面的图层数
    #[serde(default = "default_layer_count")]
    pub layer_count: usize,

    /// 音频缓冲区数
    #[serde(default = "default_sound_buffer_count")]
    pub sound_buffer_count: usize,

    /// 画面宽度
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,

    /// 画面高度
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,

    /// 文字显示间隔（tick）
    #[serde(default = "default_char_delay")]
    pub char_delay: u64,

    /// 自动模式的点击间隔（tick）
    #[serde(default = "default_auto_mode_interval")]
    pub auto_mode_interval: u64,

    /// 指令发起的跳过是否允许跳过未读内容
    #[serde(default)]
    pub skip_unread_by_tag: bool,

    /// Ctrl 跳过是否允许跳过未读内容
    #[serde(default)]
    pub skip_unread_by_ctrl: bool,

    /// 是否忽略未知指令（否则视为致命错误）
    #[serde(default)]
    pub ignore_unknown_tags: bool,

    /// 单个 tick 内最多连续执行的指令数
    #[serde(default = "default_max_tags_per_tick")]
    pub max_tags_per_tick: usize,

    /// 默认消息图层
    #[serde(default = "default_message_layer")]
    pub message_layer: usize,

    /// 历史记录最大条数
    #[serde(default = "default_history_max")]
    pub history_max: usize,

    /// 实体（表达式参数）前缀字符
    #[serde(default = "default_entity_sigil")]
    pub entity_sigil: char,
}

fn default_layer_count() -> usize {
    40
}

fn default_sound_buffer_count() -> usize {
    8
}

fn default_screen_width() -> u32 {
    1280
}

fn default_screen_height() -> u32 {
    720
}

fn default_char_delay() -> u64 {
    30
}

fn default_auto_mode_interval() -> u64 {
    1000
}

fn default_max_tags_per_tick() -> usize {
    10_000
}

fn default_message_layer() -> usize {
    20
}

fn default_history_max() -> usize {
    1000
}

fn default_entity_sigil() -> char {
    '&'
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layer_count: default_layer_count(),
            sound_buffer_count: default_sound_buffer_count(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            char_delay: default_char_delay(),
            auto_mode_interval: default_auto_mode_interval(),
            skip_unread_by_tag: false,
            skip_unread_by_ctrl: false,
            ignore_unknown_tags: false,
            max_tags_per_tick: default_max_tags_per_tick(),
            message_layer: default_message_layer(),
            history_max: default_history_max(),
            entity_sigil: default_entity_sigil(),
        }
    }
}

impl EngineConfig {
    /// 从 JSON 文本解析配置
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 从文件加载配置
    ///
    /// 文件不存在或解析失败时使用默认配置。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_json(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "无法读取配置文件，使用默认配置");
                Self::default()
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.layer_count == 0 {
            return Err("layer_count 必须大于 0".to_string());
        }
        if self.message_layer >= self.layer_count {
            return Err(format!(
                "message_layer ({}) 超出图层数 ({})",
                self.message_layer, self.layer_count
            ));
        }
        if self.max_tags_per_tick == 0 {
            return Err("max_tags_per_tick 必须大于 0".to_string());
        }
        if self.entity_sigil.is_whitespace() {
            return Err("entity_sigil 不能是空白字符".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "char_delay": 0, "skip_unread_by_tag": true }"#)
            .unwrap();
        assert_eq!(config.char_delay, 0);
        assert!(config.skip_unread_by_tag);
        assert_eq!(config.layer_count, 40);
        assert_eq!(config.entity_sigil, '&');
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::default().validate().is_ok());

        let config = EngineConfig {
            message_layer: 40,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = EngineConfig::load("/nonexistent/engine-config.json");
        assert_eq!(config, EngineConfig::default());
    }
}
