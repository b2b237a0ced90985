//! # Tag 模块
//!
//! 指令模型：
//!
//! - [`Tag`]：解析后的一条指令（名称 + 参数 + 源码行号）
//! - [`TagValue`]：指令声明的一个参数
//! - [`TagAction`]：注册到一个或多个名称上的指令行为
//!
//! 参数在每次执行前经过 [`validate`] 流水线（实体替换 → 类型转换 → 默认值 → 必需检查），
//! 结果以 [`TagArgs`] 的形式交给指令的 effect 函数。

mod registry;
mod validate;

pub use registry::TagRegistry;
pub use validate::{cast_value, substitute_entities, validate};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{TagError, VnResult};
use crate::runtime::Engine;
use crate::value::{Value, ValueType};

/// 一条解析后的指令
///
/// 相等比较只看名称和参数，行号仅用于报错。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub values: BTreeMap<String, Value>,
    pub line: usize,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.values == other.values
    }
}

impl Tag {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            line,
        }
    }

    /// 追加参数（构建器风格）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// 取字符串参数
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// 指令参数声明
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    pub name: &'static str,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<Value>,
}

impl TagValue {
    /// 必需参数
    pub fn required(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            required: true,
            default: None,
        }
    }

    /// 可选参数（无默认值）
    pub fn optional(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            required: false,
            default: None,
        }
    }

    /// 带默认值的参数
    pub fn with_default(name: &'static str, value_type: ValueType, default: impl Into<Value>) -> Self {
        Self {
            name,
            value_type,
            required: false,
            default: Some(default.into()),
        }
    }
}

/// 指令执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagResult {
    /// 同一 tick 内继续执行下一条指令
    Continue,
    /// 结束本次 conduct
    Break,
}

/// 指令行为
pub type TagEffect = fn(&mut Engine, &TagArgs, u64) -> VnResult<TagResult>;

/// 注册的指令
pub struct TagAction {
    pub aliases: Vec<&'static str>,
    pub params: Vec<TagValue>,
    pub effect: TagEffect,
}

impl std::fmt::Debug for TagAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagAction")
            .field("aliases", &self.aliases)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl TagAction {
    pub fn new(aliases: &[&'static str], params: Vec<TagValue>, effect: TagEffect) -> Self {
        Self {
            aliases: aliases.to_vec(),
            params,
            effect,
        }
    }

    /// 主名称（第一个别名）
    pub fn name(&self) -> &'static str {
        self.aliases.first().copied().unwrap_or_default()
    }
}

/// 校验后的指令参数
#[derive(Debug, Clone, PartialEq)]
pub struct TagArgs {
    tag: String,
    values: BTreeMap<String, Value>,
}

impl TagArgs {
    pub fn new(tag: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            tag: tag.into(),
            values,
        }
    }

    /// 指令名（错误信息用）
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn missing(&self, name: &str) -> TagError {
        TagError::MissingParameter {
            tag: self.tag.clone(),
            param: name.to_string(),
        }
    }

    fn invalid(&self, name: &str, message: impl Into<String>) -> TagError {
        TagError::InvalidParameter {
            tag: self.tag.clone(),
            param: name.to_string(),
            message: message.into(),
        }
    }

    pub fn opt_number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn number(&self, name: &str) -> Result<f64, TagError> {
        self.opt_number(name).ok_or_else(|| self.missing(name))
    }

    /// 非负整数参数
    pub fn opt_count(&self, name: &str) -> Result<Option<u64>, TagError> {
        match self.opt_number(name) {
            None => Ok(None),
            Some(n) if n >= 0.0 && n.is_finite() => Ok(Some(n as u64)),
            Some(n) => Err(self.invalid(name, format!("期望非负数，实际为 {}", n))),
        }
    }

    pub fn count(&self, name: &str) -> Result<u64, TagError> {
        self.opt_count(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn opt_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn string(&self, name: &str) -> Result<&str, TagError> {
        self.opt_string(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// 布尔参数（缺省为 false）
    pub fn flag(&self, name: &str) -> bool {
        self.opt_bool(name).unwrap_or(false)
    }

    pub fn opt_array(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_array)
    }

    /// 回调参数：返回表达式源码
    pub fn opt_callback(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Callback(source)) | Some(Value::String(source)) => Some(source),
            _ => None,
        }
    }

    /// 从参数中取出选择器（字符串或数字），例如图层名
    pub fn selector(&self, name: &str) -> Option<String> {
        let value = self.get(name)?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(_) => Some(value.to_string()),
            _ => None,
        }
    }

    /// 构造参数不合法错误
    pub fn error(&self, name: &str, message: impl Into<String>) -> TagError {
        self.invalid(name, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_equality_ignores_line() {
        let a = Tag::new("wait", 3).with("time", 100i64);
        let b = Tag::new("wait", 99).with("time", 100i64);
        let c = Tag::new("wait", 3).with("time", 200i64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_args_accessors() {
        let args = TagArgs::new(
            "move",
            BTreeMap::from([
                ("time".to_string(), Value::Number(500.0)),
                ("loop".to_string(), Value::Bool(true)),
                ("lay".to_string(), Value::Number(3.0)),
                ("neg".to_string(), Value::Number(-1.0)),
                ("nothing".to_string(), Value::Null),
            ]),
        );
        assert_eq!(args.number("time").unwrap(), 500.0);
        assert!(args.flag("loop"));
        assert!(!args.flag("missing"));
        assert_eq!(args.selector("lay").as_deref(), Some("3"));
        assert!(!args.has("nothing"));
        assert!(matches!(
            args.string("file"),
            Err(TagError::MissingParameter { .. })
        ));
        assert!(matches!(
            args.count("neg"),
            Err(TagError::InvalidParameter { .. })
        ));
    }
}
