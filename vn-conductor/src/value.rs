//! # Value 模块
//!
//! 脚本值模型：指令参数、变量表、表达式求值共用同一套值类型。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 脚本值
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    /// 空值（未定义的变量也求值为 Null）
    #[default]
    Null,
    /// 布尔值
    Bool(bool),
    /// 数值（整数与浮点统一用 f64 表示）
    Number(f64),
    /// 字符串
    String(String),
    /// 数组
    Array(Vec<Value>),
    /// 对象
    Object(BTreeMap<String, Value>),
    /// 回调
    ///
    /// 保存的是一段表达式源码，在触发时求值（例如按钮的 `exp`）。
    Callback(String),
}

impl Value {
    /// 类型名（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Callback(_) => "callback",
        }
    }

    /// 动态真值判断
    ///
    /// `null`、`false`、`0`、`NaN`、空字符串为假，其余为真。
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Callback(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// 取对象字段（非对象返回 None）
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// 数值转换（用于算术运算）
    ///
    /// 字符串按数字解析，布尔值转为 0/1，null 为 0。
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

/// 格式化数值：整数不带小数点
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Object(_) => write!(f, "[object]"),
            Value::Callback(source) => write!(f, "{}", source),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// 指令参数的声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Boolean,
    String,
    Array,
    Object,
    Callback,
    /// 字符串或回调
    StringOrCallback,
    /// 数值或数组
    NumberOrArray,
}

impl ValueType {
    /// 值的运行时类型是否已符合声明
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::Number, Value::Number(_))
                | (ValueType::Boolean, Value::Bool(_))
                | (ValueType::String, Value::String(_))
                | (ValueType::Array, Value::Array(_))
                | (ValueType::Object, Value::Object(_))
                | (ValueType::Callback, Value::Callback(_))
                | (ValueType::StringOrCallback, Value::String(_))
                | (ValueType::StringOrCallback, Value::Callback(_))
                | (ValueType::NumberOrArray, Value::Number(_))
                | (ValueType::NumberOrArray, Value::Array(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Callback => "callback",
            ValueType::StringOrCallback => "string|callback",
            ValueType::NumberOrArray => "number|array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::Number(2.0).is_truthy());
        assert!(Value::from("a").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_display_number() {
        assert_eq!(Value::Number(5.0).to_string(), "5");
        assert_eq!(Value::Number(-3.0).to_string(), "-3");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(
            Value::Array(vec![Value::Number(1.0), Value::from("x")]).to_string(),
            "1,x"
        );
    }

    #[test]
    fn test_type_matching() {
        assert!(ValueType::NumberOrArray.matches(&Value::Number(1.0)));
        assert!(ValueType::NumberOrArray.matches(&Value::Array(vec![])));
        assert!(!ValueType::NumberOrArray.matches(&Value::from("1")));
        assert!(ValueType::StringOrCallback.matches(&Value::Callback("x".into())));
        assert!(!ValueType::Boolean.matches(&Value::from("true")));
    }

    #[test]
    fn test_serialization() {
        let value = Value::Object(BTreeMap::from([
            ("a".to_string(), Value::Number(1.0)),
            ("b".to_string(), Value::Callback("tf.x = 1".to_string())),
        ]));
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
