//! 指令参数校验流水线
//!
//! 每次执行都重新运行，不缓存：实体替换的结果依赖可变的变量状态
//! （例如循环体内的 `&tf.index`）。

use std::collections::BTreeMap;

use super::{Tag, TagAction, TagArgs};
use crate::error::{ExprError, TagError, VnResult};
use crate::expr::{EvalContext, eval_str};
use crate::value::{Value, ValueType};

/// 实体替换
///
/// 以 `sigil` 开头的字符串参数被替换为其余部分的求值结果。
pub fn substitute_entities<C: EvalContext + ?Sized>(
    values: &BTreeMap<String, Value>,
    sigil: char,
    ctx: &mut C,
) -> Result<BTreeMap<String, Value>, ExprError> {
    let mut out = BTreeMap::new();
    for (key, value) in values {
        let value = match value {
            Value::String(s) if s.starts_with(sigil) => eval_str(&s[sigil.len_utf8()..], ctx)?,
            other => other.clone(),
        };
        out.insert(key.clone(), value);
    }
    Ok(out)
}

/// 把值转换为声明的类型
pub fn cast_value(
    tag: &str,
    param: &str,
    value: Value,
    value_type: ValueType,
) -> Result<Value, TagError> {
    if value_type.matches(&value) {
        return Ok(value);
    }

    let cast = match (value_type, &value) {
        (ValueType::Number | ValueType::NumberOrArray, Value::String(s)) => {
            s.trim().parse::<f64>().ok().map(Value::Number)
        }
        (ValueType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (ValueType::String | ValueType::StringOrCallback, Value::Number(_) | Value::Bool(_)) => {
            Some(Value::String(value.to_string()))
        }
        (ValueType::Callback, Value::String(s)) => Some(Value::Callback(s.clone())),
        // 数组、对象、回调原样通过
        (ValueType::Array | ValueType::Object | ValueType::Callback, _) => Some(value.clone()),
        _ => None,
    };

    cast.ok_or_else(|| TagError::CastFailed {
        tag: tag.to_string(),
        param: param.to_string(),
        expected: value_type.name().to_string(),
        raw: value.to_string(),
    })
}

/// 运行完整的校验流水线
///
/// 实体替换 → 类型转换 → 默认值填充 → 必需参数检查。
/// 未声明的参数原样保留。
pub fn validate<C: EvalContext + ?Sized>(
    action: &TagAction,
    tag: &Tag,
    sigil: char,
    ctx: &mut C,
) -> VnResult<TagArgs> {
    let mut values = substitute_entities(&tag.values, sigil, ctx)?;

    for param in &action.params {
        let present = values
            .remove(param.name)
            .filter(|value| !value.is_null());

        let value = match present {
            Some(value) => Some(cast_value(&tag.name, param.name, value, param.value_type)?),
            None => param.default.clone(),
        };

        match value {
            Some(value) => {
                values.insert(param.name.to_string(), value);
            }
            None if param.required => {
                return Err(TagError::MissingParameter {
                    tag: tag.name.clone(),
                    param: param.name.to_string(),
                }
                .into());
            }
            None => {}
        }
    }

    Ok(TagArgs::new(tag.name.clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VnError;
    use crate::runtime::Engine;
    use crate::tag::{TagResult, TagValue};
    use crate::variables::{EvalScope, VarScope, VariableStore};

    fn noop(_: &mut Engine, _: &TagArgs, _: u64) -> VnResult<TagResult> {
        Ok(TagResult::Continue)
    }

    fn wait_action() -> TagAction {
        TagAction::new(
            &["wait"],
            vec![
                TagValue::required("time", ValueType::Number),
                TagValue::with_default("canskip", ValueType::Boolean, true),
            ],
            noop,
        )
    }

    #[test]
    fn test_cast_number() {
        assert_eq!(
            cast_value("wait", "time", Value::from("5"), ValueType::Number).unwrap(),
            Value::Number(5.0)
        );
        let err = cast_value("wait", "time", Value::from("abc"), ValueType::Number).unwrap_err();
        assert_eq!(
            err,
            TagError::CastFailed {
                tag: "wait".to_string(),
                param: "time".to_string(),
                expected: "number".to_string(),
                raw: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_cast_other_types() {
        assert_eq!(
            cast_value("t", "p", Value::from("true"), ValueType::Boolean).unwrap(),
            Value::Bool(true)
        );
        assert!(cast_value("t", "p", Value::from("yes"), ValueType::Boolean).is_err());
        assert_eq!(
            cast_value("t", "p", Value::Number(3.0), ValueType::String).unwrap(),
            Value::from("3")
        );
        assert_eq!(
            cast_value("t", "p", Value::from("tf.a = 1"), ValueType::Callback).unwrap(),
            Value::Callback("tf.a = 1".to_string())
        );
        assert!(cast_value("t", "p", Value::Bool(true), ValueType::Number).is_err());
    }

    #[test]
    fn test_required_and_default() {
        let action = wait_action();
        let mut store = VariableStore::new();
        let mut scope = EvalScope::new(&mut store, None);

        let tag = Tag::new("wait", 1).with("time", "100");
        let args = validate(&action, &tag, '&', &mut scope).unwrap();
        assert_eq!(args.number("time").unwrap(), 100.0);
        assert_eq!(args.opt_bool("canskip"), Some(true));

        let tag = Tag::new("wait", 1);
        let err = validate(&action, &tag, '&', &mut scope).unwrap_err();
        assert!(matches!(
            err,
            VnError::Tag(TagError::MissingParameter { ref tag, ref param })
                if tag == "wait" && param == "time"
        ));
    }

    #[test]
    fn test_entity_substitution_is_not_cached() {
        let action = wait_action();
        let tag = Tag::new("wait", 1).with("time", "&tf.t * 2");
        let mut store = VariableStore::new();

        store.set(VarScope::Temp, "t", 10i64);
        let args = validate(&action, &tag, '&', &mut EvalScope::new(&mut store, None)).unwrap();
        assert_eq!(args.number("time").unwrap(), 20.0);

        store.set(VarScope::Temp, "t", 15i64);
        let args = validate(&action, &tag, '&', &mut EvalScope::new(&mut store, None)).unwrap();
        assert_eq!(args.number("time").unwrap(), 30.0);
    }

    #[test]
    fn test_undeclared_params_pass_through() {
        let action = wait_action();
        let tag = Tag::new("wait", 1).with("time", 1i64).with("extra", "x");
        let mut store = VariableStore::new();
        let args = validate(&action, &tag, '&', &mut EvalScope::new(&mut store, None)).unwrap();
        assert_eq!(args.opt_string("extra"), Some("x"));
    }
}
