//! # Variables 模块
//!
//! 三个生命周期作用域的变量表：
//!
//! ```text
//! tf  临时变量   进程内有效，不进入存档
//! gf  游戏变量   随存档槽位保存
//! sf  系统变量   跨存档共享，保存在系统存档中
//! mp  宏参数     只读，仅在宏体内可见（由 Script 持有）
//! ```
//!
//! 引擎是单线程的，变量表不需要加锁；求值器通过 [`EvalContext`] 显式访问变量表。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ExprError;
use crate::expr::EvalContext;
use crate::value::Value;

/// 变量表
pub type VarTable = BTreeMap<String, Value>;

/// 变量作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarScope {
    /// 临时变量 `tf`
    Temp,
    /// 游戏变量 `gf`
    Game,
    /// 系统变量 `sf`
    System,
}

impl VarScope {
    /// 根据前缀解析作用域
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "tf" => Some(Self::Temp),
            "gf" => Some(Self::Game),
            "sf" => Some(Self::System),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Temp => "tf",
            Self::Game => "gf",
            Self::System => "sf",
        }
    }
}

/// 变量存储
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStore {
    temp: VarTable,
    game: VarTable,
    system: VarTable,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, scope: VarScope) -> &VarTable {
        match scope {
            VarScope::Temp => &self.temp,
            VarScope::Game => &self.game,
            VarScope::System => &self.system,
        }
    }

    pub fn table_mut(&mut self, scope: VarScope) -> &mut VarTable {
        match scope {
            VarScope::Temp => &mut self.temp,
            VarScope::Game => &mut self.game,
            VarScope::System => &mut self.system,
        }
    }

    pub fn get(&self, scope: VarScope, name: &str) -> Option<&Value> {
        self.table(scope).get(name)
    }

    pub fn set(&mut self, scope: VarScope, name: impl Into<String>, value: impl Into<Value>) {
        self.table_mut(scope).insert(name.into(), value.into());
    }

    pub fn remove(&mut self, scope: VarScope, name: &str) -> Option<Value> {
        self.table_mut(scope).remove(name)
    }

    pub fn clear(&mut self, scope: VarScope) {
        self.table_mut(scope).clear();
    }

    /// 整表替换（读档/读取系统存档时使用）
    pub fn replace(&mut self, scope: VarScope, table: VarTable) {
        *self.table_mut(scope) = table;
    }
}

/// 求值作用域
///
/// 把变量表与当前宏参数组合成一个求值上下文。
pub struct EvalScope<'a> {
    pub vars: &'a mut VariableStore,
    pub macro_params: Option<&'a VarTable>,
}

impl<'a> EvalScope<'a> {
    pub fn new(vars: &'a mut VariableStore, macro_params: Option<&'a VarTable>) -> Self {
        Self { vars, macro_params }
    }
}

impl EvalContext for EvalScope<'_> {
    fn get_var(&self, root: &str, name: &str) -> Result<Option<&Value>, ExprError> {
        if root == "mp" {
            return Ok(self.macro_params.and_then(|params| params.get(name)));
        }
        let scope = VarScope::from_prefix(root).ok_or_else(|| ExprError::UnknownScope {
            scope: root.to_string(),
        })?;
        Ok(self.vars.get(scope, name))
    }

    fn set_var(&mut self, root: &str, name: &str, value: Value) -> Result<(), ExprError> {
        if root == "mp" {
            return Err(ExprError::ReadOnly {
                scope: root.to_string(),
            });
        }
        let scope = VarScope::from_prefix(root).ok_or_else(|| ExprError::UnknownScope {
            scope: root.to_string(),
        })?;
        self.vars.set(scope, name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_are_independent() {
        let mut store = VariableStore::new();
        store.set(VarScope::Temp, "x", 1i64);
        store.set(VarScope::Game, "x", 2i64);

        assert_eq!(store.get(VarScope::Temp, "x"), Some(&Value::Number(1.0)));
        assert_eq!(store.get(VarScope::Game, "x"), Some(&Value::Number(2.0)));
        assert_eq!(store.get(VarScope::System, "x"), None);

        store.clear(VarScope::Temp);
        assert_eq!(store.get(VarScope::Temp, "x"), None);
        assert_eq!(store.get(VarScope::Game, "x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_eval_scope_macro_params_read_only() {
        let mut store = VariableStore::new();
        let params = VarTable::from([("val".to_string(), Value::from("hi"))]);
        let mut scope = EvalScope::new(&mut store, Some(&params));

        assert_eq!(scope.get_var("mp", "val").unwrap(), Some(&Value::from("hi")));
        assert!(matches!(
            scope.set_var("mp", "val", Value::Null),
            Err(ExprError::ReadOnly { .. })
        ));
        assert!(matches!(
            scope.get_var("zz", "val"),
            Err(ExprError::UnknownScope { .. })
        ));
    }
}
