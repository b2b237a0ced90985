//! 指令注册表
//!
//! 每个引擎实例构建一次。多个别名可以指向同一个 [`TagAction`]（纯重命名），
//! 但两个不同的 action 声明同一个别名会在构建时报错。

use std::collections::BTreeMap;
use std::sync::Arc;

use super::TagAction;
use crate::error::TagError;

/// 指令注册表
#[derive(Debug, Default)]
pub struct TagRegistry {
    actions: Vec<Arc<TagAction>>,
    by_alias: BTreeMap<String, Arc<TagAction>>,
}

impl TagRegistry {
    /// 从若干 action 构建注册表
    pub fn build(actions: impl IntoIterator<Item = TagAction>) -> Result<Self, TagError> {
        let mut registry = Self::default();
        for action in actions {
            registry.register(Arc::new(action))?;
        }
        Ok(registry)
    }

    /// 注册一个 action 的全部别名
    pub fn register(&mut self, action: Arc<TagAction>) -> Result<(), TagError> {
        for alias in &action.aliases {
            let key = alias.to_lowercase();
            if let Some(existing) = self.by_alias.get(&key)
                && !Arc::ptr_eq(existing, &action)
            {
                return Err(TagError::DuplicateAlias { alias: key });
            }
            self.by_alias.insert(key, Arc::clone(&action));
        }
        if !self.actions.iter().any(|known| Arc::ptr_eq(known, &action)) {
            self.actions.push(action);
        }
        Ok(())
    }

    /// 按名称查找（大小写不敏感）
    pub fn lookup(&self, name: &str) -> Option<&Arc<TagAction>> {
        self.by_alias
            .get(name)
            .or_else(|| self.by_alias.get(&name.to_lowercase()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// 所有别名（按字母序）
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.by_alias.keys().map(String::as_str)
    }

    /// 不同 action 的数量
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VnResult;
    use crate::runtime::Engine;
    use crate::tag::{TagArgs, TagResult};

    fn noop(_: &mut Engine, _: &TagArgs, _: u64) -> VnResult<TagResult> {
        Ok(TagResult::Continue)
    }

    #[test]
    fn test_aliases_share_one_action() {
        let registry =
            TagRegistry::build([TagAction::new(&["wait", "sleep"], vec![], noop)]).unwrap();
        let a = registry.lookup("wait").unwrap();
        let b = registry.lookup("SLEEP").unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(registry.action_count(), 1);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let result = TagRegistry::build([
            TagAction::new(&["wait"], vec![], noop),
            TagAction::new(&["Wait"], vec![], noop),
        ]);
        assert_eq!(
            result.unwrap_err(),
            TagError::DuplicateAlias {
                alias: "wait".to_string()
            }
        );
    }

    #[test]
    fn test_reregistering_same_action_is_allowed() {
        let action = Arc::new(TagAction::new(&["s"], vec![], noop));
        let mut registry = TagRegistry::default();
        registry.register(Arc::clone(&action)).unwrap();
        assert!(registry.register(action).is_ok());
    }
}
