//! # Storage 模块
//!
//! 存档文档的持久化接口。文档以名字为键：槽位为 `slot_NNN`，系统文档为 `system`。
//! 文件实现在 Host 中；这里提供内存实现。

use std::collections::BTreeMap;

use crate::error::SaveError;

/// 系统文档的键
pub const SYSTEM_KEY: &str = "system";

/// 槽位文档的键
pub fn slot_key(slot: u32) -> String {
    format!("slot_{:03}", slot)
}

pub trait SaveStorage {
    /// 读取文档；不存在时返回 `Ok(None)`
    fn read(&self, name: &str) -> Result<Option<String>, SaveError>;

    fn write(&mut self, name: &str, content: &str) -> Result<(), SaveError>;

    /// 删除文档；不存在时不报错
    fn remove(&mut self, name: &str) -> Result<(), SaveError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }
}

impl SaveStorage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<String>, SaveError> {
        Ok(self.documents.get(name).cloned())
    }

    fn write(&mut self, name: &str, content: &str) -> Result<(), SaveError> {
        self.documents.insert(name.to_string(), content.to_string());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), SaveError> {
        self.documents.remove(name);
        Ok(())
    }
}
