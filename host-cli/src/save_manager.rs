//! # SaveManager 模块
//!
//! 文件存档存储：每个文档一个 JSON 文件。
//!
//! ## 文件布局
//!
//! ```text
//! saves/
//! ├── system.json
//! ├── slot_001.json
//! ├── slot_002.json
//! └── ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use vn_conductor::{SaveError, SaveStorage};

/// 文件存档存储
pub struct SaveManager {
    saves_dir: PathBuf,
}

impl SaveManager {
    pub fn new(saves_dir: impl AsRef<Path>) -> Self {
        Self {
            saves_dir: saves_dir.as_ref().to_path_buf(),
        }
    }

    fn ensure_dir(&self) -> Result<(), SaveError> {
        if !self.saves_dir.exists() {
            fs::create_dir_all(&self.saves_dir)
                .map_err(|e| SaveError::Storage(format!("无法创建存档目录: {}", e)))?;
        }
        Ok(())
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.saves_dir.join(format!("{}.json", name))
    }

    /// 列出存档目录中的槽位编号（升序）
    pub fn list_slots(&self) -> Vec<u32> {
        let Ok(entries) = fs::read_dir(&self.saves_dir) else {
            return Vec::new();
        };
        let mut slots: Vec<u32> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                name.strip_prefix("slot_")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        slots.sort_unstable();
        slots
    }
}

impl SaveStorage for SaveManager {
    fn read(&self, name: &str) -> Result<Option<String>, SaveError> {
        let path = self.document_path(name);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| SaveError::Storage(format!("无法读取存档文件 {:?}: {}", path, e)))
    }

    fn write(&mut self, name: &str, content: &str) -> Result<(), SaveError> {
        self.ensure_dir()?;
        let path = self.document_path(name);
        fs::write(&path, content)
            .map_err(|e| SaveError::Storage(format!("无法写入存档文件 {:?}: {}", path, e)))?;
        debug!(path = ?path, "存档已写入");
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), SaveError> {
        let path = self.document_path(name);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| SaveError::Storage(format!("无法删除存档文件 {:?}: {}", path, e)))?;
            debug!(path = ?path, "存档已删除");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SaveManager::new(dir.path().join("saves"));

        assert_eq!(manager.read("slot_001").unwrap(), None);
        manager.write("slot_001", "{}").unwrap();
        assert_eq!(manager.read("slot_001").unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("saves/slot_001.json").exists());

        manager.remove("slot_001").unwrap();
        manager.remove("slot_001").unwrap();
        assert_eq!(manager.read("slot_001").unwrap(), None);
    }

    #[test]
    fn test_list_slots_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SaveManager::new(dir.path());
        manager.write("slot_010", "{}").unwrap();
        manager.write("slot_002", "{}").unwrap();
        manager.write("system", "{}").unwrap();
        fs::write(dir.path().join("slot_abc.json"), "{}").unwrap();

        assert_eq!(manager.list_slots(), vec![2, 10]);
    }

    #[test]
    fn test_list_slots_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SaveManager::new(dir.path().join("none"));
        assert!(manager.list_slots().is_empty());
    }
}
