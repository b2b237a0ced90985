//! # Resource 模块
//!
//! 引擎与外部资源之间的窄接口。
//!
//! - [`ResourceLoader`]：图片/视频/音频的异步加载。请求返回 [`LoadToken`]，
//!   引擎每个 tick 轮询一次，直到完成或失败。等待中的加载只是一张令牌表，
//!   不持有任何回调。
//! - [`ScriptSource`]：按路径读取脚本文本。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ResourceError;

/// 资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Image,
    Video,
    Sound,
}

/// 加载令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoadToken(pub u64);

/// 加载完成后可得的资源信息
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub width: u32,
    pub height: u32,
    /// 时长（视频/音频，tick）
    pub duration: Option<u64>,
}

/// 轮询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Pending,
    Ready(ResourceInfo),
    Failed(String),
}

/// 资源加载器
pub trait ResourceLoader {
    /// 发起加载请求
    fn request(&mut self, kind: ResourceKind, path: &str) -> LoadToken;

    /// 查询加载状态；返回 `Ready`/`Failed` 后令牌失效
    fn poll(&mut self, token: LoadToken) -> LoadStatus;
}

/// 脚本来源
pub trait ScriptSource {
    fn load(&self, path: &str) -> Result<String, ResourceError>;
}

/// 已加载资源的信息缓存（按路径）
pub type ResourceCache = BTreeMap<String, ResourceInfo>;

/// 内存资源加载器
///
/// 资源表预先登记；`latency` 指定每个请求需要轮询多少次才完成，用于模拟异步加载。
#[derive(Debug, Default)]
pub struct MemoryResourceLoader {
    resources: BTreeMap<String, ResourceInfo>,
    latency: u32,
    next_token: u64,
    requests: BTreeMap<LoadToken, (String, u32)>,
}

impl MemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置加载延迟（轮询次数）
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    /// 登记一个资源
    pub fn insert(&mut self, path: impl Into<String>, info: ResourceInfo) {
        self.resources.insert(path.into(), info);
    }

    /// 登记资源（构建器风格）
    pub fn with(mut self, path: impl Into<String>, width: u32, height: u32) -> Self {
        self.insert(
            path,
            ResourceInfo {
                width,
                height,
                duration: None,
            },
        );
        self
    }

    /// 尚未完成的请求数
    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn request(&mut self, _kind: ResourceKind, path: &str) -> LoadToken {
        let token = LoadToken(self.next_token);
        self.next_token += 1;
        self.requests.insert(token, (path.to_string(), self.latency));
        token
    }

    fn poll(&mut self, token: LoadToken) -> LoadStatus {
        let Some((path, remaining)) = self.requests.get_mut(&token) else {
            return LoadStatus::Failed(format!("未知的加载令牌 {:?}", token));
        };
        if *remaining > 0 {
            *remaining -= 1;
            return LoadStatus::Pending;
        }
        let path = path.clone();
        self.requests.remove(&token);
        match self.resources.get(&path) {
            Some(info) => LoadStatus::Ready(info.clone()),
            None => LoadStatus::Failed("资源不存在".to_string()),
        }
    }
}

/// 内存脚本来源
#[derive(Debug, Clone, Default)]
pub struct MemoryScriptSource {
    scripts: BTreeMap<String, String>,
}

impl MemoryScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.scripts.insert(path.into(), text.into());
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.scripts.insert(path.into(), text.into());
    }
}

impl ScriptSource for MemoryScriptSource {
    fn load(&self, path: &str) -> Result<String, ResourceError> {
        self.scripts
            .get(path)
            .cloned()
            .ok_or_else(|| ResourceError::Script {
                path: path.to_string(),
                message: "脚本不存在".to_string(),
            })
    }
}
