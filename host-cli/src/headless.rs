//! # Headless 模块
//!
//! 文件系统上的脚本来源与资源加载器，以及驱动引擎的合成时钟循环。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};
use vn_conductor::runtime::events;
use vn_conductor::{
    Engine, EngineInput, LoadStatus, LoadToken, ResourceError, ResourceInfo, ResourceKind,
    ResourceLoader, ScriptSource,
};

/// 以目录为根读取脚本
pub struct FsScriptSource {
    root: PathBuf,
}

impl FsScriptSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ScriptSource for FsScriptSource {
    fn load(&self, path: &str) -> Result<String, ResourceError> {
        std::fs::read_to_string(self.root.join(path)).map_err(|e| ResourceError::Script {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

/// 文件系统资源加载器
///
/// 图片只读取文件头获取尺寸；视频和音频只检查文件存在。请求在下一次轮询时完成。
pub struct FsResourceLoader {
    root: PathBuf,
    next_token: u64,
    requests: BTreeMap<LoadToken, (ResourceKind, String)>,
}

impl FsResourceLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            next_token: 0,
            requests: BTreeMap::new(),
        }
    }

    fn probe(&self, kind: ResourceKind, path: &str) -> LoadStatus {
        let full = self.root.join(path);
        if !full.is_file() {
            return LoadStatus::Failed(format!("文件不存在: {}", full.display()));
        }
        match kind {
            ResourceKind::Image => match image::image_dimensions(&full) {
                Ok((width, height)) => LoadStatus::Ready(ResourceInfo {
                    width,
                    height,
                    duration: None,
                }),
                Err(e) => LoadStatus::Failed(e.to_string()),
            },
            ResourceKind::Video | ResourceKind::Sound => LoadStatus::Ready(ResourceInfo::default()),
        }
    }
}

impl ResourceLoader for FsResourceLoader {
    fn request(&mut self, kind: ResourceKind, path: &str) -> LoadToken {
        let token = LoadToken(self.next_token);
        self.next_token += 1;
        debug!(?kind, path, ?token, "资源请求");
        self.requests.insert(token, (kind, path.to_string()));
        token
    }

    fn poll(&mut self, token: LoadToken) -> LoadStatus {
        match self.requests.remove(&token) {
            Some((kind, path)) => self.probe(kind, &path),
            None => LoadStatus::Failed(format!("未知的加载令牌 {:?}", token)),
        }
    }
}

/// 合成时钟循环的参数
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 每帧推进的时间（ms）
    pub frame_ms: u64,
    /// 最多运行的帧数
    pub max_frames: u64,
    /// 最多自动点击的次数
    pub max_clicks: u64,
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub clicks: u64,
    /// 每次点击等待时消息层上的文字
    pub transcript: Vec<String>,
    /// 脚本正常停止（没有等待中的事件）
    pub finished: bool,
}

/// 驱动引擎直到脚本停止、点击次数用完或帧数用完
///
/// 点击等待时记录消息文字并自动点击；等待音频结束时直接通知非循环缓冲区播放完毕。
pub fn drive(engine: &mut Engine, options: &RunOptions) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let mut now = 0u64;

    while summary.frames < options.max_frames {
        engine.tick(now)?;
        summary.frames += 1;

        let conductor = engine.conductor();
        if conductor.is_stopped() && !conductor.has_any_event_handler() && !engine.is_loading() {
            summary.finished = true;
            break;
        }

        if engine.is_waiting_click() && !engine.is_loading() {
            if summary.clicks >= options.max_clicks {
                warn!(clicks = summary.clicks, "自动点击次数已用完");
                break;
            }
            summary.transcript.push(engine.message_text());
            engine.handle_input(EngineInput::PrimaryClick)?;
            summary.clicks += 1;
        } else if engine.conductor().has_event_handler(events::SOUND_STOP) {
            let ended: Vec<usize> = engine
                .sounds()
                .iter()
                .filter(|buf| buf.is_playing() && !buf.looping && !buf.is_fading())
                .map(|buf| buf.index)
                .collect();
            for buf in ended {
                engine.handle_input(EngineInput::SoundEnded { buf })?;
            }
        }

        now += options.frame_ms;
    }

    let text = engine.message_text();
    if !text.is_empty() {
        summary.transcript.push(text);
    }
    info!(
        frames = summary.frames,
        clicks = summary.clicks,
        finished = summary.finished,
        "运行结束"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vn_conductor::{EngineConfig, MemoryStorage, SaveStorage};

    fn options() -> RunOptions {
        RunOptions {
            frame_ms: 16,
            max_frames: 10_000,
            max_clicks: 100,
        }
    }

    fn engine_in(dir: &Path, script: &str) -> Engine {
        std::fs::write(dir.join("main.txt"), script).unwrap();
        let config = EngineConfig {
            char_delay: 0,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config, Box::new(FsScriptSource::new(dir)))
            .unwrap()
            .with_loader(Box::new(FsResourceLoader::new(dir)))
            .with_storage(Box::new(MemoryStorage::new()));
        engine.start("main.txt").unwrap();
        engine
    }

    #[test]
    fn test_drive_clicks_through_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path(), "第一页\n;p\n第二页\n;l\n;s\n");
        let summary = drive(&mut engine, &options()).unwrap();

        assert!(summary.finished);
        assert_eq!(summary.clicks, 2);
        assert_eq!(summary.transcript[0], "第一页\n");
    }

    #[test]
    fn test_read_marks_survive_between_runs() {
        use crate::save_manager::SaveManager;
        use vn_conductor::SystemData;
        use vn_conductor::storage::SYSTEM_KEY;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.txt"), "~first\n-sf.seen = 1\n;s\n").unwrap();
        let saves = dir.path().join("saves");
        let start = |saves: &Path| {
            let mut engine = Engine::new(EngineConfig::default(), Box::new(FsScriptSource::new(dir.path())))
                .unwrap()
                .with_storage(Box::new(SaveManager::new(saves)));
            engine.start("main.txt").unwrap();
            engine
        };

        let mut engine = start(&saves);
        assert!(drive(&mut engine, &options()).unwrap().finished);

        let json = SaveManager::new(&saves).read(SYSTEM_KEY).unwrap().unwrap();
        let system = SystemData::from_json(&json).unwrap();
        assert!(system.read_marks.contains(&SystemData::read_mark_key("main.txt", "first")));

        // 第二次运行：存档点已读，允许快进
        let mut engine = start(&saves);
        engine.tick(0).unwrap();
        assert!(engine.latest_save_mark().is_some_and(|mark| mark.was_read));
        assert!(engine.start_skip_by_tag());
    }

    #[test]
    fn test_image_dimensions_from_file() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::new(4, 3)
            .save(dir.path().join("bg.png"))
            .unwrap();
        let mut loader = FsResourceLoader::new(dir.path());
        let token = loader.request(ResourceKind::Image, "bg.png");
        assert_eq!(
            loader.poll(token),
            LoadStatus::Ready(ResourceInfo {
                width: 4,
                height: 3,
                duration: None
            })
        );
    }

    #[test]
    fn test_missing_resource_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path(), ";image lay: 0 file: none.png\n;s\n");
        let err = drive(&mut engine, &options()).unwrap_err();
        assert!(err.to_string().contains("image"), "{}", err);
    }
}
