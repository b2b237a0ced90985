//! # Layer 模块
//!
//! 无像素的图层模型：一个 [`Layer`] 聚合若干互相独立、可各自序列化的组件。
//!
//! ```text
//! Layer
//! ├── 基础属性 (name, visible, x, y, width, height, alpha)
//! ├── ImageComponent      图片引用（尺寸来自加载结果）
//! ├── TextComponent       文字缓冲 + 等待图标
//! ├── MoveComponent       路径移动
//! ├── FrameAnimComponent  逐帧动画
//! ├── VideoComponent      视频播放状态
//! ├── ButtonComponent     按钮
//! └── children            子图层
//! ```
//!
//! 存档时 [`Layer::store`] 生成 [`LayerSnapshot`]；读档时宿主先加载快照引用的
//! 图片/视频（[`LayerSnapshot::resource_requests`]），全部完成后再调用
//! [`Layer::restore`]，因为尺寸等派生属性只有在加载之后才有效。

mod button;
mod frame_anim;
mod movement;
mod page;
mod text;
mod video;

pub use button::{Button, ButtonComponent, ButtonKind, ButtonTarget};
pub use frame_anim::{AnimFrame, FrameAnimComponent};
pub use movement::{EaseMode, MoveComponent, MoveKind, MovePoint, interpolate};
pub use page::{LayerPage, PageSide, Pages, TransMethod, Transition};
pub use text::{GlyphState, TextComponent};
pub use video::VideoComponent;

use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::resource::{ResourceCache, ResourceInfo, ResourceKind};
use crate::runtime::events;

/// 图片引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageComponent {
    pub file: String,
    pub width: u32,
    pub height: u32,
    /// 源图偏移（逐帧动画使用）
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ImageComponent {
    pub fn new(file: impl Into<String>, info: &ResourceInfo) -> Self {
        Self {
            file: file.into(),
            width: info.width,
            height: info.height,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// 图层
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub alpha: f64,
    pub image: Option<ImageComponent>,
    pub text: TextComponent,
    pub movement: Option<MoveComponent>,
    pub frame_anim: Option<FrameAnimComponent>,
    pub video: Option<VideoComponent>,
    pub buttons: ButtonComponent,
    pub children: Vec<Layer>,
}

/// 图层快照
///
/// 图片与视频只以文件引用出现，尺寸在读档加载完成后重新取得。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub name: String,
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub alpha: f64,
    pub image: Option<ImageRef>,
    pub text: TextComponent,
    pub movement: Option<MoveComponent>,
    pub frame_anim: Option<FrameAnimComponent>,
    pub video: Option<VideoRef>,
    pub buttons: ButtonComponent,
    #[serde(default)]
    pub children: Vec<LayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub file: String,
    pub offset_x: f64,
    pub offset_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub file: String,
    pub playing: bool,
    pub looping: bool,
    pub volume: f64,
    pub elapsed: u64,
}

impl LayerSnapshot {
    /// 读档前需要加载的资源（含子图层）
    pub fn resource_requests(&self) -> Vec<(ResourceKind, String)> {
        let mut requests = Vec::new();
        self.collect_requests(&mut requests);
        requests
    }

    fn collect_requests(&self, out: &mut Vec<(ResourceKind, String)>) {
        if let Some(image) = &self.image {
            out.push((ResourceKind::Image, image.file.clone()));
        }
        if let Some(video) = &self.video {
            out.push((ResourceKind::Video, video.file.clone()));
        }
        for child in &self.children {
            child.collect_requests(out);
        }
    }
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: false,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            alpha: 1.0,
            image: None,
            text: TextComponent::default(),
            movement: None,
            frame_anim: None,
            video: None,
            buttons: ButtonComponent::default(),
            children: Vec::new(),
        }
    }

    /// 设置图片，尺寸取自加载结果
    pub fn set_image(&mut self, file: impl Into<String>, info: &ResourceInfo) {
        self.image = Some(ImageComponent::new(file, info));
        self.width = info.width as f64;
        self.height = info.height as f64;
    }

    /// 释放图片及依附于图片的动画
    pub fn free_image(&mut self) {
        self.image = None;
        self.frame_anim = None;
        self.width = 0.0;
        self.height = 0.0;
    }

    pub fn set_video(&mut self, file: impl Into<String>, info: &ResourceInfo) {
        self.video = Some(VideoComponent::new(
            file,
            info.width,
            info.height,
            info.duration,
        ));
        self.width = info.width as f64;
        self.height = info.height as f64;
    }

    // =========================================================================
    // 移动与动画
    // =========================================================================

    /// 开始移动；路径起点为当前位置
    pub fn start_move(
        &mut self,
        path: &[MovePoint],
        kind: MoveKind,
        ease: EaseMode,
        duration: u64,
        delay: u64,
        looping: bool,
        tick: u64,
    ) {
        let mut points = Vec::with_capacity(path.len() + 1);
        points.push(MovePoint::new(self.x, self.y, self.alpha));
        points.extend_from_slice(path);
        self.movement = Some(MoveComponent::new(
            points, kind, ease, duration, delay, looping, tick,
        ));
    }

    /// 停止移动，图层停在路径终点
    pub fn stop_move(&mut self) {
        if let Some(movement) = self.movement.take() {
            self.apply_point(movement.end_point());
        }
    }

    pub fn is_moving(&self) -> bool {
        self.movement.is_some()
    }

    pub fn start_frame_anim(&mut self, frames: Vec<AnimFrame>, frame_time: u64, looping: bool, tick: u64) {
        let mut anim = FrameAnimComponent::new(frames, frame_time, looping);
        anim.start(tick);
        self.frame_anim = Some(anim);
        self.apply_frame();
    }

    pub fn stop_frame_anim(&mut self) {
        if let Some(anim) = &mut self.frame_anim {
            anim.stop();
        }
    }

    pub fn is_frame_animating(&self) -> bool {
        self.frame_anim.as_ref().is_some_and(|a| a.running)
    }

    pub fn is_video_playing(&self) -> bool {
        self.video.as_ref().is_some_and(|v| v.playing)
    }

    fn apply_point(&mut self, point: MovePoint) {
        self.x = point.x;
        self.y = point.y;
        self.alpha = point.alpha;
    }

    fn apply_frame(&mut self) {
        let frame = self.frame_anim.as_ref().and_then(|a| a.current());
        if let (Some(frame), Some(image)) = (frame, &mut self.image) {
            image.offset_x = frame.x;
            image.offset_y = frame.y;
        }
    }

    /// 推进时间，返回本次完成的事件（`move`/`frameanim`/`video`）
    pub fn update(&mut self, tick: u64) -> Vec<&'static str> {
        let mut fired = Vec::new();

        if let Some(movement) = &mut self.movement {
            movement.update(tick);
            let point = movement.current();
            let finished = movement.is_finished();
            self.apply_point(point);
            if finished {
                self.movement = None;
                fired.push(events::MOVE);
            }
        }

        if let Some(anim) = &mut self.frame_anim {
            let finished = anim.update(tick);
            self.apply_frame();
            if finished {
                fired.push(events::FRAME_ANIM);
            }
        }

        if let Some(video) = &mut self.video
            && video.update(tick)
        {
            fired.push(events::VIDEO);
        }

        for child in &mut self.children {
            fired.extend(child.update(tick));
        }
        fired
    }

    // =========================================================================
    // 存档
    // =========================================================================

    /// 生成快照；进行中的移动/动画记录到 `tick` 为止的进度
    pub fn store(&self, tick: u64) -> LayerSnapshot {
        let mut movement = self.movement.clone();
        if let Some(m) = &mut movement {
            m.update(tick);
        }
        let mut frame_anim = self.frame_anim.clone();
        if let Some(a) = &mut frame_anim {
            a.update(tick);
        }
        LayerSnapshot {
            name: self.name.clone(),
            visible: self.visible,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            alpha: self.alpha,
            image: self.image.as_ref().map(|image| ImageRef {
                file: image.file.clone(),
                offset_x: image.offset_x,
                offset_y: image.offset_y,
            }),
            text: self.text.clone(),
            movement,
            frame_anim,
            video: self.video.as_ref().map(|video| VideoRef {
                file: video.file.clone(),
                playing: video.playing,
                looping: video.looping,
                volume: video.volume,
                elapsed: video.elapsed,
            }),
            buttons: self.buttons.clone(),
            children: self.children.iter().map(|c| c.store(tick)).collect(),
        }
    }

    /// 从快照恢复
    ///
    /// 快照引用的资源必须已在 `cache` 中。先应用图片/视频（得到派生尺寸），
    /// 再应用其余字段。`clear` 为 true 时快照中不存在的组件被清除，
    /// 否则保留。
    pub fn restore(
        &mut self,
        snapshot: &LayerSnapshot,
        cache: &ResourceCache,
        clear: bool,
    ) -> Result<(), ResourceError> {
        match &snapshot.image {
            Some(image) => {
                let info = cache.get(&image.file).ok_or_else(|| ResourceError::Image {
                    path: image.file.clone(),
                    message: "读档时资源尚未加载".to_string(),
                })?;
                self.set_image(&image.file, info);
                if let Some(component) = &mut self.image {
                    component.offset_x = image.offset_x;
                    component.offset_y = image.offset_y;
                }
            }
            None if clear => self.image = None,
            None => {}
        }

        match &snapshot.video {
            Some(video) => {
                let info = cache.get(&video.file).ok_or_else(|| ResourceError::Video {
                    path: video.file.clone(),
                    message: "读档时资源尚未加载".to_string(),
                })?;
                self.set_video(&video.file, info);
                if let Some(component) = &mut self.video {
                    component.playing = video.playing;
                    component.looping = video.looping;
                    component.volume = video.volume;
                    component.elapsed = video.elapsed;
                }
            }
            None if clear => self.video = None,
            None => {}
        }

        self.name = snapshot.name.clone();
        self.visible = snapshot.visible;
        self.x = snapshot.x;
        self.y = snapshot.y;
        self.width = snapshot.width;
        self.height = snapshot.height;
        self.alpha = snapshot.alpha;
        self.text = snapshot.text.clone();
        self.buttons = snapshot.buttons.clone();
        if clear || snapshot.movement.is_some() {
            self.movement = snapshot.movement.clone();
        }
        if clear || snapshot.frame_anim.is_some() {
            self.frame_anim = snapshot.frame_anim.clone();
        }

        if clear {
            self.children.truncate(snapshot.children.len());
        }
        for (index, child) in snapshot.children.iter().enumerate() {
            if index >= self.children.len() {
                self.children.push(Layer::new(child.name.clone()));
            }
            self.children[index].restore(child, cache, clear)?;
        }
        Ok(())
    }
}

/// 解析图层选择器
///
/// 支持：单个编号、`all`、`mes`/`message`（消息层）、范围 `a-b`、逗号列表 `1,3,5-7`。
/// 返回去重且有序的编号。
pub fn resolve_layers(selector: &str, count: usize, message_layer: usize) -> Result<Vec<usize>, String> {
    let mut result = Vec::new();
    let in_range = |n: usize| {
        if n < count {
            Ok(n)
        } else {
            Err(format!("图层编号 {} 超出范围 (0-{})", n, count.saturating_sub(1)))
        }
    };
    let parse = |s: &str| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| format!("无效的图层编号: {}", s.trim()))
    };

    for part in selector.split(',') {
        let part = part.trim();
        match part.to_ascii_lowercase().as_str() {
            "" => continue,
            "all" => result.extend(0..count),
            "mes" | "message" => result.push(in_range(message_layer)?),
            _ => match part.split_once('-') {
                Some((from, to)) => {
                    let (from, to) = (in_range(parse(from)?)?, in_range(parse(to)?)?);
                    if from > to {
                        return Err(format!("无效的图层范围: {}", part));
                    }
                    result.extend(from..=to);
                }
                None => result.push(in_range(parse(part)?)?),
            },
        }
    }

    result.sort_unstable();
    result.dedup();
    if result.is_empty() {
        return Err(format!("没有选中任何图层: {}", selector));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32) -> ResourceInfo {
        ResourceInfo {
            width,
            height,
            duration: None,
        }
    }

    #[test]
    fn test_resolve_layers() {
        assert_eq!(resolve_layers("3", 40, 20), Ok(vec![3]));
        assert_eq!(resolve_layers("mes", 40, 20), Ok(vec![20]));
        assert_eq!(resolve_layers("5-7, 1,6", 40, 20), Ok(vec![1, 5, 6, 7]));
        assert_eq!(resolve_layers("all", 3, 0), Ok(vec![0, 1, 2]));
        assert!(resolve_layers("40", 40, 20).is_err());
        assert!(resolve_layers("7-5", 40, 20).is_err());
        assert!(resolve_layers("abc", 40, 20).is_err());
        assert!(resolve_layers("", 40, 20).is_err());
    }

    #[test]
    fn test_move_finishes_at_end_point() {
        let mut layer = Layer::new("1");
        layer.x = 10.0;
        layer.start_move(
            &[MovePoint::new(110.0, 50.0, 0.5)],
            MoveKind::Linear,
            EaseMode::None,
            100,
            0,
            false,
            0,
        );
        assert!(layer.update(50).is_empty());
        assert_eq!((layer.x, layer.y), (60.0, 25.0));

        assert_eq!(layer.update(100), vec![events::MOVE]);
        assert_eq!((layer.x, layer.y, layer.alpha), (110.0, 50.0, 0.5));
        assert!(!layer.is_moving());
    }

    #[test]
    fn test_stop_move_jumps_to_end() {
        let mut layer = Layer::new("1");
        layer.start_move(
            &[MovePoint::new(300.0, 200.0, 1.0)],
            MoveKind::Linear,
            EaseMode::Both,
            1000,
            0,
            false,
            0,
        );
        layer.update(10);
        layer.stop_move();
        assert_eq!((layer.x, layer.y), (300.0, 200.0));
    }

    #[test]
    fn test_frame_anim_moves_image_offset() {
        let mut layer = Layer::new("2");
        layer.set_image("chara.png", &info(256, 64));
        let frames = vec![AnimFrame { x: 0.0, y: 0.0 }, AnimFrame { x: 64.0, y: 0.0 }];
        layer.start_frame_anim(frames, 100, false, 0);
        layer.update(120);
        assert_eq!(layer.image.as_ref().map(|i| i.offset_x), Some(64.0));
        assert_eq!(layer.update(200), vec![events::FRAME_ANIM]);
    }

    #[test]
    fn test_store_and_restore() {
        let mut layer = Layer::new("0");
        layer.set_image("bg.png", &info(1280, 720));
        layer.visible = true;
        layer.x = 15.0;
        layer.alpha = 0.5;
        layer.text.push_char("字");
        let mut child = Layer::new("0.0");
        child.set_image("face.png", &info(64, 64));
        layer.children.push(child);

        let snapshot = layer.store(0);
        assert_eq!(
            snapshot.resource_requests(),
            vec![
                (ResourceKind::Image, "bg.png".to_string()),
                (ResourceKind::Image, "face.png".to_string()),
            ]
        );

        let mut cache = ResourceCache::new();
        cache.insert("bg.png".to_string(), info(1280, 720));
        cache.insert("face.png".to_string(), info(64, 64));

        let mut restored = Layer::new("0");
        restored.restore(&snapshot, &cache, true).unwrap();
        assert_eq!(restored, layer);
    }

    #[test]
    fn test_restore_requires_loaded_image() {
        let mut layer = Layer::new("0");
        layer.set_image("bg.png", &info(1, 1));
        let snapshot = layer.store(0);

        let mut restored = Layer::new("0");
        let err = restored
            .restore(&snapshot, &ResourceCache::new(), true)
            .unwrap_err();
        assert!(matches!(err, ResourceError::Image { .. }));
    }

    #[test]
    fn test_restore_without_clear_keeps_components() {
        let mut layer = Layer::new("0");
        layer.set_image("bg.png", &info(10, 10));
        let empty = Layer::new("0").store(0);

        layer.restore(&empty, &ResourceCache::new(), false).unwrap();
        assert!(layer.image.is_some());
        layer.restore(&empty, &ResourceCache::new(), true).unwrap();
        assert!(layer.image.is_none());
    }
}
