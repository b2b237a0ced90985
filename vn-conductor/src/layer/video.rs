//! # Video 组件
//!
//! 只记录播放状态；解码与呈现由宿主负责。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoComponent {
    pub file: String,
    pub width: u32,
    pub height: u32,
    /// 时长未知时（宿主不提供）视频只能由 `stopvideo` 结束
    pub duration: Option<u64>,
    pub playing: bool,
    pub looping: bool,
    pub volume: f64,
    pub elapsed: u64,
    #[serde(skip)]
    last_tick: Option<u64>,
}

impl VideoComponent {
    pub fn new(file: impl Into<String>, width: u32, height: u32, duration: Option<u64>) -> Self {
        Self {
            file: file.into(),
            width,
            height,
            duration,
            playing: false,
            looping: false,
            volume: 1.0,
            elapsed: 0,
            last_tick: None,
        }
    }

    pub fn play(&mut self, tick: u64, looping: bool) {
        self.playing = true;
        self.looping = looping;
        self.elapsed = 0;
        self.last_tick = Some(tick);
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// 推进时间；播放到结尾时返回 true
    pub fn update(&mut self, tick: u64) -> bool {
        if !self.playing {
            return false;
        }
        if let Some(last) = self.last_tick {
            self.elapsed = self.elapsed.saturating_add(tick.saturating_sub(last));
        }
        self.last_tick = Some(tick);
        match self.duration {
            Some(duration) if self.elapsed >= duration => {
                if self.looping && duration > 0 {
                    self.elapsed %= duration;
                    false
                } else {
                    self.playing = false;
                    true
                }
            }
            _ => false,
        }
    }
}
