//! # FrameAnim 组件
//!
//! 逐帧动画：按固定间隔切换图片的显示区域（源图偏移）。

use serde::{Deserialize, Serialize};

/// 一帧：源图中的偏移
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimFrame {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnimComponent {
    pub frames: Vec<AnimFrame>,
    /// 每帧持续时间
    pub frame_time: u64,
    pub looping: bool,
    pub elapsed: u64,
    pub running: bool,
    #[serde(skip)]
    last_tick: Option<u64>,
}

impl FrameAnimComponent {
    pub fn new(frames: Vec<AnimFrame>, frame_time: u64, looping: bool) -> Self {
        Self {
            frames,
            frame_time,
            looping,
            elapsed: 0,
            running: false,
            last_tick: None,
        }
    }

    pub fn start(&mut self, tick: u64) {
        self.elapsed = 0;
        self.running = true;
        self.last_tick = Some(tick);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    fn total(&self) -> u64 {
        self.frame_time.saturating_mul(self.frames.len() as u64)
    }

    /// 当前帧
    pub fn current(&self) -> Option<AnimFrame> {
        if self.frames.is_empty() {
            return None;
        }
        let index = if self.frame_time == 0 {
            self.frames.len() - 1
        } else {
            let step = (self.elapsed / self.frame_time) as usize;
            if self.looping {
                step % self.frames.len()
            } else {
                step.min(self.frames.len() - 1)
            }
        };
        self.frames.get(index).copied()
    }

    /// 推进时间；非循环动画播放完毕时返回 true（仅一次）
    pub fn update(&mut self, tick: u64) -> bool {
        if !self.running {
            return false;
        }
        if let Some(last) = self.last_tick {
            self.elapsed = self.elapsed.saturating_add(tick.saturating_sub(last));
        }
        self.last_tick = Some(tick);
        if !self.looping && self.elapsed >= self.total() {
            self.running = false;
            return true;
        }
        false
    }
}
