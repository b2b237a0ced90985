//! # Sound 模块
//!
//! 音频缓冲的状态机。解码与混音由宿主负责，这里只维护宿主需要的状态
//! （文件、音量、循环、淡入淡出进度），并产生 `soundstop` / `soundfade` 事件。
//!
//! ```text
//!   play         fade/fadein/fadeout
//! Stop ──► Play ───────────────────► Fade/Fadein/Fadeout ──► Play（或 Stop：stop_after）
//!           │ ▲
//!     pause │ │ resume
//!           ▼ │
//!          Pause
//! ```

use serde::{Deserialize, Serialize};

use crate::runtime::events;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SoundState {
    #[default]
    Stop,
    Play,
    Pause,
    Fade,
    Fadein,
    Fadeout,
}

/// 进行中的音量渐变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundFade {
    pub from: f64,
    pub to: f64,
    pub duration: u64,
    pub elapsed: u64,
    /// 渐变结束后停止播放
    pub stop_after: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundBuffer {
    pub index: usize,
    pub file: Option<String>,
    pub state: SoundState,
    pub volume: f64,
    pub looping: bool,
    pub fade: Option<SoundFade>,
    #[serde(skip)]
    last_tick: Option<u64>,
}

impl SoundBuffer {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            file: None,
            state: SoundState::Stop,
            volume: 1.0,
            looping: false,
            fade: None,
            last_tick: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        !matches!(self.state, SoundState::Stop | SoundState::Pause)
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn play(&mut self, file: impl Into<String>, looping: bool, tick: u64) {
        self.file = Some(file.into());
        self.looping = looping;
        self.state = SoundState::Play;
        self.fade = None;
        self.last_tick = Some(tick);
    }

    /// 停止；返回之前是否在播放
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = SoundState::Stop;
        self.fade = None;
        was_playing
    }

    pub fn pause(&mut self) {
        if self.is_playing() {
            self.state = SoundState::Pause;
        }
    }

    pub fn resume(&mut self, tick: u64) {
        if self.state == SoundState::Pause {
            self.state = if self.fade.is_some() {
                SoundState::Fade
            } else {
                SoundState::Play
            };
            self.last_tick = Some(tick);
        }
    }

    fn start_fade(&mut self, state: SoundState, from: f64, to: f64, duration: u64, stop_after: bool, tick: u64) {
        self.state = state;
        self.volume = from;
        self.fade = Some(SoundFade {
            from,
            to,
            duration,
            elapsed: 0,
            stop_after,
        });
        self.last_tick = Some(tick);
    }

    /// 以当前音量为起点渐变到 `volume`
    pub fn fade(&mut self, volume: f64, duration: u64, stop_after: bool, tick: u64) {
        let from = self.volume;
        self.start_fade(SoundState::Fade, from, volume, duration, stop_after, tick);
    }

    /// 从静音开始播放并渐变到 `volume`
    pub fn fadein(&mut self, file: impl Into<String>, volume: f64, duration: u64, looping: bool, tick: u64) {
        self.file = Some(file.into());
        self.looping = looping;
        self.start_fade(SoundState::Fadein, 0.0, volume, duration, false, tick);
    }

    /// 渐变到静音后停止
    pub fn fadeout(&mut self, duration: u64, tick: u64) {
        let from = self.volume;
        self.start_fade(SoundState::Fadeout, from, 0.0, duration, true, tick);
    }

    /// 推进渐变，返回本次产生的事件
    pub fn update(&mut self, tick: u64) -> Vec<&'static str> {
        let delta = self
            .last_tick
            .map(|last| tick.saturating_sub(last))
            .unwrap_or(0);
        self.last_tick = Some(tick);

        if self.state == SoundState::Pause {
            return Vec::new();
        }
        let Some(fade) = &mut self.fade else {
            return Vec::new();
        };

        fade.elapsed = fade.elapsed.saturating_add(delta);
        if fade.elapsed < fade.duration {
            let t = fade.elapsed as f64 / fade.duration as f64;
            self.volume = fade.from + (fade.to - fade.from) * t;
            return Vec::new();
        }

        self.volume = fade.to;
        let stop_after = fade.stop_after;
        self.fade = None;
        if stop_after {
            self.state = SoundState::Stop;
            vec![events::SOUND_FADE, events::SOUND_STOP]
        } else {
            self.state = SoundState::Play;
            vec![events::SOUND_FADE]
        }
    }

    /// 宿主通知播放结束（非循环音频到达结尾）
    pub fn notify_ended(&mut self) -> Vec<&'static str> {
        if self.looping || !self.is_playing() {
            return Vec::new();
        }
        let fading = self.fade.take().is_some();
        self.state = SoundState::Stop;
        if fading {
            vec![events::SOUND_FADE, events::SOUND_STOP]
        } else {
            vec![events::SOUND_STOP]
        }
    }

    /// 快照：记录到 `tick` 为止的渐变进度
    pub fn store(&self, tick: u64) -> SoundBuffer {
        let mut snapshot = self.clone();
        snapshot.update(tick);
        snapshot
    }

    /// 从快照恢复
    ///
    /// 只有循环播放（BGM）会继续；一次性音效恢复为停止状态。
    pub fn restore(&mut self, snapshot: &SoundBuffer, tick: u64) {
        *self = snapshot.clone();
        self.last_tick = Some(tick);
        if !self.looping && self.is_playing() {
            self.state = SoundState::Stop;
            self.fade = None;
        }
    }
}
