//! # Page 模块
//!
//! 表页（fore）是当前显示的状态，里页（back）用于在过渡前准备画面。
//! `trans` 在给定时间内从表页过渡到里页，结束时两页交换。

use serde::{Deserialize, Serialize};

use super::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSide {
    #[default]
    Fore,
    Back,
}

impl PageSide {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fore" => Some(Self::Fore),
            "back" => Some(Self::Back),
            _ => None,
        }
    }
}

/// 过渡方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransMethod {
    #[default]
    Crossfade,
    /// 使用规则图的过渡
    Univ,
    Scroll,
}

impl TransMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "crossfade" => Some(Self::Crossfade),
            "univ" => Some(Self::Univ),
            "scroll" => Some(Self::Scroll),
            _ => None,
        }
    }
}

/// 进行中的过渡
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub method: TransMethod,
    pub duration: u64,
    pub elapsed: u64,
    /// univ 的规则图
    pub rule: Option<String>,
    /// scroll 的方向
    pub direction: Option<String>,
    #[serde(skip)]
    last_tick: Option<u64>,
}

impl Transition {
    pub fn new(
        method: TransMethod,
        duration: u64,
        rule: Option<String>,
        direction: Option<String>,
        tick: u64,
    ) -> Self {
        Self {
            method,
            duration,
            elapsed: 0,
            rule,
            direction,
            last_tick: Some(tick),
        }
    }

    /// 进度（0.0 - 1.0）
    pub fn progress(&self) -> f64 {
        if self.duration == 0 {
            1.0
        } else {
            (self.elapsed as f64 / self.duration as f64).min(1.0)
        }
    }

    fn update(&mut self, tick: u64) -> bool {
        if let Some(last) = self.last_tick {
            self.elapsed = self.elapsed.saturating_add(tick.saturating_sub(last));
        }
        self.last_tick = Some(tick);
        self.elapsed >= self.duration
    }
}

/// 一页图层
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPage {
    pub layers: Vec<Layer>,
}

impl LayerPage {
    pub fn new(count: usize) -> Self {
        Self {
            layers: (0..count).map(|i| Layer::new(i.to_string())).collect(),
        }
    }
}

/// 表里两页与进行中的过渡
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pages {
    pub fore: LayerPage,
    pub back: LayerPage,
    pub transition: Option<Transition>,
}

impl Pages {
    pub fn new(count: usize) -> Self {
        Self {
            fore: LayerPage::new(count),
            back: LayerPage::new(count),
            transition: None,
        }
    }

    pub fn page(&self, side: PageSide) -> &LayerPage {
        match side {
            PageSide::Fore => &self.fore,
            PageSide::Back => &self.back,
        }
    }

    pub fn page_mut(&mut self, side: PageSide) -> &mut LayerPage {
        match side {
            PageSide::Fore => &mut self.fore,
            PageSide::Back => &mut self.back,
        }
    }

    /// 把表页的指定图层复制到里页
    pub fn backlay(&mut self, indices: &[usize]) {
        for &index in indices {
            if let (Some(fore), Some(back)) =
                (self.fore.layers.get(index), self.back.layers.get_mut(index))
            {
                *back = fore.clone();
            }
        }
    }

    pub fn start_transition(&mut self, transition: Transition) {
        self.transition = Some(transition);
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// 立即结束过渡并交换两页
    pub fn finish_transition(&mut self) -> bool {
        if self.transition.take().is_some() {
            std::mem::swap(&mut self.fore, &mut self.back);
            true
        } else {
            false
        }
    }

    /// 推进过渡；完成时交换两页并返回 true
    pub fn update_transition(&mut self, tick: u64) -> bool {
        let done = self.transition.as_mut().is_some_and(|t| t.update(tick));
        done && self.finish_transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlay_copies_fore() {
        let mut pages = Pages::new(3);
        pages.fore.layers[1].visible = true;
        pages.fore.layers[2].x = 50.0;
        pages.backlay(&[1]);
        assert!(pages.back.layers[1].visible);
        assert_eq!(pages.back.layers[2].x, 0.0);
    }

    #[test]
    fn test_transition_swaps_pages() {
        let mut pages = Pages::new(2);
        pages.back.layers[0].visible = true;
        pages.start_transition(Transition::new(TransMethod::Crossfade, 300, None, None, 100));

        assert!(!pages.update_transition(250));
        assert!(pages.is_transitioning());
        assert!(pages.update_transition(400));
        assert!(!pages.is_transitioning());
        assert!(pages.fore.layers[0].visible);
        assert!(!pages.back.layers[0].visible);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(TransMethod::parse("UNIV"), Some(TransMethod::Univ));
        assert_eq!(TransMethod::parse("wipe"), None);
        assert_eq!(PageSide::parse("back"), Some(PageSide::Back));
    }
}
