//! # History 模块
//!
//! 消息履历：记录已显示的文字与换行/换页，供回看界面使用。
//!
//! - 只在 `historyoutput` 打开时记录
//! - 随槽位存档保存
//! - 条数有上限，超出时丢弃最早的事件

use serde::{Deserialize, Serialize};

/// 履历事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// 连续输出的文字（相邻的字符合并为一条）
    Text { content: String },
    LineBreak,
    PageBreak,
}

/// 履历容器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    events: Vec<HistoryEvent>,
    max_events: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            max_events: 1000,
        }
    }

    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    fn push(&mut self, event: HistoryEvent) {
        self.events.push(event);
        if self.events.len() > self.max_events {
            let overflow = self.events.len() - self.max_events;
            self.events.drain(..overflow);
        }
    }

    /// 追加文字
    pub fn push_text(&mut self, text: &str) {
        if let Some(HistoryEvent::Text { content }) = self.events.last_mut() {
            content.push_str(text);
            return;
        }
        self.push(HistoryEvent::Text {
            content: text.to_string(),
        });
    }

    pub fn line_break(&mut self) {
        self.push(HistoryEvent::LineBreak);
    }

    /// 换页；连续换页只记录一次
    pub fn page_break(&mut self) {
        if matches!(self.events.last(), Some(HistoryEvent::PageBreak) | None) {
            return;
        }
        self.push(HistoryEvent::PageBreak);
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// 按页拆分的纯文本
    pub fn pages(&self) -> Vec<String> {
        let mut pages = vec![String::new()];
        for event in &self.events {
            match event {
                HistoryEvent::Text { content } => {
                    if let Some(page) = pages.last_mut() {
                        page.push_str(content);
                    }
                }
                HistoryEvent::LineBreak => {
                    if let Some(page) = pages.last_mut() {
                        page.push('\n');
                    }
                }
                HistoryEvent::PageBreak => pages.push(String::new()),
            }
        }
        pages.retain(|page| !page.is_empty());
        pages
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
