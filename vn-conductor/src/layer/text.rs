//! # Text 组件
//!
//! 文字缓冲与等待图标状态。排版、禁则处理由宿主负责。

use serde::{Deserialize, Serialize};

/// 等待图标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlyphState {
    #[default]
    Hidden,
    /// 行末等待
    Line,
    /// 页末等待
    Page,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextComponent {
    pub text: String,
    pub glyph: GlyphState,
}

impl TextComponent {
    pub fn push_char(&mut self, ch: &str) {
        self.text.push_str(ch);
    }

    pub fn line_break(&mut self) {
        self.text.push('\n');
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.glyph = GlyphState::Hidden;
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_buffer() {
        let mut text = TextComponent::default();
        text.push_char("あ");
        text.line_break();
        text.push_char("い");
        text.glyph = GlyphState::Page;
        assert_eq!(text.text, "あ\nい");

        text.clear();
        assert!(text.is_empty());
        assert_eq!(text.glyph, GlyphState::Hidden);
    }
}
