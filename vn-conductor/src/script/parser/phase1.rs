//! # 阶段 1：块识别
//!
//! 将原始文本按行分组为块：普通行，或 `---` 包围的多行表达式块。

use crate::error::ParseError;

/// 块类型（阶段 1 输出）
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// 单行内容（已去除首尾空白，非空）
    SingleLine { line: String, line_number: usize },
    /// `---` … `---` 表达式块
    Expression { source: String, start_line: usize },
}

/// 识别文本中的块
pub fn recognize_blocks(text: &str) -> Result<Vec<Block>, ParseError> {
    let mut blocks = Vec::new();
    let mut current_expr: Option<(Vec<&str>, usize)> = None;

    for (line_idx, line) in text.lines().enumerate() {
        let line_number = line_idx + 1;
        let trimmed = line.trim();
        let is_fence = trimmed == "---";

        if let Some((lines, start)) = current_expr.as_mut() {
            if is_fence {
                blocks.push(Block::Expression {
                    source: lines.join("\n"),
                    start_line: *start,
                });
                current_expr = None;
            } else {
                lines.push(line);
            }
            continue;
        }

        if is_fence {
            current_expr = Some((Vec::new(), line_number));
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        blocks.push(Block::SingleLine {
            line: trimmed.to_string(),
            line_number,
        });
    }

    if let Some((_, start)) = current_expr {
        return Err(ParseError::UnterminatedBlock { line: start });
    }

    Ok(blocks)
}
