//! # Parser 模块
//!
//! 两阶段脚本解析器实现（手写，无 regex 依赖）。
//!
//! ## 架构
//!
//! ```text
//! 原始文本 → [阶段1: 块识别] → Vec<Block> → [阶段2: 块解析] → ParsedScript
//! ```
//!
//! ## 行语法
//!
//! | 行首 | 含义 |
//! |------|------|
//! | `;`  | 指令：`;name key: value ...` 或 `;name { ... }` |
//! | `#`  | 注释 |
//! | `*`  | 标签 |
//! | `~`  | 存档点 `~name\|comment` |
//! | `-`  | 静默求值表达式 |
//! | `=`  | 求值并输出到消息层 |
//! | `---`| 多行表达式块 |
//! | 其他 | 文本（逐字 `ch` + 行末 `br`） |
//!
//! 文件末尾自动追加一条 `s`。
//!
//! ## 模块结构
//!
//! - `helpers`: 参数字面量解析
//! - `phase1`: 块识别
//! - `phase2`: 块解析

mod helpers;
mod phase1;
mod phase2;

#[cfg(test)]
mod tests;

use crate::error::ParseError;
use crate::script::ParsedScript;

use phase1::recognize_blocks;
use phase2::Phase2Parser;

pub use helpers::{parse_object_params, parse_params};

/// 解析脚本文本
///
/// # 参数
///
/// - `file_path`: 脚本路径（用于错误信息与跨文件跳转）
/// - `text`: 脚本文本内容
pub fn parse_script(file_path: &str, text: &str) -> Result<ParsedScript, ParseError> {
    let blocks = recognize_blocks(text)?;

    let mut phase2 = Phase2Parser::new();
    for block in blocks {
        phase2.parse_block(block)?;
    }

    let last_line = text.lines().count().max(1);
    Ok(phase2.finish(file_path, last_line))
}
