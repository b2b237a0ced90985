//! # 诊断模块
//!
//! 不执行脚本的静态检查，供编辑工具与 `vn-cli check` 使用。
//!
//! - 未注册且未在本文件中定义为宏的指令（Warn：宏可能定义在其他文件）
//! - 同文件内不存在的 `jump`/`call` 目标标签（Error）
//! - 不配对的 `if`/`endif`、`for`/`endfor`、`macro`/`endmacro`（Error）

use std::collections::BTreeSet;

use crate::resource::ResourceKind;
use crate::script::ParsedScript;
use crate::tag::{Tag, TagRegistry};

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    Warn,
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub file: String,
    /// 从 1 开始；文件末尾的问题没有行号
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, file: &str, line: Option<usize>, message: String) -> Self {
        Self {
            level,
            file: file.to_string(),
            line,
            message,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.file)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// 诊断结果
#[derive(Debug, Clone, Default)]
pub struct DiagnosticResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticResult {
    pub fn error_count(&self) -> usize {
        self.count(DiagnosticLevel::Error)
    }

    pub fn warn_count(&self) -> usize {
        self.count(DiagnosticLevel::Warn)
    }

    fn count(&self, level: DiagnosticLevel) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// 脚本中引用的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    pub kind: ResourceKind,
    pub path: String,
    pub line: usize,
}

// =============================================================================
// 分析
// =============================================================================

/// 块配对检查用的开/闭指令
const BLOCKS: &[(&str, &str)] = &[("if", "endif"), ("for", "endfor"), ("macro", "endmacro")];

/// 分析一个已解析的脚本
pub fn analyze_script(script: &ParsedScript, registry: &TagRegistry) -> DiagnosticResult {
    let mut result = DiagnosticResult::default();
    let file = script.file_path.as_str();
    let mut push = |level, line, message| {
        result
            .diagnostics
            .push(Diagnostic::new(level, file, line, message));
    };

    let macros: BTreeSet<String> = script
        .tags
        .iter()
        .filter(|t| t.name == "macro")
        .filter_map(|t| t.get_str("name"))
        .map(str::to_ascii_lowercase)
        .collect();

    for tag in &script.tags {
        if !registry.contains(&tag.name) && !macros.contains(&tag.name) {
            push(
                DiagnosticLevel::Warn,
                Some(tag.line),
                format!("未知的指令: {}", tag.name),
            );
        }
        if let Some(label) = local_jump_target(tag, file)
            && script.label_position(label).is_none()
        {
            push(
                DiagnosticLevel::Error,
                Some(tag.line),
                format!("{} 的目标标签不存在: {}", tag.name, label),
            );
        }
    }

    // 块配对：栈中保存 (开指令, 行号)
    let mut stack: Vec<(&str, usize)> = Vec::new();
    for tag in &script.tags {
        let name = tag.name.as_str();
        if let Some((open, _)) = BLOCKS.iter().find(|(open, _)| *open == name) {
            stack.push((*open, tag.line));
        } else if let Some((open, _)) = BLOCKS.iter().find(|(_, close)| *close == name) {
            match stack.last() {
                Some((top, _)) if top == open => {
                    stack.pop();
                }
                Some((top, line)) => push(
                    DiagnosticLevel::Error,
                    Some(tag.line),
                    format!("{} 与第 {} 行的 {} 不匹配", name, line, top),
                ),
                None => push(
                    DiagnosticLevel::Error,
                    Some(tag.line),
                    format!("{} 没有对应的 {}", name, open),
                ),
            }
        } else if matches!(name, "elsif" | "else") && !stack.iter().any(|(open, _)| *open == "if") {
            push(
                DiagnosticLevel::Error,
                Some(tag.line),
                format!("{} 不在 if 块内", name),
            );
        }
    }
    for (open, line) in stack {
        push(
            DiagnosticLevel::Error,
            Some(line),
            format!("{} 缺少结束指令", open),
        );
    }

    result
}

/// 同文件跳转的目标标签；跨文件跳转无法静态检查
fn local_jump_target<'a>(tag: &'a Tag, file: &str) -> Option<&'a str> {
    if !matches!(tag.name.as_str(), "jump" | "call") {
        return None;
    }
    match tag.get_str("file") {
        Some(target) if target != file => None,
        _ => tag.get_str("label"),
    }
}

/// 提取脚本引用的图片、视频与音频文件
pub fn extract_resource_references(script: &ParsedScript) -> Vec<ResourceReference> {
    script
        .tags
        .iter()
        .filter_map(|tag| {
            let (kind, key) = match tag.name.as_str() {
                "image" | "loadimage" => (ResourceKind::Image, "file"),
                "imagebutton" | "imgbtn" => (ResourceKind::Image, "image"),
                "video" | "loadvideo" => (ResourceKind::Video, "file"),
                "playse" | "playbgm" | "play" | "fadein" => (ResourceKind::Sound, "file"),
                _ => return None,
            };
            tag.get_str(key).map(|path| ResourceReference {
                kind,
                path: path.to_string(),
                line: tag.line,
            })
        })
        .collect()
}
