//! # Script 模块
//!
//! 一个已加载的脚本文件：不可变的 Tag 序列 + 辅助索引（标签、存档点），
//! 以及可变的解释器簿记（游标、if/for/call 栈、宏表、宏参数）。
//!
//! 分支与循环都通过**移动游标**实现：未选中的分支体不会被执行，
//! 也不会被"执行后丢弃"。
//!
//! ```text
//! ;if exp: "tf.a == 1"    ← if_jump：真 → 进入；假 → 游标移到下一个 elsif/else/endif
//! ...
//! ;elsif exp: "..."       ← 已有分支被选中 → 游标移到 endif
//! ...
//! ;endif                  ← 弹出 if 帧
//! ```

pub mod parser;

pub use parser::parse_script;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{MacroDefectKind, TagError};
use crate::layer::GlyphState;
use crate::runtime::HandlerTable;
use crate::tag::Tag;
use crate::variables::{VarScope, VarTable, VariableStore};

/// 存档点信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMarkInfo {
    /// `savemark` 指令所在位置
    pub position: usize,
    pub comment: String,
}

/// 解析结果：不可变部分，可在多个 [`Script`] 实例间共享
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScript {
    pub file_path: String,
    pub tags: Vec<Tag>,
    /// 标签名 → `label` 指令位置
    pub labels: BTreeMap<String, usize>,
    pub save_marks: BTreeMap<String, SaveMarkInfo>,
}

impl ParsedScript {
    /// 查找标签位置（允许带 `*` 前缀）
    pub fn label_position(&self, name: &str) -> Option<usize> {
        self.labels.get(name.trim_start_matches('*')).copied()
    }
}

/// 宏定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDef {
    pub name: String,
    /// 宏体（包含结尾的 `endmacro`）
    pub tags: Vec<Tag>,
}

/// if 帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfFrame {
    /// 是否已有分支被选中
    pub taken: bool,
}

/// for 帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForFrame {
    pub remaining: i64,
    pub index: i64,
    pub index_var: String,
    /// 循环体第一条指令的位置
    pub loop_start: usize,
    /// 进入循环时的 if 栈深度
    pub if_depth: usize,
}

/// 调用帧（子程序或宏）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    pub return_file: String,
    pub return_position: usize,
    /// 调用发生在宏体内时，返回后继续执行的宏
    pub return_macro: Option<String>,
    pub is_macro: bool,
    /// 调用方可见的宏参数，返回时恢复
    pub caller_params: Option<VarTable>,
    pub if_depth: usize,
    pub for_depth: usize,
    /// 调用时被挂起的等待（例如右键子程序打断了点击等待）
    #[serde(default)]
    pub suspended: Option<SuspendedWait>,
}

/// 被子程序打断的等待：事件处理器与当时的等待图标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspendedWait {
    pub handlers: HandlerTable,
    pub glyph: GlyphState,
}

/// Script 的可变状态
///
/// 全部字段可序列化，直接进入存档。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptState {
    pub cursor: usize,
    pub current_macro: Option<String>,
    pub if_stack: Vec<IfFrame>,
    pub for_stack: Vec<ForFrame>,
    pub call_stack: Vec<CallFrame>,
    pub macros: BTreeMap<String, MacroDef>,
    pub macro_params: Option<VarTable>,
}

/// 一个正在执行的脚本
#[derive(Debug, Clone)]
pub struct Script {
    parsed: Arc<ParsedScript>,
    state: ScriptState,
    /// 已读存档点
    read_marks: BTreeSet<String>,
}

fn unbalanced(message: impl Into<String>) -> TagError {
    TagError::Unbalanced {
        message: message.into(),
    }
}

impl Script {
    pub fn new(parsed: Arc<ParsedScript>) -> Self {
        Self {
            parsed,
            state: ScriptState::default(),
            read_marks: BTreeSet::new(),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.parsed.file_path
    }

    pub fn parsed(&self) -> &Arc<ParsedScript> {
        &self.parsed
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn state(&self) -> &ScriptState {
        &self.state
    }

    /// 用存档中的状态整体替换
    pub fn restore_state(&mut self, state: ScriptState) {
        self.state = state;
    }

    pub fn macro_params(&self) -> Option<&VarTable> {
        self.state.macro_params.as_ref()
    }

    pub fn current_macro(&self) -> Option<&str> {
        self.state.current_macro.as_deref()
    }

    /// 切换到另一个文件
    ///
    /// `reset` 为 true 时（jump）清空游标与所有栈；宏表总是保留。
    /// 为 false 时（跨文件 call/return）保留全部状态。
    pub fn switch_file(&mut self, parsed: Arc<ParsedScript>, read_marks: BTreeSet<String>, reset: bool) {
        self.parsed = parsed;
        self.read_marks = read_marks;
        if reset {
            let macros = std::mem::take(&mut self.state.macros);
            self.state = ScriptState {
                macros,
                ..ScriptState::default()
            };
        }
    }

    /// 当前执行中的指令序列（文件本体或宏体）
    fn current_tags(&self) -> &[Tag] {
        match &self.state.current_macro {
            Some(name) => self
                .state
                .macros
                .get(name)
                .map(|def| def.tags.as_slice())
                .unwrap_or_default(),
            None => &self.parsed.tags,
        }
    }

    /// 取下一条指令并前进游标
    pub fn next_tag(&mut self) -> Option<Tag> {
        let tag = self.current_tags().get(self.state.cursor).cloned()?;
        self.state.cursor += 1;
        Some(tag)
    }

    // =========================================================================
    // 标签与存档点
    // =========================================================================

    pub fn has_label(&self, name: &str) -> bool {
        self.parsed.label_position(name).is_some()
    }

    /// 跳到标签的下一条指令
    pub fn go_to_label(&mut self, name: &str) -> Result<(), TagError> {
        let position = self
            .parsed
            .label_position(name)
            .ok_or_else(|| TagError::LabelNotFound {
                label: name.to_string(),
            })?;
        self.state.current_macro = None;
        self.state.cursor = position + 1;
        Ok(())
    }

    /// 回到文件开头
    pub fn go_to_start(&mut self) {
        self.state.current_macro = None;
        self.state.cursor = 0;
    }

    /// 跳到存档点的下一条指令，并标记为已读
    pub fn go_to_save_mark(&mut self, name: &str) -> Result<(), TagError> {
        let position = self
            .parsed
            .save_marks
            .get(name)
            .map(|info| info.position)
            .ok_or_else(|| TagError::SaveMarkNotFound {
                mark: name.to_string(),
            })?;
        self.state.current_macro = None;
        self.state.cursor = position + 1;
        self.read_marks.insert(name.to_string());
        Ok(())
    }

    /// 经过存档点：标记为已读，返回经过之前是否已读
    pub fn pass_save_mark(&mut self, name: &str) -> bool {
        !self.read_marks.insert(name.to_string())
    }

    pub fn is_save_mark_read(&self, name: &str) -> bool {
        self.read_marks.contains(name)
    }

    pub fn read_marks(&self) -> &BTreeSet<String> {
        &self.read_marks
    }

    // =========================================================================
    // 宏
    // =========================================================================

    pub fn has_macro(&self, name: &str) -> bool {
        self.state.macros.contains_key(name)
    }

    /// 定义宏
    ///
    /// 游标位于 `macro` 指令之后。向前扫描到 `endmacro`，捕获宏体并跳过它。
    pub fn define_macro(&mut self, name: &str) -> Result<(), TagError> {
        if self.has_macro(name) {
            return Err(TagError::DuplicateMacro {
                name: name.to_string(),
            });
        }

        let malformed = |reason| TagError::MalformedMacro {
            name: name.to_string(),
            reason,
        };

        let start = self.state.cursor;
        let tags = self.current_tags();
        let mut end = None;
        for (offset, tag) in tags.iter().enumerate().skip(start) {
            match tag.name.as_str() {
                "endmacro" => {
                    end = Some(offset);
                    break;
                }
                "label" => return Err(malformed(MacroDefectKind::ContainsLabel)),
                "savemark" => return Err(malformed(MacroDefectKind::ContainsSaveMark)),
                "macro" => return Err(malformed(MacroDefectKind::Nested)),
                _ => {}
            }
        }

        let end = end.ok_or_else(|| malformed(MacroDefectKind::Unterminated))?;
        if end == start {
            return Err(malformed(MacroDefectKind::Empty));
        }

        let body = tags[start..=end].to_vec();
        self.state.macros.insert(
            name.to_string(),
            MacroDef {
                name: name.to_string(),
                tags: body,
            },
        );
        self.state.cursor = end + 1;
        Ok(())
    }

    fn push_frame(&mut self, is_macro: bool, suspended: Option<SuspendedWait>) {
        let frame = CallFrame {
            return_file: self.parsed.file_path.clone(),
            return_position: self.state.cursor,
            return_macro: self.state.current_macro.clone(),
            is_macro,
            caller_params: self.state.macro_params.take(),
            if_depth: self.state.if_stack.len(),
            for_depth: self.state.for_stack.len(),
            suspended,
        };
        self.state.call_stack.push(frame);
    }

    /// 调用宏：压入调用帧并绑定宏参数
    pub fn call_macro(&mut self, name: &str, params: VarTable) -> Result<(), TagError> {
        if !self.has_macro(name) {
            return Err(TagError::UnknownTag {
                name: name.to_string(),
            });
        }
        self.push_frame(true, None);
        self.state.macro_params = Some(params);
        self.state.current_macro = Some(name.to_string());
        self.state.cursor = 0;
        Ok(())
    }

    /// 压入子程序调用帧（调用方随后负责跳转）
    pub fn push_subroutine(&mut self, suspended: Option<SuspendedWait>) {
        self.push_frame(false, suspended);
    }

    /// 从子程序或宏返回
    ///
    /// 恢复游标、宏参数以及调用前的 if/for 栈深度。
    /// 返回弹出的帧，调用方据此处理跨文件返回与挂起的等待。
    pub fn return_from(&mut self) -> Result<CallFrame, TagError> {
        let frame = self
            .state
            .call_stack
            .pop()
            .ok_or_else(|| unbalanced("return 没有对应的 call"))?;
        self.state.if_stack.truncate(frame.if_depth);
        self.state.for_stack.truncate(frame.for_depth);
        self.state.macro_params = frame.caller_params.clone();
        self.state.current_macro = frame.return_macro.clone();
        self.state.cursor = frame.return_position;
        Ok(frame)
    }

    pub fn call_depth(&self) -> usize {
        self.state.call_stack.len()
    }

    // =========================================================================
    // if / elsif / else / endif
    // =========================================================================

    /// `if`：条件为真进入分支体，否则游标移到下一个分支
    pub fn if_jump(&mut self, condition: bool) -> Result<(), TagError> {
        self.state.if_stack.push(IfFrame { taken: condition });
        if !condition {
            self.skip_to_next_branch()?;
        }
        Ok(())
    }

    /// 当前 if 帧是否已有分支被选中
    pub fn branch_taken(&self) -> Result<bool, TagError> {
        self.state
            .if_stack
            .last()
            .map(|frame| frame.taken)
            .ok_or_else(|| unbalanced("elsif/else 没有对应的 if"))
    }

    /// `elsif` 求值后调用
    pub fn elsif_jump(&mut self, condition: bool) -> Result<(), TagError> {
        if condition {
            if let Some(frame) = self.state.if_stack.last_mut() {
                frame.taken = true;
            }
            Ok(())
        } else {
            self.skip_to_next_branch()
        }
    }

    /// `else`
    pub fn else_jump(&mut self) -> Result<(), TagError> {
        if self.branch_taken()? {
            return self.skip_to_endif();
        }
        if let Some(frame) = self.state.if_stack.last_mut() {
            frame.taken = true;
        }
        Ok(())
    }

    /// `endif`
    pub fn end_if(&mut self) -> Result<(), TagError> {
        self.state
            .if_stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| unbalanced("endif 没有对应的 if"))
    }

    /// 游标移到同层的下一个 elsif/else/endif（停在该指令上）
    fn skip_to_next_branch(&mut self) -> Result<(), TagError> {
        self.skip_in_if(&["elsif", "else", "endif"])
    }

    /// 游标移到同层的 endif（停在该指令上）
    pub fn skip_to_endif(&mut self) -> Result<(), TagError> {
        self.skip_in_if(&["endif"])
    }

    fn skip_in_if(&mut self, stops: &[&str]) -> Result<(), TagError> {
        let mut depth = 0usize;
        let tags = self.current_tags();
        for (position, tag) in tags.iter().enumerate().skip(self.state.cursor) {
            let name = tag.name.as_str();
            if name == "if" {
                depth += 1;
            } else if depth > 0 {
                if name == "endif" {
                    depth -= 1;
                }
            } else if stops.contains(&name) {
                self.state.cursor = position;
                return Ok(());
            }
        }
        Err(unbalanced("if 缺少对应的 endif"))
    }

    // =========================================================================
    // for / endfor / breakfor
    // =========================================================================

    /// `for`：压入循环帧并把索引变量置 0；次数不大于 0 时直接跳过循环体
    pub fn start_for_loop(
        &mut self,
        count: i64,
        index_var: &str,
        vars: &mut VariableStore,
    ) -> Result<(), TagError> {
        if count <= 0 {
            return self.skip_past_endfor();
        }
        self.state.for_stack.push(ForFrame {
            remaining: count,
            index: 0,
            index_var: index_var.to_string(),
            loop_start: self.state.cursor,
            if_depth: self.state.if_stack.len(),
        });
        vars.set(VarScope::Temp, index_var, 0i64);
        Ok(())
    }

    /// `endfor`：还有剩余次数则回到循环开头，否则弹出循环帧
    pub fn end_for_loop(&mut self, vars: &mut VariableStore) -> Result<(), TagError> {
        let frame = self
            .state
            .for_stack
            .last_mut()
            .ok_or_else(|| unbalanced("endfor 没有对应的 for"))?;
        frame.remaining -= 1;
        if frame.remaining > 0 {
            frame.index += 1;
            vars.set(VarScope::Temp, frame.index_var.clone(), frame.index);
            let (loop_start, if_depth) = (frame.loop_start, frame.if_depth);
            self.state.cursor = loop_start;
            self.state.if_stack.truncate(if_depth);
        } else {
            self.state.for_stack.pop();
        }
        Ok(())
    }

    /// `breakfor`：弹出循环帧并跳到对应 endfor 之后
    pub fn break_for_loop(&mut self) -> Result<(), TagError> {
        let frame = self
            .state
            .for_stack
            .pop()
            .ok_or_else(|| unbalanced("breakfor 不在 for 循环内"))?;
        self.state.if_stack.truncate(frame.if_depth);
        self.skip_past_endfor()
    }

    pub fn is_inside_of_for_loop(&self) -> bool {
        !self.state.for_stack.is_empty()
    }

    fn skip_past_endfor(&mut self) -> Result<(), TagError> {
        let mut depth = 0usize;
        let tags = self.current_tags();
        for (position, tag) in tags.iter().enumerate().skip(self.state.cursor) {
            match tag.name.as_str() {
                "for" => depth += 1,
                "endfor" if depth == 0 => {
                    self.state.cursor = position + 1;
                    return Ok(());
                }
                "endfor" => depth -= 1,
                _ => {}
            }
        }
        Err(unbalanced("for 缺少对应的 endfor"))
    }
}
