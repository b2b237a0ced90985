//! # 阶段 2：块解析
//!
//! 将块转换为 Tag 序列，同时建立标签与存档点索引。

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::script::{ParsedScript, SaveMarkInfo};
use crate::tag::Tag;
use crate::value::Value;

use super::helpers::{parse_object_params, parse_params};
use super::phase1::Block;

/// 阶段 2 解析器
#[derive(Default)]
pub struct Phase2Parser {
    tags: Vec<Tag>,
    labels: BTreeMap<String, usize>,
    save_marks: BTreeMap<String, SaveMarkInfo>,
    /// 自动编号的存档点计数
    auto_mark_count: usize,
}

impl Phase2Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析单个块
    pub fn parse_block(&mut self, block: Block) -> Result<(), ParseError> {
        match block {
            Block::SingleLine { line, line_number } => self.parse_single_line(&line, line_number),
            Block::Expression { source, start_line } => {
                self.tags
                    .push(Tag::new("eval", start_line).with("exp", source));
                Ok(())
            }
        }
    }

    /// 结束解析，追加隐式的 `s`
    pub fn finish(mut self, file_path: &str, last_line: usize) -> ParsedScript {
        self.tags.push(Tag::new("s", last_line));
        ParsedScript {
            file_path: file_path.to_string(),
            tags: self.tags,
            labels: self.labels,
            save_marks: self.save_marks,
        }
    }

    fn parse_single_line(&mut self, line: &str, line_number: usize) -> Result<(), ParseError> {
        let mut chars = line.chars();
        let Some(first) = chars.next() else {
            return Ok(());
        };
        let rest = chars.as_str();

        match first {
            '#' => Ok(()),
            ';' => self.parse_command(rest, line_number),
            '*' => self.parse_label(rest, line_number),
            '~' => self.parse_save_mark(rest, line_number),
            '-' => {
                self.tags
                    .push(Tag::new("eval", line_number).with("exp", rest.trim()));
                Ok(())
            }
            '=' => {
                self.tags
                    .push(Tag::new("embed", line_number).with("exp", rest.trim()));
                Ok(())
            }
            _ => {
                self.parse_text(line, line_number);
                Ok(())
            }
        }
    }

    /// `;name key: value ...` 或 `;name { ... }`
    fn parse_command(&mut self, rest: &str, line_number: usize) -> Result<(), ParseError> {
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '{')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if name.is_empty() {
            return Err(ParseError::InvalidLine {
                line: line_number,
                message: "指令名为空".to_string(),
            });
        }

        let args = rest[name_end..].trim();
        let values = if args.starts_with('{') {
            parse_object_params(args, line_number)?
        } else {
            parse_params(args, line_number)?
        };

        self.tags.push(Tag {
            name: name.to_lowercase(),
            values,
            line: line_number,
        });
        Ok(())
    }

    /// `*name`
    fn parse_label(&mut self, rest: &str, line_number: usize) -> Result<(), ParseError> {
        let name = rest.trim();
        if name.is_empty() {
            return Err(ParseError::InvalidLine {
                line: line_number,
                message: "标签名为空".to_string(),
            });
        }
        if self.labels.contains_key(name) {
            return Err(ParseError::DuplicateLabel {
                line: line_number,
                label: name.to_string(),
            });
        }
        self.labels.insert(name.to_string(), self.tags.len());
        self.tags
            .push(Tag::new("label", line_number).with("name", name));
        Ok(())
    }

    /// `~name|comment`，名称与注释均可省略
    fn parse_save_mark(&mut self, rest: &str, line_number: usize) -> Result<(), ParseError> {
        let (name, comment) = match rest.split_once('|') {
            Some((name, comment)) => (name.trim(), comment.trim()),
            None => (rest.trim(), ""),
        };

        let name = if name.is_empty() {
            let auto = format!("__save_mark_{}__", self.auto_mark_count);
            self.auto_mark_count += 1;
            auto
        } else {
            name.to_string()
        };

        if self.save_marks.contains_key(&name) {
            return Err(ParseError::DuplicateSaveMark {
                line: line_number,
                mark: name,
            });
        }

        self.save_marks.insert(
            name.clone(),
            SaveMarkInfo {
                position: self.tags.len(),
                comment: comment.to_string(),
            },
        );
        self.tags.push(
            Tag::new("savemark", line_number)
                .with("name", name)
                .with("comment", comment),
        );
        Ok(())
    }

    /// 文本行：每个字符一条 `ch`，行末一条 `br`
    fn parse_text(&mut self, line: &str, line_number: usize) {
        for c in line.chars() {
            self.tags.push(Tag {
                name: "ch".to_string(),
                values: BTreeMap::from([("text".to_string(), Value::String(c.to_string()))]),
                line: line_number,
            });
        }
        self.tags.push(Tag::new("br", line_number));
    }
}
