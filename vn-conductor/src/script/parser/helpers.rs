//! # 辅助解析函数
//!
//! 指令参数的字面量解析：
//!
//! ```text
//! ;image lay: 0 file: "bg.png" visible: true
//! ;move { lay: 1, path: [[0, 0, 255], [100, 0, 255]], time: 500 }
//! ```
//!
//! 值可以是带引号的字符串、数字、`true`/`false`/`null`、`[..]` 数组、`{..}` 对象，
//! 或不含空白的裸字（按字符串处理）。

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::value::Value;

/// 解析 `key: value` 形式的参数列表
pub fn parse_params(text: &str, line: usize) -> Result<BTreeMap<String, Value>, ParseError> {
    let mut reader = ValueReader::new(text, line);
    let mut params = BTreeMap::new();

    loop {
        reader.skip_whitespace();
        if reader.at_end() {
            break;
        }
        let key = reader.read_key()?;
        reader.skip_whitespace();
        if !reader.eat(':') {
            return Err(reader.error(&key, "参数名后缺少 ':'"));
        }
        reader.skip_whitespace();
        let value = reader.read_value(&key, false)?;
        params.insert(key, value);
    }

    Ok(params)
}

/// 解析 `{ ... }` 对象字面量形式的参数
pub fn parse_object_params(
    text: &str,
    line: usize,
) -> Result<BTreeMap<String, Value>, ParseError> {
    let mut reader = ValueReader::new(text, line);
    reader.skip_whitespace();
    let value = reader.read_value("{}", true)?;
    reader.skip_whitespace();
    if !reader.at_end() {
        return Err(reader.error("{}", format!("对象字面量后存在多余内容: '{}'", reader.remaining())));
    }
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(reader.error("{}", "期望对象字面量")),
    }
}

/// 裸字分类：布尔、null、数字或字符串
fn classify_bare(word: &str) -> Value {
    match word {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    let looks_numeric = word
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
    if looks_numeric && let Ok(n) = word.parse::<f64>() {
        return Value::Number(n);
    }
    Value::String(word.to_string())
}

struct ValueReader<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> ValueReader<'a> {
    fn new(input: &'a str, line: usize) -> Self {
        Self {
            input,
            pos: 0,
            line,
        }
    }

    fn error(&self, param: &str, message: impl Into<String>) -> ParseError {
        ParseError::InvalidParameter {
            line: self.line,
            param: param.to_string(),
            message: message.into(),
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    /// 读取参数名 / 对象键
    fn read_key(&mut self) -> Result<String, ParseError> {
        if let Some(quote @ ('"' | '\'')) = self.peek() {
            return self.read_string(quote, "key");
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error(
                "key",
                format!("期望参数名，实际为 '{}'", self.remaining()),
            ));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn read_value(&mut self, key: &str, nested: bool) -> Result<Value, ParseError> {
        match self.peek() {
            None => Err(self.error(key, "缺少参数值")),
            Some(quote @ ('"' | '\'')) => self.read_string(quote, key).map(Value::String),
            Some('[') => self.read_array(key),
            Some('{') => self.read_object(key),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    let stop = c.is_whitespace() || (nested && matches!(c, ',' | ']' | '}'));
                    if stop {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
                if self.pos == start {
                    return Err(self.error(key, "缺少参数值"));
                }
                Ok(classify_bare(&self.input[start..self.pos]))
            }
        }
    }

    fn read_string(&mut self, quote: char, key: &str) -> Result<String, ParseError> {
        self.pos += quote.len_utf8();
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error(key, "字符串末尾存在悬空的转义符"))?;
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
        Err(self.error(key, format!("字符串字面量未闭合，缺少 '{}'", quote)))
    }

    fn read_array(&mut self, key: &str) -> Result<Value, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat(']') {
                return Ok(Value::Array(items));
            }
            if self.at_end() {
                return Err(self.error(key, "数组未闭合，缺少 ']'"));
            }
            items.push(self.read_value(key, true)?);
            self.skip_whitespace();
            if !self.eat(',') && self.peek() != Some(']') {
                return Err(self.error(key, "数组元素之间缺少 ','"));
            }
        }
    }

    fn read_object(&mut self, key: &str) -> Result<Value, ParseError> {
        self.pos += 1;
        let mut map = BTreeMap::new();
        loop {
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            if self.at_end() {
                return Err(self.error(key, "对象未闭合，缺少 '}'"));
            }
            let field = self.read_key()?;
            self.skip_whitespace();
            if !self.eat(':') {
                return Err(self.error(&field, "对象键后缺少 ':'"));
            }
            self.skip_whitespace();
            let value = self.read_value(&field, true)?;
            map.insert(field, value);
            self.skip_whitespace();
            if !self.eat(',') && self.peek() != Some('}') {
                return Err(self.error(key, "对象成员之间缺少 ','"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bare() {
        assert_eq!(classify_bare("12"), Value::Number(12.0));
        assert_eq!(classify_bare("-0.5"), Value::Number(-0.5));
        assert_eq!(classify_bare("true"), Value::Bool(true));
        assert_eq!(classify_bare("nan"), Value::from("nan"));
        assert_eq!(classify_bare("bg.png"), Value::from("bg.png"));
        assert_eq!(classify_bare("-"), Value::from("-"));
    }
}
