//! # 表达式解析器
//!
//! 递归下降解析器。优先级从低到高：
//!
//! ```text
//! 赋值      =  +=  -=  *=  /=
//! 三元      ?:
//! 逻辑或    ||  or
//! 逻辑与    &&  and
//! 相等      ==  !=  ===  !==
//! 比较      <  <=  >  >=
//! 加减      +  -
//! 乘除      *  /  %
//! 一元      !  not  -  +
//! 后缀      ++  --
//! ```
//!
//! 语句之间用 `;` 或换行分隔（括号内的换行被忽略）。

use super::{AssignOp, BinaryOp, Expr, PathSegment, Program, VarPath};
use crate::error::ExprError;
use crate::value::Value;

/// 解析单个表达式
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    let mut parser = ExprParser::new(input);
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(parser.error("空表达式"));
    }
    let expr = parser.parse_assignment()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error(format!(
            "表达式末尾存在无法解析的内容: '{}'",
            parser.remaining()
        )));
    }
    Ok(expr)
}

/// 解析语句序列
pub fn parse_program(input: &str) -> Result<Program, ExprError> {
    let mut parser = ExprParser::new(input);
    let mut statements = Vec::new();

    loop {
        parser.skip_separators();
        if parser.at_end() {
            break;
        }
        statements.push(parser.parse_assignment()?);
        parser.skip_whitespace();
        match parser.peek_char() {
            None => break,
            Some(';') | Some('\n') | Some('\r') => {}
            Some(c) => {
                return Err(parser.error(format!("语句之间缺少分隔符，意外字符: '{}'", c)));
            }
        }
    }

    Ok(Program { statements })
}

struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
    /// 括号嵌套深度，大于 0 时换行视为空白
    depth: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            source_text: self.input.trim().to_string(),
            message: message.into(),
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            let is_newline = c == '\n' || c == '\r';
            if c.is_whitespace() && (!is_newline || self.depth > 0) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn skip_separators(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || c == ';' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    /// 尝试消费一个运算符；`rejects` 中列出的更长运算符不会被误匹配
    fn eat(&mut self, op: &str, rejects: &[&str]) -> bool {
        self.skip_whitespace();
        let rest = self.remaining();
        if rest.starts_with(op) && !rejects.iter().any(|longer| rest.starts_with(longer)) {
            self.pos += op.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str) -> Result<(), ExprError> {
        if self.eat(op, &[]) {
            Ok(())
        } else {
            Err(self.error(format!("期望 '{}'", op)))
        }
    }

    /// 查看下一个标识符（不消费）
    fn peek_identifier(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.remaining();
        let first = rest.chars().next()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let end = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        Some(&rest[..end])
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_identifier() == Some(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn parse_identifier(&mut self) -> Result<&'a str, ExprError> {
        let ident = self
            .peek_identifier()
            .ok_or_else(|| self.error("期望标识符"))?;
        self.pos += ident.len();
        Ok(ident)
    }

    fn parse_assignment(&mut self) -> Result<Expr, ExprError> {
        let target = self.parse_conditional()?;

        let op = if self.eat("+=", &[]) {
            AssignOp::Add
        } else if self.eat("-=", &[]) {
            AssignOp::Sub
        } else if self.eat("*=", &[]) {
            AssignOp::Mul
        } else if self.eat("/=", &[]) {
            AssignOp::Div
        } else if self.eat("=", &["=="]) {
            AssignOp::Set
        } else {
            return Ok(target);
        };

        let Expr::Var(path) = target else {
            return Err(self.error("赋值目标必须是变量"));
        };
        let value = self.parse_assignment()?;
        Ok(Expr::Assign(op, path, Box::new(value)))
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if !self.eat("?", &[]) {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.expect(":")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat("||", &[]) || self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.eat("&&", &[]) || self.eat_keyword("and") {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.eat("===", &[]) {
                BinaryOp::StrictEq
            } else if self.eat("!==", &[]) {
                BinaryOp::StrictNotEq
            } else if self.eat("==", &[]) {
                BinaryOp::Eq
            } else if self.eat("!=", &[]) {
                BinaryOp::NotEq
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat("<=", &[]) {
                BinaryOp::Le
            } else if self.eat(">=", &[]) {
                BinaryOp::Ge
            } else if self.eat("<", &[]) {
                BinaryOp::Lt
            } else if self.eat(">", &[]) {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat("+", &["+=", "++"]) {
                BinaryOp::Add
            } else if self.eat("-", &["-=", "--"]) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat("*", &["*="]) {
                BinaryOp::Mul
            } else if self.eat("/", &["/="]) {
                BinaryOp::Div
            } else if self.eat("%", &[]) {
                BinaryOp::Rem
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat("!", &["!="]) || self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat("-", &["--", "-="]) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.eat("+", &["++", "+="]) {
            let inner = self.parse_unary()?;
            // 一元加号：转为数值
            return Ok(Expr::Binary(
                BinaryOp::Sub,
                Box::new(inner),
                Box::new(Expr::Literal(Value::Number(0.0))),
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_primary()?;
        let delta = if self.eat("++", &[]) {
            1.0
        } else if self.eat("--", &[]) {
            -1.0
        } else {
            return Ok(expr);
        };
        match expr {
            Expr::Var(path) => Ok(Expr::Update(path, delta)),
            _ => Err(self.error("自增/自减的目标必须是变量")),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        self.skip_whitespace();
        let c = self
            .peek_char()
            .ok_or_else(|| self.error("表达式意外结束"))?;

        match c {
            '(' => {
                self.consume_char();
                self.depth += 1;
                let expr = self.parse_assignment()?;
                self.expect(")")?;
                self.depth -= 1;
                Ok(expr)
            }
            '[' => {
                self.consume_char();
                self.depth += 1;
                let mut items = Vec::new();
                if !self.eat("]", &[]) {
                    loop {
                        items.push(self.parse_assignment()?);
                        if self.eat(",", &[]) {
                            continue;
                        }
                        self.expect("]")?;
                        break;
                    }
                }
                self.depth -= 1;
                Ok(Expr::Array(items))
            }
            '"' | '\'' => Ok(Expr::Literal(Value::String(self.parse_string_literal(c)?))),
            c if c.is_ascii_digit() || c == '.' => {
                Ok(Expr::Literal(Value::Number(self.parse_number()?)))
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.parse_identifier()?;
                match ident {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                    root => self.parse_path(root).map(Expr::Var),
                }
            }
            _ => Err(self.error(format!("无法解析表达式，意外字符: '{}'", c))),
        }
    }

    /// 解析变量路径（根标识符已消费）
    fn parse_path(&mut self, root: &str) -> Result<VarPath, ExprError> {
        if !self.eat(".", &[]) {
            return Err(self.error(format!(
                "变量 '{}' 缺少作用域前缀（tf./gf./sf./mp.）",
                root
            )));
        }
        let name = self.parse_identifier()?.to_string();
        let mut rest = Vec::new();

        loop {
            if self.eat(".", &[]) {
                rest.push(PathSegment::Field(self.parse_identifier()?.to_string()));
            } else if self.eat("[", &[]) {
                self.depth += 1;
                let index = self.parse_assignment()?;
                self.expect("]")?;
                self.depth -= 1;
                rest.push(PathSegment::Index(Box::new(index)));
            } else {
                break;
            }
        }

        Ok(VarPath {
            root: root.to_string(),
            name,
            rest,
        })
    }

    fn parse_string_literal(&mut self, quote: char) -> Result<String, ExprError> {
        self.consume_char();
        let mut out = String::new();

        while let Some(c) = self.consume_char() {
            match c {
                c if c == quote => return Ok(out),
                '\\' => match self.consume_char() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => break,
                },
                c => out.push(c),
            }
        }

        Err(self.error(format!("字符串字面量未闭合，缺少 '{}'", quote)))
    }

    fn parse_number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || (c == '.' && !seen_dot) {
                seen_dot |= c == '.';
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map_err(|_| self.error(format!("无法解析数字: '{}'", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(root: &str, name: &str) -> VarPath {
        VarPath {
            root: root.to_string(),
            name: name.to_string(),
            rest: vec![],
        }
    }

    #[test]
    fn test_parse_assignment_is_right_associative() {
        let expr = parse_expression("tf.a = tf.b = 1").unwrap();
        assert_eq!(
            expr,
            Expr::Assign(
                AssignOp::Set,
                var("tf", "a"),
                Box::new(Expr::Assign(
                    AssignOp::Set,
                    var("tf", "b"),
                    Box::new(Expr::Literal(Value::Number(1.0)))
                ))
            )
        );
    }

    #[test]
    fn test_parse_equality_not_assignment() {
        let expr = parse_expression("tf.a == 1").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Eq, _, _)));
    }

    #[test]
    fn test_parse_path_segments() {
        let expr = parse_expression("gf.items[0].name").unwrap();
        let Expr::Var(path) = expr else {
            panic!("expected var");
        };
        assert_eq!(path.root, "gf");
        assert_eq!(path.name, "items");
        assert_eq!(path.rest.len(), 2);
        assert_eq!(path.rest[1], PathSegment::Field("name".to_string()));
    }

    #[test]
    fn test_parse_program_separators() {
        let program = parse_program("tf.a = 1; tf.b = 2\n\n tf.c = (1 +\n 2)").unwrap();
        assert_eq!(program.statements.len(), 3);
        assert!(parse_program("").unwrap().statements.is_empty());
    }

    #[test]
    fn test_parse_string_escapes() {
        let expr = parse_expression(r#""a\"b;c""#).unwrap();
        assert_eq!(expr, Expr::Literal(Value::from("a\"b;c")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("foo").is_err());
        assert!(parse_expression("1 = 2").is_err());
        assert!(parse_expression("(1 + 2").is_err());
        assert!(parse_expression("'abc").is_err());
        assert!(parse_expression("1 2").is_err());
        assert!(parse_program("tf.a = 1 tf.b = 2").is_err());
    }
}
