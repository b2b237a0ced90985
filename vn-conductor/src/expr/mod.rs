//! # 表达式模块
//!
//! 脚本中的实体（`&expr`）、条件（`if exp:`）、`-expr`/`=expr` 行以及 `---` 块
//! 都使用这一套表达式语言求值。
//!
//! ## 设计原则
//!
//! - 语法刻意保持小巧：算术、比较、逻辑、三元、变量读写
//! - 变量必须带作用域前缀（`tf.`/`gf.`/`sf.`/`mp.`），通过 [`EvalContext`] 显式访问
//! - 未定义的变量求值为 `null`
//! - 求值是**确定性**的，不依赖 IO 或真实时间
//!
//! ## 模块结构
//!
//! - `parser`：词法 + 递归下降语法分析

mod parser;

pub use parser::{parse_expression, parse_program};

use std::cmp::Ordering;

use crate::error::ExprError;
use crate::value::Value;

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// 赋值运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// 变量路径中的一段
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// `.name`
    Field(String),
    /// `[expr]`
    Index(Box<Expr>),
}

/// 变量路径
///
/// `tf.items[0].name` → root=`tf`，name=`items`，rest=`[Index(0), Field(name)]`
#[derive(Debug, Clone, PartialEq)]
pub struct VarPath {
    pub root: String,
    pub name: String,
    pub rest: Vec<PathSegment>,
}

/// 表达式 AST 节点
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 字面量
    Literal(Value),
    /// 数组字面量
    Array(Vec<Expr>),
    /// 变量引用
    Var(VarPath),
    /// 逻辑非
    Not(Box<Expr>),
    /// 取负
    Neg(Box<Expr>),
    /// 二元运算
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// 逻辑与（短路）
    And(Box<Expr>, Box<Expr>),
    /// 逻辑或（短路）
    Or(Box<Expr>, Box<Expr>),
    /// 三元条件
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// 赋值，返回新值
    Assign(AssignOp, VarPath, Box<Expr>),
    /// 后置自增/自减，返回旧值
    Update(VarPath, f64),
}

/// 语句序列（`;` 或换行分隔）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Expr>,
}

/// 表达式求值上下文
///
/// 提供按作用域前缀的变量读写能力。
pub trait EvalContext {
    /// 读取变量（未定义返回 `Ok(None)`，未知作用域返回错误）
    fn get_var(&self, root: &str, name: &str) -> Result<Option<&Value>, ExprError>;

    /// 写入变量
    fn set_var(&mut self, root: &str, name: &str, value: Value) -> Result<(), ExprError>;
}

/// 解析后的路径键
enum Key {
    Field(String),
    Index(usize),
}

/// 对表达式求值
pub fn evaluate<C: EvalContext + ?Sized>(expr: &Expr, ctx: &mut C) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(evaluate(item, ctx)?);
            }
            Ok(Value::Array(values))
        }

        Expr::Var(path) => read_path(path, ctx),

        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, ctx)?.is_truthy())),

        Expr::Neg(inner) => {
            let value = evaluate(inner, ctx)?;
            let n = value.to_number().ok_or_else(|| ExprError::TypeMismatch {
                message: format!("无法对 {} 取负", value.type_name()),
            })?;
            Ok(Value::Number(-n))
        }

        Expr::Binary(op, left, right) => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            apply_binary(*op, &left, &right)
        }

        Expr::And(left, right) => {
            let left = evaluate(left, ctx)?;
            // 短路求值
            if !left.is_truthy() {
                return Ok(left);
            }
            evaluate(right, ctx)
        }

        Expr::Or(left, right) => {
            let left = evaluate(left, ctx)?;
            if left.is_truthy() {
                return Ok(left);
            }
            evaluate(right, ctx)
        }

        Expr::Conditional(cond, then, otherwise) => {
            if evaluate(cond, ctx)?.is_truthy() {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }

        Expr::Assign(op, path, value) => {
            let rhs = evaluate(value, ctx)?;
            let new_value = match op {
                AssignOp::Set => rhs,
                AssignOp::Add => apply_binary(BinaryOp::Add, &read_path(path, ctx)?, &rhs)?,
                AssignOp::Sub => apply_binary(BinaryOp::Sub, &read_path(path, ctx)?, &rhs)?,
                AssignOp::Mul => apply_binary(BinaryOp::Mul, &read_path(path, ctx)?, &rhs)?,
                AssignOp::Div => apply_binary(BinaryOp::Div, &read_path(path, ctx)?, &rhs)?,
            };
            write_path(path, new_value.clone(), ctx)?;
            Ok(new_value)
        }

        Expr::Update(path, delta) => {
            let old = read_path(path, ctx)?;
            let n = old.to_number().ok_or_else(|| ExprError::TypeMismatch {
                message: format!("无法对 {} 自增/自减", old.type_name()),
            })?;
            write_path(path, Value::Number(n + delta), ctx)?;
            Ok(Value::Number(n))
        }
    }
}

/// 执行语句序列，返回最后一条语句的值
pub fn run_program<C: EvalContext + ?Sized>(
    program: &Program,
    ctx: &mut C,
) -> Result<Value, ExprError> {
    let mut last = Value::Null;
    for statement in &program.statements {
        last = evaluate(statement, ctx)?;
    }
    Ok(last)
}

/// 解析并执行一段表达式源码
pub fn eval_str<C: EvalContext + ?Sized>(source: &str, ctx: &mut C) -> Result<Value, ExprError> {
    let program = parse_program(source)?;
    run_program(&program, ctx)
}

/// 解析并求值条件表达式
pub fn eval_condition<C: EvalContext + ?Sized>(
    source: &str,
    ctx: &mut C,
) -> Result<bool, ExprError> {
    Ok(eval_str(source, ctx)?.is_truthy())
}

fn resolve_keys<C: EvalContext + ?Sized>(
    segments: &[PathSegment],
    ctx: &mut C,
) -> Result<Vec<Key>, ExprError> {
    let mut keys = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            PathSegment::Field(name) => keys.push(Key::Field(name.clone())),
            PathSegment::Index(expr) => match evaluate(expr, ctx)? {
                Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => keys.push(Key::Index(n as usize)),
                Value::String(s) => keys.push(Key::Field(s)),
                other => {
                    return Err(ExprError::TypeMismatch {
                        message: format!("无效的下标类型 {}", other.type_name()),
                    });
                }
            },
        }
    }
    Ok(keys)
}

fn read_path<C: EvalContext + ?Sized>(path: &VarPath, ctx: &mut C) -> Result<Value, ExprError> {
    let keys = resolve_keys(&path.rest, ctx)?;
    let mut current = ctx
        .get_var(&path.root, &path.name)?
        .cloned()
        .unwrap_or_default();
    for key in keys {
        current = match (key, current) {
            (Key::Field(name), Value::Object(mut map)) => map.remove(&name).unwrap_or_default(),
            (Key::Field(name), Value::Array(items)) if name == "length" => {
                Value::Number(items.len() as f64)
            }
            (Key::Field(name), Value::String(s)) if name == "length" => {
                Value::Number(s.chars().count() as f64)
            }
            (Key::Index(index), Value::Array(mut items)) if index < items.len() => {
                items.swap_remove(index)
            }
            _ => Value::Null,
        };
    }
    Ok(current)
}

fn write_path<C: EvalContext + ?Sized>(
    path: &VarPath,
    value: Value,
    ctx: &mut C,
) -> Result<(), ExprError> {
    if path.rest.is_empty() {
        return ctx.set_var(&path.root, &path.name, value);
    }
    let keys = resolve_keys(&path.rest, ctx)?;
    let mut root = ctx
        .get_var(&path.root, &path.name)?
        .cloned()
        .unwrap_or_default();
    assign_into(&mut root, &keys, value)?;
    ctx.set_var(&path.root, &path.name, root)
}

fn assign_into(target: &mut Value, keys: &[Key], value: Value) -> Result<(), ExprError> {
    let Some((first, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };
    match first {
        Key::Field(name) => {
            if target.is_null() {
                *target = Value::Object(Default::default());
            }
            let Value::Object(map) = target else {
                return Err(ExprError::InvalidTarget {
                    message: format!("无法在 {} 上设置字段 '{}'", target.type_name(), name),
                });
            };
            let slot = map.entry(name.clone()).or_default();
            assign_into(slot, rest, value)
        }
        Key::Index(index) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return Err(ExprError::InvalidTarget {
                    message: format!("无法在 {} 上设置下标 {}", target.type_name(), index),
                });
            };
            if *index >= items.len() {
                items.resize(*index + 1, Value::Null);
            }
            assign_into(&mut items[*index], rest, value)
        }
    }
}

/// 宽松相等：数字与数字字符串视为相等
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::String(s)) | (Value::String(s), Value::Number(a)) => {
            s.trim().parse::<f64>().map(|b| b == *a).unwrap_or(false)
        }
        (Value::Bool(b), Value::Number(n)) | (Value::Number(n), Value::Bool(b)) => {
            (if *b { 1.0 } else { 0.0 }) == *n
        }
        _ => left == right,
    }
}

fn numbers(op: &str, left: &Value, right: &Value) -> Result<(f64, f64), ExprError> {
    match (left.to_number(), right.to_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ExprError::TypeMismatch {
            message: format!(
                "运算 '{}' 不支持 {} 与 {}",
                op,
                left.type_name(),
                right.type_name()
            ),
        }),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ExprError> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    let (a, b) = numbers("比较", left, right)?;
    Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let value = match op {
        BinaryOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::String(format!("{}{}", left, right))
            } else {
                let (a, b) = numbers("+", left, right)?;
                Value::Number(a + b)
            }
        }
        BinaryOp::Sub => {
            let (a, b) = numbers("-", left, right)?;
            Value::Number(a - b)
        }
        BinaryOp::Mul => {
            let (a, b) = numbers("*", left, right)?;
            Value::Number(a * b)
        }
        BinaryOp::Div => {
            let (a, b) = numbers("/", left, right)?;
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Value::Number(a / b)
        }
        BinaryOp::Rem => {
            let (a, b) = numbers("%", left, right)?;
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Value::Number(a % b)
        }
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(left == right),
        BinaryOp::StrictNotEq => Value::Bool(left != right),
        BinaryOp::Lt => Value::Bool(compare(left, right)? == Ordering::Less),
        BinaryOp::Le => Value::Bool(compare(left, right)? != Ordering::Greater),
        BinaryOp::Gt => Value::Bool(compare(left, right)? == Ordering::Greater),
        BinaryOp::Ge => Value::Bool(compare(left, right)? != Ordering::Less),
    };
    Ok(value)
}
