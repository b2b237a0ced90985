//! # Parser 测试
//!
//! 行语法、参数字面量、索引与错误报告。

use super::*;
use crate::tag::Tag;
use crate::value::Value;
use std::collections::BTreeMap;

fn names(script: &ParsedScript) -> Vec<&str> {
    script.tags.iter().map(|t| t.name.as_str()).collect()
}

// -------------------------------------------------------------------------
// 行语法
// -------------------------------------------------------------------------

#[test]
fn test_text_line_expands_to_ch_and_br() {
    let script = parse_script("main.txt", "你好").unwrap();
    assert_eq!(names(&script), vec!["ch", "ch", "br", "s"]);
    assert_eq!(script.tags[0], Tag::new("ch", 1).with("text", "你"));
    assert_eq!(script.tags[1], Tag::new("ch", 1).with("text", "好"));
}

#[test]
fn test_implicit_trailing_stop() {
    let script = parse_script("main.txt", "").unwrap();
    assert_eq!(names(&script), vec!["s"]);

    let script = parse_script("main.txt", ";wait time: 10\n\n").unwrap();
    assert_eq!(names(&script), vec!["wait", "s"]);
}

#[test]
fn test_comments_and_indentation() {
    let text = "# 注释\n    ;wait time: 10\n\t# 缩进的注释\n";
    let script = parse_script("main.txt", text).unwrap();
    assert_eq!(names(&script), vec!["wait", "s"]);
    assert_eq!(script.tags[0].line, 2);
}

#[test]
fn test_eval_and_embed_lines() {
    let script = parse_script("main.txt", "-tf.a = 1\n=tf.a + 1\n").unwrap();
    assert_eq!(script.tags[0], Tag::new("eval", 1).with("exp", "tf.a = 1"));
    assert_eq!(script.tags[1], Tag::new("embed", 2).with("exp", "tf.a + 1"));
}

#[test]
fn test_expression_block() {
    let text = "---\ntf.a = 1\ntf.b = 2\n---\n;s\n";
    let script = parse_script("main.txt", text).unwrap();
    assert_eq!(
        script.tags[0],
        Tag::new("eval", 1).with("exp", "tf.a = 1\ntf.b = 2")
    );
    assert_eq!(names(&script), vec!["eval", "s", "s"]);
}

#[test]
fn test_unterminated_expression_block() {
    let err = parse_script("main.txt", ";s\n---\ntf.a = 1\n").unwrap_err();
    assert_eq!(err, ParseError::UnterminatedBlock { line: 2 });
}

// -------------------------------------------------------------------------
// 指令参数
// -------------------------------------------------------------------------

#[test]
fn test_command_key_value_params() {
    let script = parse_script(
        "main.txt",
        r#";image lay: 0 file: "bg 1.png" visible: true page: back"#,
    )
    .unwrap();
    let tag = &script.tags[0];
    assert_eq!(tag.name, "image");
    assert_eq!(tag.get("lay"), Some(&Value::Number(0.0)));
    assert_eq!(tag.get("file"), Some(&Value::from("bg 1.png")));
    assert_eq!(tag.get("visible"), Some(&Value::Bool(true)));
    assert_eq!(tag.get("page"), Some(&Value::from("back")));
}

#[test]
fn test_command_object_params() {
    let script = parse_script(
        "main.txt",
        ";move { lay: 1, time: 500, path: [[0, 0, 1], [100, 50, 0.5]], ease: 'both' }",
    )
    .unwrap();
    let tag = &script.tags[0];
    assert_eq!(tag.name, "move");
    assert_eq!(tag.get("time"), Some(&Value::Number(500.0)));
    assert_eq!(tag.get("ease"), Some(&Value::from("both")));
    assert_eq!(
        tag.get("path"),
        Some(&Value::Array(vec![
            Value::Array(vec![Value::Number(0.0), Value::Number(0.0), Value::Number(1.0)]),
            Value::Array(vec![
                Value::Number(100.0),
                Value::Number(50.0),
                Value::Number(0.5)
            ]),
        ]))
    );
}

#[test]
fn test_nested_object_value() {
    let params = parse_params(r#"opt: { a: 1, "b c": [x, y] }"#, 1).unwrap();
    let expected = Value::Object(BTreeMap::from([
        ("a".to_string(), Value::Number(1.0)),
        (
            "b c".to_string(),
            Value::Array(vec![Value::from("x"), Value::from("y")]),
        ),
    ]));
    assert_eq!(params.get("opt"), Some(&expected));
}

#[test]
fn test_command_name_is_lowercased() {
    let script = parse_script("main.txt", ";WaitClick").unwrap();
    assert_eq!(script.tags[0].name, "waitclick");
}

#[test]
fn test_entity_values_stay_strings() {
    let script = parse_script("main.txt", ";wait time: &tf.t*2").unwrap();
    assert_eq!(script.tags[0].get("time"), Some(&Value::from("&tf.t*2")));
}

#[test]
fn test_param_errors() {
    let err = parse_script("main.txt", ";s\n;wait time 10").unwrap_err();
    assert!(matches!(err, ParseError::InvalidParameter { line: 2, .. }));

    let err = parse_script("main.txt", r#";ch text: "abc"#).unwrap_err();
    assert!(matches!(err, ParseError::InvalidParameter { line: 1, .. }));

    let err = parse_script("main.txt", ";move { lay: 1").unwrap_err();
    assert!(matches!(err, ParseError::InvalidParameter { .. }));

    let err = parse_script("main.txt", "; time: 1").unwrap_err();
    assert!(matches!(err, ParseError::InvalidParameter { .. }));
}

#[test]
fn test_empty_command_name() {
    let err = parse_script("main.txt", ";").unwrap_err();
    assert!(matches!(err, ParseError::InvalidLine { line: 1, .. }));
}

// -------------------------------------------------------------------------
// 标签与存档点
// -------------------------------------------------------------------------

#[test]
fn test_label_index() {
    let script = parse_script("main.txt", "A\n*start\nB\n").unwrap();
    assert_eq!(script.label_position("start"), Some(2));
    assert_eq!(script.label_position("*start"), Some(2));
    assert_eq!(script.tags[2], Tag::new("label", 2).with("name", "start"));
}

#[test]
fn test_duplicate_label() {
    let err = parse_script("main.txt", "*a\n*a\n").unwrap_err();
    assert_eq!(
        err,
        ParseError::DuplicateLabel {
            line: 2,
            label: "a".to_string()
        }
    );
}

#[test]
fn test_save_mark_names_and_comments() {
    let text = "~first|序章\n~|无名\n~\n~named\n";
    let script = parse_script("main.txt", text).unwrap();

    let marks: Vec<(&str, &str)> = script
        .save_marks
        .iter()
        .map(|(name, info)| (name.as_str(), info.comment.as_str()))
        .collect();
    assert_eq!(
        marks,
        vec![
            ("__save_mark_0__", "无名"),
            ("__save_mark_1__", ""),
            ("first", "序章"),
            ("named", ""),
        ]
    );
    assert_eq!(script.save_marks["first"].position, 0);
    assert_eq!(
        script.tags[1],
        Tag::new("savemark", 2)
            .with("name", "__save_mark_0__")
            .with("comment", "无名")
    );
}

#[test]
fn test_duplicate_save_mark() {
    let err = parse_script("main.txt", "~a\n~a|again\n").unwrap_err();
    assert!(matches!(err, ParseError::DuplicateSaveMark { line: 2, .. }));
}
