//! 存档指令

use super::cont;
use crate::error::VnResult;
use crate::runtime::Engine;
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

fn slot(args: &TagArgs, name: &str) -> VnResult<u32> {
    let n = args.count(name)?;
    u32::try_from(n).map_err(|_| args.error(name, format!("槽位编号过大: {}", n)).into())
}

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(
            &["save"],
            vec![
                TagValue::required("num", ValueType::Number),
                TagValue::optional("screenshot", ValueType::String),
            ],
            |e, args, _| {
                let screenshot = args.opt_string("screenshot").map(str::to_string);
                e.save(slot(args, "num")?, screenshot)?;
                cont()
            },
        ),
        TagAction::new(
            &["load"],
            vec![TagValue::required("num", ValueType::Number)],
            |e, args, tick| {
                e.load(slot(args, "num")?, tick)?;
                Ok(TagResult::Break)
            },
        ),
        TagAction::new(
            &["tempsave"],
            vec![TagValue::required("num", ValueType::Number)],
            |e, args, tick| {
                e.temp_save(slot(args, "num")?, tick);
                cont()
            },
        ),
        TagAction::new(
            &["tempload"],
            vec![
                TagValue::required("num", ValueType::Number),
                TagValue::with_default("sound", ValueType::Boolean, false),
                TagValue::with_default("toback", ValueType::Boolean, false),
            ],
            temp_load,
        ),
        TagAction::new(
            &["copysave"],
            vec![
                TagValue::required("src", ValueType::Number),
                TagValue::required("dest", ValueType::Number),
            ],
            |e, args, _| {
                e.copy_save(slot(args, "src")?, slot(args, "dest")?)?;
                cont()
            },
        ),
        TagAction::new(
            &["deletesave"],
            vec![TagValue::required("num", ValueType::Number)],
            |e, args, _| {
                e.delete_save(slot(args, "num")?)?;
                cont()
            },
        ),
    ]
}

/// 恢复完成后 `load` 事件让 Conductor 继续
fn temp_load(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let num = slot(args, "num")?;
    engine.temp_load(num, args.flag("sound"), args.flag("toback"), tick)?;
    Ok(TagResult::Break)
}
