//! 文字与消息图层指令

use super::{cont, layer_params, target_layers_or};
use crate::error::VnResult;
use crate::layer::GlyphState;
use crate::runtime::{CH_OWNER, Engine, HandlerAction};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(
            &["ch"],
            vec![TagValue::required("text", ValueType::String)],
            ch,
        ),
        TagAction::new(&["br"], vec![], br),
        TagAction::new(&["clear", "cm"], layer_params(false), clear),
        TagAction::new(&["l"], vec![], |e, _, _| {
            e.set_glyph(GlyphState::Line);
            Ok(e.wait_click("l", HandlerAction::StartHidingGlyph))
        }),
        TagAction::new(&["p"], vec![], |e, _, _| {
            e.set_glyph(GlyphState::Page);
            Ok(e.wait_click("p", HandlerAction::PageBreak))
        }),
        TagAction::new(
            &["messagelayer", "meslay"],
            vec![TagValue::required("lay", ValueType::String)],
            messagelayer,
        ),
        TagAction::new(
            &["textspeed", "delay"],
            vec![TagValue::required("speed", ValueType::Number)],
            textspeed,
        ),
        TagAction::new(&["nowait"], vec![], |e, _, _| {
            e.flags.nowait = true;
            cont()
        }),
        TagAction::new(&["endnowait"], vec![], |e, _, _| {
            e.flags.nowait = false;
            cont()
        }),
    ]
}

/// 输出一个字符；逐字显示时睡眠 `text_speed`
fn ch(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let text = args.string("text")?;
    engine.message_layer_mut()?.text.push_char(text);
    if engine.flags.history_output {
        engine.history.push_text(text);
    }

    let speed = engine.flags.text_speed;
    if speed == 0 || engine.is_skipping_text() {
        return cont();
    }
    engine.conductor.sleep(tick, speed, CH_OWNER);
    Ok(TagResult::Break)
}

fn br(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.message_layer_mut()?.text.line_break();
    if engine.flags.history_output {
        engine.history.line_break();
    }
    cont()
}

/// 清除文字；缺省为消息图层
fn clear(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers_or(engine, args, "message")?;
    for index in layers {
        engine.layer_mut(page, index)?.text.clear();
    }
    if engine.flags.history_output {
        engine.history.page_break();
    }
    cont()
}

fn messagelayer(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (_, layers) = target_layers_or(engine, args, "message")?;
    match layers.as_slice() {
        [index] => {
            engine.flags.message_layer = *index;
            cont()
        }
        _ => Err(args.error("lay", "消息图层只能指定一个").into()),
    }
}

fn textspeed(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.flags.text_speed = args.count("speed")?;
    cont()
}
