//! 按钮指令

use super::{cont, layer_params, target_layers, target_layers_or};
use crate::error::VnResult;
use crate::layer::{Button, ButtonKind, ButtonTarget};
use crate::runtime::{Engine, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

fn button_params(content: TagValue) -> Vec<TagValue> {
    let mut params = layer_params(true);
    params.extend([
        content,
        TagValue::with_default("x", ValueType::Number, 0.0),
        TagValue::with_default("y", ValueType::Number, 0.0),
        TagValue::optional("width", ValueType::Number),
        TagValue::optional("height", ValueType::Number),
        TagValue::with_default("call", ValueType::Boolean, false),
        TagValue::optional("file", ValueType::String),
        TagValue::optional("label", ValueType::String),
        TagValue::optional("exp", ValueType::StringOrCallback),
        TagValue::with_default("system", ValueType::Boolean, false),
    ]);
    params
}

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(
            &["textbutton", "txtbtn"],
            button_params(TagValue::required("text", ValueType::String)),
            text_button,
        ),
        TagAction::new(
            &["imagebutton", "imgbtn"],
            button_params(TagValue::required("image", ValueType::String)),
            image_button,
        ),
        TagAction::new(&["clearbuttons"], layer_params(false), |e, args, _| {
            for_buttons(e, args, |b| b.clear())
        }),
        TagAction::new(&["lockbuttons"], layer_params(false), |e, args, _| {
            for_buttons(e, args, |b| b.locked = true)
        }),
        TagAction::new(&["unlockbuttons"], layer_params(false), |e, args, _| {
            for_buttons(e, args, |b| b.locked = false)
        }),
        TagAction::new(&["locksystembuttons"], layer_params(false), |e, args, _| {
            for_buttons(e, args, |b| b.system_locked = true)
        }),
        TagAction::new(&["unlocksystembuttons"], layer_params(false), |e, args, _| {
            for_buttons(e, args, |b| b.system_locked = false)
        }),
        TagAction::new(&["waitbutton"], vec![], |e, _, _| {
            Ok(e.wait_for(events::BUTTON, "waitbutton"))
        }),
    ]
}

fn read_target(args: &TagArgs) -> ButtonTarget {
    ButtonTarget {
        call: args.flag("call"),
        file: args.opt_string("file").map(str::to_string),
        label: args.opt_string("label").map(str::to_string),
        exp: args.opt_callback("exp").map(str::to_string),
    }
}

fn add_button(engine: &mut Engine, args: &TagArgs, kind: ButtonKind, size: (f64, f64)) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let button = Button {
        kind,
        x: args.opt_number("x").unwrap_or(0.0),
        y: args.opt_number("y").unwrap_or(0.0),
        width: args.opt_number("width").unwrap_or(size.0),
        height: args.opt_number("height").unwrap_or(size.1),
        target: read_target(args),
        system: args.flag("system"),
    };
    for index in layers {
        let layer = engine.layer_mut(page, index)?;
        layer.buttons.add(button.clone());
        layer.visible = true;
    }
    cont()
}

fn text_button(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let text = args.string("text")?.to_string();
    add_button(engine, args, ButtonKind::Text { text }, (0.0, 0.0))
}

/// 图片按钮；尺寸缺省取已加载图片的尺寸
fn image_button(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let file = args.string("image")?.to_string();
    let size = engine
        .resources
        .get(&file)
        .map(|info| (info.width as f64, info.height as f64))
        .unwrap_or_default();
    add_button(engine, args, ButtonKind::Image { file }, size)
}

/// 对选中图层（缺省为全部）的按钮执行操作
fn for_buttons(
    engine: &mut Engine,
    args: &TagArgs,
    mut f: impl FnMut(&mut crate::layer::ButtonComponent),
) -> VnResult<TagResult> {
    let (page, layers) = target_layers_or(engine, args, "all")?;
    for index in layers {
        f(&mut engine.layer_mut(page, index)?.buttons);
    }
    cont()
}
