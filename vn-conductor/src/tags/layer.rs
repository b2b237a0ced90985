//! 图层指令

use super::{cont, layer_params, target_layers, target_layers_or, target_page};
use crate::error::VnResult;
use crate::layer::Layer;
use crate::runtime::Engine;
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

/// 图层属性参数
fn prop_params() -> Vec<TagValue> {
    vec![
        TagValue::optional("visible", ValueType::Boolean),
        TagValue::optional("x", ValueType::Number),
        TagValue::optional("y", ValueType::Number),
        TagValue::optional("width", ValueType::Number),
        TagValue::optional("height", ValueType::Number),
        TagValue::optional("alpha", ValueType::Number),
    ]
}

pub fn tags() -> Vec<TagAction> {
    let with_props = |extra: Vec<TagValue>| {
        let mut params = layer_params(true);
        params.extend(prop_params());
        params.extend(extra);
        params
    };

    vec![
        TagAction::new(&["layopt", "layerparam"], with_props(vec![]), layopt),
        TagAction::new(
            &["image", "loadimage"],
            with_props(vec![TagValue::required("file", ValueType::String)]),
            image,
        ),
        TagAction::new(&["freeimage"], layer_params(true), freeimage),
        TagAction::new(&["freelayer"], layer_params(true), freelayer),
        TagAction::new(&["backlay"], layer_params(false), backlay),
        TagAction::new(
            &["currentpage"],
            vec![TagValue::required("page", ValueType::String)],
            |e, args, _| {
                e.flags.current_page = target_page(e, args)?;
                cont()
            },
        ),
    ]
}

fn apply_props(layer: &mut Layer, args: &TagArgs) -> VnResult<()> {
    if let Some(visible) = args.opt_bool("visible") {
        layer.visible = visible;
    }
    if let Some(x) = args.opt_number("x") {
        layer.x = x;
    }
    if let Some(y) = args.opt_number("y") {
        layer.y = y;
    }
    if let Some(width) = args.opt_number("width") {
        layer.width = width;
    }
    if let Some(height) = args.opt_number("height") {
        layer.height = height;
    }
    if let Some(alpha) = args.opt_number("alpha") {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(args.error("alpha", format!("alpha 必须在 0-1 之间: {}", alpha)).into());
        }
        layer.alpha = alpha;
    }
    Ok(())
}

fn layopt(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    for index in layers {
        apply_props(engine.layer_mut(page, index)?, args)?;
    }
    cont()
}

/// 载入图片；未缓存时等待加载完成
fn image(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let file = args.string("file")?;
    let mut result = TagResult::Continue;
    for index in layers {
        apply_props(engine.layer_mut(page, index)?, args)?;
        if engine.request_layer_image(page, index, file)? == TagResult::Break {
            result = TagResult::Break;
        }
    }
    Ok(result)
}

fn freeimage(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    for index in layers {
        engine.layer_mut(page, index)?.free_image();
    }
    cont()
}

/// 释放图层的全部内容并恢复初始状态
fn freelayer(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    for index in layers {
        let layer = engine.layer_mut(page, index)?;
        *layer = Layer::new(std::mem::take(&mut layer.name));
    }
    cont()
}

/// 把表页复制到里页；缺省为全部图层
fn backlay(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (_, layers) = target_layers_or(engine, args, "all")?;
    engine.pages.backlay(&layers);
    cont()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_apply_props_rejects_bad_alpha() {
        let mut layer = Layer::new("0");
        let args = TagArgs::new(
            "layopt",
            [("alpha".to_string(), Value::Number(2.0)), ("x".to_string(), Value::Number(10.0))]
                .into_iter()
                .collect(),
        );
        assert!(apply_props(&mut layer, &args).is_err());

        let args = TagArgs::new(
            "layopt",
            [("alpha".to_string(), Value::Number(0.5)), ("visible".to_string(), Value::Bool(true))]
                .into_iter()
                .collect(),
        );
        apply_props(&mut layer, &args).unwrap();
        assert_eq!(layer.alpha, 0.5);
        assert!(layer.visible);
    }
}
