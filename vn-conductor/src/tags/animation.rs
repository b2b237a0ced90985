//! 移动与帧动画指令

use super::{cont, layer_params, target_layers, wait_event};
use crate::error::{TagError, VnResult};
use crate::layer::{AnimFrame, EaseMode, Layer, MoveKind, MovePoint, PageSide};
use crate::runtime::{Engine, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::{Value, ValueType};

pub fn tags() -> Vec<TagAction> {
    let with_layer = |extra: Vec<TagValue>| {
        let mut params = layer_params(true);
        params.extend(extra);
        params
    };

    vec![
        TagAction::new(
            &["move", "startmove"],
            with_layer(vec![
                TagValue::required("path", ValueType::Array),
                TagValue::required("time", ValueType::Number),
                TagValue::with_default("delay", ValueType::Number, 0.0),
                TagValue::with_default("type", ValueType::String, "linear"),
                TagValue::with_default("ease", ValueType::String, "none"),
                TagValue::with_default("loop", ValueType::Boolean, false),
            ]),
            start_move,
        ),
        TagAction::new(&["stopmove"], layer_params(false), stop_move),
        TagAction::new(
            &["waitmove"],
            vec![TagValue::with_default("canskip", ValueType::Boolean, true)],
            wait_move,
        ),
        TagAction::new(
            &["frameanim", "startframeanim"],
            with_layer(vec![
                TagValue::required("frames", ValueType::Array),
                TagValue::required("time", ValueType::Number),
                TagValue::with_default("loop", ValueType::Boolean, false),
            ]),
            start_frame_anim,
        ),
        TagAction::new(&["stopframeanim"], layer_params(false), stop_frame_anim),
        TagAction::new(
            &["waitframeanim"],
            vec![TagValue::with_default("canskip", ValueType::Boolean, true)],
            wait_frame_anim,
        ),
    ]
}

/// 读取坐标点：`[x, y]`、`[x, y, alpha]` 或 `{x: .., y: .., alpha: ..}`
fn read_point(value: &Value) -> Option<(f64, f64, Option<f64>)> {
    match value {
        Value::Array(items) => {
            let x = items.first()?.to_number()?;
            let y = items.get(1)?.to_number()?;
            let alpha = items.get(2).and_then(Value::to_number);
            Some((x, y, alpha))
        }
        Value::Object(_) => {
            let x = value.field("x")?.to_number()?;
            let y = value.field("y")?.to_number()?;
            let alpha = value.field("alpha").and_then(Value::to_number);
            Some((x, y, alpha))
        }
        _ => None,
    }
}

/// 解析移动路径；省略的 alpha 沿用上一个点
fn parse_path(args: &TagArgs, start_alpha: f64) -> Result<Vec<MovePoint>, TagError> {
    let items = args.opt_array("path").unwrap_or_default();
    if items.is_empty() {
        return Err(args.error("path", "路径不能为空"));
    }
    let mut alpha = start_alpha;
    items
        .iter()
        .map(|item| {
            let (x, y, a) = read_point(item)
                .ok_or_else(|| args.error("path", format!("无效的路径点: {}", item)))?;
            alpha = a.unwrap_or(alpha);
            Ok(MovePoint::new(x, y, alpha))
        })
        .collect()
}

fn parse_frames(args: &TagArgs) -> Result<Vec<AnimFrame>, TagError> {
    let items = args.opt_array("frames").unwrap_or_default();
    if items.is_empty() {
        return Err(args.error("frames", "帧列表不能为空"));
    }
    items
        .iter()
        .map(|item| {
            read_point(item)
                .map(|(x, y, _)| AnimFrame { x, y })
                .ok_or_else(|| args.error("frames", format!("无效的帧: {}", item)))
        })
        .collect()
}

fn start_move(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let duration = args.count("time")?;
    let delay = args.opt_count("delay")?.unwrap_or(0);
    let kind_name = args.string("type")?;
    let kind = MoveKind::parse(kind_name)
        .ok_or_else(|| args.error("type", format!("未知的移动方式: {}", kind_name)))?;
    let ease_name = args.string("ease")?;
    let ease = EaseMode::parse(ease_name)
        .ok_or_else(|| args.error("ease", format!("未知的缓动方式: {}", ease_name)))?;
    let looping = args.flag("loop");

    for index in layers {
        let layer = engine.layer_mut(page, index)?;
        let path = parse_path(args, layer.alpha)?;
        layer.start_move(&path, kind, ease, duration, delay, looping, tick);
    }
    cont()
}

/// 对两页的全部图层执行操作，返回是否有图层被操作
fn for_each_layer(engine: &mut Engine, mut f: impl FnMut(&mut Layer) -> bool) -> bool {
    let mut touched = false;
    for side in [PageSide::Fore, PageSide::Back] {
        for layer in &mut engine.pages.page_mut(side).layers {
            touched |= f(layer);
        }
    }
    touched
}

fn stop_move(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let stopped = if args.has("lay") {
        let (page, layers) = target_layers(engine, args)?;
        let mut stopped = false;
        for index in layers {
            let layer = engine.layer_mut(page, index)?;
            stopped |= layer.is_moving();
            layer.stop_move();
        }
        stopped
    } else {
        for_each_layer(engine, |layer| {
            let moving = layer.is_moving();
            layer.stop_move();
            moving
        })
    };
    if stopped {
        engine.fire(events::MOVE);
    }
    cont()
}

fn wait_move(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let any_moving = engine
        .pages
        .fore
        .layers
        .iter()
        .chain(&engine.pages.back.layers)
        .any(Layer::is_moving);
    if !any_moving {
        return cont();
    }
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        for_each_layer(engine, |layer| {
            layer.stop_move();
            false
        });
        return cont();
    }
    Ok(wait_event(engine, events::MOVE, "waitmove", can_skip))
}

fn start_frame_anim(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let frames = parse_frames(args)?;
    let frame_time = args.count("time")?;
    if frame_time == 0 {
        return Err(args.error("time", "帧间隔必须大于 0").into());
    }
    let looping = args.flag("loop");
    for index in layers {
        engine
            .layer_mut(page, index)?
            .start_frame_anim(frames.clone(), frame_time, looping, tick);
    }
    cont()
}

fn stop_frame_anim(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let stopped = if args.has("lay") {
        let (page, layers) = target_layers(engine, args)?;
        let mut stopped = false;
        for index in layers {
            let layer = engine.layer_mut(page, index)?;
            stopped |= layer.is_frame_animating();
            layer.stop_frame_anim();
        }
        stopped
    } else {
        for_each_layer(engine, |layer| {
            let running = layer.is_frame_animating();
            layer.stop_frame_anim();
            running
        })
    };
    if stopped {
        engine.fire(events::FRAME_ANIM);
    }
    cont()
}

fn wait_frame_anim(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    // 循环动画永远不会结束，只等待非循环动画
    let any_running = engine
        .pages
        .fore
        .layers
        .iter()
        .chain(&engine.pages.back.layers)
        .any(|l| l.frame_anim.as_ref().is_some_and(|a| a.running && !a.looping));
    if !any_running {
        return cont();
    }
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        for_each_layer(engine, |layer| {
            layer.stop_frame_anim();
            false
        });
        return cont();
    }
    Ok(wait_event(engine, events::FRAME_ANIM, "waitframeanim", can_skip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn path_args(path: Vec<Value>) -> TagArgs {
        let mut values = BTreeMap::new();
        values.insert("path".to_string(), Value::Array(path));
        TagArgs::new("move", values)
    }

    #[test]
    fn test_parse_path_inherits_alpha() {
        let mut object = BTreeMap::new();
        object.insert("x".to_string(), Value::Number(30.0));
        object.insert("y".to_string(), Value::Number(40.0));
        let args = path_args(vec![
            Value::Array(vec![Value::Number(10.0), Value::Number(20.0)]),
            Value::Array(vec![Value::Number(0.0), Value::Number(0.0), Value::Number(0.5)]),
            Value::Object(object),
        ]);
        let path = parse_path(&args, 0.8).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], MovePoint::new(10.0, 20.0, 0.8));
        assert_eq!(path[1].alpha, 0.5);
        assert_eq!(path[2], MovePoint::new(30.0, 40.0, 0.5));
    }

    #[test]
    fn test_parse_path_rejects_bad_points() {
        assert!(parse_path(&path_args(vec![]), 1.0).is_err());
        let args = path_args(vec![Value::String("left".to_string())]);
        assert!(parse_path(&args, 1.0).is_err());
    }
}
