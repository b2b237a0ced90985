//! 视频指令

use super::{cont, layer_params, target_layers, wait_event};
use crate::error::VnResult;
use crate::layer::PageSide;
use crate::runtime::{Engine, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

pub fn tags() -> Vec<TagAction> {
    let with_layer = |extra: Vec<TagValue>| {
        let mut params = layer_params(true);
        params.extend(extra);
        params
    };

    vec![
        TagAction::new(
            &["video", "loadvideo"],
            with_layer(vec![
                TagValue::required("file", ValueType::String),
                TagValue::optional("visible", ValueType::Boolean),
            ]),
            load_video,
        ),
        TagAction::new(
            &["playvideo"],
            with_layer(vec![
                TagValue::with_default("loop", ValueType::Boolean, false),
                TagValue::optional("volume", ValueType::Number),
            ]),
            play_video,
        ),
        TagAction::new(&["stopvideo"], layer_params(true), stop_video),
        TagAction::new(
            &["waitvideo"],
            vec![TagValue::with_default("canskip", ValueType::Boolean, true)],
            wait_video,
        ),
    ]
}

fn load_video(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let file = args.string("file")?;
    let mut result = TagResult::Continue;
    for index in layers {
        if let Some(visible) = args.opt_bool("visible") {
            engine.layer_mut(page, index)?.visible = visible;
        }
        if engine.request_layer_video(page, index, file)? == TagResult::Break {
            result = TagResult::Break;
        }
    }
    Ok(result)
}

fn play_video(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let looping = args.flag("loop");
    let volume = args.opt_number("volume");
    for index in layers {
        let video = engine
            .layer_mut(page, index)?
            .video
            .as_mut()
            .ok_or_else(|| args.error("lay", format!("图层 {} 没有载入视频", index)))?;
        if let Some(volume) = volume {
            video.volume = volume.clamp(0.0, 1.0);
        }
        video.play(tick, looping);
    }
    cont()
}

fn stop_video(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let (page, layers) = target_layers(engine, args)?;
    let mut stopped = false;
    for index in layers {
        if let Some(video) = engine.layer_mut(page, index)?.video.as_mut() {
            stopped |= video.playing;
            video.stop();
        }
    }
    if stopped {
        engine.fire(events::VIDEO);
    }
    cont()
}

/// 等待非循环视频播放结束
fn wait_video(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let playing = |side: PageSide, engine: &Engine| {
        engine
            .pages
            .page(side)
            .layers
            .iter()
            .filter_map(|l| l.video.as_ref())
            .any(|v| v.playing && !v.looping)
    };
    if !playing(PageSide::Fore, engine) && !playing(PageSide::Back, engine) {
        return cont();
    }
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        for side in [PageSide::Fore, PageSide::Back] {
            for layer in &mut engine.pages.page_mut(side).layers {
                if let Some(video) = layer.video.as_mut().filter(|v| !v.looping) {
                    video.stop();
                }
            }
        }
        return cont();
    }
    Ok(wait_event(engine, events::VIDEO, "waitvideo", can_skip))
}
