//! 音频缓冲指令

use super::{cont, wait_event};
use crate::error::VnResult;
use crate::runtime::{Engine, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

fn buf() -> TagValue {
    TagValue::with_default("buf", ValueType::Number, 0.0)
}

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(
            &["bufopt"],
            vec![
                buf(),
                TagValue::optional("volume", ValueType::Number),
                TagValue::optional("loop", ValueType::Boolean),
            ],
            bufopt,
        ),
        TagAction::new(
            &["playse", "playbgm", "play"],
            vec![
                buf(),
                TagValue::required("file", ValueType::String),
                TagValue::optional("loop", ValueType::Boolean),
            ],
            play,
        ),
        TagAction::new(&["stopse", "stopbgm", "stop"], vec![buf()], stop),
        TagAction::new(&["pause"], vec![buf()], |e, args, _| {
            e.sound_mut(buffer_index(args)?)?.pause();
            cont()
        }),
        TagAction::new(&["resume"], vec![buf()], |e, args, tick| {
            e.sound_mut(buffer_index(args)?)?.resume(tick);
            cont()
        }),
        TagAction::new(
            &["fade"],
            vec![
                buf(),
                TagValue::required("volume", ValueType::Number),
                TagValue::required("time", ValueType::Number),
                TagValue::with_default("autostop", ValueType::Boolean, false),
            ],
            fade,
        ),
        TagAction::new(
            &["fadein"],
            vec![
                buf(),
                TagValue::required("file", ValueType::String),
                TagValue::with_default("volume", ValueType::Number, 1.0),
                TagValue::required("time", ValueType::Number),
                TagValue::with_default("loop", ValueType::Boolean, false),
            ],
            fadein,
        ),
        TagAction::new(
            &["fadeout"],
            vec![buf(), TagValue::required("time", ValueType::Number)],
            |e, args, tick| {
                let time = args.count("time")?;
                e.sound_mut(buffer_index(args)?)?.fadeout(time, tick);
                cont()
            },
        ),
        TagAction::new(
            &["waitsoundstop"],
            vec![buf(), TagValue::with_default("canskip", ValueType::Boolean, false)],
            wait_sound_stop,
        ),
        TagAction::new(
            &["waitsoundfade"],
            vec![buf(), TagValue::with_default("canskip", ValueType::Boolean, true)],
            wait_sound_fade,
        ),
    ]
}

fn buffer_index(args: &TagArgs) -> VnResult<usize> {
    Ok(args.count("buf")? as usize)
}

fn volume(args: &TagArgs, name: &str) -> VnResult<Option<f64>> {
    match args.opt_number(name) {
        Some(v) if !(0.0..=1.0).contains(&v) => {
            Err(args.error(name, format!("音量必须在 0-1 之间: {}", v)).into())
        }
        other => Ok(other),
    }
}

fn bufopt(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let volume = volume(args, "volume")?;
    let sound = engine.sound_mut(buffer_index(args)?)?;
    if let Some(volume) = volume {
        sound.volume = volume;
    }
    if let Some(looping) = args.opt_bool("loop") {
        sound.looping = looping;
    }
    cont()
}

/// `playbgm` 缺省循环播放，其余缺省只播放一次
fn play(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let file = args.string("file")?;
    let looping = args
        .opt_bool("loop")
        .unwrap_or_else(|| args.tag().eq_ignore_ascii_case("playbgm"));
    engine.sound_mut(buffer_index(args)?)?.play(file, looping, tick);
    cont()
}

fn stop(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    if engine.sound_mut(buffer_index(args)?)?.stop() {
        engine.fire(events::SOUND_STOP);
    }
    cont()
}

fn fade(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let target = volume(args, "volume")?.unwrap_or(1.0);
    let time = args.count("time")?;
    let autostop = args.flag("autostop");
    let sound = engine.sound_mut(buffer_index(args)?)?;
    if !sound.is_playing() {
        return Err(args.error("buf", "缓冲未在播放").into());
    }
    sound.fade(target, time, autostop, tick);
    cont()
}

fn fadein(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let file = args.string("file")?;
    let target = volume(args, "volume")?.unwrap_or(1.0);
    let time = args.count("time")?;
    let looping = args.flag("loop");
    engine
        .sound_mut(buffer_index(args)?)?
        .fadein(file, target, time, looping, tick);
    cont()
}

fn wait_sound_stop(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let index = buffer_index(args)?;
    let sound = engine.sound_mut(index)?;
    // 循环播放不会自然停止
    if !sound.is_playing() || (sound.looping && !sound.is_fading()) {
        return cont();
    }
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        return cont();
    }
    Ok(wait_event(engine, events::SOUND_STOP, "waitsoundstop", can_skip))
}

fn wait_sound_fade(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    if !engine.sound_mut(buffer_index(args)?)?.is_fading() {
        return cont();
    }
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        return cont();
    }
    Ok(wait_event(engine, events::SOUND_FADE, "waitsoundfade", can_skip))
}
