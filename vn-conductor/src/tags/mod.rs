//! # Tags 模块
//!
//! 全部内置指令，按主题分成独立模块。每个模块提供 `tags()`，
//! 返回该主题的 [`TagAction`] 列表；[`all`] 把它们拼接起来交给注册表。
//!
//! | 模块 | 指令 |
//! |------|------|
//! | script | s, jump, call, return, if/elsif/else/endif, for/endfor/breakfor, macro/endmacro, label, savemark, eval, embed, var, wait, waitclick, skip, auto, rightclick |
//! | message | ch, br, clear, l, p, messagelayer, textspeed, nowait |
//! | layer | layopt, image, freeimage, freelayer, backlay, currentpage |
//! | animation | move, stopmove, waitmove, frameanim, stopframeanim, waitframeanim |
//! | sound | bufopt, play, stop, pause, resume, fade, fadein, fadeout, waitsoundstop, waitsoundfade |
//! | transition | trans, waittrans, stoptrans |
//! | button | textbutton, imagebutton, clearbuttons, lock/unlock, waitbutton |
//! | history | historyoutput, historych, historybr, clearhistory |
//! | video | video, playvideo, stopvideo, waitvideo |
//! | save | save, load, tempsave, tempload, copysave, deletesave |

mod animation;
mod button;
mod history;
mod layer;
mod message;
mod save;
mod script;
mod sound;
mod transition;
mod video;

use crate::error::VnResult;
use crate::layer::{PageSide, resolve_layers};
use crate::runtime::{Engine, HandlerAction, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

/// 全部内置指令
pub fn all() -> Vec<TagAction> {
    [
        script::tags(),
        message::tags(),
        layer::tags(),
        animation::tags(),
        sound::tags(),
        transition::tags(),
        button::tags(),
        history::tags(),
        video::tags(),
        save::tags(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// `lay` + `page` 参数
fn layer_params(lay_required: bool) -> Vec<TagValue> {
    vec![
        if lay_required {
            TagValue::required("lay", ValueType::String)
        } else {
            TagValue::optional("lay", ValueType::String)
        },
        TagValue::optional("page", ValueType::String),
    ]
}

fn target_page(engine: &Engine, args: &TagArgs) -> VnResult<PageSide> {
    match args.opt_string("page") {
        None => Ok(engine.flags().current_page),
        Some(page) => {
            PageSide::parse(page).ok_or_else(|| args.error("page", format!("未知的页: {}", page)).into())
        }
    }
}

/// 解析 `lay`/`page`，`lay` 缺省时使用 `default`
fn target_layers_or(engine: &Engine, args: &TagArgs, default: &str) -> VnResult<(PageSide, Vec<usize>)> {
    let page = target_page(engine, args)?;
    let selector = args.selector("lay").unwrap_or_else(|| default.to_string());
    let layers = resolve_layers(
        &selector,
        engine.config().layer_count,
        engine.flags().message_layer,
    )
    .map_err(|message| args.error("lay", message))?;
    Ok((page, layers))
}

fn target_layers(engine: &Engine, args: &TagArgs) -> VnResult<(PageSide, Vec<usize>)> {
    target_layers_or(engine, args, "")
}

/// 等待某个事件；`can_skip` 时点击也能解除等待
fn wait_event(engine: &mut Engine, event: &str, owner: &str, can_skip: bool) -> TagResult {
    let result = engine.wait_for(event, owner);
    if can_skip {
        engine
            .conductor
            .add_event_handler(events::CLICK, owner, HandlerAction::Start);
    }
    result
}

/// 只执行一次就继续的指令
fn cont() -> VnResult<TagResult> {
    Ok(TagResult::Continue)
}
