//! 表里页过渡指令

use tracing::debug;

use super::{cont, wait_event};
use crate::error::VnResult;
use crate::layer::{TransMethod, Transition};
use crate::runtime::{Engine, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(
            &["trans"],
            vec![
                TagValue::with_default("method", ValueType::String, "crossfade"),
                TagValue::required("time", ValueType::Number),
                TagValue::optional("rule", ValueType::String),
                TagValue::optional("direction", ValueType::String),
            ],
            trans,
        ),
        TagAction::new(
            &["waittrans"],
            vec![TagValue::with_default("canskip", ValueType::Boolean, true)],
            wait_trans,
        ),
        TagAction::new(&["stoptrans"], vec![], |e, _, _| {
            finish(e);
            cont()
        }),
    ]
}

fn finish(engine: &mut Engine) {
    if engine.pages.finish_transition() {
        engine.fire(events::TRANS);
    }
}

fn trans(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let method_name = args.string("method")?;
    let method = TransMethod::parse(method_name)
        .ok_or_else(|| args.error("method", format!("未知的过渡方式: {}", method_name)))?;
    let rule = args.opt_string("rule").map(str::to_string);
    if method == TransMethod::Univ && rule.is_none() {
        return Err(args.error("rule", "univ 过渡需要规则图").into());
    }
    let time = args.count("time")?;

    // 进行中的过渡先结束
    finish(engine);
    engine.pages.start_transition(Transition::new(
        method,
        time,
        rule,
        args.opt_string("direction").map(str::to_string),
        tick,
    ));
    debug!(?method, time, "开始过渡");
    cont()
}

fn wait_trans(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    if !engine.pages.is_transitioning() {
        return cont();
    }
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        finish(engine);
        return cont();
    }
    Ok(wait_event(engine, events::TRANS, "waittrans", can_skip))
}
