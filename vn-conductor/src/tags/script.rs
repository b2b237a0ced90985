//! 脚本控制指令

use tracing::debug;

use super::cont;
use crate::error::{TagError, VnResult};
use crate::runtime::{Engine, HandlerAction, RightClickConfig, SkipMode, events};
use crate::tag::{TagAction, TagArgs, TagResult, TagValue};
use crate::value::ValueType;
use crate::variables::VarScope;

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(&["s"], vec![], stop),
        TagAction::new(
            &["jump"],
            vec![
                TagValue::optional("file", ValueType::String),
                TagValue::optional("label", ValueType::String),
                TagValue::with_default("countpage", ValueType::Boolean, true),
            ],
            jump,
        ),
        TagAction::new(
            &["call"],
            vec![
                TagValue::optional("file", ValueType::String),
                TagValue::optional("label", ValueType::String),
            ],
            call,
        ),
        TagAction::new(
            &["return"],
            vec![
                TagValue::with_default("forcestart", ValueType::Boolean, false),
                TagValue::with_default("countpage", ValueType::Boolean, false),
            ],
            return_,
        ),
        TagAction::new(
            &["if"],
            vec![TagValue::required("exp", ValueType::StringOrCallback)],
            if_,
        ),
        TagAction::new(
            &["elsif"],
            vec![TagValue::required("exp", ValueType::StringOrCallback)],
            elsif,
        ),
        TagAction::new(&["else"], vec![], else_),
        TagAction::new(&["endif"], vec![], endif),
        TagAction::new(
            &["for"],
            vec![
                TagValue::required("loops", ValueType::Number),
                TagValue::with_default("indexvar", ValueType::String, "__index__"),
            ],
            for_,
        ),
        TagAction::new(&["endfor"], vec![], endfor),
        TagAction::new(&["breakfor"], vec![], breakfor),
        TagAction::new(
            &["macro"],
            vec![TagValue::required("name", ValueType::String)],
            macro_,
        ),
        TagAction::new(&["endmacro"], vec![], endmacro),
        TagAction::new(
            &["label"],
            vec![TagValue::optional("name", ValueType::String)],
            |_, _, _| cont(),
        ),
        TagAction::new(
            &["savemark"],
            vec![
                TagValue::required("name", ValueType::String),
                TagValue::with_default("comment", ValueType::String, ""),
            ],
            savemark,
        ),
        TagAction::new(
            &["eval"],
            vec![TagValue::required("exp", ValueType::StringOrCallback)],
            eval,
        ),
        TagAction::new(
            &["embed"],
            vec![TagValue::required("exp", ValueType::StringOrCallback)],
            embed,
        ),
        TagAction::new(
            &["var"],
            vec![
                TagValue::required("name", ValueType::String),
                TagValue::optional("value", ValueType::Object),
            ],
            var,
        ),
        TagAction::new(&["clearvar"], vec![], |e, _, _| clear_scope(e, VarScope::Temp)),
        TagAction::new(&["clearsysvar"], vec![], |e, _, _| {
            clear_scope(e, VarScope::System)
        }),
        TagAction::new(&["cleargamevar"], vec![], |e, _, _| {
            clear_scope(e, VarScope::Game)
        }),
        TagAction::new(
            &["wait", "sleep"],
            vec![
                TagValue::required("time", ValueType::Number),
                TagValue::with_default("canskip", ValueType::Boolean, true),
            ],
            wait,
        ),
        TagAction::new(&["waitclick"], vec![], |e, _, _| {
            Ok(e.wait_click("waitclick", HandlerAction::Start))
        }),
        TagAction::new(&["skip", "startskip"], vec![], |e, _, _| {
            e.start_skip_by_tag();
            cont()
        }),
        TagAction::new(&["stopskip"], vec![], |e, _, _| {
            e.stop_skip();
            cont()
        }),
        TagAction::new(&["autostart", "startauto"], vec![], |e, _, _| {
            e.start_auto_mode();
            cont()
        }),
        TagAction::new(&["autostop", "stopauto"], vec![], |e, _, _| {
            e.stop_auto_mode();
            cont()
        }),
        TagAction::new(
            &["rightclick"],
            vec![
                TagValue::with_default("enabled", ValueType::Boolean, true),
                TagValue::with_default("call", ValueType::Boolean, false),
                TagValue::optional("file", ValueType::String),
                TagValue::optional("label", ValueType::String),
            ],
            rightclick,
        ),
    ]
}

fn stop(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.conductor.stop();
    if matches!(engine.skip_mode, SkipMode::UntilS | SkipMode::UntilClickWait) {
        engine.skip_mode = SkipMode::Invalid;
    }
    Ok(TagResult::Break)
}

fn jump(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let file = args.opt_string("file");
    let label = args.opt_string("label");
    if file.is_none() && label.is_none() {
        return Err(args.error("label", "需要 file 或 label").into());
    }
    engine.jump(file, label, args.flag("countpage"))?;
    cont()
}

fn call(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let file = args.opt_string("file");
    let label = args.opt_string("label");
    if file.is_none() && label.is_none() {
        return Err(args.error("label", "需要 file 或 label").into());
    }
    engine.call(file, label)?;
    cont()
}

fn return_(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    if args.flag("countpage") && engine.flags.history_output {
        engine.history.page_break();
    }
    engine.return_from(args.flag("forcestart"))
}

fn if_(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let exp = args.opt_callback("exp").unwrap_or_default();
    let condition = engine.eval_condition(exp)?;
    engine.script.if_jump(condition)?;
    cont()
}

fn elsif(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    if engine.script.branch_taken()? {
        engine.script.skip_to_endif()?;
        return cont();
    }
    let exp = args.opt_callback("exp").unwrap_or_default();
    let condition = engine.eval_condition(exp)?;
    engine.script.elsif_jump(condition)?;
    cont()
}

fn else_(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.script.else_jump()?;
    cont()
}

fn endif(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.script.end_if()?;
    cont()
}

fn for_(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let loops = args.number("loops")?;
    let index_var = args.string("indexvar")?;
    engine
        .script
        .start_for_loop(loops.floor() as i64, index_var, &mut engine.variables)?;
    cont()
}

fn endfor(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.script.end_for_loop(&mut engine.variables)?;
    cont()
}

fn breakfor(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.script.break_for_loop()?;
    cont()
}

fn macro_(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let name = args.string("name")?.to_ascii_lowercase();
    if engine.registry().contains(&name) {
        return Err(TagError::DuplicateMacro { name }.into());
    }
    engine.script.define_macro(&name)?;
    debug!(name = %name, "定义宏");
    cont()
}

fn endmacro(engine: &mut Engine, _args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    if engine.script.current_macro().is_none() {
        return Err(TagError::Unbalanced {
            message: "endmacro 不在宏内".to_string(),
        }
        .into());
    }
    engine.return_from(false)
}

fn savemark(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let name = args.string("name")?;
    let comment = args.opt_string("comment").unwrap_or_default();
    engine.pass_save_mark(name);
    engine.record_save_point(name, comment, tick);
    cont()
}

fn eval(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let exp = args.opt_callback("exp").unwrap_or_default();
    engine.eval(exp)?;
    cont()
}

/// 求值并把结果作为文字输出（不逐字等待）
fn embed(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let exp = args.opt_callback("exp").unwrap_or_default();
    let text = engine.eval(exp)?.to_string();
    engine.message_layer_mut()?.text.push_char(&text);
    if engine.flags.history_output {
        engine.history.push_text(&text);
    }
    cont()
}

/// `;var name: tf.flag value: 1`
fn var(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    let name = args.string("name")?;
    let (prefix, key) = name
        .split_once('.')
        .ok_or_else(|| args.error("name", format!("变量名需要作用域前缀: {}", name)))?;
    let scope = VarScope::from_prefix(prefix)
        .ok_or_else(|| args.error("name", format!("未知的作用域: {}", prefix)))?;
    let value = args.get("value").cloned().unwrap_or_default();
    engine.variables.set(scope, key, value);
    cont()
}

fn clear_scope(engine: &mut Engine, scope: VarScope) -> VnResult<TagResult> {
    engine.variables.clear(scope);
    if scope == VarScope::System {
        engine.save_system_data()?;
    }
    cont()
}

fn wait(engine: &mut Engine, args: &TagArgs, tick: u64) -> VnResult<TagResult> {
    let time = args.count("time")?;
    let can_skip = args.flag("canskip");
    if can_skip && engine.skip_mode.is_skipping() {
        return cont();
    }
    engine.conductor.sleep(tick, time, "wait");
    if can_skip {
        engine
            .conductor
            .add_event_handler(events::CLICK, "wait", HandlerAction::Start);
    }
    Ok(TagResult::Break)
}

fn rightclick(engine: &mut Engine, args: &TagArgs, _tick: u64) -> VnResult<TagResult> {
    engine.flags.right_click = RightClickConfig {
        enabled: args.flag("enabled"),
        call: args.flag("call"),
        file: args.opt_string("file").map(str::to_string),
        label: args.opt_string("label").map(str::to_string),
    };
    cont()
}
