//! # Engine 场景测试
//!
//! 用内存脚本、内存资源与内存存储驱动整个引擎，逐 tick 检查状态。

use super::*;
use crate::config::EngineConfig;
use crate::error::{ResourceError, TagError, VnError};
use crate::input::EngineInput;
use crate::layer::{GlyphState, PageSide};
use crate::resource::{MemoryResourceLoader, MemoryScriptSource};
use crate::save::{SaveData, SystemData};
use crate::storage::{MemoryStorage, SYSTEM_KEY, SaveStorage};
use crate::value::Value;
use crate::variables::VarScope;

fn test_config() -> EngineConfig {
    EngineConfig {
        char_delay: 0,
        ..EngineConfig::default()
    }
}

fn engine_with(config: EngineConfig, files: &[(&str, &str)]) -> Engine {
    let mut source = MemoryScriptSource::new();
    for (path, text) in files {
        source.insert(*path, *text);
    }
    let loader = MemoryResourceLoader::new()
        .with("bg.png", 640, 480)
        .with("chara.png", 200, 400);
    Engine::new(config, Box::new(source))
        .unwrap()
        .with_loader(Box::new(loader))
}

/// 从 main.txt 开始执行一个 tick
fn run(text: &str) -> Engine {
    run_with(test_config(), text)
}

fn run_with(config: EngineConfig, text: &str) -> Engine {
    let mut engine = engine_with(config, &[("main.txt", text)]);
    engine.start("main.txt").unwrap();
    engine.tick(0).unwrap();
    engine
}

fn tf<'a>(engine: &'a Engine, name: &str) -> Option<&'a Value> {
    engine.variables().get(VarScope::Temp, name)
}

fn click(engine: &mut Engine, tick: u64) {
    engine.handle_input(EngineInput::PrimaryClick).unwrap();
    engine.tick(tick).unwrap();
}

// -------------------------------------------------------------------------
// 基本执行
// -------------------------------------------------------------------------

#[test]
fn test_text_runs_until_stop() {
    let engine = run("你好\n;s\n-tf.unreached = true\n");
    assert_eq!(engine.message_text(), "你好\n");
    assert!(engine.conductor().is_stopped());
    assert_eq!(tf(&engine, "unreached"), None);
}

#[test]
fn test_unknown_tag_is_fatal() {
    let mut engine = engine_with(test_config(), &[("main.txt", "-tf.a = 1\n;nosuch\n")]);
    engine.start("main.txt").unwrap();
    let err = engine.tick(0).unwrap_err();

    assert_eq!(
        err.root(),
        &VnError::Tag(TagError::UnknownTag {
            name: "nosuch".to_string()
        })
    );
    assert!(matches!(&err, VnError::InScript { file, line: 2, .. } if file == "main.txt"));
    assert!(engine.conductor().is_stopped());
    assert_eq!(engine.last_error(), Some(&err));
}

#[test]
fn test_unknown_tag_can_be_ignored() {
    let config = EngineConfig {
        ignore_unknown_tags: true,
        ..test_config()
    };
    let engine = run_with(config, ";nosuch\n-tf.after = 1\n");
    assert_eq!(tf(&engine, "after"), Some(&Value::Number(1.0)));
    assert!(engine.last_error().is_none());
}

#[test]
fn test_missing_parameter_names_tag_and_param() {
    let mut engine = engine_with(test_config(), &[("main.txt", ";wait\n")]);
    engine.start("main.txt").unwrap();
    let err = engine.tick(0).unwrap_err();
    assert_eq!(
        err.root(),
        &VnError::Tag(TagError::MissingParameter {
            tag: "wait".to_string(),
            param: "time".to_string()
        })
    );
}

#[test]
fn test_runaway_chain_is_bounded() {
    let config = EngineConfig {
        max_tags_per_tick: 50,
        ..test_config()
    };
    let mut engine = engine_with(config, &[("main.txt", "*top\n;jump label: top\n")]);
    engine.start("main.txt").unwrap();
    let err = engine.tick(0).unwrap_err();
    assert_eq!(
        err.root(),
        &VnError::Tag(TagError::RunawayChain { limit: 50 })
    );
    assert!(engine.conductor().is_stopped());
}

// -------------------------------------------------------------------------
// 等待与点击
// -------------------------------------------------------------------------

#[test]
fn test_line_wait_hides_glyph_on_click() {
    let mut engine = run("一\n;l\n二\n");
    assert!(engine.is_waiting_click());
    let layer = engine.layer(PageSide::Fore, 20).unwrap();
    assert_eq!(layer.text.glyph, GlyphState::Line);

    click(&mut engine, 1);
    let layer = engine.layer(PageSide::Fore, 20).unwrap();
    assert_eq!(layer.text.glyph, GlyphState::Hidden);
    assert_eq!(engine.message_text(), "一\n二\n");
}

#[test]
fn test_page_wait_clears_message_and_records_history() {
    let mut engine = run("一\n;p\n二\n");
    assert_eq!(engine.message_text(), "一\n");

    click(&mut engine, 1);
    assert_eq!(engine.message_text(), "二\n");
    assert_eq!(engine.history().pages(), vec!["一\n".to_string(), "二\n".to_string()]);
}

#[test]
fn test_wait_sleeps_until_due() {
    let mut engine = run(";wait time: 100\n-tf.done = true\n");
    assert!(engine.conductor().is_sleeping());

    engine.tick(99).unwrap();
    assert_eq!(tf(&engine, "done"), None);
    engine.tick(100).unwrap();
    assert_eq!(tf(&engine, "done"), Some(&Value::Bool(true)));
}

#[test]
fn test_wait_can_be_cut_short_by_click() {
    let mut engine = run(";wait time: 1000\n-tf.done = true\n");
    click(&mut engine, 10);
    assert_eq!(tf(&engine, "done"), Some(&Value::Bool(true)));
}

#[test]
fn test_char_delay_and_click_skips_to_next_wait() {
    let config = EngineConfig {
        char_delay: 30,
        ..EngineConfig::default()
    };
    let mut engine = run_with(config, "あいう\n;l\nえ\n");
    assert_eq!(engine.message_text(), "あ");

    engine.tick(10).unwrap();
    assert_eq!(engine.message_text(), "あ");
    engine.tick(30).unwrap();
    assert_eq!(engine.message_text(), "あい");

    // 逐字显示中点击：一直显示到下一次点击等待
    click(&mut engine, 35);
    assert_eq!(engine.message_text(), "あいう\n");
    assert!(engine.is_waiting_click());
    assert_eq!(engine.skip_mode(), SkipMode::Invalid);
}

#[test]
fn test_auto_mode_synthesizes_clicks() {
    let mut engine = run(";waitclick\n-tf.after = true\n");
    engine.start_auto_mode();

    engine.tick(10).unwrap();
    engine.tick(500).unwrap();
    assert_eq!(tf(&engine, "after"), None);
    engine.tick(1010).unwrap();
    assert_eq!(tf(&engine, "after"), Some(&Value::Bool(true)));
}

// -------------------------------------------------------------------------
// 快进
// -------------------------------------------------------------------------

#[test]
fn test_skip_requires_read_save_mark() {
    let mut engine = run("~first\n;s\n");
    assert_eq!(
        engine.latest_save_mark(),
        Some(&LatestSaveMark {
            name: "first".to_string(),
            was_read: false
        })
    );
    assert!(!engine.start_skip_by_tag());
    assert_eq!(engine.skip_mode(), SkipMode::Invalid);

    // 第二次经过同一个存档点
    engine.jump(Some("main.txt"), None, false).unwrap();
    engine.conductor.start();
    engine.tick(1).unwrap();
    assert!(engine.latest_save_mark().is_some_and(|m| m.was_read));
    assert!(engine.start_skip_by_tag());
    assert_eq!(engine.skip_mode(), SkipMode::UntilS);
}

#[test]
fn test_skip_unread_when_permitted() {
    let config = EngineConfig {
        skip_unread_by_tag: true,
        ..test_config()
    };
    let mut engine = run_with(config, "~first\n;s\n");
    assert!(engine.start_skip_by_tag());
    assert_eq!(engine.skip_mode(), SkipMode::UntilS);
}

#[test]
fn test_skip_until_s_passes_click_waits() {
    let config = EngineConfig {
        skip_unread_by_tag: true,
        ..test_config()
    };
    let engine = run_with(
        config,
        ";skip\n一\n;l\n二\n;p\n;wait time: 500\n-tf.before_s = true\n;s\n-tf.after_s = true\n",
    );
    assert_eq!(tf(&engine, "before_s"), Some(&Value::Bool(true)));
    assert_eq!(tf(&engine, "after_s"), None);
    assert_eq!(engine.skip_mode(), SkipMode::Invalid);
}

#[test]
fn test_ctrl_skip_is_gated_and_released() {
    let mut engine = run("~first\n;waitclick\n");
    engine.handle_input(EngineInput::CtrlDown).unwrap();
    assert_eq!(engine.skip_mode(), SkipMode::Invalid);

    engine.jump(Some("main.txt"), None, false).unwrap();
    engine.conductor.clear_all_event_handlers();
    engine.conductor.start();
    engine.tick(1).unwrap();
    engine.handle_input(EngineInput::CtrlDown).unwrap();
    assert_eq!(engine.skip_mode(), SkipMode::WhilePressingCtrl);
    engine.handle_input(EngineInput::CtrlUp).unwrap();
    assert_eq!(engine.skip_mode(), SkipMode::Invalid);
}

// -------------------------------------------------------------------------
// 控制流
// -------------------------------------------------------------------------

#[test]
fn test_macro_params_scoped_through_nested_calls() {
    let text = r#"
;macro name: inner
-tf.inner = mp.val
;endmacro
;macro name: middle
-tf.middle = mp.val
;inner val: "&mp.val"
;endmacro
;macro name: outer
-tf.outer = mp.val
;middle val: "&mp.val"
-tf.outer_after = mp.val
;endmacro
;outer val: 7
-tf.after = mp.val
"#;
    let engine = run(text);
    assert!(engine.last_error().is_none());
    for name in ["inner", "middle", "outer", "outer_after"] {
        assert_eq!(tf(&engine, name), Some(&Value::Number(7.0)), "tf.{}", name);
    }
    assert!(tf(&engine, "after").is_none_or(Value::is_null));
    assert!(engine.script().macro_params().is_none());
    assert_eq!(engine.script().call_depth(), 0);
}

#[test]
fn test_malformed_macro_fails_at_definition() {
    let mut engine = engine_with(
        test_config(),
        &[("main.txt", ";macro name: m\n*inside\n;endmacro\n")],
    );
    engine.start("main.txt").unwrap();
    let err = engine.tick(0).unwrap_err();
    assert!(matches!(err.root(), VnError::Tag(TagError::MalformedMacro { name, .. }) if name == "m"));
}

#[test]
fn test_nested_if_selects_single_branch() {
    let text = r#"
-tf.outer = 2
-tf.inner = 0
-tf.log = ''
;if exp: "tf.outer == 1"
-tf.log += 'A'
;elsif exp: "tf.outer == 2"
;if exp: "tf.inner == 1"
-tf.log += 'B'
;elsif exp: "tf.inner == 0"
-tf.log += 'C'
;else
-tf.log += 'E'
;endif
-tf.log += 'D'
;else
-tf.log += 'F'
;endif
"#;
    let engine = run(text);
    assert_eq!(tf(&engine, "log"), Some(&Value::from("CD")));
    assert!(engine.last_error().is_none());
}

#[test]
fn test_for_loop_index_and_scope() {
    let mut engine = run(";for loops: 5 indexvar: i\n;waitclick\n;endfor\n;waitclick\n");
    for (n, tick) in (0..5).zip(1..) {
        assert_eq!(tf(&engine, "i"), Some(&Value::Number(n as f64)));
        assert!(engine.script().is_inside_of_for_loop());
        click(&mut engine, tick);
    }
    assert!(!engine.script().is_inside_of_for_loop());
    assert!(engine.is_waiting_click());
}

#[test]
fn test_breakfor_leaves_loop() {
    let text = "-tf.n = 0\n;for loops: 10\n-tf.n += 1\n;if exp: \"tf.n == 3\"\n;breakfor\n;endif\n;endfor\n";
    let engine = run(text);
    assert_eq!(tf(&engine, "n"), Some(&Value::Number(3.0)));
    assert!(!engine.script().is_inside_of_for_loop());
}

#[test]
fn test_call_and_return() {
    let text = ";call label: sub\n-tf.back = true\n;s\n*sub\n-tf.in_sub = true\n;return\n";
    let engine = run(text);
    assert_eq!(tf(&engine, "in_sub"), Some(&Value::Bool(true)));
    assert_eq!(tf(&engine, "back"), Some(&Value::Bool(true)));
    assert_eq!(engine.script().call_depth(), 0);
}

#[test]
fn test_call_across_files() {
    let mut engine = engine_with(
        test_config(),
        &[
            ("main.txt", ";call file: sub.txt label: entry\n-tf.back = true\n"),
            ("sub.txt", "*entry\n-tf.in_sub = true\n;return\n"),
        ],
    );
    engine.start("main.txt").unwrap();
    engine.tick(0).unwrap();
    assert_eq!(tf(&engine, "in_sub"), Some(&Value::Bool(true)));
    assert_eq!(tf(&engine, "back"), Some(&Value::Bool(true)));
    assert_eq!(engine.script().file_path(), "main.txt");
}

#[test]
fn test_rightclick_call_restores_suspended_wait() {
    let text = ";rightclick call: true label: menu\n一\n;l\n二\n;s\n*menu\n-tf.menu = true\n;return\n";
    let mut engine = run(text);
    assert_eq!(engine.glyph(), GlyphState::Line);

    engine.handle_input(EngineInput::SecondaryClick).unwrap();
    assert_eq!(engine.glyph(), GlyphState::Hidden);
    engine.tick(1).unwrap();
    assert_eq!(tf(&engine, "menu"), Some(&Value::Bool(true)));
    assert!(engine.is_waiting_click());
    assert_eq!(engine.glyph(), GlyphState::Line);
    assert_eq!(engine.message_text(), "一\n");

    click(&mut engine, 2);
    assert_eq!(engine.glyph(), GlyphState::Hidden);
    assert_eq!(engine.message_text(), "一\n二\n");
}

#[test]
fn test_rightclick_return_forcestart_drops_wait() {
    let text =
        ";rightclick call: true label: menu\n一\n;l\n二\n;s\n*menu\n;return forcestart: true\n";
    let mut engine = run(text);
    assert!(engine.is_waiting_click());

    engine.handle_input(EngineInput::SecondaryClick).unwrap();
    engine.tick(1).unwrap();
    assert!(!engine.is_waiting_click());
    assert!(!engine.conductor().has_any_event_handler());
    assert_eq!(engine.glyph(), GlyphState::Hidden);
    assert_eq!(engine.message_text(), "一\n二\n");
}

#[test]
fn test_rightclick_ignored_when_disabled() {
    let text = ";rightclick enabled: false label: menu\n一\n;l\n;s\n*menu\n-tf.menu = true\n;return\n";
    let mut engine = run(text);
    engine.handle_input(EngineInput::SecondaryClick).unwrap();
    engine.tick(1).unwrap();
    assert_eq!(tf(&engine, "menu"), None);
    assert!(engine.is_waiting_click());
    assert_eq!(engine.glyph(), GlyphState::Line);
}

#[test]
fn test_missing_label_is_fatal() {
    let mut engine = engine_with(test_config(), &[("main.txt", ";jump label: nowhere\n")]);
    engine.start("main.txt").unwrap();
    let err = engine.tick(0).unwrap_err();
    assert!(matches!(err.root(), VnError::Tag(TagError::LabelNotFound { label }) if label == "nowhere"));
}

// -------------------------------------------------------------------------
// 图层与资源
// -------------------------------------------------------------------------

#[test]
fn test_image_waits_for_load() {
    let mut engine = run(";image lay: 1 file: bg.png visible: true x: 10\n-tf.loaded = true\n");
    assert!(engine.is_loading());
    assert_eq!(tf(&engine, "loaded"), None);

    engine.tick(1).unwrap();
    let layer = engine.layer(PageSide::Fore, 1).unwrap();
    assert_eq!((layer.width, layer.height), (640.0, 480.0));
    assert_eq!(layer.x, 10.0);
    assert!(layer.visible);
    assert_eq!(tf(&engine, "loaded"), Some(&Value::Bool(true)));
}

#[test]
fn test_resource_failure_is_annotated() {
    let mut engine = run(";wait time: 0\n;image lay: 0 file: missing.png\n");
    let err = engine.tick(1).and_then(|_| engine.tick(2)).unwrap_err();
    match &err {
        VnError::InScript { file, line, tag, .. } => {
            assert_eq!(file, "main.txt");
            assert_eq!(*line, 2);
            assert_eq!(tag, "image");
        }
        other => panic!("期望带位置的错误，实际为 {:?}", other),
    }
    assert!(matches!(
        err.root(),
        VnError::Resource(ResourceError::Image { path, .. }) if path == "missing.png"
    ));
    assert!(engine.conductor().is_stopped());
}

#[test]
fn test_linear_move_reaches_endpoints() {
    let mut engine = run(";move lay: 1 path: [[100, 50]] time: 100\n;waitmove canskip: false\n-tf.moved = true\n");
    let layer = engine.layer(PageSide::Fore, 1).unwrap();
    assert_eq!((layer.x, layer.y), (0.0, 0.0));

    engine.tick(50).unwrap();
    let layer = engine.layer(PageSide::Fore, 1).unwrap();
    assert_eq!((layer.x, layer.y), (50.0, 25.0));
    assert_eq!(tf(&engine, "moved"), None);

    engine.tick(100).unwrap();
    let layer = engine.layer(PageSide::Fore, 1).unwrap();
    assert_eq!((layer.x, layer.y), (100.0, 50.0));
    assert!(!layer.is_moving());
    assert_eq!(tf(&engine, "moved"), Some(&Value::Bool(true)));
}

#[test]
fn test_backlay_and_transition_swap_pages() {
    let text = ";layopt lay: 3 visible: true\n;backlay\n;layopt lay: 3 page: back x: 42\n;trans time: 100\n;waittrans\n-tf.done = true\n";
    let mut engine = run(text);
    assert!(engine.pages().is_transitioning());
    assert_eq!(engine.layer(PageSide::Fore, 3).unwrap().x, 0.0);

    engine.tick(100).unwrap();
    assert!(!engine.pages().is_transitioning());
    assert_eq!(engine.layer(PageSide::Fore, 3).unwrap().x, 42.0);
    assert_eq!(tf(&engine, "done"), Some(&Value::Bool(true)));
}

#[test]
fn test_button_click_jumps() {
    let text = ";textbutton lay: 5 text: 开始 label: go\n;waitbutton\n;s\n*go\n-tf.pressed = true\n";
    let mut engine = run(text);
    assert!(engine.conductor().is_stopped());

    engine.handle_input(EngineInput::button(5, 0)).unwrap();
    engine.tick(1).unwrap();
    assert_eq!(tf(&engine, "pressed"), Some(&Value::Bool(true)));
}

#[test]
fn test_locked_button_is_ignored() {
    let text = ";textbutton lay: 5 text: 开始 label: go\n;lockbuttons lay: 5\n;waitbutton\n;s\n*go\n-tf.pressed = true\n";
    let mut engine = run(text);
    engine.handle_input(EngineInput::button(5, 0)).unwrap();
    engine.tick(1).unwrap();
    assert_eq!(tf(&engine, "pressed"), None);
}

#[test]
fn test_sound_fadeout_fires_stop() {
    let text = ";playbgm buf: 1 file: bgm.ogg\n;fadeout buf: 1 time: 100\n;waitsoundstop buf: 1\n-tf.stopped = true\n";
    let mut engine = run(text);
    assert!(engine.sounds()[1].looping);
    assert_eq!(tf(&engine, "stopped"), None);

    engine.tick(100).unwrap();
    assert!(!engine.sounds()[1].is_playing());
    assert_eq!(tf(&engine, "stopped"), Some(&Value::Bool(true)));
}

// -------------------------------------------------------------------------
// 存档
// -------------------------------------------------------------------------

#[test]
fn test_snapshot_round_trip_into_fresh_engine() {
    let text = ";image lay: 1 file: bg.png visible: true x: 10 y: 20 alpha: 0.5\n~start\n你好\n;p\n";
    let mut original = run(text);
    original.tick(1).unwrap();
    assert!(original.is_waiting_click());
    let data = original.generate_save_data("start", "", 1, true);

    let mut restored = engine_with(test_config(), &[("main.txt", text)]);
    restored.begin_restore(data, RestoreMode::Full, 5).unwrap();
    assert!(restored.is_loading());
    restored.tick(6).unwrap();

    assert_eq!(restored.message_text(), original.message_text());
    for index in 0..restored.config().layer_count {
        let (a, b) = (
            original.layer(PageSide::Fore, index).unwrap(),
            restored.layer(PageSide::Fore, index).unwrap(),
        );
        assert_eq!(
            (a.visible, a.x, a.y, a.width, a.height, a.alpha),
            (b.visible, b.x, b.y, b.width, b.height, b.alpha),
            "图层 {}",
            index
        );
        assert_eq!(a.image, b.image);
        assert_eq!(a.text, b.text);
    }
    assert_eq!(restored.conductor().handlers(), original.conductor().handlers());

    // 恢复的点击等待仍然有效
    click(&mut restored, 7);
    assert_eq!(restored.message_text(), "");
}

#[test]
fn test_save_and_load_slot() {
    let text = "-gf.count = 1\n~mark|第一章\n;waitclick\n-gf.count = 2\n;waitclick\n";
    let mut engine = run(text);
    engine.save(1, None).unwrap();
    assert_eq!(engine.system_data().slots[&1].comment, "第一章");

    click(&mut engine, 1);
    assert_eq!(
        engine.variables().get(VarScope::Game, "count"),
        Some(&Value::Number(2.0))
    );

    engine.load(1, 2).unwrap();
    assert_eq!(
        engine.variables().get(VarScope::Game, "count"),
        Some(&Value::Number(1.0))
    );
    engine.tick(3).unwrap();
    assert!(engine.is_waiting_click());
    assert_eq!(
        engine.variables().get(VarScope::Game, "count"),
        Some(&Value::Number(1.0))
    );
}

#[test]
fn test_read_marks_and_system_vars_persist_without_slot_save() {
    let text = "~first\n-sf.seen = 1\n;s\n";
    let engine = run(text);
    let json = engine.storage.read(SYSTEM_KEY).unwrap().unwrap();
    let system = SystemData::from_json(&json).unwrap();
    assert!(system.read_marks.contains("main.txt#first"));
    assert_eq!(system.system_variables.get("seen"), Some(&Value::Number(1.0)));

    // 下一次启动读取同一份系统文档
    let mut storage = MemoryStorage::new();
    storage.write(SYSTEM_KEY, &json).unwrap();
    let mut next = engine_with(test_config(), &[("main.txt", text)]).with_storage(Box::new(storage));
    next.start("main.txt").unwrap();
    next.tick(0).unwrap();
    assert!(next.latest_save_mark().is_some_and(|mark| mark.was_read));
    assert!(next.start_skip_by_tag());
    assert_eq!(
        next.variables().get(VarScope::System, "seen"),
        Some(&Value::Number(1.0))
    );
}

#[test]
fn test_save_writes_state_at_save_mark() {
    let mut engine = run("~mark|序章\n一\n;l\n");
    assert_eq!(engine.message_text(), "一\n");
    engine.save(3, None).unwrap();

    let json = engine.storage.read(&crate::storage::slot_key(3)).unwrap().unwrap();
    let data = SaveData::from_json(&json).unwrap();
    assert_eq!(data.mark_name, "mark");
    assert_eq!(data.message_text, "");
}

#[test]
fn test_save_without_save_mark_fails() {
    let mut engine = run(";s\n");
    assert!(engine.save(0, None).is_err());
}

#[test]
fn test_tempload_restores_presentation_only() {
    let text = ";layopt lay: 2 visible: true x: 5\n;tempsave num: 0\n-tf.x = 1\n;layopt lay: 2 x: 99\n;tempload num: 0\n-tf.done = true\n";
    let mut engine = run(text);
    assert_eq!(engine.layer(PageSide::Fore, 2).unwrap().x, 5.0);

    engine.tick(1).unwrap();
    assert_eq!(tf(&engine, "done"), Some(&Value::Bool(true)));
    assert_eq!(tf(&engine, "x"), Some(&Value::Number(1.0)));
}
