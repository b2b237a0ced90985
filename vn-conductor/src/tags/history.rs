//! 履历指令

use super::cont;
use crate::tag::{TagAction, TagValue};
use crate::value::ValueType;

pub fn tags() -> Vec<TagAction> {
    vec![
        TagAction::new(
            &["historyoutput", "hisout"],
            vec![TagValue::required("output", ValueType::Boolean)],
            |e, args, _| {
                e.flags.history_output = args.flag("output");
                cont()
            },
        ),
        TagAction::new(
            &["historych"],
            vec![TagValue::required("text", ValueType::String)],
            |e, args, _| {
                e.history.push_text(args.string("text")?);
                cont()
            },
        ),
        TagAction::new(&["historybr"], vec![], |e, _, _| {
            e.history.line_break();
            cont()
        }),
        TagAction::new(&["clearhistory"], vec![], |e, _, _| {
            e.history.clear();
            cont()
        }),
    ]
}
