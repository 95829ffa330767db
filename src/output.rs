use serde::{Deserialize, Serialize};

use crate::{runtime::Evaluation, value::Value};

pub const TEXT: &str = "text";
pub const TABLE: &str = "table";
pub const ALIGNMENT: &str = "alignment";

/// Text shown when a run neither displayed nor produced a value.
pub const NO_OUTPUT: &str = "(no output)";

/// A rendered cell result: a type tag for the front-end plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl Output {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::new(TEXT, Value::String(data.into()))
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT
    }
}

/// Picks the envelope for a finished run: the last display wins, then the last
/// statement value, then the [`NO_OUTPUT`] sentinel.
pub fn select_output(evaluation: &Evaluation) -> Output {
    if let Some(last) = evaluation.displays.last() {
        return build_output(&last.value, last.output_type.as_deref());
    }
    match &evaluation.last_value {
        Some(value) => detect_output(value),
        None => Output::text(NO_OUTPUT),
    }
}

/// An explicit `text` type coerces the value to its string form; any other
/// explicit type passes the value through untouched.
pub fn build_output(value: &Value, forced: Option<&str>) -> Output {
    match forced {
        Some(TEXT) => Output::text(value.to_text()),
        Some(kind) if !kind.is_empty() => Output::new(kind, value.clone()),
        _ => detect_output(value),
    }
}

pub fn detect_output(value: &Value) -> Output {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            Output::text(value.to_text())
        }
        Value::Array(items) => match items.first() {
            Some(Value::Array(_) | Value::Object(_)) => Output::new(TABLE, value.clone()),
            _ => Output::text(value.to_json_pretty()),
        },
        Value::Object(map) => {
            let present = |key: &str| value.get(key).is_some_and(Value::is_truthy);
            if present("aligned_query") && present("aligned_target") {
                Output::new(ALIGNMENT, value.clone())
            } else if map.contains_key("mean") || map.contains_key("count") {
                Output::new(TABLE, Value::array(vec![value.clone()]))
            } else {
                Output::text(value.to_json_pretty())
            }
        }
    }
}
