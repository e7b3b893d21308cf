//! Field-path extraction over control-plane documents.
//!
//! Paths are dot-separated; numeric segments index arrays, so
//! `bindings.0.members` reads the members of the first binding. Listings are
//! never sorted: index 0 is the first entry in the order the control plane
//! returned.

use serde_json::Value;

pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(doc);
    }
    path.split('.').try_fold(doc, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// String at `path`; `None` when absent or not a string.
pub fn str_at<'a>(doc: &'a Value, path: &str) -> Option<&'a str> {
    get_path(doc, path).and_then(Value::as_str)
}

/// Strings of the array at `path`. Non-string entries are skipped.
pub fn str_list_at(doc: &Value, path: &str) -> Vec<String> {
    get_path(doc, path)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// For each element of the array `list`, the string at `path`.
pub fn field_values(list: &Value, path: &str) -> Vec<String> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| str_at(item, path).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Element 0 of an array document.
pub fn first(doc: &Value) -> Option<&Value> {
    doc.as_array().and_then(|items| items.first())
}

/// `null`, `{}`, `[]` and `""` are empty.
pub fn is_empty(doc: &Value) -> bool {
    match doc {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
