// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Remapping clangd results back into `.cm` coordinates.
//!
//! clangd answers about the generated C; every range and URI in its
//! results is translated through the [`LineMapper`] before reaching the
//! client. When a mapping fails the original payload passes through
//! unmapped (hover, locations) or degrades to a zero-width insert at the
//! request position (completion edits) so data is never dropped.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::line_map::LineMapper;
use crate::text::split_lines;
use crate::uri::uri_from_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspPosition {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspRange {
    pub start: LspPosition,
    pub end: LspPosition,
}

/// Maps a 0-based generated-C position to its `.cm` position.
pub fn map_position_c_to_cm(lm: &LineMapper, pos: LspPosition) -> Option<(Utf8PathBuf, LspPosition)> {
    let (file, orig_line1) = lm.map_line(pos.line + 1)?;
    Some((
        file.to_path_buf(),
        LspPosition {
            line: orig_line1 - 1,
            character: pos.character,
        },
    ))
}

/// Maps a range; `None` when either end is unmapped or the ends land in
/// different files.
pub fn map_range_c_to_cm(lm: &LineMapper, range: LspRange) -> Option<(Utf8PathBuf, LspRange)> {
    let (file_start, start) = map_position_c_to_cm(lm, range.start)?;
    let (file_end, end) = map_position_c_to_cm(lm, range.end)?;
    if file_start != file_end {
        return None;
    }
    Some((file_start, LspRange { start, end }))
}

/// Remaps a hover result's optional `range`; the contents pass through.
pub fn map_hover_result(lm: &LineMapper, raw: Value) -> Value {
    let mut obj = match raw {
        Value::Object(obj) => obj,
        other => return other,
    };

    if let Some(range_value) = obj.get("range") {
        if let Ok(range) = serde_json::from_value::<LspRange>(range_value.clone()) {
            if let Some((_, mapped)) = map_range_c_to_cm(lm, range) {
                obj.insert("range".to_string(), serde_json::to_value(mapped).expect("range serialize"));
            }
        }
    }

    Value::Object(obj)
}

/// Remaps definition/references results: a bare `Location`, an array of
/// `Location`s, or an array of `LocationLink`s.
pub fn map_locations(lm: &LineMapper, raw: Value) -> Value {
    match raw {
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_locations(lm, v)).collect()),
        Value::Object(mut obj) => {
            if obj.contains_key("uri") {
                map_location_in_place(lm, &mut obj, "uri", "range");
                Value::Object(obj)
            } else if obj.contains_key("targetUri") {
                map_location_in_place(lm, &mut obj, "targetUri", "targetRange");
                if let Some(sel) = obj.get("targetSelectionRange") {
                    if let Ok(range) = serde_json::from_value::<LspRange>(sel.clone()) {
                        if let Some((_, mapped)) = map_range_c_to_cm(lm, range) {
                            obj.insert(
                                "targetSelectionRange".to_string(),
                                serde_json::to_value(mapped).expect("range serialize"),
                            );
                        }
                    }
                }
                Value::Object(obj)
            } else {
                Value::Object(obj)
            }
        }
        other => other,
    }
}

fn map_location_in_place(
    lm: &LineMapper,
    obj: &mut serde_json::Map<String, Value>,
    uri_key: &str,
    range_key: &str,
) {
    let Some(range_value) = obj.get(range_key) else {
        return;
    };
    let Ok(range) = serde_json::from_value::<LspRange>(range_value.clone()) else {
        return;
    };
    let Some((file, mapped)) = map_range_c_to_cm(lm, range) else {
        return;
    };
    let Ok(cm_uri) = uri_from_path(&file) else {
        return;
    };
    obj.insert(uri_key.to_string(), Value::String(cm_uri));
    obj.insert(range_key.to_string(), serde_json::to_value(mapped).expect("range serialize"));
}

/// Remaps completion results (`CompletionList` or a bare item array):
/// every item's `textEdit` and `additionalTextEdits` come back in `.cm`
/// coordinates.
pub fn map_completion_result(
    raw: Value,
    lm: &LineMapper,
    cm_path: &Utf8Path,
    cm_text: &str,
    cm_line: u32,
    cm_char: u32,
) -> Value {
    match raw {
        Value::Object(mut obj) => {
            if let Some(Value::Array(items)) = obj.remove("items") {
                let mapped: Vec<Value> = items
                    .into_iter()
                    .map(|item| map_completion_item(item, lm, cm_path, cm_text, cm_line, cm_char))
                    .collect();
                obj.insert("items".to_string(), Value::Array(mapped));
            }
            Value::Object(obj)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| map_completion_item(item, lm, cm_path, cm_text, cm_line, cm_char))
                .collect(),
        ),
        other => other,
    }
}

fn map_completion_item(
    item: Value,
    lm: &LineMapper,
    cm_path: &Utf8Path,
    cm_text: &str,
    cm_line: u32,
    cm_char: u32,
) -> Value {
    let mut obj = match item {
        Value::Object(obj) => obj,
        other => return other,
    };

    if let Some(edit) = obj.remove("textEdit") {
        let mapped = if edit.get("insert").is_some() && edit.get("replace").is_some() {
            map_insert_replace_edit(edit, lm, cm_path, cm_text, cm_line, cm_char)
        } else {
            map_text_edit(edit, lm, cm_path, cm_text, cm_line, cm_char)
        };
        obj.insert("textEdit".to_string(), mapped);
    }

    if let Some(Value::Array(edits)) = obj.remove("additionalTextEdits") {
        let mapped: Vec<Value> = edits
            .into_iter()
            .map(|e| map_text_edit(e, lm, cm_path, cm_text, cm_line, cm_char))
            .collect();
        obj.insert("additionalTextEdits".to_string(), Value::Array(mapped));
    }

    Value::Object(obj)
}

fn map_text_edit(
    edit: Value,
    lm: &LineMapper,
    cm_path: &Utf8Path,
    cm_text: &str,
    cm_line: u32,
    cm_char: u32,
) -> Value {
    let mut obj = match edit {
        Value::Object(obj) => obj,
        other => return other,
    };
    let mapped = obj
        .get("range")
        .cloned()
        .and_then(|v| serde_json::from_value::<LspRange>(v).ok())
        .and_then(|range| map_range_c_to_cm(lm, range))
        .filter(|(file, _)| file == cm_path)
        .map(|(_, range)| clamp_range_to_line(range, cm_text));

    let range = mapped.unwrap_or(zero_width_at(cm_line, cm_char));
    obj.insert("range".to_string(), serde_json::to_value(range).expect("range serialize"));
    Value::Object(obj)
}

fn map_insert_replace_edit(
    edit: Value,
    lm: &LineMapper,
    cm_path: &Utf8Path,
    cm_text: &str,
    cm_line: u32,
    cm_char: u32,
) -> Value {
    let mut obj = match edit {
        Value::Object(obj) => obj,
        other => return other,
    };

    for key in ["insert", "replace"] {
        let mapped = obj
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value::<LspRange>(v).ok())
            .and_then(|range| map_range_c_to_cm(lm, range))
            .filter(|(file, _)| file == cm_path)
            .map(|(_, range)| clamp_range_to_line(range, cm_text));
        let range = mapped.unwrap_or(zero_width_at(cm_line, cm_char));
        obj.insert(key.to_string(), serde_json::to_value(range).expect("range serialize"));
    }

    Value::Object(obj)
}

fn zero_width_at(line: u32, character: u32) -> LspRange {
    let pos = LspPosition { line, character };
    LspRange { start: pos, end: pos }
}

/// Clamps a range's columns to the actual `.cm` line lengths.
fn clamp_range_to_line(mut range: LspRange, cm_text: &str) -> LspRange {
    let lines = split_lines(cm_text);
    let clamp = |line: u32, character: u32| -> u32 {
        match lines.get(line as usize) {
            Some(text) => character.min(text.len() as u32),
            None => character,
        }
    };
    range.start.character = clamp(range.start.line, range.start.character);
    range.end.character = clamp(range.end.line, range.end.character);
    range
}

/// Appends CM-native items to whatever clangd returned (a
/// `CompletionList`, an item array, or nothing).
pub fn merge_completion_items(clangd_result: Value, extra: Vec<Value>) -> Value {
    if extra.is_empty() {
        return clangd_result;
    }

    match clangd_result {
        Value::Object(mut obj) => {
            let mut items = match obj.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            items.extend(extra);
            obj.insert("items".to_string(), Value::Array(items));
            Value::Object(obj)
        }
        Value::Array(mut items) => {
            items.extend(extra);
            Value::Array(items)
        }
        _ => Value::Array(extra),
    }
}
