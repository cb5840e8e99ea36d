// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Native C-minus answers for qualified symbols.
//!
//! Hover, definition, and completion over `mod.symbol` access never reach
//! clangd: the module index answers them directly from `.cm` sources, so
//! results carry C-minus signatures and doc-comments rather than mangled C
//! names.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use cminus_core::project::{Project, import_prefix};
use cminus_core::source_analysis::{parse_file, parse_source};

use crate::index::{ModuleIndex, build_module_index};
use crate::text::{ident_span_at, last_identifier, snap_char_to_identifier, split_lines};
use crate::uri::uri_from_path;

/// The identifier under the cursor, plus what it qualifies as:
/// `member` with a `module` prefix, or the module prefix itself.
struct QualifiedIdent<'a> {
    qualifier: &'a str,
    /// `None` when the cursor rests on the module prefix.
    member: Option<&'a str>,
    /// Byte span of the hovered token on the line.
    start: usize,
    end: usize,
}

/// Classifies the cursor position as qualified access, snapping off
/// punctuation first. Returns `None` when no module qualifier is involved.
fn qualified_ident_at(line: &str, char0: usize) -> Option<QualifiedIdent<'_>> {
    let char0 = snap_char_to_identifier(line, char0).unwrap_or(char0);
    let (start, end) = ident_span_at(line, char0)?;
    let ident = &line[start..end];
    let bytes = line.as_bytes();

    // `mod.ident` with the cursor on `ident`.
    if start > 0 && bytes[start - 1] == b'.' {
        let (qualifier, _) = last_identifier(&line[..start - 1])?;
        return Some(QualifiedIdent {
            qualifier,
            member: Some(ident),
            start,
            end,
        });
    }

    // `mod.ident` with the cursor on `mod`.
    if end < bytes.len() && bytes[end] == b'.' {
        return Some(QualifiedIdent {
            qualifier: ident,
            member: None,
            start,
            end,
        });
    }

    None
}

/// Maps each import's prefix (last path segment) to its full import path,
/// falling back from the buffer to disk to a raw line scan.
pub fn imported_module_prefixes(cm_path: &Utf8Path, cm_text: &str) -> HashMap<String, String> {
    if !cm_text.is_empty() {
        if let Ok(file) = parse_source(cm_text, cm_path) {
            return file
                .imports
                .iter()
                .map(|imp| (import_prefix(&imp.path).to_string(), imp.path.to_string()))
                .collect();
        }
    }
    if let Ok(file) = parse_file(cm_path) {
        return file
            .imports
            .iter()
            .map(|imp| (import_prefix(&imp.path).to_string(), imp.path.to_string()))
            .collect();
    }
    imported_prefixes_fallback(cm_text)
}

/// A dumb line scan used when the buffer does not parse.
fn imported_prefixes_fallback(cm_text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in split_lines(cm_text) {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("import \"") else {
            continue;
        };
        let Some(end) = rest.find('"') else {
            continue;
        };
        let path = &rest[..end];
        out.insert(import_prefix(path).to_string(), path.to_string());
    }
    out
}

/// Produces a hover for qualified access, or `None` to defer to clangd.
pub fn try_cm_hover(
    proj: &Project,
    open_docs: &HashMap<Utf8PathBuf, String>,
    cm_path: &Utf8Path,
    cm_text: &str,
    line0: u32,
    char0: u32,
) -> Option<Value> {
    let lines = split_lines(cm_text);
    let line = *lines.get(line0 as usize)?;

    let qi = qualified_ident_at(line, char0 as usize)?;
    let imports = imported_module_prefixes(cm_path, cm_text);
    let import_path = imports.get(qi.qualifier)?;

    let (value, start, end) = match qi.member {
        None => (
            format!("```c\nmodule \"{import_path}\"\n```"),
            qi.start,
            qi.end,
        ),
        Some(member) => {
            let idx = build_module_index(proj, open_docs).ok()?;
            let sym = idx.find_public(import_path, member)?;
            let mut value = format!("```c\n{}\n```", sym.signature);
            if !sym.doc.is_empty() {
                value.push_str("\n\n");
                value.push_str(&sym.doc);
            }
            (value, qi.start, qi.end)
        }
    };

    Some(json!({
        "contents": {"kind": "markdown", "value": value},
        "range": {
            "start": {"line": line0, "character": start},
            "end": {"line": line0, "character": end},
        },
    }))
}

/// Produces a definition location for qualified access, or `None` to defer
/// to clangd.
pub fn try_cm_definition(
    proj: &Project,
    open_docs: &HashMap<Utf8PathBuf, String>,
    cm_path: &Utf8Path,
    cm_text: &str,
    line0: u32,
    char0: u32,
) -> Option<Value> {
    let lines = split_lines(cm_text);
    let line = *lines.get(line0 as usize)?;

    let qi = qualified_ident_at(line, char0 as usize)?;
    let member = qi.member?;

    let imports = imported_module_prefixes(cm_path, cm_text);
    let import_path = imports.get(qi.qualifier)?;

    let idx = build_module_index(proj, open_docs).ok()?;
    let sym = idx.find_public(import_path, member)?;

    let uri = uri_from_path(&sym.file).ok()?;
    let line0_target = sym.line1.saturating_sub(1);
    let start = sym.char0;
    let end = start + sym.name.len() as u32;

    Some(json!([{
        "uri": uri,
        "range": {
            "start": {"line": line0_target, "character": start},
            "end": {"line": line0_target, "character": end},
        },
    }]))
}

/// What kind of CM-native completion the cursor position calls for.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompletionContext {
    /// Inside an unterminated `import "…` string.
    pub in_import_string: bool,
    /// Set when completing after `mod.`.
    pub member_module: Option<String>,
}

/// Classifies the prefix of the current line before the cursor.
pub fn completion_context(cm_text: &str, line0: u32, char0: u32) -> CompletionContext {
    let lines = split_lines(cm_text);
    let Some(line) = lines.get(line0 as usize) else {
        return CompletionContext::default();
    };
    let prefix = &line[..(char0 as usize).min(line.len())];

    if let Some(idx) = prefix.find("import \"") {
        let after = &prefix[idx + "import \"".len()..];
        if !after.contains('"') {
            return CompletionContext {
                in_import_string: true,
                member_module: None,
            };
        }
    }

    if let Some(before_dot) = prefix.strip_suffix('.') {
        if let Some((name, _)) = last_identifier(before_dot) {
            // The identifier must touch the dot and be a real identifier,
            // not the tail of a number literal.
            if before_dot.ends_with(name) && !name.starts_with(|c: char| c.is_ascii_digit()) {
                return CompletionContext {
                    in_import_string: false,
                    member_module: Some(name.to_string()),
                };
            }
        }
    }

    CompletionContext::default()
}

/// CM-native completion items: project modules inside `import "`, public
/// member symbols after an imported `mod.`, nothing otherwise.
pub fn cm_completions(
    proj: &Project,
    idx: &ModuleIndex,
    cm_path: &Utf8Path,
    cm_text: &str,
    line0: u32,
    char0: u32,
) -> Vec<Value> {
    let ctx = completion_context(cm_text, line0, char0);

    if ctx.in_import_string {
        return proj
            .modules
            .keys()
            .filter(|import_path| import_path.as_str() != "main")
            .map(|import_path| {
                json!({
                    "label": import_path,
                    "kind": 9,
                    "insertText": import_path,
                })
            })
            .collect();
    }

    let Some(module_prefix) = ctx.member_module else {
        return Vec::new();
    };

    let imports = imported_module_prefixes(cm_path, cm_text);
    let Some(target) = imports.get(&module_prefix) else {
        // Not imported in this file; suggest nothing.
        return Vec::new();
    };

    let Some(symbols) = idx.modules.get(target) else {
        return Vec::new();
    };

    symbols
        .iter()
        .filter(|s| s.public)
        .map(|s| {
            json!({
                "label": s.name.as_str(),
                "kind": s.kind.lsp_completion_kind(),
                "insertText": s.name.as_str(),
                "detail": s.signature,
            })
        })
        .collect()
}
