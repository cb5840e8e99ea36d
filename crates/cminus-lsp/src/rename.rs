// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Rename across the module graph.
//!
//! Unqualified occurrences are renamed throughout the defining module;
//! when the symbol is public, `module.name` occurrences are renamed in
//! every other module. Occurrences inside strings, character literals,
//! and comments are never touched.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use cminus_core::project::Project;

use crate::index::build_module_index;
use crate::server::RequestError;
use crate::text::{
    ident_span_at, identifier_at, is_ident_byte, is_in_string_or_comment, split_lines,
};
use crate::transpile::module_import_path;
use crate::uri::uri_from_path;

/// A valid C-minus identifier: letter or `_`, then identifier characters.
pub fn is_valid_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    let Some(&first) = bytes.first() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return false;
    }
    bytes[1..].iter().all(|&b| is_ident_byte(b))
}

/// `textDocument/prepareRename`: the identifier's range and placeholder,
/// or `null` when the position is inside a literal/comment or off any
/// identifier.
pub fn prepare_rename(cm_text: &str, line0: u32, char0: u32) -> Value {
    let lines = split_lines(cm_text);
    let Some(line) = lines.get(line0 as usize) else {
        return Value::Null;
    };
    let char0 = (char0 as usize).min(line.len());

    if is_in_string_or_comment(cm_text, line0 as usize, char0) {
        return Value::Null;
    }
    let Some((start, end)) = ident_span_at(line, char0) else {
        return Value::Null;
    };

    json!({
        "range": {
            "start": {"line": line0, "character": start},
            "end": {"line": line0, "character": end},
        },
        "placeholder": &line[start..end],
    })
}

/// `textDocument/rename`: computes the workspace edit.
///
/// # Errors
///
/// Invalid names, positions off identifiers, and positions inside
/// literals/comments are parameter errors; index failures are internal.
pub fn rename_workspace_edit(
    proj: &Project,
    open_docs: &HashMap<Utf8PathBuf, String>,
    cm_path: &Utf8Path,
    cm_text: &str,
    line0: u32,
    char0: u32,
    new_name: &str,
) -> Result<Value, RequestError> {
    if !is_valid_identifier(new_name) {
        return Err(RequestError::invalid_params("newName must be an identifier"));
    }

    let lines = split_lines(cm_text);
    let Some(line) = lines.get(line0 as usize) else {
        return Err(RequestError::invalid_params("position out of range"));
    };
    let char0 = (char0 as usize).min(line.len());

    if is_in_string_or_comment(cm_text, line0 as usize, char0) {
        return Err(RequestError::invalid_params("rename not valid in strings/comments"));
    }

    let (ident, qualifier) = identifier_at(line, char0);
    let Some(old_name) = ident else {
        return Err(RequestError::invalid_params("no identifier at position"));
    };

    let current_module = module_import_path(proj, cm_path);
    let target_module = qualifier.map_or(current_module, str::to_string);

    let idx = build_module_index(proj, open_docs).map_err(RequestError::internal)?;
    let is_public = idx
        .modules
        .get(&target_module)
        .and_then(|syms| syms.iter().find(|s| s.name == old_name))
        .is_some_and(|s| s.public);

    let mut changes = serde_json::Map::new();

    // Unqualified occurrences inside the defining module.
    if let Some(module) = proj.modules.get(&target_module) {
        for file_path in &module.files {
            let text = read_doc(open_docs, file_path);
            let edits = find_rename_edits(&text, old_name, new_name, None);
            insert_edits(&mut changes, file_path, edits);
        }
    }

    // Qualified occurrences elsewhere, public symbols only.
    if is_public {
        for (import_path, module) in &proj.modules {
            if *import_path == target_module {
                continue;
            }
            for file_path in &module.files {
                let text = read_doc(open_docs, file_path);
                let edits = find_rename_edits(&text, old_name, new_name, Some(&target_module));
                insert_edits(&mut changes, file_path, edits);
            }
        }
    }

    Ok(json!({"changes": Value::Object(changes)}))
}

fn read_doc(open_docs: &HashMap<Utf8PathBuf, String>, path: &Utf8Path) -> String {
    match open_docs.get(path) {
        Some(text) => text.clone(),
        None => std::fs::read_to_string(path).unwrap_or_default(),
    }
}

fn insert_edits(changes: &mut serde_json::Map<String, Value>, path: &Utf8Path, edits: Vec<Value>) {
    if edits.is_empty() {
        return;
    }
    let Ok(uri) = uri_from_path(path) else {
        return;
    };
    match changes.get_mut(&uri) {
        Some(Value::Array(existing)) => existing.extend(edits),
        _ => {
            changes.insert(uri, Value::Array(edits));
        }
    }
}

/// Collects text edits replacing standalone occurrences of the needle.
///
/// With `qualified_module`, the needle is `module.old_name` and the
/// replacement keeps the prefix. Occurrences inside strings, character
/// literals, and comments are skipped.
pub fn find_rename_edits(
    text: &str,
    old_name: &str,
    new_name: &str,
    qualified_module: Option<&str>,
) -> Vec<Value> {
    let (needle, replacement) = match qualified_module {
        Some(module) => (format!("{module}.{old_name}"), format!("{module}.{new_name}")),
        None => (old_name.to_string(), new_name.to_string()),
    };

    let mut edits = Vec::new();
    for (line_idx, line) in split_lines(text).iter().enumerate() {
        let bytes = line.as_bytes();
        let mut pos = 0;
        while let Some(found) = line[pos..].find(&needle) {
            let abs = pos + found;
            let after = abs + needle.len();

            let before_ok = abs == 0 || !is_ident_byte(bytes[abs - 1]);
            let after_ok = after >= bytes.len() || !is_ident_byte(bytes[after]);

            if before_ok && after_ok && !is_in_string_or_comment(text, line_idx, abs) {
                edits.push(json!({
                    "range": {
                        "start": {"line": line_idx, "character": abs},
                        "end": {"line": line_idx, "character": after},
                    },
                    "newText": replacement,
                }));
            }

            pos = after;
            if pos >= line.len() {
                break;
            }
        }
    }

    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use cminus_core::project;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("hello"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("v2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2v"));
        assert!(!is_valid_identifier("has-dash"));
        assert!(!is_valid_identifier("has space"));
    }

    #[test]
    fn edits_skip_comments_and_strings() {
        let text = "module \"m\"\n\npub func hello() int { return 0; }\n\n// hello should not be changed here\nfunc caller() int {\n    char* s = \"hello\";\n    return hello();\n}\n";
        let edits = find_rename_edits(text, "hello", "hi", None);

        assert_eq!(edits.len(), 2, "declaration and call site only");
        let lines: Vec<u64> = edits.iter().map(|e| e["range"]["start"]["line"].as_u64().unwrap()).collect();
        assert_eq!(lines, vec![2, 7]);
    }

    #[test]
    fn edits_respect_identifier_boundaries() {
        let text = "int hello = hello_world + hello;\n";
        let edits = find_rename_edits(text, "hello", "hi", None);
        assert_eq!(edits.len(), 2, "hello_world must not match");
    }

    #[test]
    fn qualified_edits_keep_the_module_prefix() {
        let text = "func main() int {\n    return math.hello();\n}\n";
        let edits = find_rename_edits(text, "hello", "hi", Some("math"));
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0]["newText"], "math.hi");
        let start = edits[0]["range"]["start"]["character"].as_u64().unwrap() as usize;
        assert_eq!(&text.lines().nth(1).unwrap()[start..start + 4], "math");
    }

    #[test]
    fn prepare_rename_vetoes_literals_and_comments() {
        let text = "// a comment with word\nchar* s = \"string word\";\nint word = 0;\n";
        assert_eq!(prepare_rename(text, 0, 18), Value::Null);
        assert_eq!(prepare_rename(text, 1, 14), Value::Null);

        let ok = prepare_rename(text, 2, 5);
        assert_eq!(ok["placeholder"], "word");
        assert_eq!(ok["range"]["start"]["character"], 4);
    }

    #[test]
    fn cross_module_rename_touches_definition_and_call_site() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("cm.mod"), "module \"p\"\n").unwrap();
        let math = root.join("math");
        fs::create_dir_all(&math).unwrap();
        fs::write(
            math.join("math.cm"),
            "module \"math\"\n\npub func hello() int { return 1; }\n",
        )
        .unwrap();
        fs::write(
            root.join("main.cm"),
            "module \"main\"\nimport \"math\"\n\nfunc main() int {\n    return math.hello();\n}\n",
        )
        .unwrap();

        let proj = project::discover(&root).unwrap();
        let cm_path = root.join("main.cm");
        let cm_text = fs::read_to_string(&cm_path).unwrap();
        let char0 = cm_text.lines().nth(4).unwrap().find("hello").unwrap() as u32;

        let edit = rename_workspace_edit(&proj, &HashMap::new(), &cm_path, &cm_text, 4, char0, "hi")
            .unwrap();
        let changes = edit["changes"].as_object().unwrap();

        assert_eq!(changes.len(), 2, "both main.cm and math.cm change");
        let main_uri = uri_from_path(&cm_path).unwrap();
        let math_uri = uri_from_path(&math.join("math.cm")).unwrap();
        assert!(changes.contains_key(&main_uri));
        assert!(changes.contains_key(&math_uri));
    }

    #[test]
    fn private_symbols_rename_only_inside_their_module() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("cm.mod"), "module \"p\"\n").unwrap();
        let math = root.join("math");
        fs::create_dir_all(&math).unwrap();
        fs::write(
            math.join("math.cm"),
            "module \"math\"\n\nfunc helper() int { return helper(); }\n",
        )
        .unwrap();
        fs::write(
            root.join("main.cm"),
            "module \"main\"\n\nfunc main() int { return 0; }\n",
        )
        .unwrap();

        let proj = project::discover(&root).unwrap();
        let cm_path = math.join("math.cm");
        let cm_text = fs::read_to_string(&cm_path).unwrap();
        let char0 = cm_text.lines().nth(2).unwrap().find("helper").unwrap() as u32;

        let edit = rename_workspace_edit(&proj, &HashMap::new(), &cm_path, &cm_text, 2, char0, "aux")
            .unwrap();
        let changes = edit["changes"].as_object().unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn invalid_new_name_is_a_parameter_error() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("cm.mod"), "module \"p\"\n").unwrap();
        fs::write(root.join("main.cm"), "module \"main\"\nfunc main() int { return 0; }\n").unwrap();
        let proj = project::discover(&root).unwrap();
        let cm_path = root.join("main.cm");

        let err = rename_workspace_edit(&proj, &HashMap::new(), &cm_path, "func main…", 0, 0, "1bad")
            .unwrap_err();
        assert_eq!(err.code, crate::server::ERROR_INVALID_PARAMS);
    }
}
