// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Document and workspace symbol listings from the module index.

use camino::Utf8Path;
use serde_json::{Value, json};

use crate::index::{ModuleIndex, Symbol};
use crate::uri::uri_from_path;

fn symbol_range(sym: &Symbol) -> Value {
    let line0 = sym.line1.saturating_sub(1);
    json!({
        "start": {"line": line0, "character": sym.char0},
        "end": {"line": line0, "character": sym.char0 + sym.name.len() as u32},
    })
}

/// `textDocument/documentSymbol`: a flat `DocumentSymbol[]` for one file.
pub fn document_symbols(idx: &ModuleIndex, import_path: &str, cm_path: &Utf8Path) -> Value {
    let mut out = Vec::new();

    if let Some(symbols) = idx.modules.get(import_path) {
        for sym in symbols {
            if sym.file != cm_path {
                continue;
            }
            let range = symbol_range(sym);
            out.push(json!({
                "name": sym.name.as_str(),
                "kind": sym.kind.lsp_symbol_kind(),
                "range": range,
                "selectionRange": range,
            }));
        }
    }

    Value::Array(out)
}

/// `workspace/symbol`: every symbol whose name contains the query as a
/// substring; an empty query matches everything.
pub fn workspace_symbols(idx: &ModuleIndex, query: &str) -> Value {
    let mut out = Vec::new();

    for symbols in idx.modules.values() {
        for sym in symbols {
            if !query.is_empty() && !sym.name.contains(query) {
                continue;
            }
            let Ok(uri) = uri_from_path(&sym.file) else {
                continue;
            };
            out.push(json!({
                "name": sym.name.as_str(),
                "kind": sym.kind.lsp_symbol_kind(),
                "location": {
                    "uri": uri,
                    "range": symbol_range(sym),
                },
            }));
        }
    }

    Value::Array(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::symbols_from_file;
    use camino::Utf8PathBuf;
    use cminus_core::source_analysis::parse_source;

    fn index_one(import_path: &str, path: &str, source: &str) -> ModuleIndex {
        let path = Utf8PathBuf::from(path);
        let file = parse_source(source, &path).unwrap();
        let mut idx = ModuleIndex::default();
        idx.modules.insert(import_path.to_string(), symbols_from_file(&file, &path, source));
        idx
    }

    #[test]
    fn document_symbols_report_functions_with_kind_12() {
        let source = "module \"main\"\n\npub func hello(int a) int { return a; }\n\nfunc main() int { return 0; }\n";
        let idx = index_one("main", "/proj/main.cm", source);

        let out = document_symbols(&idx, "main", Utf8Path::new("/proj/main.cm"));
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["name"], "hello");
        assert_eq!(arr[0]["kind"], 12);
        assert_eq!(arr[0]["range"]["start"]["line"], 2);
    }

    #[test]
    fn document_symbols_filter_by_file() {
        let source = "module \"main\"\nfunc main() int { return 0; }\n";
        let idx = index_one("main", "/proj/main.cm", source);
        let out = document_symbols(&idx, "main", Utf8Path::new("/proj/other.cm"));
        assert!(out.as_array().unwrap().is_empty());
    }

    #[test]
    fn workspace_symbols_match_substrings() {
        let source = "module \"main\"\n\npub func hello() int { return 0; }\npub func hello_world() int { return 0; }\npub func bye() int { return 0; }\n";
        let idx = index_one("main", "/proj/main.cm", source);

        let out = workspace_symbols(&idx, "hello");
        let names: Vec<&str> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"hello"));
        assert!(names.contains(&"hello_world"));
    }

    #[test]
    fn empty_query_returns_everything() {
        let source = "module \"main\"\n\npub struct S { int x; };\nfunc main() int { return 0; }\n";
        let idx = index_one("main", "/proj/main.cm", source);
        let out = workspace_symbols(&idx, "");
        assert_eq!(out.as_array().unwrap().len(), 2);
    }
}
