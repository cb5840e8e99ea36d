// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! The module symbol index.
//!
//! Rebuilt on demand from open buffers and on-disk files; every top-level
//! declaration becomes one [`Symbol`] carrying its location, visibility,
//! a C-minus-style signature, and its doc-comment.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use ecow::EcoString;

use cminus_core::project::Project;
use cminus_core::source_analysis::{Decl, File, FuncDecl, ParseError, parse_file, parse_source};

use crate::text::{index_of_identifier, last_identifier, split_lines};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Func,
    Struct,
    Union,
    Enum,
    Typedef,
    Global,
    Define,
}

impl SymbolKind {
    /// The LSP `SymbolKind` number for document/workspace symbols.
    #[must_use]
    pub fn lsp_symbol_kind(self) -> u32 {
        match self {
            SymbolKind::Func => 12,
            SymbolKind::Struct | SymbolKind::Union | SymbolKind::Typedef => 23,
            SymbolKind::Enum => 10,
            SymbolKind::Global => 13,
            SymbolKind::Define => 14,
        }
    }

    /// The LSP `CompletionItemKind` number for member completion.
    #[must_use]
    pub fn lsp_completion_kind(self) -> u32 {
        match self {
            SymbolKind::Func => 3,
            SymbolKind::Struct | SymbolKind::Union | SymbolKind::Typedef => 22,
            SymbolKind::Enum => 13,
            SymbolKind::Define => 21,
            SymbolKind::Global => 6,
        }
    }
}

/// One indexed top-level declaration.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: EcoString,
    pub kind: SymbolKind,
    pub file: Utf8PathBuf,
    /// 1-based declaration line.
    pub line1: u32,
    /// 0-based byte column of the name on that line.
    pub char0: u32,
    pub public: bool,
    pub doc: String,
    /// Display signature in C-minus syntax (unmangled).
    pub signature: String,
}

/// Import path → symbols, for every module of the project.
#[derive(Debug, Default)]
pub struct ModuleIndex {
    pub modules: HashMap<String, Vec<Symbol>>,
}

impl ModuleIndex {
    /// Looks up a public symbol by module and name.
    #[must_use]
    pub fn find_public(&self, import_path: &str, name: &str) -> Option<&Symbol> {
        self.modules
            .get(import_path)?
            .iter()
            .find(|s| s.public && s.name == name)
    }
}

/// Indexes the whole project, preferring open buffers over disk.
///
/// # Errors
///
/// Fails when any member file cannot be parsed.
pub fn build_module_index(
    proj: &Project,
    open_docs: &HashMap<Utf8PathBuf, String>,
) -> Result<ModuleIndex, ParseError> {
    let mut idx = ModuleIndex::default();

    for (import_path, module) in &proj.modules {
        let mut symbols = Vec::new();
        for file_path in &module.files {
            let source;
            let parsed = match open_docs.get(file_path) {
                Some(content) => {
                    source = content.clone();
                    parse_source(content, file_path)?
                }
                None => {
                    source = std::fs::read_to_string(file_path).unwrap_or_default();
                    parse_file(file_path)?
                }
            };
            symbols.extend(symbols_from_file(&parsed, file_path, &source));
        }
        idx.modules.insert(import_path.clone(), symbols);
    }

    Ok(idx)
}

/// Extracts symbols from one parsed file, locating each name's column on
/// its declaration line.
pub fn symbols_from_file(file: &File, path: &Utf8Path, source: &str) -> Vec<Symbol> {
    let lines = split_lines(source);

    let char_of = |line1: u32, name: &str| -> u32 {
        let Some(line) = lines.get((line1 as usize).saturating_sub(1)) else {
            return 0;
        };
        index_of_identifier(line, name).unwrap_or(0) as u32
    };

    let mut out = Vec::new();
    for decl in &file.decls {
        let symbol = match decl {
            Decl::Function(d) => Symbol {
                name: d.name.clone(),
                kind: SymbolKind::Func,
                file: path.to_path_buf(),
                line1: d.line,
                char0: char_of(d.line, &d.name),
                public: d.public,
                doc: d.doc.clone(),
                signature: format_func_signature(d),
            },
            Decl::Struct(d) => Symbol {
                name: d.name.clone(),
                kind: SymbolKind::Struct,
                file: path.to_path_buf(),
                line1: d.line,
                char0: char_of(d.line, &d.name),
                public: d.public,
                doc: d.doc.clone(),
                signature: format!("struct {}", d.name),
            },
            Decl::Union(d) => Symbol {
                name: d.name.clone(),
                kind: SymbolKind::Union,
                file: path.to_path_buf(),
                line1: d.line,
                char0: char_of(d.line, &d.name),
                public: d.public,
                doc: d.doc.clone(),
                signature: format!("union {}", d.name),
            },
            Decl::Enum(d) => Symbol {
                name: d.name.clone(),
                kind: SymbolKind::Enum,
                file: path.to_path_buf(),
                line1: d.line,
                char0: char_of(d.line, &d.name),
                public: d.public,
                doc: d.doc.clone(),
                signature: format!("enum {}", d.name),
            },
            Decl::Typedef(d) => {
                let Some(name) = typedef_name(&d.body) else {
                    continue;
                };
                Symbol {
                    name: EcoString::from(name),
                    kind: SymbolKind::Typedef,
                    file: path.to_path_buf(),
                    line1: d.line,
                    char0: char_of(d.line, name),
                    public: d.public,
                    doc: d.doc.clone(),
                    signature: format!("typedef {name}"),
                }
            }
            Decl::Global(d) => Symbol {
                name: d.name.clone(),
                kind: SymbolKind::Global,
                file: path.to_path_buf(),
                line1: d.line,
                char0: char_of(d.line, &d.name),
                public: d.public,
                doc: d.doc.clone(),
                signature: format!("{} {}", d.ty, d.name),
            },
            Decl::Define(d) => Symbol {
                name: d.name.clone(),
                kind: SymbolKind::Define,
                file: path.to_path_buf(),
                line1: d.line,
                char0: char_of(d.line, &d.name),
                public: d.public,
                doc: d.doc.clone(),
                signature: format!("#define {} {}", d.name, d.value),
            },
        };
        out.push(symbol);
    }

    out
}

/// Extracts the introduced name from a typedef body: the `(*Name)`
/// pointee for function-pointer typedefs, else the trailing identifier.
fn typedef_name(body: &str) -> Option<&str> {
    if let Some(star) = body.find("(*") {
        let after = &body[star + 2..];
        let close = after.find(')')?;
        let name = after[..close].trim();
        if !name.is_empty() {
            return Some(name);
        }
    }
    last_identifier(body).map(|(name, _)| name)
}

/// Renders a function signature in C-minus syntax for hovers and symbol
/// lists.
#[must_use]
pub fn format_func_signature(f: &FuncDecl) -> String {
    let mut out = String::new();
    if !f.return_type.is_empty() {
        out.push_str(&f.return_type);
        out.push(' ');
    }
    out.push_str(&f.name);
    out.push('(');
    for (i, p) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if !p.ty.is_empty() {
            out.push_str(&p.ty);
        }
        if !p.name.is_empty() {
            if !p.ty.is_empty() {
                out.push(' ');
            }
            out.push_str(&p.name);
        }
    }
    out.push(')');
    out
}
