// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! The line-oriented `.cm` parser.
//!
//! Parsing happens in two passes over the same line array:
//!
//! 1. A **prelude scan** collects `// +build` tags (before the first real
//!    line), the module declaration, imports, cimports, and `#cgo`
//!    directives.
//! 2. A **declaration pass** classifies each remaining line as the start of
//!    a function, struct, union, enum, typedef, global, or `#define`,
//!    extracting opaque bodies by brace balancing or `;` scanning and
//!    attaching pending doc-comments.

use camino::Utf8Path;
use ecow::EcoString;

use super::ast::{
    CImport, CgoFlag, CgoFlagKind, Decl, DefineDecl, EnumDecl, File, FuncDecl, GlobalDecl, Import,
    ModuleDecl, Param, RecordDecl, TypedefDecl,
};
use super::error::{ParseError, ParseErrorKind};

/// Parses a `.cm` file from disk.
///
/// # Errors
///
/// Returns a [`ParseError`] if the file cannot be read or violates the
/// grammar.
pub fn parse_file(path: &Utf8Path) -> Result<File, ParseError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| ParseError::new(path, 0, ParseErrorKind::Io(e)))?;
    parse_source(&source, path)
}

/// Parses `.cm` source text; `path` is used only for error messages.
///
/// # Errors
///
/// Returns a [`ParseError`] when the source has no module declaration, an
/// unterminated brace block, an unterminated `;` declaration, or a parameter
/// list that cannot be understood.
pub fn parse_source(source: &str, path: &Utf8Path) -> Result<File, ParseError> {
    let lines: Vec<&str> = source.lines().collect();

    let prelude = scan_prelude(&lines);
    let Some(module) = prelude.module else {
        return Err(ParseError::new(path, 1, ParseErrorKind::MissingModule));
    };

    let decls = parse_decls(&lines, path)?;

    Ok(File {
        module,
        imports: prelude.imports,
        cimports: prelude.cimports,
        cgo_flags: prelude.cgo_flags,
        build_tags: prelude.build_tags,
        decls,
    })
}

struct Prelude {
    module: Option<ModuleDecl>,
    imports: Vec<Import>,
    cimports: Vec<CImport>,
    cgo_flags: Vec<CgoFlag>,
    build_tags: Vec<Vec<EcoString>>,
}

/// Scans every line for directives. Build tags are only honoured in the
/// leading comment block, before the first non-blank non-comment line.
fn scan_prelude(lines: &[&str]) -> Prelude {
    let mut p = Prelude {
        module: None,
        imports: Vec::new(),
        cimports: Vec::new(),
        cgo_flags: Vec::new(),
        build_tags: Vec::new(),
    };
    let mut in_tag_block = true;

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        let line1 = (i + 1) as u32;

        if in_tag_block {
            if let Some(rest) = line.strip_prefix("// +build ") {
                let group: Vec<EcoString> = rest.split_whitespace().map(EcoString::from).collect();
                if !group.is_empty() {
                    p.build_tags.push(group);
                }
                continue;
            }
            if !line.is_empty() && !line.starts_with("//") {
                in_tag_block = false;
            }
        }

        if let Some(rest) = line.strip_prefix("module ") {
            if let Some(path) = quoted_arg(rest) {
                p.module = Some(ModuleDecl {
                    path: EcoString::from(path),
                    line: line1,
                });
            }
        } else if let Some(rest) = line.strip_prefix("cimport ") {
            // Checked before `import`: "import" is a prefix of "cimport".
            if let Some(path) = quoted_arg(rest) {
                p.cimports.push(CImport {
                    path: EcoString::from(path),
                    line: line1,
                });
            }
        } else if let Some(rest) = line.strip_prefix("import ") {
            if let Some(path) = quoted_arg(rest) {
                p.imports.push(Import {
                    path: EcoString::from(path),
                    line: line1,
                });
            }
        } else if let Some(rest) = line.strip_prefix("#cgo ") {
            if let Some(flag) = parse_cgo_directive(rest, line1) {
                p.cgo_flags.push(flag);
            }
        }
    }

    p
}

/// Extracts the quoted argument of a directive (`"math/vec"` → `math/vec`).
fn quoted_arg(rest: &str) -> Option<&str> {
    let tok = rest.split_whitespace().next()?;
    let tok = tok.trim_matches('"');
    if tok.is_empty() { None } else { Some(tok) }
}

/// Parses the tail of a `#cgo` directive: `[PLATFORM] CFLAGS:|LDFLAGS: ARGS`.
fn parse_cgo_directive(rest: &str, line1: u32) -> Option<CgoFlag> {
    let (head, flags) = rest.split_once(':')?;
    let mut head_fields = head.split_whitespace().rev();
    let kind = match head_fields.next()? {
        "CFLAGS" => CgoFlagKind::Cflags,
        "LDFLAGS" => CgoFlagKind::Ldflags,
        _ => return None,
    };
    let platform = head_fields.next().unwrap_or("");
    Some(CgoFlag {
        platform: EcoString::from(platform),
        kind,
        flags: EcoString::from(flags.trim()),
        line: line1,
    })
}

fn parse_decls(lines: &[&str], path: &Utf8Path) -> Result<Vec<Decl>, ParseError> {
    let mut decls = Vec::new();
    let mut doc: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        let line1 = (i + 1) as u32;

        if line.is_empty() {
            doc.clear();
            i += 1;
            continue;
        }
        if line.starts_with("// +build") {
            i += 1;
            continue;
        }
        if let Some(comment) = line.strip_prefix("//") {
            doc.push(comment.strip_prefix(' ').unwrap_or(comment).to_string());
            i += 1;
            continue;
        }
        if line.starts_with("module ")
            || line.starts_with("import ")
            || line.starts_with("cimport ")
            || line.starts_with("#cgo ")
        {
            doc.clear();
            i += 1;
            continue;
        }

        let (public, rest) = match line.strip_prefix("pub ") {
            Some(r) => (true, r.trim_start()),
            None => (false, line),
        };
        let doc_text = drain_doc(&mut doc);

        if let Some(r) = rest.strip_prefix("func ") {
            let (decl, consumed) = parse_function(lines, i, public, r, doc_text, path)?;
            decls.push(Decl::Function(decl));
            i += consumed;
        } else if let Some(r) = rest.strip_prefix("struct ") {
            let (decl, consumed) = parse_record(lines, i, public, r, doc_text, "struct", path)?;
            decls.push(Decl::Struct(decl));
            i += consumed;
        } else if let Some(r) = rest.strip_prefix("union ") {
            let (decl, consumed) = parse_record(lines, i, public, r, doc_text, "union", path)?;
            decls.push(Decl::Union(decl));
            i += consumed;
        } else if let Some(r) = rest.strip_prefix("enum ") {
            let (decl, consumed) = parse_enum(lines, i, public, r, doc_text, path)?;
            decls.push(Decl::Enum(decl));
            i += consumed;
        } else if rest.starts_with("typedef ") {
            let (decl, consumed) = parse_typedef(lines, i, public, doc_text, path)?;
            decls.push(Decl::Typedef(decl));
            i += consumed;
        } else if let Some(r) = rest.strip_prefix("#define ") {
            if let Some(decl) = parse_define(r, public, line1, doc_text) {
                decls.push(Decl::Define(decl));
            }
            i += 1;
        } else if is_global_candidate(rest) {
            let (decl, consumed) = parse_global(lines, i, public, doc_text, path)?;
            decls.push(Decl::Global(decl));
            i += consumed;
        } else {
            i += 1;
        }
    }

    Ok(decls)
}

fn drain_doc(doc: &mut Vec<String>) -> String {
    let text = doc.join("\n");
    doc.clear();
    text
}

/// Parses `NAME(PARAMS) RETTYPE { … }` starting at `lines[start]`.
///
/// `rest` is the first line with `pub func ` already stripped.
fn parse_function(
    lines: &[&str],
    start: usize,
    public: bool,
    rest: &str,
    doc: String,
    path: &Utf8Path,
) -> Result<(FuncDecl, usize), ParseError> {
    let line1 = (start + 1) as u32;

    let open = rest.find('(').ok_or_else(|| {
        ParseError::new(path, line1, ParseErrorKind::InvalidParam("expected '(' after function name".into()))
    })?;
    let name = rest[..open].split_whitespace().next().ok_or_else(|| {
        ParseError::new(path, line1, ParseErrorKind::InvalidParam("missing function name".into()))
    })?;

    // Find the matching close paren at depth 0; function-pointer parameters
    // nest their own parentheses.
    let close = matching_paren(rest, open).ok_or_else(|| {
        ParseError::new(path, line1, ParseErrorKind::InvalidParam("expected ')' after parameters".into()))
    })?;

    let params = parse_params(&rest[open + 1..close], path, line1)?;

    let after = rest[close + 1..].trim();
    let return_type = after.strip_suffix('{').unwrap_or(after).trim().to_string();

    let (body, consumed) = extract_brace_block(lines, start)
        .ok_or_else(|| ParseError::new(path, line1, ParseErrorKind::MissingBrace("function")))?;

    Ok((
        FuncDecl {
            public,
            name: EcoString::from(name),
            return_type,
            params,
            body,
            line: line1,
            doc,
        },
        consumed,
    ))
}

/// Returns the byte index of the `)` matching the `(` at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in s.char_indices().skip_while(|&(i, _)| i < open) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a parameter list on top-level commas and classifies each entry.
fn parse_params(param_str: &str, path: &Utf8Path, line1: u32) -> Result<Vec<Param>, ParseError> {
    let mut params = Vec::new();
    if param_str.trim().is_empty() {
        return Ok(params);
    }

    for part in split_top_level_commas(param_str) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part == "..." {
            params.push(Param {
                name: EcoString::new(),
                ty: "...".to_string(),
            });
            continue;
        }

        if let Some(star) = part.find("(*") {
            // Function pointer: the name sits between `(*` and the first `)`.
            let after = &part[star + 2..];
            let close = after.find(')').ok_or_else(|| {
                ParseError::new(path, line1, ParseErrorKind::InvalidParam(part.to_string()))
            })?;
            let name = after[..close].trim();
            let ty = part.replacen(&format!("(*{name})"), "(*)", 1);
            params.push(Param {
                name: EcoString::from(name),
                ty,
            });
            continue;
        }

        let fields: Vec<&str> = part.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(ParseError::new(
                path,
                line1,
                ParseErrorKind::InvalidParam(part.to_string()),
            ));
        }
        let name = fields[fields.len() - 1];
        let ty = fields[..fields.len() - 1].join(" ");
        params.push(Param {
            name: EcoString::from(name),
            ty,
        });
    }

    Ok(params)
}

fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[last..]);
    parts
}

/// Extracts a brace-balanced block starting at `lines[start]`.
///
/// Returns the text from the first `{` through the matching `}` and the
/// number of lines consumed, or `None` if the block never opens or closes.
fn extract_brace_block(lines: &[&str], start: usize) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut found = false;

    for (off, line) in lines[start..].iter().enumerate() {
        for ch in line.chars() {
            match ch {
                '{' => {
                    found = true;
                    depth += 1;
                    out.push('{');
                }
                '}' if found => {
                    depth -= 1;
                    out.push('}');
                    if depth == 0 {
                        return Some((out, off + 1));
                    }
                }
                _ if found => out.push(ch),
                _ => {}
            }
        }
        if found && depth > 0 {
            out.push('\n');
        }
    }

    None
}

fn parse_record(
    lines: &[&str],
    start: usize,
    public: bool,
    rest: &str,
    doc: String,
    kind: &'static str,
    path: &Utf8Path,
) -> Result<(RecordDecl, usize), ParseError> {
    let line1 = (start + 1) as u32;
    let name = rest
        .split(|c| c == '{' || c == ';')
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ParseError::new(path, line1, ParseErrorKind::InvalidParam(format!("missing {kind} name")))
        })?;

    // Forward declaration: `struct Node;` with no body.
    if rest.contains(';') && !rest.contains('{') {
        return Ok((
            RecordDecl {
                public,
                name: EcoString::from(name),
                body: String::new(),
                line: line1,
                doc,
            },
            1,
        ));
    }

    let (body, mut consumed) = extract_brace_block(lines, start)
        .ok_or_else(|| ParseError::new(path, line1, ParseErrorKind::MissingBrace(kind)))?;

    // Swallow a `;` left alone on the following line.
    if start + consumed < lines.len() && lines[start + consumed].trim() == ";" {
        consumed += 1;
    }

    Ok((
        RecordDecl {
            public,
            name: EcoString::from(name),
            body,
            line: line1,
            doc,
        },
        consumed,
    ))
}

fn parse_enum(
    lines: &[&str],
    start: usize,
    public: bool,
    rest: &str,
    doc: String,
    path: &Utf8Path,
) -> Result<(EnumDecl, usize), ParseError> {
    let line1 = (start + 1) as u32;
    let name = rest
        .split('{')
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ParseError::new(path, line1, ParseErrorKind::InvalidParam("missing enum name".into()))
        })?;

    let (body, mut consumed) = extract_brace_block(lines, start)
        .ok_or_else(|| ParseError::new(path, line1, ParseErrorKind::MissingBrace("enum")))?;

    if start + consumed < lines.len() && lines[start + consumed].trim() == ";" {
        consumed += 1;
    }

    Ok((
        EnumDecl {
            public,
            name: EcoString::from(name),
            body,
            line: line1,
            doc,
        },
        consumed,
    ))
}

fn parse_typedef(
    lines: &[&str],
    start: usize,
    public: bool,
    doc: String,
    path: &Utf8Path,
) -> Result<(TypedefDecl, usize), ParseError> {
    let line1 = (start + 1) as u32;
    let (_, consumed, text) = accumulate_until_semicolon(lines, start)
        .ok_or_else(|| ParseError::new(path, line1, ParseErrorKind::MissingSemicolon("typedef")))?;

    // Drop the leading `pub typedef` keywords and the trailing `;`.
    let body = text
        .trim_start()
        .trim_start_matches("pub ")
        .trim_start();
    let body = body.strip_prefix("typedef ").unwrap_or(body);
    let body = body.trim();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();

    Ok((
        TypedefDecl {
            public,
            body: body.to_string(),
            line: line1,
            doc,
        },
        consumed,
    ))
}

fn parse_define(rest: &str, public: bool, line1: u32, doc: String) -> Option<DefineDecl> {
    let mut it = rest.trim().splitn(2, char::is_whitespace);
    let name = it.next()?;
    if name.is_empty() {
        return None;
    }
    let value = it.next().unwrap_or("").trim().to_string();
    Some(DefineDecl {
        public,
        name: EcoString::from(name),
        value,
        line: line1,
        doc,
    })
}

/// A candidate global has no declaration keyword, no parentheses, and at
/// least a type token and a name token before any `=`.
fn is_global_candidate(rest: &str) -> bool {
    let s = rest.trim_start().trim_start_matches("static ").trim_start();
    if s.is_empty() || s.starts_with('#') || s.starts_with('}') {
        return false;
    }
    for kw in ["func ", "struct ", "union ", "enum ", "typedef "] {
        if s.starts_with(kw) {
            return false;
        }
    }
    if s.contains('(') || s.contains(')') {
        return false;
    }
    let left = s.split('=').next().unwrap_or("");
    left.split_whitespace().count() >= 2
}

fn parse_global(
    lines: &[&str],
    start: usize,
    public: bool,
    doc: String,
    path: &Utf8Path,
) -> Result<(GlobalDecl, usize), ParseError> {
    let line1 = (start + 1) as u32;
    let (_, consumed, text) = accumulate_until_semicolon(lines, start)
        .ok_or_else(|| ParseError::new(path, line1, ParseErrorKind::MissingSemicolon("global")))?;

    let mut s = text.trim();
    if let Some(r) = s.strip_prefix("pub ") {
        s = r.trim_start();
    }
    let is_static = if let Some(r) = s.strip_prefix("static ") {
        s = r.trim_start();
        true
    } else {
        false
    };
    let s = s.strip_suffix(';').unwrap_or(s).trim_end();

    let (left, value) = match s.split_once('=') {
        Some((l, r)) => (l.trim_end(), r.trim().to_string()),
        None => (s, String::new()),
    };

    let fields: Vec<&str> = left.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(ParseError::new(
            path,
            line1,
            ParseErrorKind::InvalidParam(format!("malformed global: {s}")),
        ));
    }
    let name = fields[fields.len() - 1];
    let ty = fields[..fields.len() - 1].join(" ");

    Ok((
        GlobalDecl {
            public,
            is_static,
            ty,
            name: EcoString::from(name),
            value,
            line: line1,
            doc,
        },
        consumed,
    ))
}

/// Joins lines from `start` until one ends with `;` (ignoring trailing
/// whitespace). Returns the 1-based last line, the line count, and the text.
fn accumulate_until_semicolon(lines: &[&str], start: usize) -> Option<(u32, usize, String)> {
    let mut text = String::new();
    for (off, line) in lines[start..].iter().enumerate() {
        if off > 0 {
            text.push('\n');
        }
        text.push_str(line);
        if line.trim_end().ends_with(';') {
            return Some(((start + off + 1) as u32, off + 1, text));
        }
    }
    None
}
