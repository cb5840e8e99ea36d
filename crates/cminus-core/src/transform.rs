// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Function-body rewriting.
//!
//! Bodies stay opaque; a single tokenising pass rewrites just the forms the
//! language defines:
//!
//! - `mod.sym` through a C-minus import → `mod_path_sym` (mangled)
//! - `hdr.sym` through a C import → `sym` (prefix dropped, no mangling)
//! - bare enum values → `module_Enum_VALUE`
//! - bare non-static globals → `module_name`
//! - bare public defines → `module_NAME`
//!
//! Strings and character literals are inviolate: every byte between the
//! delimiters, escapes included, passes through untouched.

use std::collections::HashMap;

use thiserror::Error;

use crate::paths::sanitize_module_name;
use crate::project::import_prefix;
use crate::source_analysis::{CImport, Import};

/// Import prefix (last path segment) → full module path.
pub type ImportMap = HashMap<String, String>;

/// C header prefix (`stdio` for `stdio.h`) → header path.
pub type CImportMap = HashMap<String, String>;

/// Bare enum value name → fully qualified C name.
pub type EnumValueMap = HashMap<String, String>;

/// Bare global name → mangled C name.
pub type GlobalVarMap = HashMap<String, String>;

/// Bare define name → mangled C name.
pub type DefineMap = HashMap<String, String>;

/// Two imports collide when they share a prefix but name different targets.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("import prefix collision: both \"{first}\" and \"{second}\" would use prefix \"{prefix}\"")]
    PrefixCollision {
        prefix: String,
        first: String,
        second: String,
    },
}

/// Builds the prefix → path map for a file's C-minus imports.
///
/// # Errors
///
/// Fails when two distinct import paths share a last segment.
pub fn build_import_map(imports: &[Import]) -> Result<ImportMap, TransformError> {
    let mut map = ImportMap::new();
    for imp in imports {
        let prefix = import_prefix(&imp.path).to_string();
        if let Some(existing) = map.get(&prefix) {
            if existing != imp.path.as_str() {
                return Err(TransformError::PrefixCollision {
                    prefix,
                    first: existing.clone(),
                    second: imp.path.to_string(),
                });
            }
        }
        map.insert(prefix, imp.path.to_string());
    }
    Ok(map)
}

/// Builds the prefix → header map for a file's C imports.
///
/// For `stdio.h` the prefix is `stdio`; for `sys/types.h` it is `types`.
///
/// # Errors
///
/// Fails when two distinct headers share a prefix.
pub fn build_cimport_map(cimports: &[CImport]) -> Result<CImportMap, TransformError> {
    let mut map = CImportMap::new();
    for cimp in cimports {
        let prefix = cimport_prefix(&cimp.path).to_string();
        if let Some(existing) = map.get(&prefix) {
            if existing != cimp.path.as_str() {
                return Err(TransformError::PrefixCollision {
                    prefix,
                    first: existing.clone(),
                    second: cimp.path.to_string(),
                });
            }
        }
        map.insert(prefix, cimp.path.to_string());
    }
    Ok(map)
}

fn cimport_prefix(header_path: &str) -> &str {
    let name = header_path.strip_suffix(".h").unwrap_or(header_path);
    import_prefix(name)
}

/// Symbol maps consumed by [`transform_function_body`].
#[derive(Debug, Default)]
pub struct SymbolMaps {
    pub imports: ImportMap,
    pub cimports: CImportMap,
    pub enum_values: EnumValueMap,
    pub globals: GlobalVarMap,
    pub defines: DefineMap,
}

/// Rewrites one opaque function body.
#[must_use]
pub fn transform_function_body(body: &str, maps: &SymbolMaps) -> String {
    let tokens = tokenize(body);
    let mut out = String::with_capacity(body.len());
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];

        if tok.kind == TokenKind::Ident && tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::Dot)
        {
            let prefix = tok.text.as_str();

            if maps.cimports.contains_key(prefix) {
                // C header access: drop the prefix and the dot.
                i += 2;
                if let Some(next) = tokens.get(i) {
                    if next.kind == TokenKind::Ident {
                        out.push_str(&next.text);
                        i += 1;
                    }
                }
                continue;
            }

            if let Some(full_path) = maps.imports.get(prefix) {
                // Qualified module access, possibly chained for enum values.
                out.push_str(&sanitize_module_name(full_path));
                i += 2;
                while i < tokens.len() && tokens[i].kind == TokenKind::Ident {
                    out.push('_');
                    out.push_str(&tokens[i].text);
                    i += 1;
                    if i < tokens.len() && tokens[i].kind == TokenKind::Dot {
                        i += 1;
                    } else {
                        break;
                    }
                }
                continue;
            }

            // Struct-field access: leave untouched.
            out.push_str(&tok.text);
            i += 1;
            continue;
        }

        if tok.kind == TokenKind::Ident {
            if let Some(replacement) = maps.enum_values.get(tok.text.as_str()) {
                out.push_str(replacement);
            } else if let Some(replacement) = maps.globals.get(tok.text.as_str()) {
                out.push_str(replacement);
            } else if let Some(replacement) = maps.defines.get(tok.text.as_str()) {
                out.push_str(replacement);
            } else {
                out.push_str(&tok.text);
            }
            i += 1;
            continue;
        }

        out.push_str(&tok.text);
        i += 1;
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Dot,
    Other,
}

#[derive(Debug)]
struct Token {
    kind: TokenKind,
    text: String,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// One pass over the bytes producing Ident/Dot/Other tokens.
///
/// Quoted runs are one Other token, escapes included. A digit starts a
/// number-shaped Other run that absorbs any trailing identifier characters,
/// so a suffix like the `f` of `1.5f` or the `abc` of `123abc` never
/// becomes a rewritable identifier. All boundaries fall on ASCII bytes, so
/// slicing is UTF-8 safe.
fn tokenize(body: &str) -> Vec<Token> {
    let bytes = body.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'.' {
            tokens.push(Token {
                kind: TokenKind::Dot,
                text: ".".to_string(),
            });
            i += 1;
        } else if b == b'"' || b == b'\'' {
            let start = i;
            let quote = b;
            i += 1;
            while i < bytes.len() && bytes[i] != quote {
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            if i < bytes.len() {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Other,
                text: body[start..i].to_string(),
            });
        } else if is_ident_start(b) {
            let start = i;
            i += 1;
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: body[start..i].to_string(),
            });
        } else if b.is_ascii_digit() {
            let start = i;
            i += 1;
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Other,
                text: body[start..i].to_string(),
            });
        } else {
            let start = i;
            i += 1;
            while i < bytes.len() {
                let c = bytes[i];
                if c == b'.' || c == b'"' || c == b'\'' || is_ident_start(c) || c.is_ascii_digit() {
                    break;
                }
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Other,
                text: body[start..i].to_string(),
            });
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecow::EcoString;

    fn import(path: &str) -> Import {
        Import {
            path: EcoString::from(path),
            line: 1,
        }
    }

    fn cimport(path: &str) -> CImport {
        CImport {
            path: EcoString::from(path),
            line: 1,
        }
    }

    fn maps_with_imports(imports: &[Import]) -> SymbolMaps {
        SymbolMaps {
            imports: build_import_map(imports).unwrap(),
            ..SymbolMaps::default()
        }
    }

    #[test]
    fn qualified_access_is_mangled() {
        let maps = maps_with_imports(&[import("math")]);
        let body = "{ int x = math.add(1, 2); return x; }";
        let out = transform_function_body(body, &maps);
        assert_eq!(out, "{ int x = math_add(1, 2); return x; }");
        assert!(!out.contains("math.add"));
    }

    #[test]
    fn nested_import_path_uses_full_sanitized_path() {
        let maps = maps_with_imports(&[import("utils/io")]);
        let out = transform_function_body("{ io.read(); }", &maps);
        assert_eq!(out, "{ utils_io_read(); }");
    }

    #[test]
    fn chained_access_covers_enum_values() {
        let maps = maps_with_imports(&[import("state")]);
        let out = transform_function_body("{ s = state.State.IDLE; }", &maps);
        assert_eq!(out, "{ s = state_State_IDLE; }");
    }

    #[test]
    fn cimport_access_drops_prefix() {
        let maps = SymbolMaps {
            cimports: build_cimport_map(&[cimport("stdio.h")]).unwrap(),
            ..SymbolMaps::default()
        };
        let out = transform_function_body("{ stdio.printf(\"x\"); }", &maps);
        assert_eq!(out, "{ printf(\"x\"); }");
    }

    #[test]
    fn struct_field_access_is_untouched() {
        let maps = maps_with_imports(&[import("math")]);
        let out = transform_function_body("{ return p.x + p.y; }", &maps);
        assert_eq!(out, "{ return p.x + p.y; }");
    }

    #[test]
    fn string_and_char_literals_are_inviolate() {
        let mut maps = maps_with_imports(&[import("math")]);
        maps.enum_values.insert("TODO".into(), "state_State_TODO".into());
        let body = "{ puts(\"math.add TODO \\\" quote\"); char c = 'T'; int t = TODO; }";
        let out = transform_function_body(body, &maps);
        assert!(out.contains("\"math.add TODO \\\" quote\""));
        assert!(out.contains("char c = 'T';"));
        assert!(out.contains("int t = state_State_TODO;"));
    }

    #[test]
    fn enum_then_global_then_define_first_match_wins() {
        let mut maps = SymbolMaps::default();
        maps.enum_values.insert("X".into(), "m_E_X".into());
        maps.globals.insert("X".into(), "m_X_global".into());
        maps.defines.insert("MAX".into(), "m_MAX".into());
        maps.globals.insert("counter".into(), "m_counter".into());

        let out = transform_function_body("{ return X + counter + MAX; }", &maps);
        assert_eq!(out, "{ return m_E_X + m_counter + m_MAX; }");
    }

    #[test]
    fn identifier_suffixes_are_not_rewritten() {
        let mut maps = SymbolMaps::default();
        maps.globals.insert("counter".into(), "m_counter".into());
        let out = transform_function_body("{ int my_counter = counter; }", &maps);
        assert_eq!(out, "{ int my_counter = m_counter; }");
    }

    #[test]
    fn import_prefix_collision_is_an_error() {
        let err = build_import_map(&[import("utils/io"), import("net/io")]).unwrap_err();
        assert!(err.to_string().contains("collision"), "{err}");
    }

    #[test]
    fn duplicate_import_is_not_a_collision() {
        let map = build_import_map(&[import("math"), import("math")]).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn cimport_prefix_strips_extension_and_directories() {
        let map = build_cimport_map(&[cimport("stdio.h"), cimport("sys/types.h")]).unwrap();
        assert_eq!(map["stdio"], "stdio.h");
        assert_eq!(map["types"], "sys/types.h");
    }
}
