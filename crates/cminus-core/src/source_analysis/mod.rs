// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Source analysis for C-minus.
//!
//! This module contains the AST definitions and the line-oriented parser.
//!
//! # Parsing
//!
//! The parser is deliberately tolerant: it recognises the fixed C-minus
//! surface (directives, functions, types, globals, defines) and keeps every
//! body as opaque text extracted by brace balancing or `;` scanning. Lines
//! it cannot classify are skipped rather than rejected.
//!
//! ```
//! use camino::Utf8Path;
//! use cminus_core::source_analysis::parse_source;
//!
//! let file = parse_source("module \"math\"\n\npub func add(int a, int b) int { return a + b; }\n",
//!     Utf8Path::new("math/ops.cm")).unwrap();
//! assert_eq!(file.module.path, "math");
//! assert_eq!(file.decls.len(), 1);
//! ```
//!
//! # Error Handling
//!
//! Structural trouble (a missing module declaration, an unterminated brace
//! block, a typedef without `;`) fails the whole file with a [`ParseError`]
//! that renders as `path:line: message`.

mod ast;
mod error;
mod parser;

pub use ast::{
    CImport, CgoFlag, CgoFlagKind, Decl, DefineDecl, EnumDecl, File, FuncDecl, GlobalDecl, Import,
    ModuleDecl, Param, RecordDecl, TypedefDecl,
};
pub use error::{ParseError, ParseErrorKind};
pub use parser::{parse_file, parse_source};
