// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! AST for a single parsed `.cm` file.
//!
//! Bodies are opaque strings: brace-balanced text for functions, structs,
//! unions and enums; the `;`-terminated span for typedefs and globals. The
//! code generator tokenises them for targeted rewrites but never parses C.

use ecow::EcoString;

/// A parsed `.cm` source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// The (required) module declaration.
    pub module: ModuleDecl,
    /// C-minus module imports, in declaration order.
    pub imports: Vec<Import>,
    /// C header imports, in declaration order.
    pub cimports: Vec<CImport>,
    /// `#cgo` compiler/linker flag directives.
    pub cgo_flags: Vec<CgoFlag>,
    /// Build-tag matrix: AND of OR-groups from leading `// +build` lines.
    pub build_tags: Vec<Vec<EcoString>>,
    /// Top-level declarations, in source order.
    pub decls: Vec<Decl>,
}

/// A `module "X"` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDecl {
    pub path: EcoString,
    /// 1-based source line.
    pub line: u32,
}

/// An `import "X"` directive naming another C-minus module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub path: EcoString,
    pub line: u32,
}

/// A `cimport "X.h"` directive naming a C header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CImport {
    pub path: EcoString,
    pub line: u32,
}

/// The flag class of a `#cgo` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgoFlagKind {
    Cflags,
    Ldflags,
}

/// One `#cgo [PLATFORM] CFLAGS:|LDFLAGS: ARGS` directive.
///
/// `flags` is the raw argument text; it is shell-split (preserving quoted
/// spans) only when the build orchestrator consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgoFlag {
    /// Platform filter; empty matches any platform.
    pub platform: EcoString,
    pub kind: CgoFlagKind,
    pub flags: EcoString,
    pub line: u32,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Function(FuncDecl),
    Struct(RecordDecl),
    Union(RecordDecl),
    Enum(EnumDecl),
    Typedef(TypedefDecl),
    Global(GlobalDecl),
    Define(DefineDecl),
}

impl Decl {
    /// Returns the declaration's `pub` flag.
    #[must_use]
    pub fn is_public(&self) -> bool {
        match self {
            Decl::Function(d) => d.public,
            Decl::Struct(d) | Decl::Union(d) => d.public,
            Decl::Enum(d) => d.public,
            Decl::Typedef(d) => d.public,
            Decl::Global(d) => d.public,
            Decl::Define(d) => d.public,
        }
    }

    /// Returns the 1-based line of the declaration's first character.
    #[must_use]
    pub fn line(&self) -> u32 {
        match self {
            Decl::Function(d) => d.line,
            Decl::Struct(d) | Decl::Union(d) => d.line,
            Decl::Enum(d) => d.line,
            Decl::Typedef(d) => d.line,
            Decl::Global(d) => d.line,
            Decl::Define(d) => d.line,
        }
    }

    /// Returns the attached doc-comment, if any.
    #[must_use]
    pub fn doc(&self) -> &str {
        match self {
            Decl::Function(d) => &d.doc,
            Decl::Struct(d) | Decl::Union(d) => &d.doc,
            Decl::Enum(d) => &d.doc,
            Decl::Typedef(d) => &d.doc,
            Decl::Global(d) => &d.doc,
            Decl::Define(d) => &d.doc,
        }
    }
}

/// A function declaration with an opaque brace-balanced body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub public: bool,
    pub name: EcoString,
    /// C return type; empty means `void`.
    pub return_type: String,
    pub params: Vec<Param>,
    /// Body text from the opening `{` through the matching `}`.
    pub body: String,
    pub line: u32,
    pub doc: String,
}

/// A function parameter.
///
/// Three shapes exist:
/// - normal: `ty = "int"`, `name = "a"`
/// - function pointer: `ty = "int (*)(void*, void*)"`, `name = "cmp"`
/// - variadic sentinel: `ty = "..."`, `name = ""`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: EcoString,
    pub ty: String,
}

impl Param {
    /// Returns true for the variadic `...` sentinel.
    #[must_use]
    pub fn is_variadic(&self) -> bool {
        self.ty == "..."
    }
}

/// A struct or union declaration.
///
/// An empty body marks a forward declaration (`pub struct Node;`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecl {
    pub public: bool,
    pub name: EcoString,
    pub body: String,
    pub line: u32,
    pub doc: String,
}

impl RecordDecl {
    /// Returns true for a forward declaration with no body.
    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.body.is_empty()
    }
}

/// An enum declaration with an opaque brace-balanced body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub public: bool,
    pub name: EcoString,
    pub body: String,
    pub line: u32,
    pub doc: String,
}

/// A typedef declaration.
///
/// `body` is everything between `typedef` and `;`, including any
/// function-pointer name the source spells out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedefDecl {
    pub public: bool,
    pub body: String,
    pub line: u32,
    pub doc: String,
}

/// A module-level global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDecl {
    pub public: bool,
    /// File-local `static` globals are emitted unmangled.
    pub is_static: bool,
    /// The C type text, qualifiers included (e.g. `const char*`).
    pub ty: String,
    pub name: EcoString,
    /// Initialiser text after `=`; empty when absent.
    pub value: String,
    pub line: u32,
    pub doc: String,
}

/// A `#define NAME VALUE` constant, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineDecl {
    pub public: bool,
    pub name: EcoString,
    pub value: String,
    pub line: u32,
    pub doc: String,
}
