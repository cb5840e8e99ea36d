// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! C code generation.
//!
//! Each module produces a public header, an internal header, and one C file
//! per `.cm` source. Public declarations are mangled `<module>_<name>`;
//! private declarations live only in the internal header; `static` globals
//! stay unmangled and file-local. Every global and function definition is
//! preceded by a `#line` directive so compiler errors and the LSP map back
//! to `.cm` sources.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::paths::{module_c_file_path, sanitize_module_name};
use crate::project::ModuleInfo;
use crate::source_analysis::{Decl, File, FuncDecl, GlobalDecl};
use crate::transform::{
    self, DefineMap, EnumValueMap, GlobalVarMap, SymbolMaps, TransformError,
    transform_function_body,
};

/// An error raised while generating C sources.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("in {path}: {source}")]
    Transform {
        path: Utf8PathBuf,
        #[source]
        source: TransformError,
    },
}

/// Primitive C types that never receive a module prefix.
const PRIMITIVE_TYPES: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "unsigned", "signed", "size_t",
    "ssize_t", "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t",
    "uint64_t", "intptr_t", "uintptr_t", "ptrdiff_t",
];

/// Generates all outputs for one module.
///
/// `files` must be aligned index-for-index with `module.files`.
///
/// # Errors
///
/// Fails on unwritable outputs or import-prefix collisions.
pub fn generate_module(
    module: &ModuleInfo,
    files: &[File],
    build_dir: &Utf8Path,
) -> Result<(), CodegenError> {
    let module_name = sanitize_module_name(&module.import_path);
    debug!(module = %module.import_path, files = files.len(), "generating module");

    let tables = collect_symbol_tables(files, &module_name);
    let buckets = classify_decls(files, &module_name, &tables);

    let mut all_imports = BTreeSet::new();
    for file in files {
        for imp in &file.imports {
            all_imports.insert(imp.path.to_string());
        }
    }

    generate_public_header(&module_name, &buckets, &all_imports, build_dir)?;
    generate_internal_header(&module_name, &buckets, build_dir)?;

    for (file, src_path) in files.iter().zip(&module.files) {
        generate_c_file(&module_name, file, src_path, build_dir, &tables)?;
    }

    Ok(())
}

/// Module-wide symbol tables driving body rewrites.
struct SymbolTables {
    /// Names of module-local structs, unions and enums.
    type_names: BTreeSet<String>,
    enum_values: EnumValueMap,
    globals: GlobalVarMap,
    defines: DefineMap,
}

fn collect_symbol_tables(files: &[File], module_name: &str) -> SymbolTables {
    let mut type_names = BTreeSet::new();
    let mut enum_values = EnumValueMap::new();
    let mut globals = GlobalVarMap::new();
    let mut defines = DefineMap::new();

    for file in files {
        for decl in &file.decls {
            match decl {
                Decl::Struct(d) | Decl::Union(d) => {
                    type_names.insert(d.name.to_string());
                }
                Decl::Enum(d) => {
                    type_names.insert(d.name.to_string());
                    extract_enum_values(&d.body, &d.name, module_name, &mut enum_values);
                }
                Decl::Global(d) if !d.is_static => {
                    // Static globals are file-local and stay unmangled.
                    globals.insert(d.name.to_string(), format!("{module_name}_{}", d.name));
                }
                Decl::Define(d) if d.public => {
                    // Private defines keep their bare names.
                    defines.insert(d.name.to_string(), format!("{module_name}_{}", d.name));
                }
                _ => {}
            }
        }
    }

    SymbolTables {
        type_names,
        enum_values,
        globals,
        defines,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKind {
    Struct,
    Union,
    Enum,
    Typedef,
}

struct TypeInfo {
    kind: TypeKind,
    name: String,
    /// Transformed body; empty for forward declarations.
    body: String,
    doc: String,
}

struct FuncInfo {
    signature: String,
    doc: String,
}

struct GlobalInfo {
    ty: String,
    name: String,
    doc: String,
}

struct DefineInfo {
    name: String,
    value: String,
    doc: String,
}

#[derive(Default)]
struct Buckets {
    public_types: Vec<TypeInfo>,
    private_types: Vec<TypeInfo>,
    public_funcs: Vec<FuncInfo>,
    private_funcs: Vec<FuncInfo>,
    public_globals: Vec<GlobalInfo>,
    private_globals: Vec<GlobalInfo>,
    public_defines: Vec<DefineInfo>,
    private_defines: Vec<DefineInfo>,
}

fn classify_decls(files: &[File], module_name: &str, tables: &SymbolTables) -> Buckets {
    let mut b = Buckets::default();

    for file in files {
        for decl in &file.decls {
            match decl {
                Decl::Function(d) => {
                    let info = FuncInfo {
                        signature: generate_function_signature(d, module_name),
                        doc: d.doc.clone(),
                    };
                    if d.public {
                        b.public_funcs.push(info);
                    } else {
                        b.private_funcs.push(info);
                    }
                }
                Decl::Struct(d) | Decl::Union(d) => {
                    let kind = if matches!(decl, Decl::Struct(_)) {
                        TypeKind::Struct
                    } else {
                        TypeKind::Union
                    };
                    let info = TypeInfo {
                        kind,
                        name: d.name.to_string(),
                        body: transform_type_body(&d.body, &tables.type_names, module_name),
                        doc: d.doc.clone(),
                    };
                    if d.public {
                        b.public_types.push(info);
                    } else {
                        b.private_types.push(info);
                    }
                }
                Decl::Enum(d) => {
                    let info = TypeInfo {
                        kind: TypeKind::Enum,
                        name: d.name.to_string(),
                        body: transform_enum_body(&d.body, &d.name, module_name),
                        doc: d.doc.clone(),
                    };
                    if d.public {
                        b.public_types.push(info);
                    } else {
                        b.private_types.push(info);
                    }
                }
                Decl::Typedef(d) => {
                    let info = TypeInfo {
                        kind: TypeKind::Typedef,
                        name: String::new(),
                        body: d.body.clone(),
                        doc: d.doc.clone(),
                    };
                    if d.public {
                        b.public_types.push(info);
                    } else {
                        b.private_types.push(info);
                    }
                }
                Decl::Global(d) => {
                    // Static globals never reach a header; they are emitted
                    // per-file as definitions only.
                    if d.is_static {
                        continue;
                    }
                    let info = GlobalInfo {
                        ty: d.ty.clone(),
                        name: d.name.to_string(),
                        doc: d.doc.clone(),
                    };
                    if d.public {
                        b.public_globals.push(info);
                    } else {
                        b.private_globals.push(info);
                    }
                }
                Decl::Define(d) => {
                    let info = DefineInfo {
                        name: d.name.to_string(),
                        value: d.value.clone(),
                        doc: d.doc.clone(),
                    };
                    if d.public {
                        b.public_defines.push(info);
                    } else {
                        b.private_defines.push(info);
                    }
                }
            }
        }
    }

    b
}

fn write_output(path: &Utf8Path, content: &str) -> Result<(), CodegenError> {
    std::fs::write(path, content).map_err(|source| CodegenError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn generate_public_header(
    module_name: &str,
    b: &Buckets,
    imports: &BTreeSet<String>,
    build_dir: &Utf8Path,
) -> Result<(), CodegenError> {
    let guard = format!("{}_H", module_name.to_uppercase());
    let mut out = String::new();

    let _ = writeln!(out, "#ifndef {guard}");
    let _ = writeln!(out, "#define {guard}");
    out.push('\n');

    // Imported-module headers, needed for types used in signatures.
    for imp in imports {
        let _ = writeln!(out, "#include \"{}.h\"", sanitize_module_name(imp));
    }
    if !imports.is_empty() {
        out.push('\n');
    }

    for d in &b.public_defines {
        out.push_str(&format_doc_comment(&d.doc));
        let _ = writeln!(out, "#define {module_name}_{} {}", d.name, d.value);
    }
    if !b.public_defines.is_empty() {
        out.push('\n');
    }

    write_forward_decls(&mut out, &b.public_types, module_name);

    for td in &b.public_types {
        out.push_str(&generate_type_declaration(td, module_name));
        out.push_str("\n\n");
    }

    for g in &b.public_globals {
        out.push_str(&format_doc_comment(&g.doc));
        let _ = writeln!(out, "extern {} {module_name}_{};\n", g.ty, g.name);
    }

    for f in &b.public_funcs {
        out.push_str(&format_doc_comment(&f.doc));
        out.push_str(&f.signature);
        out.push_str(";\n\n");
    }

    out.push_str("#endif\n");

    write_output(&build_dir.join(format!("{module_name}.h")), &out)
}

fn generate_internal_header(
    module_name: &str,
    b: &Buckets,
    build_dir: &Utf8Path,
) -> Result<(), CodegenError> {
    let guard = format!("{}_INTERNAL_H", module_name.to_uppercase());
    let mut out = String::new();

    let _ = writeln!(out, "#ifndef {guard}");
    let _ = writeln!(out, "#define {guard}");
    out.push('\n');
    let _ = writeln!(out, "#include \"{module_name}.h\"");
    out.push('\n');

    // Private defines stay unmangled: they are only visible module-side.
    for d in &b.private_defines {
        out.push_str(&format_doc_comment(&d.doc));
        let _ = writeln!(out, "#define {} {}", d.name, d.value);
    }
    if !b.private_defines.is_empty() {
        out.push('\n');
    }

    write_forward_decls(&mut out, &b.private_types, module_name);

    for td in &b.private_types {
        out.push_str(&generate_type_declaration(td, module_name));
        out.push_str("\n\n");
    }

    for g in &b.private_globals {
        out.push_str(&format_doc_comment(&g.doc));
        let _ = writeln!(out, "extern {} {module_name}_{};\n", g.ty, g.name);
    }

    for f in &b.private_funcs {
        out.push_str(&format_doc_comment(&f.doc));
        out.push_str(&f.signature);
        out.push_str(";\n\n");
    }

    out.push_str("#endif\n");

    write_output(&build_dir.join(format!("{module_name}_internal.h")), &out)
}

/// Forward declarations for every braced struct/union, letting types
/// reference one another regardless of declaration order.
fn write_forward_decls(out: &mut String, types: &[TypeInfo], module_name: &str) {
    for td in types {
        if td.body.is_empty() {
            continue;
        }
        match td.kind {
            TypeKind::Struct => {
                let _ = writeln!(out, "struct {module_name}_{};", td.name);
            }
            TypeKind::Union => {
                let _ = writeln!(out, "union {module_name}_{};", td.name);
            }
            TypeKind::Enum | TypeKind::Typedef => {}
        }
    }
    if !types.is_empty() {
        out.push('\n');
    }
}

fn generate_c_file(
    module_name: &str,
    file: &File,
    src_path: &Utf8Path,
    build_dir: &Utf8Path,
    tables: &SymbolTables,
) -> Result<(), CodegenError> {
    let maps = SymbolMaps {
        imports: transform::build_import_map(&file.imports).map_err(|source| {
            CodegenError::Transform {
                path: src_path.to_path_buf(),
                source,
            }
        })?,
        cimports: transform::build_cimport_map(&file.cimports).map_err(|source| {
            CodegenError::Transform {
                path: src_path.to_path_buf(),
                source,
            }
        })?,
        enum_values: tables.enum_values.clone(),
        globals: tables.globals.clone(),
        defines: tables.defines.clone(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "#include \"{module_name}_internal.h\"");
    for cimp in &file.cimports {
        let _ = writeln!(out, "#include <{}>", cimp.path);
    }
    for imp in &file.imports {
        let _ = writeln!(out, "#include \"{}.h\"", sanitize_module_name(&imp.path));
    }
    out.push('\n');

    for decl in &file.decls {
        if let Decl::Global(g) = decl {
            if g.line > 0 {
                let _ = writeln!(out, "#line {} \"{src_path}\"", g.line);
            }
            out.push_str(&generate_global_definition(g, module_name));
            out.push_str("\n\n");
        }
    }

    for decl in &file.decls {
        if let Decl::Function(f) = decl {
            if f.line > 0 {
                let _ = writeln!(out, "#line {} \"{src_path}\"", f.line);
            }
            out.push_str(&generate_function_signature(f, module_name));
            out.push(' ');
            out.push_str(&transform_function_body(&f.body, &maps));
            out.push_str("\n\n");
        }
    }

    let file_name = src_path.file_name().unwrap_or("file.cm");
    let c_path = module_c_file_path(build_dir, module_name, file_name);
    write_output(&c_path, &out)
}

fn generate_global_definition(g: &GlobalDecl, module_name: &str) -> String {
    let mut out = String::new();
    if g.is_static {
        let _ = write!(out, "static {} {}", g.ty, g.name);
    } else {
        let _ = write!(out, "{} {module_name}_{}", g.ty, g.name);
    }
    if !g.value.is_empty() {
        let _ = write!(out, " = {}", g.value);
    }
    out.push(';');
    out
}

/// Renders a mangled C signature: `void logging_log(char* fmt, ...)`.
pub(crate) fn generate_function_signature(f: &FuncDecl, module_name: &str) -> String {
    let mut out = String::new();

    let return_type = if f.return_type.is_empty() {
        "void".to_string()
    } else {
        mangle_type_in_signature(&f.return_type, module_name)
    };
    out.push_str(&return_type);
    out.push(' ');

    // `main` stays unmangled so the linker finds the entry point.
    if f.name != "main" {
        out.push_str(module_name);
        out.push('_');
    }
    out.push_str(&f.name);

    out.push('(');
    for (i, param) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if param.is_variadic() {
            out.push_str("...");
            continue;
        }
        let ty = mangle_type_in_signature(&param.ty, module_name);
        if ty.contains("(*)") {
            // Function pointer: the name belongs inside the parens.
            out.push_str(&ty.replacen("(*)", &format!("(*{})", param.name), 1));
        } else {
            let _ = write!(out, "{ty} {}", param.name);
        }
    }
    out.push(')');

    out
}

/// Mangles a type reference appearing in a signature.
///
/// Pointers are peeled and re-applied; `struct`/`union`/`enum`-prefixed and
/// primitive types pass through; `mod.Type` becomes `mod_Type`; anything
/// else is a module-local type and gains the module prefix.
fn mangle_type_in_signature(type_name: &str, module_name: &str) -> String {
    if type_name.ends_with('*') {
        let base = type_name.trim_end_matches('*');
        let stars = &type_name[base.len()..];
        return format!("{}{stars}", mangle_type_in_signature(base, module_name));
    }

    if type_name.starts_with("struct ")
        || type_name.starts_with("union ")
        || type_name.starts_with("enum ")
    {
        return type_name.to_string();
    }

    let Some(first) = type_name.split_whitespace().next() else {
        return type_name.to_string();
    };
    if PRIMITIVE_TYPES.contains(&first) {
        return type_name.to_string();
    }

    if let Some((module, ty)) = type_name.split_once('.') {
        return format!("{module}_{ty}");
    }

    format!("{module_name}_{type_name}")
}

fn generate_type_declaration(td: &TypeInfo, module_name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format_doc_comment(&td.doc));

    match td.kind {
        TypeKind::Struct => {
            if td.body.is_empty() {
                let _ = write!(out, "struct {module_name}_{};", td.name);
            } else {
                let _ = write!(
                    out,
                    "typedef struct {module_name}_{} {} {module_name}_{};",
                    td.name, td.body, td.name
                );
            }
        }
        TypeKind::Union => {
            if td.body.is_empty() {
                let _ = write!(out, "union {module_name}_{};", td.name);
            } else {
                let _ = write!(
                    out,
                    "typedef union {module_name}_{} {} {module_name}_{};",
                    td.name, td.body, td.name
                );
            }
        }
        TypeKind::Enum => {
            let _ = write!(
                out,
                "typedef enum {module_name}_{} {} {module_name}_{};",
                td.name, td.body, td.name
            );
        }
        TypeKind::Typedef => {
            // The body already carries its own name, function-pointer
            // typedefs included.
            let _ = write!(out, "typedef {};", td.body);
        }
    }

    out
}

/// Adds `Name → Module_EnumName_Name` entries for every value in an enum
/// body, dropping `= expr` suffixes.
fn extract_enum_values(body: &str, enum_name: &str, module_name: &str, out: &mut EnumValueMap) {
    let Some(inner) = enum_body_inner(body) else {
        return;
    };
    let prefix = format!("{module_name}_{enum_name}_");

    for value in inner.split(',') {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let name = value.split('=').next().unwrap_or(value).trim();
        if !name.is_empty() {
            out.insert(name.to_string(), format!("{prefix}{name}"));
        }
    }
}

/// Prefixes every enum value with `Module_EnumName_`, preserving `= expr`
/// assignments, and reflows the body.
fn transform_enum_body(body: &str, enum_name: &str, module_name: &str) -> String {
    let Some(inner) = enum_body_inner(body) else {
        return body.to_string();
    };
    let prefix = format!("{module_name}_{enum_name}_");

    let mut transformed = Vec::new();
    for value in inner.split(',') {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match value.split_once('=') {
            Some((name, rest)) => {
                transformed.push(format!("{prefix}{} ={rest}", name.trim()));
            }
            None => transformed.push(format!("{prefix}{value}")),
        }
    }

    format!("{{\n    {}\n}}", transformed.join(",\n    "))
}

fn enum_body_inner(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if start >= end {
        return None;
    }
    Some(&body[start + 1..end])
}

/// Qualifies references to module-local types inside a struct/union body.
fn transform_type_body(body: &str, type_names: &BTreeSet<String>, module_name: &str) -> String {
    if body.is_empty() || type_names.is_empty() {
        return body.to_string();
    }

    let mut result = body.to_string();
    for type_name in type_names {
        result = replace_identifier(&result, type_name, &format!("{module_name}_{type_name}"));
    }
    result
}

/// Replaces standalone occurrences of `needle` (both neighbours outside the
/// identifier class) with `replacement`.
fn replace_identifier(haystack: &str, needle: &str, replacement: &str) -> String {
    let bytes = haystack.as_bytes();
    let n = needle.as_bytes();
    let mut out = String::with_capacity(haystack.len());
    let mut i = 0;

    while i < bytes.len() {
        if i + n.len() <= bytes.len() && &bytes[i..i + n.len()] == n {
            let before_ok = i == 0 || !is_ident_byte(bytes[i - 1]);
            let after_ok = i + n.len() >= bytes.len() || !is_ident_byte(bytes[i + n.len()]);
            if before_ok && after_ok {
                out.push_str(replacement);
                i += n.len();
                continue;
            }
        }
        // Advance one full UTF-8 character.
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&haystack[i..i + ch_len]);
        i += ch_len;
    }

    out
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Formats a doc-comment for C output: `//` for one line, a block comment
/// for several.
fn format_doc_comment(comment: &str) -> String {
    if comment.is_empty() {
        return String::new();
    }

    let lines: Vec<&str> = comment.split('\n').collect();
    if lines.len() == 1 {
        return format!("// {}\n", lines[0]);
    }

    let mut out = String::from("/*\n");
    for line in lines {
        let _ = writeln!(out, " * {line}");
    }
    out.push_str(" */\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_analysis::parse_source;
    use std::fs;
    use tempfile::TempDir;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    /// Parses sources and generates a single-module build directory.
    fn generate(import_path: &str, sources: &[(&str, &str)]) -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        let build_dir = root.join(".c_minus");
        fs::create_dir_all(&build_dir).unwrap();

        let mut file_paths = Vec::new();
        let mut files = Vec::new();
        for (name, source) in sources {
            let path = root.join(name);
            files.push(parse_source(source, &path).unwrap());
            file_paths.push(path);
        }

        let module = ModuleInfo {
            import_path: import_path.to_string(),
            dir_path: root.clone(),
            files: file_paths,
            imports: Vec::new(),
        };
        generate_module(&module, &files, &build_dir).unwrap();
        (temp, build_dir)
    }

    fn read(dir: &Utf8Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn public_functions_land_in_public_header_only() {
        let source = "module \"math\"\n\npub func add(int a, int b) int { return a + b; }\n\nfunc helper() int { return 42; }\n";
        let (_t, build) = generate("math", &[("vector.cm", source)]);

        let public = read(&build, "math.h");
        let internal = read(&build, "math_internal.h");

        assert!(public.contains("int math_add(int a, int b);"));
        assert!(!public.contains("math_helper"));
        assert!(internal.contains("int math_helper();"));
        assert!(public.starts_with("#ifndef MATH_H\n#define MATH_H\n"));
        assert!(internal.contains("#include \"math.h\""));
    }

    #[test]
    fn public_struct_becomes_typedef_with_forward_decl() {
        let source = "module \"math\"\n\npub struct Vec3 {\n    float x;\n    float y;\n    float z;\n};\n";
        let (_t, build) = generate("math", &[("vec.cm", source)]);

        let public = read(&build, "math.h");
        assert!(public.contains("struct math_Vec3;"));
        assert!(public.contains("typedef struct math_Vec3 {"));
        assert!(public.contains("} math_Vec3;"));
    }

    #[test]
    fn union_and_function_pointer_typedef() {
        let source = "module \"types\"\n\npub union Value {\n    int i;\n    float f;\n    char* s;\n};\n\npub typedef int (*Comparator)(void* a, void* b);\n";
        let (_t, build) = generate("types", &[("types.cm", source)]);

        let public = read(&build, "types.h");
        assert!(public.contains("union types_Value;"));
        assert!(public.contains("typedef union types_Value {"));
        assert!(public.contains("} types_Value;"));
        assert!(public.contains("typedef int (*Comparator)(void* a, void* b);"));
    }

    #[test]
    fn enum_values_are_prefixed_in_header_and_bodies() {
        let source = "module \"state\"\n\npub enum State {\n    TODO,\n    DONE = 5\n};\n\npub func first() State {\n    return TODO;\n}\n";
        let (_t, build) = generate("state", &[("state.cm", source)]);

        let public = read(&build, "state.h");
        assert!(public.contains("typedef enum state_State {"));
        assert!(public.contains("state_State_TODO"));
        assert!(public.contains("state_State_DONE = 5"));

        let c = read(&build, "state_state.c");
        assert!(c.contains("return state_State_TODO;"));
    }

    #[test]
    fn enum_values_in_strings_stay_untouched() {
        let source = "module \"state\"\n\npub enum State {\n    TODO\n};\n\nfunc describe() void {\n    log(\"TODO\");\n}\n";
        let (_t, build) = generate("state", &[("state.cm", source)]);
        let c = read(&build, "state_state.c");
        assert!(c.contains("log(\"TODO\")"));
    }

    #[test]
    fn globals_public_static_and_private() {
        let source = "module \"state\"\n\npub int counter = 0;\nint hidden = 3;\nstatic int initialized = 0;\n";
        let (_t, build) = generate("state", &[("globals.cm", source)]);

        let public = read(&build, "state.h");
        let internal = read(&build, "state_internal.h");
        let c = read(&build, "state_globals.c");

        assert!(public.contains("extern int state_counter;"));
        assert!(!public.contains("hidden"));
        assert!(!public.contains("initialized"));
        assert!(internal.contains("extern int state_hidden;"));
        assert!(c.contains("int state_counter = 0;"));
        assert!(c.contains("static int initialized = 0;"));
        assert!(c.contains("int state_hidden = 3;"));
    }

    #[test]
    fn defines_mangled_by_visibility() {
        let source = "module \"config\"\n\npub #define MAX_BUFFER 1024\n#define CHUNK_SIZE 256\n";
        let (_t, build) = generate("config", &[("config.cm", source)]);

        let public = read(&build, "config.h");
        let internal = read(&build, "config_internal.h");

        assert!(public.contains("#define config_MAX_BUFFER 1024"));
        assert!(!public.contains("CHUNK_SIZE"));
        assert!(internal.contains("#define CHUNK_SIZE 256"));
        assert!(!internal.contains("config_CHUNK_SIZE"));
    }

    #[test]
    fn variadic_signature_is_preserved() {
        let source = "module \"logging\"\n\npub func log(char* fmt, ...) void { }\n";
        let (_t, build) = generate("logging", &[("log.cm", source)]);
        let public = read(&build, "logging.h");
        assert!(public.contains("void logging_log(char* fmt, ...);"));
    }

    #[test]
    fn function_pointer_param_gets_name_inserted() {
        let source = "module \"sorting\"\n\npub func sort(void* base, int (*cmp)(void*, void*)) void { }\n";
        let (_t, build) = generate("sorting", &[("sort.cm", source)]);
        let public = read(&build, "sorting.h");
        assert!(public.contains("void sorting_sort(void* base, int (*cmp)(void*, void*));"));
    }

    #[test]
    fn qualified_param_types_are_mangled() {
        let source = "module \"physics\"\nimport \"math\"\n\npub func magnitude(math.Vec3* v) float { return 0; }\n";
        let (_t, build) = generate("physics", &[("phys.cm", source)]);
        let public = read(&build, "physics.h");
        assert!(public.contains("float physics_magnitude(math_Vec3* v);"));
        assert!(public.contains("#include \"math.h\""));
    }

    #[test]
    fn module_local_type_references_qualify_in_struct_bodies() {
        let source = "module \"shapes\"\n\npub struct Point {\n    int x;\n};\n\npub struct Line {\n    Point a;\n    Point b;\n};\n";
        let (_t, build) = generate("shapes", &[("shapes.cm", source)]);
        let public = read(&build, "shapes.h");
        assert!(public.contains("shapes_Point a;"));
        assert!(public.contains("shapes_Point b;"));
    }

    #[test]
    fn main_function_is_not_mangled() {
        let source = "module \"main\"\n\nfunc main() int { return 0; }\n";
        let (_t, build) = generate("main", &[("main.cm", source)]);
        let c = read(&build, "main_main.c");
        assert!(c.contains("int main() {"));
        assert!(!c.contains("main_main("));
    }

    #[test]
    fn qualified_calls_rewrite_and_includes_are_emitted() {
        let source = "module \"main\"\nimport \"math\"\ncimport \"stdio.h\"\n\nfunc main() int {\n    int sum = math.add(1, 2);\n    stdio.printf(\"%d\\n\", sum);\n    return sum;\n}\n";
        let (_t, build) = generate("main", &[("main.cm", source)]);
        let c = read(&build, "main_main.c");

        assert!(c.contains("#include \"main_internal.h\""));
        assert!(c.contains("#include <stdio.h>"));
        assert!(c.contains("#include \"math.h\""));
        assert!(c.contains("math_add(1, 2)"));
        assert!(c.contains("printf(\"%d\\n\", sum)"));
        assert!(!c.contains("math.add"));
        assert!(!c.contains("stdio.printf"));
    }

    #[test]
    fn line_directives_precede_globals_and_functions() {
        let source = "module \"m\"\n\nint counter = 0;\n\nfunc tick() int {\n    return counter;\n}\n";
        let (_t, build) = generate("m", &[("m.cm", source)]);
        let c = read(&build, "m_m.c");

        let global_line = c.lines().position(|l| l.contains("int m_counter = 0;")).unwrap();
        assert!(c.lines().nth(global_line - 1).unwrap().starts_with("#line 3 \""));
        let func_line = c.lines().position(|l| l.contains("int m_tick()")).unwrap();
        assert!(c.lines().nth(func_line - 1).unwrap().starts_with("#line 5 \""));
    }

    #[test]
    fn doc_comments_round_trip_into_headers() {
        let source = "module \"math\"\n\n// Adds two integers.\npub func add(int a, int b) int { return a + b; }\n\n// Vector of three floats.\n// Used across the project.\npub struct Vec3 {\n    float x;\n};\n";
        let (_t, build) = generate("math", &[("math.cm", source)]);
        let public = read(&build, "math.h");

        assert!(public.contains("// Adds two integers.\nint math_add(int a, int b);"));
        assert!(public.contains("/*\n * Vector of three floats.\n * Used across the project.\n */"));
    }

    #[test]
    fn internal_header_generated_even_when_empty() {
        let source = "module \"tiny\"\n\npub func one() int { return 1; }\n";
        let (_t, build) = generate("tiny", &[("tiny.cm", source)]);
        let internal = read(&build, "tiny_internal.h");
        assert!(internal.contains("#ifndef TINY_INTERNAL_H"));
        assert!(internal.contains("#include \"tiny.h\""));
    }

    #[test]
    fn nested_module_paths_sanitize_throughout() {
        let source = "module \"utils/io\"\n\npub func read() int { return 0; }\n";
        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        let build_dir = root.join(".c_minus");
        fs::create_dir_all(&build_dir).unwrap();
        let path = root.join("io.cm");
        let file = parse_source(source, &path).unwrap();
        let module = ModuleInfo {
            import_path: "utils/io".to_string(),
            dir_path: root,
            files: vec![path],
            imports: Vec::new(),
        };
        generate_module(&module, &[file], &build_dir).unwrap();

        let public = read(&build_dir, "utils_io.h");
        assert!(public.contains("#ifndef UTILS_IO_H"));
        assert!(public.contains("int utils_io_read();"));
    }

    #[test]
    fn mangle_type_rules() {
        assert_eq!(mangle_type_in_signature("int", "m"), "int");
        assert_eq!(mangle_type_in_signature("unsigned int", "m"), "unsigned int");
        assert_eq!(mangle_type_in_signature("char**", "m"), "char**");
        assert_eq!(mangle_type_in_signature("Vec3", "math"), "math_Vec3");
        assert_eq!(mangle_type_in_signature("Vec3*", "math"), "math_Vec3*");
        assert_eq!(mangle_type_in_signature("math.Vec3", "physics"), "math_Vec3");
        assert_eq!(mangle_type_in_signature("struct tm", "m"), "struct tm");
        assert_eq!(mangle_type_in_signature("size_t", "m"), "size_t");
    }
}
