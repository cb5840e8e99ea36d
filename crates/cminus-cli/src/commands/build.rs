// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Build C-minus projects.
//!
//! The pipeline: discover the project, transpile every module into
//! `.c_minus/`, compile each generated C file to an object (in parallel,
//! incrementally), then link the objects into the project binary with the
//! aggregated `#cgo` linker flags.

use camino::{Utf8Path, Utf8PathBuf};
use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, info, instrument};

use cminus_core::codegen;
use cminus_core::paths::{module_c_file_path, module_o_file_path};
use cminus_core::project::{self, BUILD_DIR_NAME, BuildContext, Project};
use cminus_core::source_analysis::parse_file;

use crate::c_compiler::{self, CompileUnit, FileFlags};

/// Builds the project found from the current directory.
///
/// # Errors
///
/// Fails on discovery, parse, generation, compile, or link errors.
pub fn build(jobs: Option<usize>, output: Option<&str>, tags: &[String], release: bool) -> Result<()> {
    let cwd = current_dir()?;
    build_at(&cwd, jobs, output, tags, release)?;
    println!("Build succeeded");
    Ok(())
}

/// Builds the project discovered from `start_dir`; returns the binary path.
///
/// # Errors
///
/// See [`build`].
#[instrument(skip_all, fields(start_dir = %start_dir))]
pub fn build_at(
    start_dir: &Utf8Path,
    jobs: Option<usize>,
    output: Option<&str>,
    tags: &[String],
    release: bool,
) -> Result<Utf8PathBuf> {
    let ctx = BuildContext::new(tags.iter().cloned(), release);
    let proj = project::discover_with_context(start_dir, Some(&ctx))
        .into_diagnostic()
        .wrap_err("project discovery failed")?;
    info!(root = %proj.root_path, modules = proj.modules.len(), "building project");

    let build_dir = ensure_build_dir(&proj)?;
    let (units, file_flags) = transpile_project(&proj, &build_dir, &ctx)?;

    let jobs = jobs.unwrap_or_else(default_jobs);
    c_compiler::compile_units(&units, &build_dir, jobs).wrap_err("compilation failed")?;

    let output_path = match output {
        Some(p) => Utf8PathBuf::from(p),
        None => default_output_path(&proj),
    };
    let objects: Vec<Utf8PathBuf> = units.iter().map(|u| u.o_file.clone()).collect();
    let ldflags = c_compiler::collect_ldflags(file_flags.iter());

    c_compiler::link_binary(&objects, &output_path, &ldflags).wrap_err("linking failed")?;

    info!(binary = %output_path, "build completed");
    Ok(output_path)
}

/// Parses every module's files fresh from disk and generates the C outputs,
/// collecting the per-file compile units and `#cgo` flags.
///
/// # Errors
///
/// Fails on unreadable or unparsable sources and on generation errors.
pub fn transpile_project(
    proj: &Project,
    build_dir: &Utf8Path,
    ctx: &BuildContext,
) -> Result<(Vec<CompileUnit>, Vec<FileFlags>)> {
    let mut units = Vec::new();
    let mut all_flags = Vec::new();

    for module in proj.modules.values() {
        let mut parsed = Vec::with_capacity(module.files.len());
        for file_path in &module.files {
            debug!(file = %file_path, "parsing");
            let file = parse_file(file_path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to parse '{file_path}'"))?;

            let flags = c_compiler::extract_file_flags(&file.cgo_flags, &ctx.os);
            let file_name = file_path.file_name().unwrap_or_default();
            units.push(CompileUnit {
                c_file: module_c_file_path(build_dir, &module.import_path, file_name),
                o_file: module_o_file_path(build_dir, &module.import_path, file_name),
                cflags: flags.cflags.clone(),
            });
            all_flags.push(flags);
            parsed.push(file);
        }

        codegen::generate_module(module, &parsed, build_dir)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to generate code for module '{}'", module.import_path))?;
    }

    Ok((units, all_flags))
}

pub(crate) fn ensure_build_dir(proj: &Project) -> Result<Utf8PathBuf> {
    let build_dir = proj.root_path.join(BUILD_DIR_NAME);
    std::fs::create_dir_all(&build_dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to create build directory '{build_dir}'"))?;
    Ok(build_dir)
}

pub(crate) fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().into_diagnostic()?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|p| miette::miette!("non-UTF-8 working directory: {}", p.display()))
}

fn default_output_path(proj: &Project) -> Utf8PathBuf {
    let name = proj.root_path.file_name().unwrap_or("a.out");
    proj.root_path.join(name)
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZero::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    fn write(path: &Utf8Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    fn cc_available() -> bool {
        Command::new("cc").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn make_multi_module_project(root: &Utf8Path) {
        write(&root.join("cm.mod"), "module \"test/project\"\n");
        let math = root.join("math");
        fs::create_dir_all(&math).unwrap();
        write(
            &math.join("vector.cm"),
            "module \"math\"\n\npub func add(int a, int b) int { return a + b; }\n\nfunc helper() int { return 42; }\n",
        );
        write(
            &math.join("matrix.cm"),
            "module \"math\"\n\npub func multiply(int a, int b) int { return a * b; }\n",
        );
        write(
            &root.join("main.cm"),
            "module \"main\"\nimport \"math\"\n\nfunc main() int {\n    int sum = math.add(1, 2);\n    int prod = math.multiply(3, 4);\n    return sum + prod;\n}\n",
        );
    }

    #[test]
    fn transpile_emits_expected_files() {
        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        make_multi_module_project(&root);

        let ctx = BuildContext::current();
        let proj = project::discover_with_context(&root, Some(&ctx)).unwrap();
        let build_dir = ensure_build_dir(&proj).unwrap();
        let (units, _) = transpile_project(&proj, &build_dir, &ctx).unwrap();

        assert_eq!(units.len(), 3);
        for name in ["math.h", "math_internal.h", "math_vector.c", "math_matrix.c", "main_main.c"] {
            assert!(build_dir.join(name).is_file(), "missing {name}");
        }

        let math_h = fs::read_to_string(build_dir.join("math.h")).unwrap();
        assert!(math_h.contains("int math_add(int a, int b);"));
        assert!(math_h.contains("int math_multiply(int a, int b);"));
        assert!(!math_h.contains("math_helper"));

        let internal = fs::read_to_string(build_dir.join("math_internal.h")).unwrap();
        assert!(internal.contains("int math_helper()"));
    }

    #[test]
    fn build_produces_binary_with_expected_exit_code() {
        if !cc_available() {
            eprintln!("skipping test - cc not installed");
            return;
        }

        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        make_multi_module_project(&root);

        let binary = build_at(&root, Some(2), None, &[], false).unwrap();
        assert!(binary.is_file());

        // add(1, 2) + multiply(3, 4)
        let status = Command::new(binary.as_std_path()).status().unwrap();
        assert_eq!(status.code(), Some(15));
    }

    #[test]
    fn circular_dependency_fails_the_build() {
        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        write(&root.join("cm.mod"), "module \"p\"\n");
        for (m, import) in [("a", "b"), ("b", "a")] {
            let dir = root.join(m);
            fs::create_dir_all(&dir).unwrap();
            write(
                &dir.join("m.cm"),
                &format!("module \"{m}\"\nimport \"{import}\"\nfunc f_{m}() int {{ return 0; }}\n"),
            );
        }

        let err = build_at(&root, Some(1), None, &[], false).unwrap_err();
        assert!(format!("{err:?}").contains("circular"));
    }

    #[test]
    fn variadic_program_prints_through_c_varargs() {
        if !cc_available() {
            eprintln!("skipping test - cc not installed");
            return;
        }

        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        write(&root.join("cm.mod"), "module \"p\"\n");
        let logging = root.join("logging");
        fs::create_dir_all(&logging).unwrap();
        write(
            &logging.join("log.cm"),
            "module \"logging\"\ncimport \"stdio.h\"\ncimport \"stdarg.h\"\n\npub func log(char* fmt, ...) void {\n    va_list args;\n    va_start(args, fmt);\n    vprintf(fmt, args);\n    va_end(args);\n}\n",
        );
        write(
            &root.join("main.cm"),
            "module \"main\"\nimport \"logging\"\n\nfunc main() int {\n    logging.log(\"Hello %s, number %d\\n\", \"World\", 42);\n    return 0;\n}\n",
        );

        let binary = build_at(&root, None, None, &[], false).unwrap();
        let output = Command::new(binary.as_std_path()).output().unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "Hello World, number 42\n");
    }

    #[test]
    fn build_tags_exclude_files_from_compilation() {
        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        write(&root.join("cm.mod"), "module \"p\"\n");
        let os = root.join("osdep");
        fs::create_dir_all(&os).unwrap();
        write(
            &os.join("never.cm"),
            "// +build neverland\n\nmodule \"osdep\"\nfunc which() int { return 9; }\n",
        );
        write(&os.join("always.cm"), "module \"osdep\"\nfunc which2() int { return 1; }\n");

        let ctx = BuildContext::current();
        let proj = project::discover_with_context(&root, Some(&ctx)).unwrap();
        let build_dir = ensure_build_dir(&proj).unwrap();
        let (units, _) = transpile_project(&proj, &build_dir, &ctx).unwrap();

        assert!(units.iter().all(|u| !u.c_file.as_str().contains("never")));
        assert!(!build_dir.join("osdep_never.c").exists());
        assert!(build_dir.join("osdep_always.c").exists());
    }
}
