// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Workspace transpilation for the language server.
//!
//! Unlike the CLI build, open editor buffers take priority over on-disk
//! file contents. Every refresh rewrites the generated C and
//! `compile_commands.json`, which is what the child clangd indexes.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use cminus_core::codegen::{self, CodegenError};
use cminus_core::paths::module_c_file_path;
use cminus_core::project::{BUILD_DIR_NAME, Project};
use cminus_core::source_analysis::{ParseError, parse_file, parse_source};

#[derive(Debug, Error)]
pub enum TranspileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One entry of `compile_commands.json`.
#[derive(Debug, Serialize)]
struct CompileCommand {
    directory: Utf8PathBuf,
    file: Utf8PathBuf,
    arguments: Vec<String>,
}

/// Regenerates every module into `.c_minus`, substituting open buffers,
/// and refreshes `compile_commands.json`. Returns the build directory.
///
/// # Errors
///
/// Fails on parse errors, generation errors, and unwritable outputs.
pub fn transpile_workspace(
    proj: &Project,
    open_docs: &HashMap<Utf8PathBuf, String>,
) -> Result<Utf8PathBuf, TranspileError> {
    let build_dir = proj.root_path.join(BUILD_DIR_NAME);
    std::fs::create_dir_all(&build_dir).map_err(|source| TranspileError::Io {
        path: build_dir.clone(),
        source,
    })?;

    let mut commands = Vec::new();

    for module in proj.modules.values() {
        let mut parsed = Vec::with_capacity(module.files.len());
        for file_path in &module.files {
            let file = match open_docs.get(file_path) {
                Some(content) => parse_source(content, file_path)?,
                None => parse_file(file_path)?,
            };
            parsed.push(file);

            let file_name = file_path.file_name().unwrap_or_default();
            let c_file = module_c_file_path(&build_dir, &module.import_path, file_name);
            commands.push(CompileCommand {
                directory: build_dir.clone(),
                arguments: vec![
                    "cc".to_string(),
                    "-c".to_string(),
                    c_file.to_string(),
                    "-I".to_string(),
                    build_dir.to_string(),
                ],
                file: c_file,
            });
        }

        codegen::generate_module(module, &parsed, &build_dir)?;
    }

    let json = serde_json::to_vec_pretty(&commands).expect("compile commands serialize");
    let cc_path = build_dir.join("compile_commands.json");
    std::fs::write(&cc_path, json).map_err(|source| TranspileError::Io {
        path: cc_path,
        source,
    })?;

    debug!(build_dir = %build_dir, files = commands.len(), "workspace transpiled");
    Ok(build_dir)
}

/// Computes the import path of the module owning `cm_path` (`main` for
/// files directly under the root).
#[must_use]
pub fn module_import_path(proj: &Project, cm_path: &Utf8Path) -> String {
    let dir = cm_path.parent().unwrap_or(Utf8Path::new("."));
    match dir.strip_prefix(&proj.root_path) {
        Ok(rel) if !rel.as_str().is_empty() => rel.as_str().replace('\\', "/"),
        _ => "main".to_string(),
    }
}

/// Computes the generated C path corresponding to one `.cm` source.
#[must_use]
pub fn generated_c_path(root_path: &Utf8Path, import_path: &str, cm_base: &str) -> Utf8PathBuf {
    module_c_file_path(&root_path.join(BUILD_DIR_NAME), import_path, cm_base)
}
