// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Request forwarding to clangd.
//!
//! Hover and definition first try a native C-minus answer; everything that
//! reaches clangd is translated into generated-C coordinates on the way
//! out and remapped on the way back. clangd is position-sensitive (a
//! hover on `(` yields null), so null results are retried once with the
//! column snapped to the nearest identifier on the generated line.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Value, json};

use cminus_core::project::{self, Project};

use crate::index::build_module_index;
use crate::line_map::LineMapper;
use crate::native;
use crate::remap;
use crate::server::{
    Position, RequestError, Server, TextDocumentIdentifier, TextDocumentPositionParams,
    parse_params,
};
use crate::text::snap_char_in_c_file;
use crate::transpile::{generated_c_path, module_import_path};
use crate::uri::{path_from_uri, uri_from_path};

/// Everything needed to talk to clangd about one `.cm` position.
struct CTarget {
    cm_path: Utf8PathBuf,
    c_path: Utf8PathBuf,
    c_uri: String,
    lm: Arc<LineMapper>,
    /// 1-based generated line for the request position.
    c_line1: u32,
}

fn discover_project(cm_path: &Utf8Path) -> Result<Project, RequestError> {
    let start_dir = cm_path.parent().unwrap_or(Utf8Path::new("."));
    project::discover(start_dir).map_err(RequestError::internal)
}

fn resolve_target(
    server: &Server,
    proj: &Project,
    cm_path: &Utf8Path,
    line0: u32,
) -> Result<CTarget, RequestError> {
    let import_path = module_import_path(proj, cm_path);
    let cm_base = cm_path.file_name().unwrap_or_default();
    let c_path = generated_c_path(&proj.root_path, &import_path, cm_base);
    let c_uri = uri_from_path(&c_path).map_err(RequestError::internal)?;

    let lm = server
        .shared
        .line_mapper(&c_path)
        .map_err(|e| RequestError::internal(format!("generated file missing: {e}")))?;

    // Fall back to the same line number when the mapping has no entry.
    let c_line1 = lm.map_to_generated_line(cm_path, line0 + 1).unwrap_or(line0 + 1);

    Ok(CTarget {
        cm_path: cm_path.to_path_buf(),
        c_path,
        c_uri,
        lm,
        c_line1,
    })
}

fn position_params(target: &CTarget, character: u32) -> Value {
    json!({
        "textDocument": {"uri": target.c_uri},
        "position": {"line": target.c_line1 - 1, "character": character},
    })
}

/// Forwards with one snap-retry when clangd returns null.
fn request_with_snap(
    server: &Server,
    method: &str,
    target: &CTarget,
    character: u32,
) -> Result<Value, RequestError> {
    let mut raw = server
        .clangd
        .request(method, position_params(target, character))
        .map_err(RequestError::internal)?;

    if raw.is_null() {
        if let Some(snapped) = snap_char_in_c_file(&target.c_path, target.c_line1, character as usize)
        {
            if let Ok(retry) = server
                .clangd
                .request(method, position_params(target, snapped as u32))
            {
                raw = retry;
            }
        }
    }

    Ok(raw)
}

pub fn hover(server: &Server, params: Value) -> Result<Value, RequestError> {
    let p: TextDocumentPositionParams = parse_params(params)?;
    let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;
    let proj = discover_project(&cm_path)?;

    if let Some(cm_text) = server.shared.open_doc(&cm_path) {
        let open_docs = server.shared.open_docs_snapshot();
        if let Some(native_hover) = native::try_cm_hover(
            &proj,
            &open_docs,
            &cm_path,
            &cm_text,
            p.position.line,
            p.position.character,
        ) {
            return Ok(native_hover);
        }
    }

    let target = resolve_target(server, &proj, &cm_path, p.position.line)?;
    let raw = request_with_snap(server, "textDocument/hover", &target, p.position.character)?;
    Ok(remap::map_hover_result(&target.lm, raw))
}

pub fn definition(server: &Server, params: Value) -> Result<Value, RequestError> {
    let p: TextDocumentPositionParams = parse_params(params)?;
    let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;
    let proj = discover_project(&cm_path)?;

    if let Some(cm_text) = server.shared.open_doc(&cm_path) {
        let open_docs = server.shared.open_docs_snapshot();
        if let Some(native_def) = native::try_cm_definition(
            &proj,
            &open_docs,
            &cm_path,
            &cm_text,
            p.position.line,
            p.position.character,
        ) {
            return Ok(native_def);
        }
    }

    let target = resolve_target(server, &proj, &cm_path, p.position.line)?;
    let raw = request_with_snap(server, "textDocument/definition", &target, p.position.character)?;
    Ok(remap::map_locations(&target.lm, raw))
}

pub fn references(server: &Server, params: Value) -> Result<Value, RequestError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ReferenceParams {
        text_document: TextDocumentIdentifier,
        position: Position,
        #[serde(default)]
        context: ReferenceContext,
    }
    #[derive(Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ReferenceContext {
        #[serde(default)]
        include_declaration: bool,
    }

    let p: ReferenceParams = parse_params(params)?;
    let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;
    let proj = discover_project(&cm_path)?;
    let target = resolve_target(server, &proj, &cm_path, p.position.line)?;

    let forward_params = json!({
        "textDocument": {"uri": target.c_uri},
        "position": {"line": target.c_line1 - 1, "character": p.position.character},
        "context": {"includeDeclaration": p.context.include_declaration},
    });
    let raw = server
        .clangd
        .request("textDocument/references", forward_params)
        .map_err(RequestError::internal)?;

    Ok(remap::map_locations(&target.lm, raw))
}

pub fn completion(server: &Server, params: Value) -> Result<Value, RequestError> {
    let p: TextDocumentPositionParams = parse_params(params)?;
    let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;
    let proj = discover_project(&cm_path)?;
    let target = resolve_target(server, &proj, &cm_path, p.position.line)?;

    let raw = server
        .clangd
        .request(
            "textDocument/completion",
            position_params(&target, p.position.character),
        )
        .map_err(RequestError::internal)?;

    let cm_text = server.shared.open_doc(&cm_path).unwrap_or_default();
    let cm_items = if cm_text.is_empty() {
        Vec::new()
    } else {
        let open_docs = server.shared.open_docs_snapshot();
        match build_module_index(&proj, &open_docs) {
            Ok(idx) => native::cm_completions(
                &proj,
                &idx,
                &cm_path,
                &cm_text,
                p.position.line,
                p.position.character,
            ),
            Err(_) => Vec::new(),
        }
    };

    let mapped = remap::map_completion_result(
        raw,
        &target.lm,
        &target.cm_path,
        &cm_text,
        p.position.line,
        p.position.character,
    );
    Ok(remap::merge_completion_items(mapped, cm_items))
}
