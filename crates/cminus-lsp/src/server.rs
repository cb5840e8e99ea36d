// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! The LSP main loop and document lifecycle.
//!
//! Requests and notifications are handled cooperatively in arrival order
//! on this loop; the only other thread is the clangd reader. Every buffer
//! change triggers a refresh: re-discover the project, transpile the
//! workspace with open buffers substituted, and sync the regenerated C
//! into clangd.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::Sender;
use lsp_server::{Connection, Message, Notification, Request, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use cminus_core::project::{self, BUILD_DIR_NAME};

use crate::clangd::{ClangdProxy, RpcMessage};
use crate::line_map::LineMapper;
use crate::remap::LspRange;
use crate::uri::{path_from_uri, uri_from_path};
use crate::{forward, index, rename, symbols, transpile};

pub const ERROR_INVALID_PARAMS: i32 = -32602;
pub const ERROR_INTERNAL: i32 = -32002;
pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;

/// A per-request failure carried back as a JSON-RPC error response.
#[derive(Debug)]
pub struct RequestError {
    pub code: i32,
    pub message: String,
}

impl RequestError {
    pub fn invalid_params(message: impl std::fmt::Display) -> Self {
        Self {
            code: ERROR_INVALID_PARAMS,
            message: message.to_string(),
        }
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self {
            code: ERROR_INTERNAL,
            message: message.to_string(),
        }
    }
}

/// Open-document state, guarded together: the `.cm` buffers and the
/// version counters of generated C files already opened in clangd.
#[derive(Default)]
pub struct DocState {
    pub open_docs: HashMap<Utf8PathBuf, String>,
    pub opened_c_docs: HashMap<Utf8PathBuf, i64>,
}

/// State shared between the main loop and the clangd reader thread.
pub struct Shared {
    pub root_path: Utf8PathBuf,
    pub build_dir: Utf8PathBuf,
    pub docs: Mutex<DocState>,
    line_maps: Mutex<HashMap<Utf8PathBuf, Arc<LineMapper>>>,
    sender: Sender<Message>,
}

impl Shared {
    /// Returns the buffer text for an open document.
    pub fn open_doc(&self, path: &Utf8Path) -> Option<String> {
        self.docs.lock().expect("doc state poisoned").open_docs.get(path).cloned()
    }

    /// Copies the open-document map out so long work runs unlocked.
    pub fn open_docs_snapshot(&self) -> HashMap<Utf8PathBuf, String> {
        self.docs.lock().expect("doc state poisoned").open_docs.clone()
    }

    /// Returns the cached line mapper for a generated C file, building it
    /// from disk on first use.
    pub fn line_mapper(&self, c_path: &Utf8Path) -> std::io::Result<Arc<LineMapper>> {
        let mut maps = self.line_maps.lock().expect("line maps poisoned");
        if let Some(lm) = maps.get(c_path) {
            return Ok(Arc::clone(lm));
        }
        let file = std::fs::File::open(c_path)?;
        let lm = Arc::new(LineMapper::from_reader(std::io::BufReader::new(file))?);
        maps.insert(c_path.to_path_buf(), Arc::clone(&lm));
        Ok(lm)
    }

    fn invalidate_line_map(&self, c_path: &Utf8Path) {
        self.line_maps.lock().expect("line maps poisoned").remove(c_path);
    }

    fn send_notification(&self, method: &str, params: Value) {
        let note = Notification {
            method: method.to_string(),
            params,
        };
        if self.sender.send(Message::Notification(note)).is_err() {
            warn!("client connection closed while sending {method}");
        }
    }

    /// Publishes diagnostics on a `.cm` document.
    pub fn publish_diagnostics(&self, cm_path: &Utf8Path, diagnostics: Vec<Value>) {
        let Ok(uri) = uri_from_path(cm_path) else {
            return;
        };
        self.send_notification(
            "textDocument/publishDiagnostics",
            json!({"uri": uri, "diagnostics": diagnostics}),
        );
    }

    /// Degrades an error to a single diagnostic at the top of the file so
    /// editing stays productive.
    fn publish_error_diagnostic(&self, cm_path: &Utf8Path, message: &str) {
        self.publish_diagnostics(
            cm_path,
            vec![json!({
                "range": {
                    "start": {"line": 0, "character": 0},
                    "end": {"line": 0, "character": 1},
                },
                "severity": 1,
                "source": "c_minus",
                "message": message,
            })],
        );
    }
}

/// The language server: shared state plus the clangd proxy.
pub struct Server {
    pub shared: Arc<Shared>,
    pub clangd: ClangdProxy,
}

impl Server {
    /// Resolves the root, prepares `.c_minus`, and starts clangd.
    ///
    /// # Errors
    ///
    /// Fails when the root URI is unusable, the build directory cannot be
    /// created, or clangd cannot be spawned and initialized.
    pub fn new(root_uri: &str, sender: Sender<Message>) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let root_path = path_from_uri(root_uri)?;
        let build_dir = root_path.join(BUILD_DIR_NAME);
        std::fs::create_dir_all(&build_dir)?;

        let shared = Arc::new(Shared {
            root_path: root_path.clone(),
            build_dir: build_dir.clone(),
            docs: Mutex::new(DocState::default()),
            line_maps: Mutex::new(HashMap::new()),
            sender,
        });

        let notification_state = Arc::clone(&shared);
        let clangd = ClangdProxy::spawn(&root_path, &build_dir, move |msg| {
            handle_clangd_notification(&notification_state, &msg);
        })?;
        clangd.initialize(root_uri)?;

        Ok(Self { shared, clangd })
    }

    /// Runs the main loop until shutdown.
    ///
    /// # Errors
    ///
    /// Propagates connection failures.
    pub fn run(&mut self, connection: &Connection) -> Result<(), Box<dyn std::error::Error + Sync + Send>> {
        for msg in &connection.receiver {
            match msg {
                Message::Request(req) => {
                    if req.method == "shutdown" {
                        self.clangd.stop();
                    }
                    if connection.handle_shutdown(&req)? {
                        return Ok(());
                    }
                    let resp = self.dispatch_request(req);
                    connection.sender.send(Message::Response(resp))?;
                }
                Message::Notification(note) => {
                    if note.method == "exit" {
                        return Ok(());
                    }
                    self.handle_notification(note);
                }
                Message::Response(_) => {}
            }
        }
        Ok(())
    }

    /// Stops the child clangd; safe to call twice.
    pub fn stop(&mut self) {
        self.clangd.stop();
    }

    fn dispatch_request(&self, req: Request) -> Response {
        debug!(method = %req.method, "request");
        let result = match req.method.as_str() {
            "textDocument/hover" => forward::hover(self, req.params),
            "textDocument/definition" => forward::definition(self, req.params),
            "textDocument/references" => forward::references(self, req.params),
            "textDocument/completion" => forward::completion(self, req.params),
            "textDocument/documentSymbol" => self.document_symbols(req.params),
            "workspace/symbol" => self.workspace_symbols(req.params),
            "textDocument/prepareRename" => self.prepare_rename(req.params),
            "textDocument/rename" => self.rename(req.params),
            _ => {
                return Response::new_err(req.id, ERROR_METHOD_NOT_FOUND, "method not found".to_string());
            }
        };

        match result {
            Ok(value) => Response::new_ok(req.id, value),
            Err(e) => Response::new_err(req.id, e.code, e.message),
        }
    }

    fn handle_notification(&self, note: Notification) {
        match note.method.as_str() {
            "textDocument/didOpen" => {
                let Ok(params) = serde_json::from_value::<DidOpenParams>(note.params) else {
                    return;
                };
                let Ok(cm_path) = path_from_uri(&params.text_document.uri) else {
                    return;
                };
                self.shared
                    .docs
                    .lock()
                    .expect("doc state poisoned")
                    .open_docs
                    .insert(cm_path.clone(), params.text_document.text);
                self.refresh(&cm_path);
            }
            "textDocument/didChange" => {
                let Ok(params) = serde_json::from_value::<DidChangeParams>(note.params) else {
                    return;
                };
                let Some(change) = params.content_changes.into_iter().next_back() else {
                    return;
                };
                let Ok(cm_path) = path_from_uri(&params.text_document.uri) else {
                    return;
                };
                self.shared
                    .docs
                    .lock()
                    .expect("doc state poisoned")
                    .open_docs
                    .insert(cm_path.clone(), change.text);
                self.refresh(&cm_path);
            }
            "textDocument/didClose" => {
                let Ok(params) = serde_json::from_value::<DidCloseParams>(note.params) else {
                    return;
                };
                let Ok(cm_path) = path_from_uri(&params.text_document.uri) else {
                    return;
                };
                self.shared
                    .docs
                    .lock()
                    .expect("doc state poisoned")
                    .open_docs
                    .remove(&cm_path);
                self.shared.publish_diagnostics(&cm_path, Vec::new());
            }
            "initialized" => {}
            other => debug!(method = %other, "ignoring notification"),
        }
    }

    /// Re-transpiles the workspace after a buffer change and syncs the
    /// regenerated C for `cm_path` into clangd. Failures degrade to one
    /// diagnostic on the `.cm` document.
    fn refresh(&self, cm_path: &Utf8Path) {
        let start_dir = cm_path.parent().unwrap_or(Utf8Path::new("."));
        let proj = match project::discover(start_dir) {
            Ok(p) => p,
            Err(e) => {
                self.shared.publish_error_diagnostic(cm_path, &e.to_string());
                return;
            }
        };

        let open_docs = self.shared.open_docs_snapshot();
        if let Err(e) = transpile::transpile_workspace(&proj, &open_docs) {
            self.shared.publish_error_diagnostic(cm_path, &e.to_string());
            return;
        }

        let import_path = transpile::module_import_path(&proj, cm_path);
        let cm_base = cm_path.file_name().unwrap_or_default();
        let c_path = transpile::generated_c_path(&proj.root_path, &import_path, cm_base);

        self.shared.invalidate_line_map(&c_path);

        let c_text = match std::fs::read_to_string(&c_path) {
            Ok(t) => t,
            Err(e) => {
                warn!(c_path = %c_path, "generated file unreadable: {e}");
                return;
            }
        };
        let Ok(c_uri) = uri_from_path(&c_path) else {
            return;
        };

        let version = {
            let mut docs = self.shared.docs.lock().expect("doc state poisoned");
            match docs.opened_c_docs.get_mut(&c_path) {
                Some(v) => {
                    *v += 1;
                    Some(*v)
                }
                None => {
                    docs.opened_c_docs.insert(c_path.clone(), 1);
                    None
                }
            }
        };

        let result = match version {
            None => self.clangd.notify(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": c_uri,
                        "languageId": "c",
                        "version": 1,
                        "text": c_text,
                    }
                }),
            ),
            Some(v) => self.clangd.notify(
                "textDocument/didChange",
                json!({
                    "textDocument": {"uri": c_uri, "version": v},
                    "contentChanges": [{"text": c_text}],
                }),
            ),
        };
        if let Err(e) = result {
            warn!("failed to sync generated C to clangd: {e}");
        }

        // Clear any stale parse diagnostics on the source document.
        self.shared.publish_diagnostics(cm_path, Vec::new());
    }

    fn document_symbols(&self, params: Value) -> Result<Value, RequestError> {
        let p: TextDocumentParams = parse_params(params)?;
        let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;

        let cm_text = self
            .shared
            .open_doc(&cm_path)
            .ok_or_else(|| RequestError::internal("document not open"))?;

        let start_dir = cm_path.parent().unwrap_or(Utf8Path::new("."));
        let proj = project::discover(start_dir).map_err(RequestError::internal)?;

        let mut docs = HashMap::new();
        docs.insert(cm_path.clone(), cm_text);
        let idx = index::build_module_index(&proj, &docs).map_err(RequestError::internal)?;

        let import_path = transpile::module_import_path(&proj, &cm_path);
        Ok(symbols::document_symbols(&idx, &import_path, &cm_path))
    }

    fn workspace_symbols(&self, params: Value) -> Result<Value, RequestError> {
        #[derive(Deserialize)]
        struct WorkspaceSymbolParams {
            #[serde(default)]
            query: String,
        }
        let p: WorkspaceSymbolParams = parse_params(params)?;

        let proj = project::discover(&self.shared.root_path).map_err(RequestError::internal)?;
        let open_docs = self.shared.open_docs_snapshot();
        let idx = index::build_module_index(&proj, &open_docs).map_err(RequestError::internal)?;

        Ok(symbols::workspace_symbols(&idx, &p.query))
    }

    fn prepare_rename(&self, params: Value) -> Result<Value, RequestError> {
        let p: TextDocumentPositionParams = parse_params(params)?;
        let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;
        let cm_text = self.document_text(&cm_path)?;

        Ok(rename::prepare_rename(&cm_text, p.position.line, p.position.character))
    }

    fn rename(&self, params: Value) -> Result<Value, RequestError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RenameParams {
            text_document: TextDocumentIdentifier,
            position: Position,
            new_name: String,
        }
        let p: RenameParams = parse_params(params)?;
        let cm_path = path_from_uri(&p.text_document.uri).map_err(RequestError::invalid_params)?;
        let cm_text = self.document_text(&cm_path)?;

        let start_dir = cm_path.parent().unwrap_or(Utf8Path::new("."));
        let proj = project::discover(start_dir).map_err(RequestError::internal)?;
        let open_docs = self.shared.open_docs_snapshot();

        rename::rename_workspace_edit(
            &proj,
            &open_docs,
            &cm_path,
            &cm_text,
            p.position.line,
            p.position.character,
            &p.new_name,
        )
    }

    /// The open buffer, or the on-disk content for unopened documents.
    fn document_text(&self, cm_path: &Utf8Path) -> Result<String, RequestError> {
        match self.shared.open_doc(cm_path) {
            Some(text) => Ok(text),
            None => std::fs::read_to_string(cm_path).map_err(RequestError::internal),
        }
    }
}

/// Maps clangd's diagnostics for a generated C file back onto the `.cm`
/// sources they came from.
fn handle_clangd_notification(shared: &Shared, msg: &RpcMessage) {
    if msg.method.as_deref() != Some("textDocument/publishDiagnostics") {
        return;
    }

    #[derive(Deserialize)]
    struct PublishDiagnosticsParams {
        uri: String,
        #[serde(default)]
        diagnostics: Vec<Value>,
    }

    let Some(params) = msg.params.clone() else {
        return;
    };
    let Ok(params) = serde_json::from_value::<PublishDiagnosticsParams>(params) else {
        return;
    };
    let Ok(c_path) = path_from_uri(&params.uri) else {
        return;
    };
    let Ok(lm) = shared.line_mapper(&c_path) else {
        return;
    };

    let mut by_uri: HashMap<String, Vec<Value>> = HashMap::new();
    for diag in params.diagnostics {
        let Some(range) = diag
            .get("range")
            .cloned()
            .and_then(|v| serde_json::from_value::<LspRange>(v).ok())
        else {
            continue;
        };
        let Some((orig_file, orig_line1)) = lm.map_line(range.start.line + 1) else {
            continue;
        };
        if orig_file.extension() != Some("cm") {
            continue;
        }
        let Ok(cm_uri) = uri_from_path(orig_file) else {
            continue;
        };

        let line0 = orig_line1 - 1;
        let mapped = json!({
            "range": {
                "start": {"line": line0, "character": range.start.character},
                "end": {"line": line0, "character": range.end.character},
            },
            "severity": diag.get("severity").cloned().unwrap_or(Value::Null),
            "source": "clangd",
            "message": diag.get("message").cloned().unwrap_or(Value::Null),
        });
        by_uri.entry(cm_uri).or_default().push(mapped);
    }

    for (uri, diagnostics) in by_uri {
        shared.send_notification(
            "textDocument/publishDiagnostics",
            json!({"uri": uri, "diagnostics": diagnostics}),
        );
    }
}

/// The `initialize` result advertised to the client.
pub fn server_capabilities() -> Value {
    use lsp_types::{
        CompletionOptions, HoverProviderCapability, OneOf, RenameOptions, ServerCapabilities,
        TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
        WorkDoneProgressOptions,
    };

    let capabilities = ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
            open_close: Some(true),
            change: Some(TextDocumentSyncKind::FULL),
            ..Default::default()
        })),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        definition_provider: Some(OneOf::Left(true)),
        references_provider: Some(OneOf::Left(true)),
        rename_provider: Some(OneOf::Right(RenameOptions {
            prepare_provider: Some(true),
            work_done_progress_options: WorkDoneProgressOptions::default(),
        })),
        document_symbol_provider: Some(OneOf::Left(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        completion_provider: Some(CompletionOptions {
            resolve_provider: Some(false),
            trigger_characters: Some(vec![".".into(), ">".into(), ":".into(), "\"".into()]),
            ..Default::default()
        }),
        ..Default::default()
    };

    json!({"capabilities": capabilities})
}

// Wire-level parameter shapes shared by the request handlers.

#[derive(Debug, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentPositionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidOpenParams {
    text_document: DidOpenTextDocument,
}

#[derive(Debug, Deserialize)]
struct DidOpenTextDocument {
    uri: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidChangeParams {
    text_document: TextDocumentIdentifier,
    content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
struct ContentChange {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidCloseParams {
    text_document: TextDocumentIdentifier,
}

/// Deserializes request params, converting failures to `-32602`.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RequestError> {
    serde_json::from_value(params).map_err(|e| RequestError::invalid_params(format!("invalid params: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn shared_with_sender(root: &Utf8Path) -> (Arc<Shared>, crossbeam_channel::Receiver<Message>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            root_path: root.to_path_buf(),
            build_dir: root.join(BUILD_DIR_NAME),
            docs: Mutex::new(DocState::default()),
            line_maps: Mutex::new(HashMap::new()),
            sender: tx,
        });
        (shared, rx)
    }

    #[test]
    fn clangd_diagnostics_map_back_to_cm_lines() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let build_dir = root.join(BUILD_DIR_NAME);
        fs::create_dir_all(&build_dir).unwrap();

        let cm_path = root.join("main.cm");
        fs::write(&cm_path, "module \"main\"\n\nfunc main() int {\n    return does_not_exist;\n}\n").unwrap();

        let c_path = build_dir.join("main_main.c");
        fs::write(
            &c_path,
            format!("#include \"main_internal.h\"\n\n#line 3 \"{cm_path}\"\nint main() {{\n    return does_not_exist;\n}}\n"),
        )
        .unwrap();

        let (shared, rx) = shared_with_sender(&root);

        // clangd reports the undeclared identifier on generated line 5
        // (0-based 4); the directive maps it to .cm line 4 (0-based 3).
        let msg = RpcMessage {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some("textDocument/publishDiagnostics".to_string()),
            params: Some(json!({
                "uri": uri_from_path(&c_path).unwrap(),
                "diagnostics": [{
                    "range": {
                        "start": {"line": 4, "character": 11},
                        "end": {"line": 4, "character": 25},
                    },
                    "severity": 1,
                    "message": "use of undeclared identifier 'does_not_exist'",
                }],
            })),
            result: None,
            error: None,
        };
        handle_clangd_notification(&shared, &msg);

        let Message::Notification(note) = rx.try_recv().unwrap() else {
            panic!("expected a notification");
        };
        assert_eq!(note.method, "textDocument/publishDiagnostics");
        assert_eq!(note.params["uri"], uri_from_path(&cm_path).unwrap());
        let diag = &note.params["diagnostics"][0];
        assert_eq!(diag["range"]["start"]["line"], 3);
        assert_eq!(diag["range"]["start"]["character"], 11);
        assert_eq!(diag["source"], "clangd");
        assert!(diag["message"].as_str().unwrap().contains("does_not_exist"));
    }

    #[test]
    fn diagnostics_on_unmapped_lines_are_dropped() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let build_dir = root.join(BUILD_DIR_NAME);
        fs::create_dir_all(&build_dir).unwrap();

        let c_path = build_dir.join("main_main.c");
        fs::write(&c_path, "#include \"main_internal.h\"\nint x;\n").unwrap();

        let (shared, rx) = shared_with_sender(&root);
        let msg = RpcMessage {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some("textDocument/publishDiagnostics".to_string()),
            params: Some(json!({
                "uri": uri_from_path(&c_path).unwrap(),
                "diagnostics": [{
                    "range": {
                        "start": {"line": 1, "character": 0},
                        "end": {"line": 1, "character": 3},
                    },
                    "severity": 2,
                    "message": "unused variable",
                }],
            })),
            result: None,
            error: None,
        };
        handle_clangd_notification(&shared, &msg);

        assert!(rx.try_recv().is_err(), "no .cm mapping means no republish");
    }

    #[test]
    fn capabilities_advertise_full_sync_and_triggers() {
        let caps = server_capabilities();
        let c = &caps["capabilities"];
        assert_eq!(c["textDocumentSync"]["openClose"], true);
        assert_eq!(c["textDocumentSync"]["change"], 1);
        assert_eq!(c["renameProvider"]["prepareProvider"], true);
        let triggers = c["completionProvider"]["triggerCharacters"].as_array().unwrap();
        assert_eq!(triggers.len(), 4);
        assert!(triggers.contains(&json!(".")));
        assert!(triggers.contains(&json!("\"")));
    }

    #[test]
    fn request_error_constructors_carry_codes() {
        assert_eq!(RequestError::invalid_params("x").code, ERROR_INVALID_PARAMS);
        assert_eq!(RequestError::internal("x").code, ERROR_INTERNAL);
    }

    #[test]
    fn position_params_deserialize_from_wire_shape() {
        let p: TextDocumentPositionParams = parse_params(json!({
            "textDocument": {"uri": "file:///a.cm"},
            "position": {"line": 3, "character": 7},
        }))
        .unwrap();
        assert_eq!(p.text_document.uri, "file:///a.cm");
        assert_eq!(p.position.line, 3);
        assert_eq!(p.position.character, 7);
    }

    #[test]
    fn malformed_params_become_invalid_params_errors() {
        let err = parse_params::<TextDocumentPositionParams>(json!({"bogus": 1})).unwrap_err();
        assert_eq!(err.code, ERROR_INVALID_PARAMS);
    }
}
