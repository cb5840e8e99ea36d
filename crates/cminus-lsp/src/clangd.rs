// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! The clangd child process and its JSON-RPC client plumbing.
//!
//! The proxy owns one long-lived `clangd` with piped stdin/stdout. A
//! dedicated reader thread demultiplexes the stream: messages carrying a
//! method are notifications and fan out to the installed handler; messages
//! carrying only an id complete the pending request registered under that
//! id's canonical string form.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// How long an outstanding clangd request may stay unanswered.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A generic JSON-RPC 2.0 envelope covering requests, responses, and
/// notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ClangdError {
    #[error("clangd io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("clangd error {code}: {message}")]
    Response { code: i64, message: String },

    #[error("clangd request timeout: {method}")]
    Timeout { method: String },

    #[error("clangd exited before responding to {method}")]
    Disconnected { method: String },
}

/// Canonical string form of a JSON-RPC id, used to correlate responses.
///
/// Integer and string ids stringify differently (`1` vs `"x"`), so the two
/// spaces cannot collide.
fn id_key(id: &Value) -> String {
    id.to_string()
}

/// Reads one `Content-Length`-framed message.
///
/// A missing header is a protocol error and terminates the connection.
pub fn read_message(reader: &mut impl BufRead) -> std::io::Result<RpcMessage> {
    let mut content_len: Option<usize> = None;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof in headers"));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let parsed = value.trim().parse().map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, format!("invalid Content-Length: {e}"))
                })?;
                content_len = Some(parsed);
            }
        }
    }

    let Some(len) = content_len else {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "missing Content-Length header"));
    };

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    serde_json::from_slice(&payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("invalid json-rpc payload: {e}")))
}

/// Writes one `Content-Length`-framed message and flushes.
pub fn write_message(writer: &mut impl Write, msg: &RpcMessage) -> std::io::Result<()> {
    let body = serde_json::to_vec(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

type Pending = Arc<Mutex<HashMap<String, mpsc::SyncSender<RpcMessage>>>>;

/// One clangd child plus the machinery to talk JSON-RPC with it.
pub struct ClangdProxy {
    child: Child,
    writer: Mutex<BufWriter<ChildStdin>>,
    next_id: Mutex<i64>,
    pending: Pending,
    read_handle: Option<JoinHandle<()>>,
    stopped: bool,
}

impl ClangdProxy {
    /// Spawns clangd against the generated build directory and starts the
    /// reader thread. `on_notification` receives every server-initiated
    /// message (diagnostics in particular).
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned.
    pub fn spawn(
        root_path: &Utf8Path,
        build_dir: &Utf8Path,
        on_notification: impl Fn(RpcMessage) + Send + 'static,
    ) -> std::io::Result<Self> {
        let mut child = Command::new("clangd")
            .arg(format!("--compile-commands-dir={build_dir}"))
            .arg("--background-index")
            .arg("--log=error")
            .current_dir(root_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("clangd stdin is piped");
        let stdout = child.stdout.take().expect("clangd stdout is piped");

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let read_handle = {
            let pending = Arc::clone(&pending);
            std::thread::spawn(move || read_loop(stdout, &pending, on_notification))
        };

        debug!(build_dir = %build_dir, "clangd started");
        Ok(Self {
            child,
            writer: Mutex::new(BufWriter::new(stdin)),
            next_id: Mutex::new(1),
            pending,
            read_handle: Some(read_handle),
            stopped: false,
        })
    }

    /// Runs the LSP handshake with the child.
    ///
    /// # Errors
    ///
    /// Surfaces request failures.
    pub fn initialize(&self, root_uri: &str) -> Result<(), ClangdError> {
        self.request(
            "initialize",
            serde_json::json!({
                "processId": null,
                "rootUri": root_uri,
                "capabilities": {},
            }),
        )?;
        self.notify("initialized", serde_json::json!({}))
    }

    /// Sends a notification (no id, no response).
    ///
    /// # Errors
    ///
    /// Surfaces write failures.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), ClangdError> {
        let msg = RpcMessage {
            jsonrpc: jsonrpc_version(),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        };
        let mut writer = self.writer.lock().expect("clangd writer poisoned");
        write_message(&mut *writer, &msg)?;
        Ok(())
    }

    /// Sends a request and blocks for its response, bounded by the request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Fails on write errors, timeouts, a dead child, or an error response.
    pub fn request(&self, method: &str, params: Value) -> Result<Value, ClangdError> {
        let id = {
            let mut next = self.next_id.lock().expect("clangd id counter poisoned");
            let id = *next;
            *next += 1;
            id
        };
        let id_value = Value::from(id);
        let key = id_key(&id_value);

        let (tx, rx) = mpsc::sync_channel(1);
        self.pending.lock().expect("clangd pending poisoned").insert(key.clone(), tx);

        let msg = RpcMessage {
            jsonrpc: jsonrpc_version(),
            id: Some(id_value),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        };
        {
            let mut writer = self.writer.lock().expect("clangd writer poisoned");
            if let Err(e) = write_message(&mut *writer, &msg) {
                self.pending.lock().expect("clangd pending poisoned").remove(&key);
                return Err(e.into());
            }
        }

        let response = match rx.recv_timeout(REQUEST_TIMEOUT) {
            Ok(resp) => resp,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.pending.lock().expect("clangd pending poisoned").remove(&key);
                return Err(ClangdError::Timeout { method: method.to_string() });
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.pending.lock().expect("clangd pending poisoned").remove(&key);
                return Err(ClangdError::Disconnected { method: method.to_string() });
            }
        };

        if let Some(err) = response.error {
            return Err(ClangdError::Response { code: err.code, message: err.message });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Stops the child: best-effort `shutdown` notification, then kill.
    /// EOF unblocks the reader thread. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.notify("shutdown", Value::Null);
        if let Err(e) = self.child.kill() {
            warn!("failed to kill clangd: {e}");
        }
        let _ = self.child.wait();
        if let Some(handle) = self.read_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ClangdProxy {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_loop(stdout: impl Read, pending: &Pending, on_notification: impl Fn(RpcMessage)) {
    let mut reader = BufReader::new(stdout);
    loop {
        let msg = match read_message(&mut reader) {
            Ok(m) => m,
            Err(e) => {
                debug!("clangd read loop ended: {e}");
                // Wake every waiter by dropping its sender.
                pending.lock().expect("clangd pending poisoned").clear();
                return;
            }
        };

        if msg.method.is_some() {
            on_notification(msg);
            continue;
        }

        let Some(id) = &msg.id else {
            continue;
        };
        let key = id_key(id);
        let tx = pending.lock().expect("clangd pending poisoned").remove(&key);
        if let Some(tx) = tx {
            let _ = tx.send(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
    }

    #[test]
    fn reads_a_framed_request() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let mut reader = BufReader::new(Cursor::new(frame(body)));
        let msg = read_message(&mut reader).unwrap();
        assert_eq!(msg.method.as_deref(), Some("initialize"));
        assert_eq!(msg.id, Some(Value::from(1)));
    }

    #[test]
    fn missing_content_length_is_a_protocol_error() {
        let mut reader = BufReader::new(Cursor::new(b"X-Other: 1\r\n\r\n{}".to_vec()));
        let err = read_message(&mut reader).unwrap_err();
        assert!(err.to_string().contains("Content-Length"));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let body = r#"{"jsonrpc":"2.0","id":7,"result":null}"#;
        let framed = format!("content-length: {}\r\n\r\n{body}", body.len());
        let mut reader = BufReader::new(Cursor::new(framed.into_bytes()));
        let msg = read_message(&mut reader).unwrap();
        assert_eq!(msg.id, Some(Value::from(7)));
    }

    #[test]
    fn write_then_read_round_trips() {
        let msg = RpcMessage {
            jsonrpc: jsonrpc_version(),
            id: Some(Value::from(42)),
            method: Some("textDocument/hover".to_string()),
            params: Some(serde_json::json!({"x": 1})),
            result: None,
            error: None,
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        let mut reader = BufReader::new(Cursor::new(buf));
        let back = read_message(&mut reader).unwrap();
        assert_eq!(back.method.as_deref(), Some("textDocument/hover"));
        assert_eq!(back.params, Some(serde_json::json!({"x": 1})));
    }

    #[test]
    fn id_keys_distinguish_numbers_from_strings() {
        assert_eq!(id_key(&Value::from(1)), "1");
        assert_eq!(id_key(&Value::from("1")), "\"1\"");
        assert_ne!(id_key(&Value::from(1)), id_key(&Value::from("1")));
    }
}
