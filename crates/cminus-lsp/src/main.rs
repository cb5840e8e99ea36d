// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! C-minus Language Server Protocol server.
//!
//! This binary serves `.cm` documents over stdio. Native module knowledge
//! (qualified symbols, imports, renames) is answered directly; everything
//! else is forwarded to a child `clangd` running against the generated C,
//! with coordinates remapped through `#line` directives in both directions.

mod clangd;
mod forward;
mod index;
mod line_map;
mod native;
mod remap;
mod rename;
mod server;
mod symbols;
mod text;
mod transpile;
mod uri;

use lsp_server::{Connection, Message, Response};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error + Sync + Send>> {
    // stdout carries JSON-RPC; logs go to stderr without ANSI escapes.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let (connection, io_threads) = Connection::stdio();

    let (request_id, init_params) = connection.initialize_start()?;
    let root_uri = init_params
        .get("rootUri")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let Some(root_uri) = root_uri else {
        let resp = Response::new_err(request_id, server::ERROR_INVALID_PARAMS, "missing rootUri".to_string());
        connection.sender.send(Message::Response(resp))?;
        io_threads.join()?;
        return Ok(());
    };

    let mut srv = match server::Server::new(&root_uri, connection.sender.clone()) {
        Ok(s) => s,
        Err(e) => {
            let resp = Response::new_err(request_id, server::ERROR_INTERNAL, format!("{e}"));
            connection.sender.send(Message::Response(resp))?;
            io_threads.join()?;
            return Ok(());
        }
    };

    connection.initialize_finish(request_id, server::server_capabilities())?;
    tracing::info!("c-minus language server initialized");

    srv.run(&connection)?;
    srv.stop();
    io_threads.join()?;

    tracing::info!("c-minus language server shutting down");
    Ok(())
}
