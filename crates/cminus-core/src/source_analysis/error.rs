// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Parse errors.
//!
//! Errors carry the source path and a 1-based line so they render as
//! `path:line: message`, the form surfaced both on the CLI and as a single
//! LSP diagnostic during refresh.

use camino::Utf8PathBuf;
use thiserror::Error;

/// A structural error in one `.cm` source file.
#[derive(Debug, Error)]
#[error("{path}:{line}: {kind}")]
pub struct ParseError {
    pub path: Utf8PathBuf,
    /// 1-based line of the offending construct.
    pub line: u32,
    #[source]
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(path: &camino::Utf8Path, line: u32, kind: ParseErrorKind) -> Self {
        Self {
            path: path.to_path_buf(),
            line,
            kind,
        }
    }
}

/// The kind of parse error.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// The file never declares a module.
    #[error("no module declaration found")]
    MissingModule,

    /// A parameter list could not be understood.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A braced declaration has no `{`, or the block never closes.
    #[error("missing brace in {0} declaration")]
    MissingBrace(&'static str),

    /// A `;`-terminated declaration runs off the end of the file.
    #[error("{0} missing semicolon")]
    MissingSemicolon(&'static str),

    /// The file could not be read.
    #[error("failed to read file: {0}")]
    Io(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn parse_error_renders_path_line_message() {
        let err = ParseError::new(Utf8Path::new("src/main.cm"), 7, ParseErrorKind::MissingSemicolon("typedef"));
        assert_eq!(err.to_string(), "src/main.cm:7: typedef missing semicolon");
    }

    #[test]
    fn missing_module_renders() {
        let err = ParseError::new(Utf8Path::new("a.cm"), 1, ParseErrorKind::MissingModule);
        assert_eq!(err.to_string(), "a.cm:1: no module declaration found");
    }
}
