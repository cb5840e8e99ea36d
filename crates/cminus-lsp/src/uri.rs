// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! `file://` URI conversion.
//!
//! Round-tripping goes through the `url` crate, which owns percent
//! decoding and Windows drive-letter normalisation in both directions.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum UriError {
    #[error("invalid uri \"{uri}\": {reason}")]
    Invalid { uri: String, reason: String },

    #[error("unsupported uri scheme \"{0}\"")]
    UnsupportedScheme(String),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),
}

/// Resolves a `file://` URI to an absolute filesystem path.
///
/// # Errors
///
/// Fails on malformed URIs, non-`file` schemes, and non-UTF-8 paths.
pub fn path_from_uri(uri: &str) -> Result<Utf8PathBuf, UriError> {
    let url = Url::parse(uri).map_err(|e| UriError::Invalid {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "file" {
        return Err(UriError::UnsupportedScheme(url.scheme().to_string()));
    }
    let path = url.to_file_path().map_err(|()| UriError::Invalid {
        uri: uri.to_string(),
        reason: "not a local file path".to_string(),
    })?;
    Utf8PathBuf::from_path_buf(path).map_err(|p| UriError::NonUtf8(p.display().to_string()))
}

/// Builds a `file://` URI from a filesystem path, absolutising it first.
///
/// # Errors
///
/// Fails when the path cannot be absolutised or expressed as a URI.
pub fn uri_from_path(path: &Utf8Path) -> Result<String, UriError> {
    let abs = std::path::absolute(path.as_std_path()).map_err(|e| UriError::Invalid {
        uri: path.to_string(),
        reason: e.to_string(),
    })?;
    let url = Url::from_file_path(&abs).map_err(|()| UriError::Invalid {
        uri: path.to_string(),
        reason: "cannot convert to file uri".to_string(),
    })?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_absolute_path() {
        let path = Utf8Path::new("/tmp/project/main.cm");
        let uri = uri_from_path(path).unwrap();
        assert!(uri.starts_with("file://"));
        assert_eq!(path_from_uri(&uri).unwrap(), path);
    }

    #[test]
    fn rejects_non_file_schemes() {
        let err = path_from_uri("http://example.com/a.cm").unwrap_err();
        assert!(err.to_string().contains("unsupported uri scheme"));
    }

    #[test]
    fn decodes_percent_escapes() {
        let path = path_from_uri("file:///tmp/my%20project/main.cm").unwrap();
        assert_eq!(path, Utf8Path::new("/tmp/my project/main.cm"));
    }
}
