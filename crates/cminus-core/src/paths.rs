// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Generated-file path construction.
//!
//! Every module's outputs live flat inside the build directory, keyed by the
//! sanitised import path. These helpers are pure and perform no I/O.

use camino::{Utf8Path, Utf8PathBuf};

/// Converts an import path to a safe C identifier prefix.
///
/// # Examples
///
/// ```
/// use cminus_core::paths::sanitize_module_name;
///
/// assert_eq!(sanitize_module_name("fileio/ticketio"), "fileio_ticketio");
/// assert_eq!(sanitize_module_name("main"), "main");
/// ```
#[must_use]
pub fn sanitize_module_name(import_path: &str) -> String {
    import_path.replace('/', "_")
}

/// Returns the path to a module's public header file.
#[must_use]
pub fn module_header_path(build_dir: &Utf8Path, import_path: &str) -> Utf8PathBuf {
    build_dir.join(format!("{}.h", sanitize_module_name(import_path)))
}

/// Returns the path to a module's internal header file.
#[must_use]
pub fn module_internal_header_path(build_dir: &Utf8Path, import_path: &str) -> Utf8PathBuf {
    build_dir.join(format!("{}_internal.h", sanitize_module_name(import_path)))
}

/// Returns the path to the generated C source for one `.cm` file.
///
/// `cm_file_name` is the base name of the source file; a trailing `.cm`
/// extension is stripped.
#[must_use]
pub fn module_c_file_path(build_dir: &Utf8Path, import_path: &str, cm_file_name: &str) -> Utf8PathBuf {
    let base = cm_file_name.strip_suffix(".cm").unwrap_or(cm_file_name);
    build_dir.join(format!("{}_{base}.c", sanitize_module_name(import_path)))
}

/// Returns the path to the object file for one `.cm` file.
#[must_use]
pub fn module_o_file_path(build_dir: &Utf8Path, import_path: &str, cm_file_name: &str) -> Utf8PathBuf {
    module_c_file_path(build_dir, import_path, cm_file_name).with_extension("o")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_every_slash() {
        assert_eq!(sanitize_module_name("fileio/ticketio"), "fileio_ticketio");
        assert_eq!(sanitize_module_name("a/b/c"), "a_b_c");
        assert_eq!(sanitize_module_name("math"), "math");
    }

    #[test]
    fn header_paths_use_sanitized_names() {
        let build = Utf8Path::new("/build");
        assert_eq!(
            module_header_path(build, "fileio/ticketio"),
            Utf8PathBuf::from("/build/fileio_ticketio.h")
        );
        assert_eq!(
            module_internal_header_path(build, "math"),
            Utf8PathBuf::from("/build/math_internal.h")
        );
    }

    #[test]
    fn c_file_path_strips_cm_extension() {
        let build = Utf8Path::new("/build");
        assert_eq!(
            module_c_file_path(build, "math", "vector.cm"),
            Utf8PathBuf::from("/build/math_vector.c")
        );
        assert_eq!(
            module_c_file_path(build, "utils/io", "read.cm"),
            Utf8PathBuf::from("/build/utils_io_read.c")
        );
    }

    #[test]
    fn o_file_path_replaces_c_extension() {
        let build = Utf8Path::new("/build");
        assert_eq!(
            module_o_file_path(build, "math", "vector.cm"),
            Utf8PathBuf::from("/build/math_vector.o")
        );
    }
}
