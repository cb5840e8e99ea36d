// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Check C-minus projects without compiling.
//!
//! Runs discovery, parsing, validation, and code generation into
//! `.c_minus/`, stopping before the C compiler is invoked. Useful as a
//! fast syntax/structure gate in editors and CI.

use camino::Utf8Path;
use miette::{Context, IntoDiagnostic, Result};
use tracing::{info, instrument};

use cminus_core::project::{self, BuildContext};

use super::build::{current_dir, ensure_build_dir, transpile_project};

/// Checks the project found from the current directory.
///
/// # Errors
///
/// Fails on discovery, parse, validation, or generation errors.
pub fn check(tags: &[String], release: bool) -> Result<()> {
    let cwd = current_dir()?;
    check_at(&cwd, tags, release)?;
    println!("Check succeeded");
    Ok(())
}

/// Checks the project discovered from `start_dir`.
///
/// # Errors
///
/// See [`check`].
#[instrument(skip_all, fields(start_dir = %start_dir))]
pub fn check_at(start_dir: &Utf8Path, tags: &[String], release: bool) -> Result<()> {
    let ctx = BuildContext::new(tags.iter().cloned(), release);
    let proj = project::discover_with_context(start_dir, Some(&ctx))
        .into_diagnostic()
        .wrap_err("project discovery failed")?;

    let build_dir = ensure_build_dir(&proj)?;
    let (units, _) = transpile_project(&proj, &build_dir, &ctx)?;

    info!(modules = proj.modules.len(), files = units.len(), "check completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn check_succeeds_without_invoking_cc() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("cm.mod"), "module \"p\"\n").unwrap();
        fs::write(
            root.join("main.cm"),
            "module \"main\"\nfunc main() int { return 0; }\n",
        )
        .unwrap();

        check_at(&root, &[], false).unwrap();
        assert!(root.join(".c_minus").join("main_main.c").is_file());
        assert!(!root.join(".c_minus").join("main_main.o").exists());
    }

    #[test]
    fn check_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("cm.mod"), "module \"p\"\n").unwrap();
        fs::write(
            root.join("main.cm"),
            "module \"main\"\nfunc main() int {\n    return 0;\n",
        )
        .unwrap();

        let err = check_at(&root, &[], false).unwrap_err();
        assert!(format!("{err:?}").contains("missing brace"));
    }
}
