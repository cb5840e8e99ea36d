// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! System C compiler integration.
//!
//! This module drives the external `cc` driver for the compile and link
//! steps. Compilation is incremental (mtime comparison of `.c` against
//! `.o`, and of the objects against the binary) and runs a bounded pool of
//! worker threads, each blocking on one compiler child process.

use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use miette::{Context, IntoDiagnostic, Result, miette};
use tracing::{debug, instrument};

use cminus_core::source_analysis::{CgoFlag, CgoFlagKind};

/// The C compiler/linker driver invoked for every unit.
const CC: &str = "cc";

/// Compiler and linker flags gathered from one file's `#cgo` directives.
#[derive(Debug, Clone, Default)]
pub struct FileFlags {
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

/// One pending compile: a generated C file and its object output.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub c_file: Utf8PathBuf,
    pub o_file: Utf8PathBuf,
    pub cflags: Vec<String>,
}

/// Filters `#cgo` directives by platform and splits the flag strings.
///
/// An empty platform matches everywhere; otherwise the directive applies
/// only when the platform equals the build OS.
#[must_use]
pub fn extract_file_flags(cgo_flags: &[CgoFlag], os: &str) -> FileFlags {
    let mut flags = FileFlags::default();

    for cgo in cgo_flags {
        if !cgo.platform.is_empty() && cgo.platform != os {
            continue;
        }
        let parts = split_flags(&cgo.flags);
        match cgo.kind {
            CgoFlagKind::Cflags => flags.cflags.extend(parts),
            CgoFlagKind::Ldflags => flags.ldflags.extend(parts),
        }
    }

    flags
}

/// Splits a flag string on whitespace, keeping single- and double-quoted
/// spans intact (quotes included).
#[must_use]
pub fn split_flags(flags: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in flags.chars() {
        match ch {
            '"' | '\'' => {
                match quote {
                    Some(q) if q == ch => quote = None,
                    None => quote = Some(ch),
                    Some(_) => {}
                }
                current.push(ch);
            }
            ' ' if quote.is_none() => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }

    out
}

/// De-duplicates linker flags across files, preserving first occurrence
/// order.
#[must_use]
pub fn collect_ldflags<'a>(all: impl IntoIterator<Item = &'a FileFlags>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for flags in all {
        for flag in &flags.ldflags {
            if seen.insert(flag.clone()) {
                out.push(flag.clone());
            }
        }
    }
    out
}

fn mtime(path: &Utf8Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Returns true when the object file is missing or older than its source.
#[must_use]
pub fn needs_recompile(unit: &CompileUnit) -> bool {
    let Some(o_time) = mtime(&unit.o_file) else {
        return true;
    };
    match mtime(&unit.c_file) {
        Some(c_time) => c_time > o_time,
        None => true,
    }
}

/// Returns true when the binary is missing or older than any object.
#[must_use]
pub fn needs_relink(output: &Utf8Path, objects: &[Utf8PathBuf]) -> bool {
    let Some(bin_time) = mtime(output) else {
        return true;
    };
    objects
        .iter()
        .any(|o| mtime(o).is_none_or(|t| t > bin_time))
}

/// Compiles every stale unit with up to `jobs` concurrent compiler
/// processes.
///
/// # Errors
///
/// Returns the first compiler failure; remaining queued units are skipped.
#[instrument(skip_all, fields(units = units.len(), jobs))]
pub fn compile_units(units: &[CompileUnit], build_dir: &Utf8Path, jobs: usize) -> Result<()> {
    let stale: Vec<&CompileUnit> = units.iter().filter(|u| needs_recompile(u)).collect();
    if stale.is_empty() {
        debug!("all objects up to date");
        return Ok(());
    }
    debug!(stale = stale.len(), "compiling");

    let queue: Mutex<VecDeque<&CompileUnit>> = Mutex::new(stale.into_iter().collect());
    let failures: Mutex<Vec<miette::Report>> = Mutex::new(Vec::new());
    let workers = jobs.max(1);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let unit = {
                        let mut q = queue.lock().expect("compile queue poisoned");
                        match q.pop_front() {
                            Some(u) => u,
                            None => return,
                        }
                    };
                    if let Err(e) = compile_one(unit, build_dir) {
                        failures.lock().expect("failure list poisoned").push(e);
                        // Drain the queue so other workers stop early.
                        queue.lock().expect("compile queue poisoned").clear();
                        return;
                    }
                }
            });
        }
    });

    let mut failures = failures.into_inner().expect("failure list poisoned");
    match failures.pop() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn compile_one(unit: &CompileUnit, build_dir: &Utf8Path) -> Result<()> {
    debug!(c_file = %unit.c_file, "compiling");

    let mut cmd = Command::new(CC);
    cmd.arg("-c")
        .arg(&unit.c_file)
        .arg("-o")
        .arg(&unit.o_file)
        .arg("-I")
        .arg(build_dir)
        .args(&unit.cflags);

    let output = cmd
        .output()
        .into_diagnostic()
        .wrap_err(format!("failed to spawn {CC}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(miette!("{CC} failed for {}:\n{stderr}", unit.c_file));
    }
    Ok(())
}

/// Links the objects into the final binary when anything changed.
///
/// # Errors
///
/// Fails when the linker exits non-zero; its stderr is surfaced.
#[instrument(skip_all, fields(output = %output))]
pub fn link_binary(objects: &[Utf8PathBuf], output: &Utf8Path, ldflags: &[String]) -> Result<()> {
    if !needs_relink(output, objects) {
        debug!("binary up to date");
        return Ok(());
    }

    let mut cmd = Command::new(CC);
    cmd.args(objects).arg("-o").arg(output).args(ldflags);

    let cmd_output = cmd
        .output()
        .into_diagnostic()
        .wrap_err(format!("failed to spawn {CC}"))?;

    if !cmd_output.status.success() {
        let stderr = String::from_utf8_lossy(&cmd_output.stderr);
        return Err(miette!("linking failed:\n{stderr}"));
    }
    debug!("linked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecow::EcoString;

    fn cgo(platform: &str, kind: CgoFlagKind, flags: &str) -> CgoFlag {
        CgoFlag {
            platform: EcoString::from(platform),
            kind,
            flags: EcoString::from(flags),
            line: 1,
        }
    }

    #[test]
    fn split_flags_plain() {
        assert_eq!(split_flags("-O2 -Wall"), vec!["-O2", "-Wall"]);
        assert_eq!(split_flags(""), Vec::<String>::new());
        assert_eq!(split_flags("   "), Vec::<String>::new());
    }

    #[test]
    fn split_flags_preserves_quoted_spans() {
        assert_eq!(
            split_flags("-I\"/opt/my libs\" -lm"),
            vec!["-I\"/opt/my libs\"", "-lm"]
        );
        assert_eq!(
            split_flags("-DNAME='hello world'"),
            vec!["-DNAME='hello world'"]
        );
    }

    #[test]
    fn extract_flags_filters_by_platform() {
        let flags = extract_file_flags(
            &[
                cgo("", CgoFlagKind::Cflags, "-O2"),
                cgo("linux", CgoFlagKind::Ldflags, "-lm"),
                cgo("windows", CgoFlagKind::Ldflags, "-lws2_32"),
            ],
            "linux",
        );
        assert_eq!(flags.cflags, vec!["-O2"]);
        assert_eq!(flags.ldflags, vec!["-lm"]);
    }

    #[test]
    fn ldflags_deduplicate_in_first_occurrence_order() {
        let a = FileFlags {
            cflags: vec![],
            ldflags: vec!["-lm".into(), "-lpthread".into()],
        };
        let b = FileFlags {
            cflags: vec![],
            ldflags: vec!["-lpthread".into(), "-lcurl".into()],
        };
        assert_eq!(collect_ldflags([&a, &b]), vec!["-lm", "-lpthread", "-lcurl"]);
    }

    #[test]
    fn missing_object_forces_recompile() {
        let unit = CompileUnit {
            c_file: Utf8PathBuf::from("/nonexistent/a.c"),
            o_file: Utf8PathBuf::from("/nonexistent/a.o"),
            cflags: vec![],
        };
        assert!(needs_recompile(&unit));
    }

    #[test]
    fn missing_binary_forces_relink() {
        assert!(needs_relink(
            Utf8Path::new("/nonexistent/bin"),
            &[Utf8PathBuf::from("/nonexistent/a.o")]
        ));
    }
}
