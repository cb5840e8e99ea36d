// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Project discovery and the module graph.
//!
//! A project is rooted at the directory holding `cm.mod`. Every directory
//! containing `.cm` files is a module; its import path is the slash-joined
//! path from the root (`main` for the root itself). Discovery optionally
//! filters files through a [`BuildContext`] before grouping, validates that
//! every file agrees with its directory about the module name, and rejects
//! cyclic imports.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use camino::{Utf8Path, Utf8PathBuf};
use ecow::EcoString;
use thiserror::Error;
use tracing::debug;

use crate::source_analysis::ParseError;

/// The build output directory name, skipped during scanning.
pub const BUILD_DIR_NAME: &str = ".c_minus";

/// The project manifest file name.
pub const MANIFEST_NAME: &str = "cm.mod";

const KNOWN_OS_TAGS: &[&str] = &["linux", "darwin", "windows", "freebsd", "openbsd", "netbsd"];
const KNOWN_ARCH_TAGS: &[&str] = &["amd64", "arm64", "arm", "386", "mips", "mips64", "ppc64", "s390x"];

/// An error raised while discovering or validating a project.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {MANIFEST_NAME} found (searched up from {start})")]
    ManifestNotFound { start: Utf8PathBuf },

    #[error("invalid module declaration in {path}: {line}")]
    InvalidManifest { path: Utf8PathBuf, line: String },

    #[error("no module declaration found in {path}")]
    ManifestMissingModule { path: Utf8PathBuf },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no module declaration in {path}")]
    ModuleMissing { path: Utf8PathBuf },

    #[error("module mismatch in {path}: module declares \"{declared}\" but expected \"{expected}\"")]
    ModuleMismatch {
        path: Utf8PathBuf,
        declared: String,
        expected: String,
    },

    #[error("circular dependency detected among modules")]
    CircularDependency,

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

/// A C-minus project with all its modules.
#[derive(Debug, Clone)]
pub struct Project {
    /// Filesystem path to the project root (where `cm.mod` lives).
    pub root_path: Utf8PathBuf,
    /// Module path declared in `cm.mod`.
    pub root_module: EcoString,
    /// Import path → module, ordered for deterministic generation.
    pub modules: BTreeMap<String, ModuleInfo>,
}

/// A single module: one directory of `.cm` files.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub import_path: String,
    pub dir_path: Utf8PathBuf,
    /// Member `.cm` files, sorted by path.
    pub files: Vec<Utf8PathBuf>,
    /// Imports of other project modules, sorted.
    pub imports: Vec<String>,
}

/// The build configuration used for build-tag matching.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub os: String,
    pub arch: String,
    /// Custom tags supplied on the command line.
    pub tags: BTreeSet<String>,
    pub release: bool,
}

impl BuildContext {
    /// Returns a context describing the host platform with no custom tags.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: host_os().to_string(),
            arch: host_arch().to_string(),
            tags: BTreeSet::new(),
            release: false,
        }
    }

    /// Returns the host context extended with custom tags and a release flag.
    #[must_use]
    pub fn new<I, S>(custom_tags: I, release: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ctx = Self::current();
        ctx.release = release;
        ctx.tags = custom_tags.into_iter().map(Into::into).collect();
        ctx
    }

    /// Applies the matching rule: every OR-group must contain at least one
    /// matching tag. An empty matrix always matches.
    #[must_use]
    pub fn matches(&self, build_tags: &[Vec<EcoString>]) -> bool {
        build_tags
            .iter()
            .all(|group| group.iter().any(|tag| self.matches_tag(tag)))
    }

    fn matches_tag(&self, tag: &str) -> bool {
        // Negation applies once; no nesting.
        if let Some(inner) = tag.strip_prefix('!') {
            return !self.matches_tag(inner);
        }
        if KNOWN_OS_TAGS.contains(&tag) {
            return self.os == tag;
        }
        if KNOWN_ARCH_TAGS.contains(&tag) {
            return self.arch == tag;
        }
        match tag {
            "debug" => !self.release,
            "release" => self.release,
            _ => self.tags.contains(tag),
        }
    }
}

/// Maps the Rust target OS name onto the C-minus tag vocabulary.
fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Maps the Rust target arch name onto the C-minus tag vocabulary.
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// Returns the last path segment of an import path, used as its prefix.
///
/// Example: `utils/io` → `io`.
#[must_use]
pub fn import_prefix(import_path: &str) -> &str {
    match import_path.rsplit('/').next() {
        Some("") | None => import_path,
        Some(last) => last,
    }
}

/// Finds the project root from `start_dir` and scans all modules.
///
/// # Errors
///
/// Fails when no `cm.mod` is found, a file cannot be read, module
/// declarations disagree with their directories, or the import graph has a
/// cycle.
pub fn discover(start_dir: &Utf8Path) -> Result<Project, ProjectError> {
    discover_with_context(start_dir, None)
}

/// Like [`discover`], additionally filtering files through a [`BuildContext`].
///
/// # Errors
///
/// See [`discover`].
pub fn discover_with_context(
    start_dir: &Utf8Path,
    ctx: Option<&BuildContext>,
) -> Result<Project, ProjectError> {
    let (root_path, root_module) = find_project_root(start_dir)?;
    debug!(root = %root_path, module = %root_module, "discovered project root");

    let mut modules = scan_modules(&root_path, ctx)?;
    validate_modules(&root_path, &mut modules)?;
    detect_cycles(&modules)?;

    Ok(Project {
        root_path,
        root_module,
        modules,
    })
}

/// Walks up from `start_dir` to find `cm.mod`, returning the root directory
/// and the declared root module.
fn find_project_root(start_dir: &Utf8Path) -> Result<(Utf8PathBuf, EcoString), ProjectError> {
    let abs = std::path::absolute(start_dir.as_std_path()).map_err(|source| ProjectError::Io {
        path: start_dir.to_path_buf(),
        source,
    })?;
    let abs = Utf8PathBuf::from_path_buf(abs)
        .map_err(|p| ProjectError::NonUtf8Path(p.display().to_string()))?;

    let mut current = abs.clone();
    loop {
        let manifest = current.join(MANIFEST_NAME);
        if manifest.is_file() {
            let module = parse_manifest(&manifest)?;
            return Ok((current, module));
        }
        if !current.pop() {
            return Err(ProjectError::ManifestNotFound { start: abs });
        }
    }
}

/// Parses `cm.mod`, extracting the `module "X"` declaration.
fn parse_manifest(path: &Utf8Path) -> Result<EcoString, ProjectError> {
    let data = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    for line in data.lines() {
        let line = line.trim();
        if line.starts_with("module") {
            let mut fields = line.split_whitespace();
            let _keyword = fields.next();
            let (Some(name), None) = (fields.next(), fields.next()) else {
                return Err(ProjectError::InvalidManifest {
                    path: path.to_path_buf(),
                    line: line.to_string(),
                });
            };
            return Ok(EcoString::from(name.trim_matches('"')));
        }
    }

    Err(ProjectError::ManifestMissingModule {
        path: path.to_path_buf(),
    })
}

/// Recursively collects `.cm` files under the root, grouped by directory.
fn scan_modules(
    root: &Utf8Path,
    ctx: Option<&BuildContext>,
) -> Result<BTreeMap<String, ModuleInfo>, ProjectError> {
    let mut modules = BTreeMap::new();
    scan_dir(root, root, ctx, &mut modules)?;
    Ok(modules)
}

fn scan_dir(
    root: &Utf8Path,
    dir: &Utf8Path,
    ctx: Option<&BuildContext>,
    modules: &mut BTreeMap<String, ModuleInfo>,
) -> Result<(), ProjectError> {
    let read = std::fs::read_dir(dir).map_err(|source| ProjectError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries: Vec<_> = read
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().map(|t| t.is_symlink()).unwrap_or(true))
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|p| ProjectError::NonUtf8Path(p.display().to_string()))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        if is_dir {
            if path.file_name() == Some(BUILD_DIR_NAME) {
                continue;
            }
            scan_dir(root, &path, ctx, modules)?;
            continue;
        }
        if path.extension() != Some("cm") {
            continue;
        }

        if let Some(ctx) = ctx {
            let tags = extract_build_tags(&path)?;
            if !ctx.matches(&tags) {
                debug!(file = %path, "excluded by build tags");
                continue;
            }
        }

        let import_path = import_path_for_dir(root, dir);
        let info = modules
            .entry(import_path.clone())
            .or_insert_with(|| ModuleInfo {
                import_path,
                dir_path: dir.to_path_buf(),
                files: Vec::new(),
                imports: Vec::new(),
            });
        info.files.push(path);
    }

    Ok(())
}

/// Computes the import path for a module directory (`.` → `main`).
fn import_path_for_dir(root: &Utf8Path, dir: &Utf8Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if !rel.as_str().is_empty() => rel.as_str().replace('\\', "/"),
        _ => "main".to_string(),
    }
}

/// Reads the build-tag prelude of one `.cm` file.
///
/// Only `// +build` lines before the module declaration (or the first
/// non-comment line) count.
fn extract_build_tags(path: &Utf8Path) -> Result<Vec<Vec<EcoString>>, ProjectError> {
    let data = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tags = Vec::new();
    for raw in data.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("// +build ") {
            let group: Vec<EcoString> = rest.split_whitespace().map(EcoString::from).collect();
            if !group.is_empty() {
                tags.push(group);
            }
        } else if line.starts_with("module") || (!line.is_empty() && !line.starts_with("//")) {
            break;
        }
    }
    Ok(tags)
}

/// Ensures every file in a module declares the module matching its
/// directory, and collects each module's import set.
fn validate_modules(
    _root: &Utf8Path,
    modules: &mut BTreeMap<String, ModuleInfo>,
) -> Result<(), ProjectError> {
    for (import_path, info) in modules.iter_mut() {
        let mut declared: Option<String> = None;
        let mut imports = BTreeSet::new();

        for file in &info.files {
            let (module, file_imports) = fast_scan_file(file)?;

            match &declared {
                None => declared = Some(module.clone()),
                Some(first) if *first != module => {
                    return Err(ProjectError::ModuleMismatch {
                        path: file.clone(),
                        declared: module,
                        expected: first.clone(),
                    });
                }
                Some(_) => {}
            }

            if module != *import_path {
                return Err(ProjectError::ModuleMismatch {
                    path: file.clone(),
                    declared: module,
                    expected: import_path.clone(),
                });
            }

            imports.extend(file_imports);
        }

        info.imports = imports.into_iter().collect();
    }

    Ok(())
}

/// Quickly scans one file for its module declaration and imports without
/// building a full AST.
fn fast_scan_file(path: &Utf8Path) -> Result<(String, Vec<String>), ProjectError> {
    let data = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut module = None;
    let mut imports = Vec::new();

    for raw in data.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("module ") {
            if let Some(tok) = rest.split_whitespace().next() {
                module = Some(tok.trim_matches('"').to_string());
            }
        } else if let Some(rest) = line.strip_prefix("import ") {
            if let Some(tok) = rest.split_whitespace().next() {
                imports.push(tok.trim_matches('"').to_string());
            }
        }
    }

    let module = module.ok_or_else(|| ProjectError::ModuleMissing {
        path: path.to_path_buf(),
    })?;
    Ok((module, imports))
}

/// Kahn's topological sort over the import graph; failure to process every
/// module means a cycle.
fn detect_cycles(modules: &BTreeMap<String, ModuleInfo>) -> Result<(), ProjectError> {
    let mut in_degree: BTreeMap<&str, usize> = modules.keys().map(|k| (k.as_str(), 0)).collect();

    for info in modules.values() {
        for imp in &info.imports {
            // Imports pointing outside the project carry no edge.
            if let Some(d) = in_degree.get_mut(imp.as_str()) {
                *d += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|&(_, d)| *d == 0)
        .map(|(k, _)| *k)
        .collect();

    let mut processed = 0usize;
    while let Some(current) = queue.pop_front() {
        processed += 1;
        for imp in &modules[current].imports {
            if let Some(d) = in_degree.get_mut(imp.as_str()) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(imp.as_str());
                }
            }
        }
    }

    if processed != modules.len() {
        return Err(ProjectError::CircularDependency);
    }
    Ok(())
}
