//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! of the session client:
//! - Nothing on the event loop blocks (no blocking file, network or console I/O)
//! - No sleeping to wait for events; timers are futures polled by `select!`
//!
//! The helpers below locate production sources and answer "what kind of code
//! is this line in?" with line-based heuristics. They are deliberately simple:
//! a false positive is fixed by restructuring the code, not the scanner.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["session/core/src", "session/cli/src"];

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// One scanned source file
#[derive(Debug)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// File content split into lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Build from in-memory lines (detector tests)
    #[must_use]
    pub fn from_lines(path: &str, lines: &[&str]) -> Self {
        Self {
            path: PathBuf::from(path),
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    /// Borrowed view of the lines
    #[must_use]
    pub fn line_refs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }
}

/// Every `.rs` file under the production directories
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(entry.path()) {
                files.push(SourceFile {
                    path: entry.path().to_path_buf(),
                    lines: content.lines().map(str::to_string).collect(),
                });
            }
        }
    }
    files
}

/// Line with any trailing `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Context {
    /// Inside an `async fn` or an `async` block
    Async,
    /// Inside a plain `fn`
    Sync,
    /// Not inside any function found by the scan
    Unknown,
}

/// Classify a function signature line
fn signature_kind(line: &str) -> Option<Context> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }
    if rest.starts_with("async fn ") {
        Some(Context::Async)
    } else if rest.starts_with("fn ") {
        Some(Context::Sync)
    } else {
        None
    }
}

/// Whether `line` opens an `async` block
fn opens_async_block(line: &str) -> bool {
    let code = code_part(line);
    code.contains("async move {") || code.contains("async {")
}

/// Context of the line at `idx`
///
/// Scans backwards to the nearest function signature; an `async` block met
/// on the way counts as async context.
#[must_use]
pub fn enclosing_context(lines: &[&str], idx: usize) -> Context {
    for i in (0..=idx).rev() {
        if i < idx && opens_async_block(lines[i]) {
            return Context::Async;
        }
        if let Some(kind) = signature_kind(lines[i]) {
            return kind;
        }
    }
    Context::Unknown
}

/// Whether the line at `idx` is test code
///
/// True inside a `#[cfg(test)]` module (kept at the end of a file) or in a
/// function annotated `#[test]` / `#[tokio::test]`.
#[must_use]
pub fn is_test_code(lines: &[&str], idx: usize) -> bool {
    if lines[..idx]
        .iter()
        .any(|l| l.trim_start().starts_with("#[cfg(test)]"))
    {
        return true;
    }

    for i in (0..idx).rev() {
        if signature_kind(lines[i]).is_some() {
            return lines[..i]
                .iter()
                .rev()
                .take_while(|l| {
                    let t = l.trim_start();
                    t.starts_with("#[") || t.starts_with("///")
                })
                .any(|l| {
                    let t = l.trim_start();
                    t.starts_with("#[test]") || t.starts_with("#[tokio::test")
                });
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_kinds() {
        assert_eq!(signature_kind("    pub async fn load(&self) {"), Some(Context::Async));
        assert_eq!(signature_kind("pub(crate) fn helper() {"), Some(Context::Sync));
        assert_eq!(signature_kind("let f = 1;"), None);
    }

    #[test]
    fn test_spawned_block_is_async() {
        let code = [
            "fn connect(&mut self) {",
            "    tokio::spawn(async move {",
            "        do_io();",
            "    });",
            "}",
        ];
        assert_eq!(enclosing_context(&code, 2), Context::Async);
        assert_eq!(enclosing_context(&code, 0), Context::Sync);
    }

    #[test]
    fn test_cfg_test_module_is_test_code() {
        let code = ["fn prod() {}", "#[cfg(test)]", "mod tests {", "    fn helper() {}", "}"];
        assert!(!is_test_code(&code, 0));
        assert!(is_test_code(&code, 3));
    }

    #[test]
    fn test_production_sources_found() {
        let files = production_sources();
        assert!(files
            .iter()
            .any(|f| f.path.ends_with("session/core/src/client.rs")));
    }
}
