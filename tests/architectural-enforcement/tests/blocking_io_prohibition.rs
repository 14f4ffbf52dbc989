//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code in the session core and CLI MUST NOT
//! use blocking I/O. Everything async runs on the client event loop or next
//! to it, and one blocking call stalls frames, timers and input together.
//!
//! **Required**: `tokio::fs`, `tokio::io`, `tokio::net`, async `reqwest`.
//! **Acceptable**: blocking calls in plain `fn`s that run before the runtime
//! starts (config loading) and in test code.

use architectural_enforcement::{
    code_part, enclosing_context, is_test_code, production_sources, Context, SourceFile,
};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<String> = production_sources()
        .iter()
        .flat_map(find_violations)
        .collect();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nFORBIDDEN in async code:");
        eprintln!("  - std::fs::*, std::net::*");
        eprintln!("  - std::io::stdin() / std::io::stdout()");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\nREQUIRED:");
        eprintln!("  - tokio::fs, tokio::io::stdin()/stdout(), tokio::net, tokio::process");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

/// Blocking patterns and what they are
const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("use std::fs", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("use std::net", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
];

fn find_violations(file: &SourceFile) -> Vec<String> {
    let lines = file.line_refs();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        let Some((_, what)) = FORBIDDEN.iter().find(|(pattern, _)| code.contains(pattern)) else {
            continue;
        };
        if is_test_code(&lines, idx) {
            continue;
        }
        // `use` lines sit outside any function; imports alone are flagged
        if enclosing_context(&lines, idx) == Context::Sync {
            continue;
        }
        violations.push(format!(
            "{}:{} - {what}: {}",
            file.path.display(),
            idx + 1,
            line.trim()
        ));
    }
    violations
}

// ============================================================================
// Detector self-checks
// ============================================================================

#[test]
fn test_detects_blocking_read_in_async_fn() {
    let file = SourceFile::from_lines(
        "bad.rs",
        &[
            "async fn load() {",
            "    let s = std::fs::read_to_string(\"x\");",
            "}",
        ],
    );
    assert_eq!(find_violations(&file).len(), 1);
}

#[test]
fn test_allows_blocking_read_before_runtime() {
    let file = SourceFile::from_lines(
        "config.rs",
        &[
            "pub fn load_config_from_path(path: &Path) -> Result<Config> {",
            "    let s = std::fs::read_to_string(path)?;",
            "}",
        ],
    );
    assert!(find_violations(&file).is_empty());
}

#[test]
fn test_detects_blocking_stdin_in_spawned_task() {
    let file = SourceFile::from_lines(
        "main.rs",
        &[
            "fn start() {",
            "    tokio::spawn(async move {",
            "        let stdin = std::io::stdin();",
            "    });",
            "}",
        ],
    );
    assert_eq!(find_violations(&file).len(), 1);
}

#[test]
fn test_ignores_test_modules() {
    let file = SourceFile::from_lines(
        "lib.rs",
        &[
            "#[cfg(test)]",
            "mod tests {",
            "    #[tokio::test]",
            "    async fn test_io() {",
            "        std::fs::write(\"x\", \"y\").unwrap();",
            "    }",
            "}",
        ],
    );
    assert!(find_violations(&file).is_empty());
}
