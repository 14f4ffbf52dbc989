//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep to wait for something. The
//! client reacts to I/O and timers through `tokio::select!`; a sleep inside a
//! handler would freeze the whole session.
//!
//! **Exceptions**:
//! - Deadline futures that are stored and polled later (`Box::pin(sleep(..))`
//!   in a single-slot timer), never awaited in place
//! - Periodic work driven by `tokio::time::interval`
//! - Test code

use architectural_enforcement::{code_part, is_test_code, production_sources, SourceFile};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = production_sources()
        .iter()
        .flat_map(find_violations)
        .collect();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nACCEPTABLE:");
        eprintln!("  - A stored deadline: Box::pin(tokio::time::sleep(delay)) polled from select!");
        eprintln!("  - tokio::time::interval() for periodic ticks");
        eprintln!("  - Test code (#[test], #[tokio::test], #[cfg(test)] modules)");
        eprintln!("\nFORBIDDEN:");
        eprintln!("  - std::thread::sleep anywhere");
        eprintln!("  - sleep(..).await in handlers, polling loops or as synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

fn find_violations(file: &SourceFile) -> Vec<String> {
    let lines = file.line_refs();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            continue;
        }
        if is_test_code(&lines, idx) {
            continue;
        }
        if !code.contains("thread::sleep") && is_stored_deadline(&lines, idx) {
            continue;
        }
        violations.push(format!(
            "{}:{} - {}",
            file.path.display(),
            idx + 1,
            line.trim()
        ));
    }
    violations
}

/// Whether the sleep future is stored rather than awaited in place
fn is_stored_deadline(lines: &[&str], idx: usize) -> bool {
    let statement: String = lines[idx..(idx + 3).min(lines.len())]
        .iter()
        .map(|l| code_part(l))
        .collect::<Vec<_>>()
        .join(" ");
    let statement = statement.split(';').next().unwrap_or_default();
    statement.contains("Box::pin(") && !statement.contains(".await")
}

// ============================================================================
// Detector self-checks
// ============================================================================

#[test]
fn test_detects_awaited_sleep() {
    let file = SourceFile::from_lines(
        "client.rs",
        &[
            "async fn wait_for_server() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ],
    );
    assert_eq!(find_violations(&file).len(), 1);
}

#[test]
fn test_allows_stored_deadline() {
    let file = SourceFile::from_lines(
        "timer.rs",
        &[
            "pub fn schedule(&mut self, delay: Duration) {",
            "    self.deadline = Some(Box::pin(time::sleep(delay)));",
            "}",
        ],
    );
    assert!(find_violations(&file).is_empty());
}

#[test]
fn test_thread_sleep_never_allowed() {
    let file = SourceFile::from_lines(
        "main.rs",
        &[
            "fn main() {",
            "    let _keep = Box::pin(std::thread::sleep(Duration::from_secs(1)));",
            "}",
        ],
    );
    assert_eq!(find_violations(&file).len(), 1);
}

#[test]
fn test_ignores_test_functions() {
    let file = SourceFile::from_lines(
        "timer.rs",
        &[
            "#[tokio::test(start_paused = true)]",
            "async fn test_fires_after_delay() {",
            "    tokio::time::sleep(Duration::from_secs(5)).await;",
            "}",
        ],
    );
    assert!(find_violations(&file).is_empty());
}
