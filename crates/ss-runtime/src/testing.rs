//! Test helpers for checks that end in a process abort
//!
//! The aborting call runs in a child copy of the test binary, selected by
//! test name and told what to do through an env var.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

const CHILD_CASE_ENV: &str = "SS_TEST_ABORT_CASE";

/// Case this process was re-executed for, `None` in the parent
pub(crate) fn child_case() -> Option<String> {
    std::env::var(CHILD_CASE_ENV).ok()
}

/// Re-run the single test `test` in a child with `case` set
pub(crate) fn run_child(test: &str, case: &str) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args([test, "--exact", "--test-threads=1", "--nocapture"])
        .env(CHILD_CASE_ENV, case)
        .output()
        .unwrap()
}

/// The child died of SIGABRT after printing `message`
pub(crate) fn assert_aborted(output: &Output, message: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        output.status.signal(),
        Some(libc::SIGABRT),
        "child exited with {:?}, stderr:\n{}",
        output.status,
        stderr
    );
    assert!(stderr.contains(message), "missing {message:?} in:\n{stderr}");
}
