//! Shared deterministic types for change-sets and execution results.
//!
//! These types define stable contracts between the parser, the materializer,
//! the runner and the fix loop. They carry no I/O state.

use serde::{Deserialize, Serialize};

/// Exit code reported when the entrypoint does not exist (nothing was spawned).
pub const ENTRYPOINT_NOT_FOUND: i32 = 127;
/// Exit code reported when the entrypoint exists but cannot be executed.
pub const ENTRYPOINT_NOT_EXECUTABLE: i32 = 126;

/// One file to create or overwrite, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

impl FileEdit {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Parsed, applyable description of one model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Entrypoint hint from the response (structured or inferred).
    pub entrypoint: Option<String>,
    /// Files to write, in response order.
    pub files: Vec<FileEdit>,
    /// Paths to delete before any write, in response order.
    pub deletes: Vec<String>,
}

impl ChangeSet {
    /// True when the response proposes neither writes nor deletes.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.deletes.is_empty()
    }
}

/// Captured result of running the project entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn not_found(entrypoint: &str) -> Self {
        Self {
            exit_code: ENTRYPOINT_NOT_FOUND,
            stdout: String::new(),
            stderr: format!("Entrypoint not found: {entrypoint}"),
        }
    }

    /// Error text fed to classification and to the repair prompt.
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stderr, self.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_change_set_has_no_changes() {
        let mut change_set = ChangeSet {
            entrypoint: Some("main.py".to_string()),
            ..ChangeSet::default()
        };
        assert!(change_set.is_empty());

        change_set.deletes.push("old.py".to_string());
        assert!(!change_set.is_empty());
    }

    #[test]
    fn combined_output_puts_stderr_first() {
        let result = ExecutionResult {
            exit_code: 1,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(result.combined_output(), "err\nout");
        assert!(!result.success());
    }
}
