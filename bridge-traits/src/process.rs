//! External Process Execution
//!
//! Media tools (probe, thumbnail extraction) run as child processes. The core
//! only ever passes an argument list, never a shell string, so paths and URLs
//! containing spaces or quotes reach the tool verbatim.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Captured result of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status, `None` when the process was terminated by a signal.
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Trailing stderr, trimmed for inclusion in error messages.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        let trimmed = self.stderr.trim();
        let count = trimmed.chars().count();
        if count <= max_chars {
            trimmed.to_string()
        } else {
            trimmed.chars().skip(count - max_chars).collect()
        }
    }
}

/// Runs external programs.
///
/// # Errors
///
/// - `BridgeError::Timeout` when the program outlives `timeout`; the child must
///   be killed before returning.
/// - `BridgeError::NotAvailable` when the program cannot be spawned.
///
/// A non-zero exit status is not an error at this level; callers inspect
/// [`ProcessOutput::success`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration)
        -> Result<ProcessOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_end() {
        let output = ProcessOutput {
            status_code: Some(1),
            stdout: String::new(),
            stderr: "  header noise ... Invalid data found  \n".to_string(),
        };

        assert!(!output.success());
        assert_eq!(output.stderr_tail(18), "Invalid data found");
    }
}
