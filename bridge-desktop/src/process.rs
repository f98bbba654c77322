//! Process Runner Implementation using `tokio::process`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    process::{ProcessOutput, ProcessRunner},
};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Spawns programs directly (no shell) and collects their output.
///
/// The child is spawned with `kill_on_drop`, so abandoning the wait on
/// timeout also terminates the process.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        debug!(program, arg_count = args.len(), timeout_ms = timeout.as_millis() as u64, "Spawning process");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to spawn {}: {}", program, e)))?;

        let output = match core_async::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(program, timeout_ms = timeout.as_millis() as u64, "Process timed out and was killed");
                return Err(BridgeError::Timeout(format!(
                    "{} did not finish within {:?}",
                    program, timeout
                )));
            }
        };

        Ok(ProcessOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
