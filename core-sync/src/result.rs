//! Scan outcomes and progress reporting

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Aggregate outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub added_count: u64,
    pub updated_count: u64,
    pub deleted_count: u64,
    /// `"<name>: <message>"` per failed file, plus scan-level failures.
    pub errors: Vec<String>,
}

impl ScanResult {
    /// Result of a scan that could not start.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_changes(&self) -> u64 {
        self.added_count + self.updated_count + self.deleted_count
    }
}

/// Outcome of a mount scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountScanResult {
    #[serde(flatten)]
    pub result: ScanResult,
    /// Roots that were walked successfully.
    pub scanned_directories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Discovering,
    Processing,
    Deleting,
    Completed,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Discovering => "discovering",
            ScanPhase::Processing => "processing",
            ScanPhase::Deleting => "deleting",
            ScanPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub processed: u64,
    pub total: u64,
    /// Name of the file just finished, when there is one.
    pub current: Option<String>,
}

/// Receives progress updates; called from the scanning task.
pub type ProgressCallback = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result() {
        let result = ScanResult::failed("Cannot read /srv/videos");
        assert_eq!(result.total_changes(), 0);
        assert_eq!(result.errors, vec!["Cannot read /srv/videos".to_string()]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let result = MountScanResult {
            result: ScanResult {
                added_count: 1,
                ..ScanResult::default()
            },
            scanned_directories: vec!["/mnt/a".to_string()],
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["addedCount"], 1);
        assert_eq!(json["scannedDirectories"][0], "/mnt/a");
    }
}
