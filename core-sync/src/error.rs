use core_library::LibraryError;
use core_metadata::MetadataError;
use provider_alist::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unsafe path rejected: {0}")]
    PathTraversal(String),

    #[error("Invalid mount directories: {}", invalid.join(", "))]
    InvalidMountDirectories { invalid: Vec<String> },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File error: {0}")]
    FileError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Extraction timed out: {0}")]
    ExtractionTimeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Metadata error: {0}")]
    Metadata(MetadataError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LibraryError> for SyncError {
    fn from(error: LibraryError) -> Self {
        SyncError::Database(error.to_string())
    }
}

impl From<ProviderError> for SyncError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Network(msg) => SyncError::Network(msg),
            ProviderError::File(msg) => SyncError::FileError(msg),
            other => SyncError::Provider(other),
        }
    }
}

impl From<MetadataError> for SyncError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::ExtractionTimeout(msg) => SyncError::ExtractionTimeout(msg),
            MetadataError::FileNotFound(msg) => SyncError::FileNotFound(msg),
            other => SyncError::Metadata(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_mount_directories_lists_entries() {
        let err = SyncError::InvalidMountDirectories {
            invalid: vec!["../unsafe".to_string(), "relative".to_string()],
        };
        assert_eq!(err.to_string(), "Invalid mount directories: ../unsafe, relative");
    }

    #[test]
    fn test_upstream_conversions() {
        let err: SyncError = ProviderError::Network("reset".to_string()).into();
        assert!(matches!(err, SyncError::Network(_)));

        let err: SyncError = MetadataError::ExtractionTimeout("ffmpeg".to_string()).into();
        assert!(matches!(err, SyncError::ExtractionTimeout(_)));

        let err: SyncError = LibraryError::Migration("boom".to_string()).into();
        assert!(matches!(err, SyncError::Database(_)));
    }
}
