//! Error types for the remote storage provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Remote storage errors.
///
/// `Clone` so a single coalesced lookup can hand the same failure to every
/// waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a failure code
    #[error("Remote API error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Local file could not be read
    #[error("File error: {0}")]
    File(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_))
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<BridgeError> for ProviderError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Network(msg) | BridgeError::Timeout(msg) => ProviderError::Network(msg),
            BridgeError::NotAvailable(msg) => ProviderError::Network(msg),
            BridgeError::Rejected { code, message } => ProviderError::Api { code, message },
            BridgeError::OperationFailed(msg) => ProviderError::Parse(msg),
            BridgeError::Io(e) => ProviderError::File(e.to_string()),
        }
    }
}
