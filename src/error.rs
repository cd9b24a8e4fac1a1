//! Error types for modelbridge operations.

use thiserror::Error;

/// Main error type for modelbridge operations.
///
/// The discovery/helper variants are finer-grained than the external contract
/// needs: callers of `fetch_model` see an empty table list on any failure,
/// but the variant that caused it is kept for logging.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Invalid configuration value
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Filesystem failure reading or writing the credential file
    #[error("credential store I/O error: {0}")]
    CredentialIo(String),

    /// Credential file exists but does not parse as JSON
    #[error("credential file is malformed: {0}")]
    CredentialMalformed(String),

    /// No running Power BI Desktop instance was discovered
    #[error("no running Power BI Desktop instance found")]
    NoInstance,

    /// No helper executable exists at any candidate path
    #[error("helper executable not found at any candidate path")]
    HelperNotFound,

    /// The helper process failed to start
    #[error("failed to spawn helper: {0}")]
    HelperSpawn(String),

    /// The helper process was killed after exceeding the fetch timeout
    #[error("helper timed out after {0}s")]
    HelperTimeout(u64),

    /// The helper process exited non-zero
    #[error("helper exited with code {0}: {1}")]
    HelperExit(i32, String),

    /// The helper process produced empty or non-JSON output
    #[error("helper output unusable: {0}")]
    HelperOutput(String),

    /// The chat-completions API call failed
    #[error("completion request failed: {0}")]
    Completion(String),

    /// The HTTP server failed to bind or serve
    #[error("server error: {0}")]
    Server(String),
}

/// Result type alias for modelbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
