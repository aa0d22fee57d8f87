//! Error types for sandbox operations.

use thiserror::Error;

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors from container lifecycle and file transfer.
///
/// Note what is *not* here: a non-zero exit code from executed code is
/// reported in the execution record, never raised.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Docker Engine API error
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Host-side filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted on a handle whose container was stopped
    #[error("Sandbox is stopped")]
    Stopped,

    /// Tar packing/unpacking failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// A table upload targeted a file extension with no serializer
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),

    /// Caller passed invalid arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
