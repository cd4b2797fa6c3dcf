//! Error types for bulk transfer operations.
//!
//! バルク転送操作のエラー型

use thiserror::Error;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Local file/stream read or write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or rejected SQL/query text.
    #[error("query rejected: {0}")]
    Query(String),

    /// Column/field count or name mismatch between source and destination.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// Destination rejected row data (type mismatch, constraint violation).
    /// The message carries the server-provided row context when obtainable.
    #[error("load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// Remote service rejected an async job at submission time.
    #[error("job submission rejected: {0}")]
    Submission(String),

    /// Async job reached the failed state. Carries the remote error payload.
    #[error("job {job_id} failed: {reason}: {message}")]
    Job {
        job_id: String,
        reason: String,
        message: String,
    },

    /// Caller supplied contradictory or invalid options.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Transport-level failure talking to a remote service (HTTP, auth).
    #[error("remote service error: {0}")]
    Remote(String),

    /// Operation cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

impl TransferError {
    /// Create a Load error with table context.
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Load {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Job error from a remote error payload.
    pub fn job(
        job_id: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TransferError::Job {
            job_id: job_id.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// True for errors worth feeding to a retry policy (transport-level).
    pub fn is_remote(&self) -> bool {
        matches!(self, TransferError::Remote(_))
    }
}

impl From<csv::Error> for TransferError {
    fn from(e: csv::Error) -> Self {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => TransferError::Io(io),
            other => TransferError::Schema(format!("malformed delimited data: {:?}", other)),
        }
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
