//! Error types for leaseq.

use thiserror::Error;

use crate::message::MessageId;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in leaseq operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend error.
    ///
    /// Preserves the full `sqlx::Error` for matching on specific database
    /// error conditions (pool timeout, connection reset, etc.). These are
    /// treated as transient by the runner.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A message body could not be decoded as a job envelope.
    #[error("malformed job envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// The envelope payload was not valid base64.
    #[error("malformed job payload: {0}")]
    EnvelopePayload(#[from] base64::DecodeError),

    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp: {0}")]
    Timestamp(#[from] time::error::Parse),

    /// No message with this identifier exists in the queue.
    ///
    /// Returned by extend when the message was already deleted or never existed.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// A job name was registered more than once.
    #[error("duplicate job registration: {0}")]
    DuplicateJob(String),

    /// Queue or runner configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns `true` for the not-found outcome of extend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::MessageNotFound(_))
    }
}
