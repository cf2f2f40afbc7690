//! Message types exchanged with the queue engine.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque identifier of a stored message.
///
/// Generated as a UUID v7 string on send, so lexical order roughly follows
/// creation time. Callers should treat it as an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a message ID from an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, time-ordered identifier.
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Consume the wrapper and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Borrow the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A claimed message, returned by receive.
///
/// The message stays invisible to other consumers until its lease expires.
/// Delete it once processed, or extend it to keep the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identifier used for extend and delete.
    pub id: MessageId,
    /// The body exactly as it was sent.
    pub body: Vec<u8>,
    /// How many times this message has been claimed, including this claim.
    pub received_count: u32,
}

/// A message that is no longer handed out by receive.
///
/// A message becomes a dead letter when it is explicitly buried (poison
/// envelopes, unknown job names) or when it has been claimed
/// `max_receive_count` times and its last lease has lapsed.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Message identifier, usable with redrive.
    pub id: MessageId,
    /// The stored body.
    pub body: Vec<u8>,
    /// Number of claims the message went through.
    pub received_count: u32,
    /// Reason recorded when the message was buried, if any.
    pub last_error: Option<String>,
    /// When the message was first sent.
    pub created_at: OffsetDateTime,
}

/// Query parameters for fetching dead letters.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterQuery {
    /// Maximum number of results to return. Default: 100.
    pub limit: Option<u32>,
    /// Only include explicitly buried messages, not exhausted ones.
    pub buried_only: bool,
}

impl DeadLetterQuery {
    /// Create a new empty query (matches all dead letters).
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict results to explicitly buried messages.
    pub fn buried_only(mut self) -> Self {
        self.buried_only = true;
        self
    }

    pub(crate) fn effective_limit(&self) -> i64 {
        i64::from(self.limit.unwrap_or(100))
    }
}
