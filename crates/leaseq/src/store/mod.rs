//! Storage abstraction for queued messages.
//!
//! The [`MessageStore`] trait is the only place atomicity is enforced. Two
//! implementations are provided:
//!
//! - [`PgStore`]: PostgreSQL, claims with `FOR UPDATE SKIP LOCKED` (requires `postgres` feature)
//! - [`SqliteStore`]: SQLite, claims with a single `UPDATE ... RETURNING` statement
//!   (requires `sqlite` feature, enabled by default)

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::message::{DeadLetter, DeadLetterQuery, Message, MessageId};

/// Storage operations for a persistent visibility-timeout queue.
///
/// Every operation is scoped to a named queue, so several queues can share
/// one table. All timestamps are computed by the database to avoid clock skew
/// between processes sharing a store.
///
/// # Claim Protocol
///
/// 1. `claim` atomically selects the oldest visible row and pushes its
///    `visible_at` out by the visibility timeout in the same statement
/// 2. While the lease holds, no other claim can return that row
/// 3. `extend` pushes the lease further out; `delete` removes the row
/// 4. If a consumer crashes, the lease lapses and the row is claimable again
///
/// Implementations must not rely on in-process locks for claim safety; two
/// processes sharing the same database must never both claim one row.
pub trait MessageStore: Send + Sync + Clone + 'static {
    /// Insert a new message that becomes visible after `delay`.
    fn insert(
        &self,
        queue: &str,
        id: &MessageId,
        body: &[u8],
        delay: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Claim the oldest visible message in `queue`.
    ///
    /// Returns `None` if no message qualifies. A message qualifies when its
    /// `visible_at` has passed, it is not buried, and it has been received
    /// fewer than `max_receive_count` times (`None` means unlimited).
    ///
    /// On success the message's `visible_at` becomes `now + visibility_timeout`
    /// and its received count is incremented, atomically with the selection.
    fn claim(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        max_receive_count: Option<u32>,
    ) -> impl Future<Output = Result<Option<Message>>> + Send;

    /// Set a message's `visible_at` to `now + delay`.
    ///
    /// Returns `Ok(false)` if no message with this identifier exists.
    fn extend(
        &self,
        queue: &str,
        id: &MessageId,
        delay: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Permanently remove a message. Unknown identifiers are not an error.
    fn delete(&self, queue: &str, id: &MessageId) -> impl Future<Output = Result<()>> + Send;

    /// Bury a message so it is never claimed again until redriven.
    ///
    /// Returns `Ok(false)` if no message with this identifier exists.
    fn bury(
        &self,
        queue: &str,
        id: &MessageId,
        reason: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Fetch dead letters: buried messages, plus messages that exhausted
    /// `max_receive_count` and whose last lease has lapsed.
    fn fetch_dead_letters(
        &self,
        queue: &str,
        query: &DeadLetterQuery,
        max_receive_count: Option<u32>,
    ) -> impl Future<Output = Result<Vec<DeadLetter>>> + Send;

    /// Count dead letters matching the query.
    fn count_dead_letters(
        &self,
        queue: &str,
        query: &DeadLetterQuery,
        max_receive_count: Option<u32>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Reset a message's received count and burial, making it visible now.
    ///
    /// Returns `Ok(true)` if the message was found and reset.
    fn redrive(&self, queue: &str, id: &MessageId) -> impl Future<Output = Result<bool>> + Send;
}

/// Receive-count ceiling as bound into SQL; unlimited maps to the column's max.
#[cfg_attr(not(any(feature = "postgres", feature = "sqlite")), allow(dead_code))]
pub(crate) fn receive_ceiling(max_receive_count: Option<u32>) -> i64 {
    max_receive_count.map_or(i64::from(i32::MAX), i64::from)
}
