//! History trait — the per-user append-only conversation log.
//!
//! The store is the sole owner of persisted turns. Other components only
//! append, read a recency window, or purge a whole user.

use async_trait::async_trait;
use crate::error::HistoryError;
use crate::message::{Role, Turn, UserId};

/// Number of prior turns fed back to the model when nothing else is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The core HistoryStore trait.
///
/// Implementations: SQLite (durable), in-memory (tests and ephemeral chats).
/// Every method commits before returning.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist one turn and return it with its storage id and timestamp.
    async fn append(
        &self,
        user_id: UserId,
        role: Role,
        content: &str,
    ) -> std::result::Result<Turn, HistoryError>;

    /// The last `limit` turns for a user, newest first.
    ///
    /// Unknown users yield an empty vector, never an error.
    async fn recent(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> std::result::Result<Vec<Turn>, HistoryError>;

    /// Delete every turn of one user. Clearing an empty log is a no-op.
    async fn clear(&self, user_id: UserId) -> std::result::Result<(), HistoryError>;

    /// Number of stored turns for a user.
    async fn count(&self, user_id: UserId) -> std::result::Result<usize, HistoryError>;
}
