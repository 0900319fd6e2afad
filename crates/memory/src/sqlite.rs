//! SQLite history backend.
//!
//! Uses a single SQLite database file with one append-only table:
//! - `messages` — one row per turn, partitioned by `user_id`
//!
//! Rows are ordered by their autoincrement `id`, so recency reads follow
//! insertion order even when two turns share a clock tick.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use relaymind_core::error::HistoryError;
use relaymind_core::history::HistoryStore;
use relaymind_core::message::{Role, Turn, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, trace};

/// A durable SQLite history store.
///
/// The pool is the only handle to the database; clone the surrounding `Arc`
/// to share it between tasks. SQLite serializes concurrent writers.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) the history database at `path`.
    ///
    /// Missing parent directories, the file, and the schema are created
    /// automatically.
    pub async fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HistoryError::Storage(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // FULL: a returned append survives power loss, not just a crash
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite history initialized at {}", path.display());
        Ok(store)
    }

    /// An ephemeral in-process database (useful for tests).
    pub async fn in_memory() -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| HistoryError::Storage(format!("Invalid SQLite URL: {e}")))?;

        // One connection that never expires: the database dies with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, HistoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run schema migrations — creates the table and its index.
    ///
    /// A `messages` table without an `id` column predates turn ids. Its rows
    /// are copied into the current layout in their original order.
    async fn run_migrations(&self) -> Result<(), HistoryError> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('messages')")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| HistoryError::MigrationFailed(format!("table info: {e}")))?;
        let legacy = !columns.is_empty() && !columns.iter().any(|c| c == "id");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HistoryError::MigrationFailed(format!("begin: {e}")))?;

        if legacy {
            sqlx::query("ALTER TABLE messages RENAME TO messages_legacy")
                .execute(&mut *tx)
                .await
                .map_err(|e| HistoryError::MigrationFailed(format!("rename legacy table: {e}")))?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   INTEGER NOT NULL,
                role      TEXT    NOT NULL CHECK (role IN ('user', 'assistant')),
                content   TEXT    NOT NULL,
                timestamp TEXT    NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("messages table: {e}")))?;

        if legacy {
            // Legacy timestamps are `YYYY-MM-DD HH:MM:SS` in UTC.
            let copied = sqlx::query(
                r#"
                INSERT INTO messages (user_id, role, content, timestamp)
                SELECT user_id, role, content,
                       COALESCE(strftime('%Y-%m-%dT%H:%M:%S', timestamp),
                                strftime('%Y-%m-%dT%H:%M:%S', 'now')) || '.000000Z'
                FROM messages_legacy
                WHERE role IN ('user', 'assistant') AND content IS NOT NULL
                ORDER BY timestamp, rowid
                "#,
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| HistoryError::MigrationFailed(format!("copy legacy rows: {e}")))?;

            sqlx::query("DROP TABLE messages_legacy")
                .execute(&mut *tx)
                .await
                .map_err(|e| HistoryError::MigrationFailed(format!("drop legacy table: {e}")))?;

            info!(rows = copied.rows_affected(), "Migrated legacy messages table");
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, id DESC)")
            .execute(&mut *tx)
            .await
            .map_err(|e| HistoryError::MigrationFailed(format!("user index: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| HistoryError::MigrationFailed(format!("commit: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `Turn` from a SQLite row.
    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, HistoryError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| HistoryError::QueryFailed(format!("id column: {e}")))?;
        let user_id: i64 = row
            .try_get("user_id")
            .map_err(|e| HistoryError::QueryFailed(format!("user_id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| HistoryError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| HistoryError::QueryFailed(format!("content column: {e}")))?;
        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| HistoryError::QueryFailed(format!("timestamp column: {e}")))?;

        let role = Role::from_str(&role_str).map_err(HistoryError::QueryFailed)?;
        let timestamp = parse_timestamp(&timestamp_str)?;

        Ok(Turn {
            id: Some(id),
            user_id: UserId(user_id),
            role,
            content,
            timestamp,
        })
    }
}

/// Fixed-width RFC 3339 so that text comparison matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HistoryError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, user_id: UserId, role: Role, content: &str) -> Result<Turn, HistoryError> {
        let now = format_timestamp(Utc::now());

        // Clamp to the user's latest timestamp so the log never runs backwards.
        let row = sqlx::query(
            r#"
            INSERT INTO messages (user_id, role, content, timestamp)
            VALUES (
                ?1, ?2, ?3,
                MAX(?4, COALESCE((SELECT MAX(timestamp) FROM messages WHERE user_id = ?1), ?4))
            )
            RETURNING id, user_id, role, content, timestamp
            "#,
        )
        .bind(user_id.0)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("INSERT failed: {e}")))?;

        let turn = Self::row_to_turn(&row)?;
        trace!(user_id = %user_id, role = %role, id = ?turn.id, "Turn appended");
        Ok(turn)
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<Turn>, HistoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, role, content, timestamp
            FROM messages
            WHERE user_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::QueryFailed(format!("recent turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn clear(&self, user_id: UserId) -> Result<(), HistoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE user_id = ?1")
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("CLEAR failed: {e}")))?;

        debug!(user_id = %user_id, deleted = result.rows_affected(), "History cleared");
        Ok(())
    }

    async fn count(&self, user_id: UserId) -> Result<usize, HistoryError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM messages WHERE user_id = ?1")
            .bind(user_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| HistoryError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn test_store() -> SqliteHistory {
        SqliteHistory::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn append_then_recent_one() {
        let db = test_store().await;
        let appended = db.append(UserId(1), Role::User, "Hello").await.unwrap();
        assert!(appended.id.is_some());

        let recent = db.recent(UserId(1), 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0], appended);
    }

    #[tokio::test]
    async fn recent_returns_newest_first_and_respects_limit() {
        let db = test_store().await;
        for i in 0..15 {
            db.append(UserId(7), Role::User, &format!("msg {i}")).await.unwrap();
        }

        let recent = db.recent(UserId(7), 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg 14");
        assert_eq!(recent[9].content, "msg 5");
    }

    #[tokio::test]
    async fn unknown_user_has_empty_history() {
        let db = test_store().await;
        assert!(db.recent(UserId(404), 10).await.unwrap().is_empty());
        assert_eq!(db.count(UserId(404)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_limit_returns_nothing() {
        let db = test_store().await;
        db.append(UserId(1), Role::User, "hi").await.unwrap();
        assert!(db.recent(UserId(1), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_empties_history_and_is_idempotent() {
        let db = test_store().await;
        db.append(UserId(1), Role::User, "a").await.unwrap();
        db.append(UserId(1), Role::Assistant, "b").await.unwrap();

        db.clear(UserId(1)).await.unwrap();
        assert!(db.recent(UserId(1), 10).await.unwrap().is_empty());

        // Second clear is a no-op
        db.clear(UserId(1)).await.unwrap();
    }

    #[tokio::test]
    async fn clear_is_partitioned_by_user() {
        let db = test_store().await;
        db.append(UserId(1), Role::User, "alice").await.unwrap();
        db.append(UserId(2), Role::User, "bob").await.unwrap();
        db.append(UserId(2), Role::Assistant, "hi bob").await.unwrap();

        db.clear(UserId(1)).await.unwrap();

        let bob = db.recent(UserId(2), 10).await.unwrap();
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[0].content, "hi bob");
        assert_eq!(db.count(UserId(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn roles_round_trip() {
        let db = test_store().await;
        db.append(UserId(3), Role::User, "question").await.unwrap();
        db.append(UserId(3), Role::Assistant, "answer").await.unwrap();

        let recent = db.recent(UserId(3), 2).await.unwrap();
        assert_eq!(recent[0].role, Role::Assistant);
        assert_eq!(recent[1].role, Role::User);
    }

    #[tokio::test]
    async fn timestamps_are_non_decreasing() {
        let db = test_store().await;
        for i in 0..20 {
            db.append(UserId(9), Role::User, &i.to_string()).await.unwrap();
        }
        let mut turns = db.recent(UserId(9), 20).await.unwrap();
        turns.reverse();
        assert!(turns.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(turns.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn future_timestamp_is_never_undercut() {
        let db = test_store().await;
        // Simulate a row written before the clock stepped backwards.
        let future = format_timestamp(Utc::now() + chrono::Duration::hours(1));
        sqlx::query("INSERT INTO messages (user_id, role, content, timestamp) VALUES (5, 'user', 'early', ?1)")
            .bind(&future)
            .execute(&db.pool)
            .await
            .unwrap();

        let turn = db.append(UserId(5), Role::Assistant, "later").await.unwrap();
        assert_eq!(format_timestamp(turn.timestamp), future);
    }

    #[tokio::test]
    async fn unicode_content_round_trip() {
        let db = test_store().await;
        let text = "🗑️ Привет, 世界 — 'quotes' and \"doubles\"";
        db.append(UserId(1), Role::User, text).await.unwrap();
        assert_eq!(db.recent(UserId(1), 1).await.unwrap()[0].content, text);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat_history.db");

        let db = SqliteHistory::open(&path).await.unwrap();
        db.append(UserId(11), Role::User, "remember me").await.unwrap();
        db.close().await;

        let reopened = SqliteHistory::open(&path).await.unwrap();
        let recent = reopened.recent(UserId(11), 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "remember me");
    }

    #[tokio::test]
    async fn legacy_table_is_migrated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.db");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let legacy = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE messages (user_id INTEGER, role TEXT, content TEXT, \
             timestamp DATETIME DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&legacy)
        .await
        .unwrap();
        for (user, role, content, ts) in [
            (7, "user", "hi", "2024-03-01 10:00:00"),
            (7, "assistant", "hello!", "2024-03-01 10:00:01"),
            (8, "user", "other user", "2024-03-01 09:00:00"),
        ] {
            sqlx::query("INSERT INTO messages (user_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)")
                .bind(user)
                .bind(role)
                .bind(content)
                .bind(ts)
                .execute(&legacy)
                .await
                .unwrap();
        }
        legacy.close().await;

        let db = SqliteHistory::open(&path).await.unwrap();
        let turns = db.recent(UserId(7), 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].role, turns[0].content.as_str()), (Role::Assistant, "hello!"));
        assert_eq!((turns[1].role, turns[1].content.as_str()), (Role::User, "hi"));
        assert_eq!(
            format_timestamp(turns[1].timestamp),
            "2024-03-01T10:00:00.000000Z"
        );
        assert_eq!(db.count(UserId(8)).await.unwrap(), 1);

        // New turns land after the migrated ones.
        db.append(UserId(7), Role::User, "again").await.unwrap();
        assert_eq!(db.recent(UserId(7), 1).await.unwrap()[0].content, "again");
        db.close().await;

        // Reopening does not migrate twice.
        let reopened = SqliteHistory::open(&path).await.unwrap();
        assert_eq!(reopened.count(UserId(7)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(SqliteHistory::open(&dir.path().join("h.db")).await.unwrap());

        let mut handles = Vec::new();
        for task in 0..8i64 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                for i in 0..5 {
                    db.append(UserId(task % 2), Role::User, &format!("{task}-{i}"))
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(db.count(UserId(0)).await.unwrap(), 20);
        assert_eq!(db.count(UserId(1)).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn backend_name() {
        let db = test_store().await;
        assert_eq!(db.name(), "sqlite");
    }
}
