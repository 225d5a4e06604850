//! Per-session sync watermarks.
//!
//! A watermark is the highest sequence number already applied for a sync
//! session. Updates at or below it are skipped, which makes re-delivery
//! idempotent. Watermarks never move backwards.

use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::collections::HashMap;

/// Table holding one watermark per session.
const WATERMARK_TABLE: &str = "chronosync_update_info";

/// Persisted per-session high-water sequence numbers.
///
/// Callers serialize read-then-write per session; implementations only
/// guarantee that `renew` never lowers a stored value.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Returns the stored watermark, or `None` for an unseen session.
    async fn latest(&self, session: &str) -> DbResult<Option<u64>>;

    /// Records the first watermark of a session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::DuplicateSession`] if the session already has one.
    async fn insert(&self, session: &str, seq: u64) -> DbResult<()>;

    /// Raises an existing watermark to `seq`. Lower values are ignored.
    async fn renew(&self, session: &str, seq: u64) -> DbResult<()>;
}

/// In-memory watermark store for testing.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    marks: RwLock<HashMap<String, u64>>,
}

impl MemoryWatermarkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored watermark.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.marks.read().clone()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn latest(&self, session: &str) -> DbResult<Option<u64>> {
        Ok(self.marks.read().get(session).copied())
    }

    async fn insert(&self, session: &str, seq: u64) -> DbResult<()> {
        let mut marks = self.marks.write();
        if marks.contains_key(session) {
            return Err(DbError::DuplicateSession(session.to_string()));
        }
        marks.insert(session.to_string(), seq);
        Ok(())
    }

    async fn renew(&self, session: &str, seq: u64) -> DbResult<()> {
        let mut marks = self.marks.write();
        let mark = marks.entry(session.to_string()).or_insert(seq);
        *mark = (*mark).max(seq);
        Ok(())
    }
}

/// Watermarks in the `chronosync_update_info` MySQL table.
#[derive(Debug, Clone)]
pub struct SqlWatermarkStore {
    pool: MySqlPool,
}

impl SqlWatermarkStore {
    /// Creates a store over `pool`.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates the watermark table if it does not exist.
    pub async fn ensure_table(&self) -> DbResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {WATERMARK_TABLE} (\
             id INT AUTO_INCREMENT NOT NULL, \
             session_name VARCHAR(255) UNIQUE NOT NULL, \
             seq_num BIGINT UNSIGNED NOT NULL, \
             PRIMARY KEY (id)) ENGINE=InnoDB"
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for SqlWatermarkStore {
    async fn latest(&self, session: &str) -> DbResult<Option<u64>> {
        let sql = format!("SELECT seq_num FROM {WATERMARK_TABLE} WHERE session_name = ?");
        let row = sqlx::query(&sql)
            .bind(session)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<u64, _>(0).map_err(DbError::from))
            .transpose()
    }

    async fn insert(&self, session: &str, seq: u64) -> DbResult<()> {
        let sql = format!("INSERT INTO {WATERMARK_TABLE} (session_name, seq_num) VALUES (?, ?)");
        sqlx::query(&sql)
            .bind(session)
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                let duplicate = err
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    DbError::DuplicateSession(session.to_string())
                } else {
                    DbError::from(err)
                }
            })?;
        Ok(())
    }

    async fn renew(&self, session: &str, seq: u64) -> DbResult<()> {
        let sql = format!(
            "UPDATE {WATERMARK_TABLE} SET seq_num = GREATEST(seq_num, ?) WHERE session_name = ?"
        );
        sqlx::query(&sql)
            .bind(seq)
            .bind(session)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
