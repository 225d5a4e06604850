//! Database gateway trait definition.

use crate::error::DbResult;
use crate::statement::{SelectQuery, WriteBatch};
use async_trait::async_trait;

/// Result of applying a [`WriteBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows inserted or deleted.
    pub affected: u64,
    /// Rows skipped because their content hash was already cataloged.
    pub skipped: u64,
}

/// Runs catalog statements against a concrete engine.
///
/// Gateways are **dumb executors**. The catalog owns query compilation and
/// record decomposition; gateways only render, bind and run.
///
/// # Invariants
///
/// - `execute` returns the selected column of every matching row, in engine order
/// - `execute_batch` applies the whole batch or nothing
/// - Duplicate content hashes on insert are skipped, never overwritten
/// - Connection loss and pool exhaustion surface as
///   [`crate::DbError::Unavailable`], never as a panic
///
/// # Implementors
///
/// - [`super::MemoryCatalog`] - For testing
/// - [`super::MySqlCatalog`] - For production
#[async_trait]
pub trait CatalogDatabase: Send + Sync {
    /// Runs a select and returns the selected column of each row.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An identifier is not a plain SQL identifier
    /// - No connection could be acquired in time
    /// - The engine fails the statement
    async fn execute(&self, query: &SelectQuery) -> DbResult<Vec<String>>;

    /// Applies a batch atomically.
    ///
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is malformed or the engine fails it.
    /// On error nothing from the batch is applied.
    async fn execute_batch(&self, batch: &WriteBatch) -> DbResult<BatchOutcome>;
}
