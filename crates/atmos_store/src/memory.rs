//! In-memory catalog for testing.

use crate::error::{DbError, DbResult};
use crate::gateway::{BatchOutcome, CatalogDatabase};
use crate::schema::{CatalogRecord, CatalogSchema, HASH_COLUMN, NAME_COLUMN};
use crate::statement::{SelectQuery, WriteBatch};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory catalog table.
///
/// Rows are kept in insertion order, which is also the order `execute`
/// returns them in. This catalog is suitable for:
/// - Unit tests
/// - Integration tests of the query and publish engines
/// - Offline tooling that never touches a server
///
/// # Example
///
/// ```rust
/// use atmos_store::{CatalogDatabase, CatalogSchema, MemoryCatalog, SelectQuery};
///
/// # tokio_test_block(async {
/// let schema = CatalogSchema::new("cmip5", vec!["activity".into()]).unwrap();
/// let db = MemoryCatalog::new(schema);
/// db.insert_names(["/CMIP5", "/CMIP6"]).unwrap();
/// let rows = db.execute(&SelectQuery::new("cmip5", "name")).await.unwrap();
/// assert_eq!(rows, vec!["/CMIP5", "/CMIP6"]);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryCatalog {
    schema: CatalogSchema,
    rows: RwLock<Vec<CatalogRecord>>,
    available: AtomicBool,
    executions: AtomicUsize,
}

impl MemoryCatalog {
    /// Creates an empty catalog with `schema`.
    #[must_use]
    pub fn new(schema: CatalogSchema) -> Self {
        Self {
            schema,
            rows: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            executions: AtomicUsize::new(0),
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &CatalogSchema {
        &self.schema
    }

    /// Decomposes and inserts names directly, skipping duplicates.
    ///
    /// Returns the number of rows inserted.
    pub fn insert_names<I, S>(&self, names: I) -> DbResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let records = names
            .into_iter()
            .map(|n| CatalogRecord::from_name(&self.schema, n.as_ref()))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(self.apply_insert(records).0)
    }

    /// Returns every cataloged name in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.rows.read().iter().map(|r| r.name.clone()).collect()
    }

    /// Returns true if `name` is cataloged.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rows.read().iter().any(|r| r.name == name)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Simulates losing (or regaining) the database connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns how many selects have been executed.
    #[must_use]
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> DbResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::Unavailable("no connection available".into()))
        }
    }

    fn check_table(&self, table: &str) -> DbResult<()> {
        if table == self.schema.table() {
            Ok(())
        } else {
            Err(DbError::Statement(format!("table {table} doesn't exist")))
        }
    }

    fn column_index(&self, column: &str) -> DbResult<Option<usize>> {
        match column {
            HASH_COLUMN | NAME_COLUMN => Ok(None),
            _ => self
                .schema
                .name_fields()
                .iter()
                .position(|f| f == column)
                .map(Some)
                .ok_or_else(|| DbError::Statement(format!("unknown column {column}"))),
        }
    }

    fn value<'r>(&self, record: &'r CatalogRecord, column: &str) -> DbResult<&'r str> {
        Ok(match column {
            HASH_COLUMN => &record.content_hash,
            NAME_COLUMN => &record.name,
            _ => match self.column_index(column)? {
                Some(i) => &record.fields[i],
                None => &record.name,
            },
        })
    }

    fn apply_insert(&self, records: Vec<CatalogRecord>) -> (usize, usize) {
        let mut rows = self.rows.write();
        let mut seen: HashSet<String> = rows.iter().map(|r| r.content_hash.clone()).collect();
        let (mut inserted, mut skipped) = (0, 0);
        for record in records {
            if seen.insert(record.content_hash.clone()) {
                rows.push(record);
                inserted += 1;
            } else {
                skipped += 1;
            }
        }
        (inserted, skipped)
    }
}

#[async_trait]
impl CatalogDatabase for MemoryCatalog {
    async fn execute(&self, query: &SelectQuery) -> DbResult<Vec<String>> {
        query.validate()?;
        self.check_available()?;
        self.check_table(query.table())?;
        self.executions.fetch_add(1, Ordering::SeqCst);

        let rows = self.rows.read();
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        'rows: for record in rows.iter() {
            for p in query.predicates() {
                if self.value(record, &p.column)? != p.value {
                    continue 'rows;
                }
            }
            let value = self.value(record, query.column())?;
            if query.is_distinct() && !seen.insert(value) {
                continue;
            }
            out.push(value.to_string());
        }
        Ok(out)
    }

    async fn execute_batch(&self, batch: &WriteBatch) -> DbResult<BatchOutcome> {
        batch.validate()?;
        self.check_available()?;
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        match batch {
            WriteBatch::Insert { table, records, .. } => {
                self.check_table(table)?;
                let (inserted, skipped) = self.apply_insert(records.clone());
                Ok(BatchOutcome {
                    affected: inserted as u64,
                    skipped: skipped as u64,
                })
            }
            WriteBatch::DeleteByName { table, names } => {
                self.check_table(table)?;
                let doomed: HashSet<&str> = names.iter().map(String::as_str).collect();
                let mut rows = self.rows.write();
                let before = rows.len();
                rows.retain(|r| !doomed.contains(r.name.as_str()));
                Ok(BatchOutcome {
                    affected: (before - rows.len()) as u64,
                    skipped: 0,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Predicate;

    fn catalog() -> MemoryCatalog {
        let schema =
            CatalogSchema::new("cmip5", vec!["activity".into(), "product".into()]).unwrap();
        let db = MemoryCatalog::new(schema);
        db.insert_names(["/CMIP5/output", "/CMIP5/input", "/CMIP6/output"])
            .unwrap();
        db
    }

    #[tokio::test]
    async fn select_with_predicates() {
        let db = catalog();
        let q = SelectQuery::new("cmip5", "name")
            .with_predicates(vec![Predicate::new("activity", "CMIP5")]);
        assert_eq!(
            db.execute(&q).await.unwrap(),
            vec!["/CMIP5/output", "/CMIP5/input"]
        );
        assert_eq!(db.executions(), 1);
    }

    #[tokio::test]
    async fn select_distinct_keeps_first_occurrence_order() {
        let db = catalog();
        let q = SelectQuery::new("cmip5", "product").distinct();
        assert_eq!(db.execute(&q).await.unwrap(), vec!["output", "input"]);
    }

    #[tokio::test]
    async fn unknown_column_or_table_is_statement_error() {
        let db = catalog();
        let q = SelectQuery::new("cmip5", "model");
        assert!(matches!(db.execute(&q).await, Err(DbError::Statement(_))));
        let q = SelectQuery::new("other", "name");
        assert!(matches!(db.execute(&q).await, Err(DbError::Statement(_))));
    }

    #[tokio::test]
    async fn unavailable_is_transient() {
        let db = catalog();
        db.set_available(false);
        let err = db.execute(&SelectQuery::new("cmip5", "name")).await.unwrap_err();
        assert!(err.is_transient());
        db.set_available(true);
        assert!(db.execute(&SelectQuery::new("cmip5", "name")).await.is_ok());
    }

    #[tokio::test]
    async fn insert_skips_duplicate_hashes() {
        let db = catalog();
        let records = vec![
            CatalogRecord::from_name(db.schema(), "/CMIP5/output").unwrap(),
            CatalogRecord::from_name(db.schema(), "/NEW/thing").unwrap(),
        ];
        let outcome = db
            .execute_batch(&WriteBatch::insert(db.schema(), records))
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome { affected: 1, skipped: 1 });
        assert_eq!(db.len(), 4);
    }

    #[tokio::test]
    async fn delete_by_name() {
        let db = catalog();
        let batch = WriteBatch::delete_by_name(
            db.schema(),
            vec!["/CMIP5/input".into(), "/missing/name".into()],
        );
        let outcome = db.execute_batch(&batch).await.unwrap();
        assert_eq!(outcome.affected, 1);
        assert!(!db.contains("/CMIP5/input"));
        assert_eq!(db.len(), 2);
    }

    #[tokio::test]
    async fn malformed_batch_applies_nothing() {
        let db = catalog();
        let good = CatalogRecord::from_name(db.schema(), "/A/B").unwrap();
        let mut bad = good.clone();
        bad.fields.pop();
        let batch = WriteBatch::insert(db.schema(), vec![good, bad]);
        assert!(db.execute_batch(&batch).await.is_err());
        assert_eq!(db.len(), 3);
    }
}
