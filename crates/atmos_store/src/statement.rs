//! Typed catalog statements.
//!
//! Statements keep values apart from SQL text. [`SelectQuery::to_sql`] and
//! [`WriteBatch::to_sql`] render placeholders for the pool, while `Display`
//! renders quoted literals for logs, diagnostics and the operator CLI.

use crate::error::{DbError, DbResult};
use crate::schema::{is_identifier, CatalogRecord, CatalogSchema, NAME_COLUMN};
use std::fmt;

/// A `column = value` equality predicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Predicate {
    /// Column name.
    pub column: String,
    /// Required value.
    pub value: String,
}

impl Predicate {
    /// Creates a predicate.
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Writes `value` as a single-quoted SQL literal.
fn write_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "'{}'", value.replace('\'', "''"))
}

/// A single-column `SELECT` with ANDed equality predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    table: String,
    column: String,
    distinct: bool,
    predicates: Vec<Predicate>,
}

impl SelectQuery {
    /// Creates `SELECT <column> FROM <table>`.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            distinct: false,
            predicates: Vec::new(),
        }
    }

    /// Selects distinct values only.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Sets the predicates. They are rendered in the given order.
    #[must_use]
    pub fn with_predicates(mut self, predicates: Vec<Predicate>) -> Self {
        self.predicates = predicates;
        self
    }

    /// Returns the table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the selected column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns true for `SELECT DISTINCT`.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Returns the predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Checks that every identifier is safe to splice into SQL.
    pub fn validate(&self) -> DbResult<()> {
        let identifiers = [self.table.as_str(), self.column.as_str()]
            .into_iter()
            .chain(self.predicates.iter().map(|p| p.column.as_str()));
        for ident in identifiers {
            if !is_identifier(ident) {
                return Err(DbError::InvalidIdentifier(ident.to_string()));
            }
        }
        Ok(())
    }

    /// Renders the statement with `?` placeholders.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.column);
        sql.push_str(" FROM ");
        sql.push_str(&self.table);
        for (i, p) in self.predicates.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&p.column);
            sql.push_str(" = ?");
        }
        sql
    }

    /// Returns the values bound to the placeholders, in order.
    pub fn bind_values(&self) -> Vec<&str> {
        self.predicates.iter().map(|p| p.value.as_str()).collect()
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write!(f, "{} FROM {}", self.column, self.table)?;
        for (i, p) in self.predicates.iter().enumerate() {
            f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
            write!(f, "{}=", p.column)?;
            write_literal(f, &p.value)?;
        }
        f.write_str(";")
    }
}

/// A batched write against the catalog table.
///
/// Each batch runs as one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBatch {
    /// Multi-row insert. Rows whose content hash already exists are skipped.
    Insert {
        /// Target table.
        table: String,
        /// Column list, in value order.
        columns: Vec<String>,
        /// Rows to insert.
        records: Vec<CatalogRecord>,
    },
    /// Delete every row whose full name is listed.
    DeleteByName {
        /// Target table.
        table: String,
        /// Full dataset names.
        names: Vec<String>,
    },
}

impl WriteBatch {
    /// Builds an insert batch for `schema`.
    pub fn insert(schema: &CatalogSchema, records: Vec<CatalogRecord>) -> Self {
        WriteBatch::Insert {
            table: schema.table().to_string(),
            columns: schema.columns(),
            records,
        }
    }

    /// Builds a delete-by-name batch for `schema`.
    pub fn delete_by_name(schema: &CatalogSchema, names: Vec<String>) -> Self {
        WriteBatch::DeleteByName {
            table: schema.table().to_string(),
            names,
        }
    }

    /// Returns the number of rows the batch carries.
    pub fn len(&self) -> usize {
        match self {
            WriteBatch::Insert { records, .. } => records.len(),
            WriteBatch::DeleteByName { names, .. } => names.len(),
        }
    }

    /// Returns true if the batch carries no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks identifiers and row widths.
    pub fn validate(&self) -> DbResult<()> {
        match self {
            WriteBatch::Insert {
                table,
                columns,
                records,
            } => {
                if let Some(bad) = std::iter::once(table)
                    .chain(columns)
                    .find(|c| !is_identifier(c))
                {
                    return Err(DbError::InvalidIdentifier(bad.clone()));
                }
                for record in records {
                    let actual = record.fields.len() + 2;
                    if actual != columns.len() {
                        return Err(DbError::ColumnMismatch {
                            expected: columns.len(),
                            actual,
                        });
                    }
                }
                Ok(())
            }
            WriteBatch::DeleteByName { table, .. } => {
                if is_identifier(table) {
                    Ok(())
                } else {
                    Err(DbError::InvalidIdentifier(table.clone()))
                }
            }
        }
    }

    /// Renders the statement with `?` placeholders.
    pub fn to_sql(&self) -> String {
        match self {
            WriteBatch::Insert {
                table,
                columns,
                records,
            } => {
                let row = format!("({})", vec!["?"; columns.len()].join(", "));
                let rows = vec![row.as_str(); records.len()].join(", ");
                format!(
                    "INSERT IGNORE INTO {table} ({}) VALUES {rows}",
                    columns.join(", ")
                )
            }
            WriteBatch::DeleteByName { table, names } => format!(
                "DELETE FROM {table} WHERE {NAME_COLUMN} IN ({})",
                vec!["?"; names.len()].join(", ")
            ),
        }
    }

    /// Returns the values bound to the placeholders, in order.
    pub fn bind_values(&self) -> Vec<&str> {
        match self {
            WriteBatch::Insert { records, .. } => {
                records.iter().flat_map(CatalogRecord::values).collect()
            }
            WriteBatch::DeleteByName { names, .. } => names.iter().map(String::as_str).collect(),
        }
    }

    /// Returns the placeholders each row binds.
    pub fn placeholders_per_row(&self) -> usize {
        match self {
            WriteBatch::Insert { columns, .. } => columns.len().max(1),
            WriteBatch::DeleteByName { .. } => 1,
        }
    }

    /// Splits the batch so that no statement binds more than
    /// `max_placeholders` values. Always returns at least one batch.
    pub fn split(&self, max_placeholders: usize) -> Vec<WriteBatch> {
        let rows = (max_placeholders / self.placeholders_per_row()).max(1);
        match self {
            WriteBatch::Insert {
                table,
                columns,
                records,
            } if records.len() > rows => records
                .chunks(rows)
                .map(|chunk| WriteBatch::Insert {
                    table: table.clone(),
                    columns: columns.clone(),
                    records: chunk.to_vec(),
                })
                .collect(),
            WriteBatch::DeleteByName { table, names } if names.len() > rows => names
                .chunks(rows)
                .map(|chunk| WriteBatch::DeleteByName {
                    table: table.clone(),
                    names: chunk.to_vec(),
                })
                .collect(),
            _ => vec![self.clone()],
        }
    }
}

impl fmt::Display for WriteBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteBatch::Insert {
                table,
                columns,
                records,
            } => {
                write!(f, "INSERT IGNORE INTO {table} ({}) VALUES ", columns.join(", "))?;
                for (i, record) in records.iter().enumerate() {
                    f.write_str(if i == 0 { "(" } else { ", (" })?;
                    for (j, value) in record.values().into_iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write_literal(f, value)?;
                    }
                    f.write_str(")")?;
                }
                f.write_str(";")
            }
            WriteBatch::DeleteByName { table, names } => {
                write!(f, "DELETE FROM {table} WHERE {NAME_COLUMN} IN (")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, name)?;
                }
                f.write_str(");")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CatalogSchema {
        CatalogSchema::new("cmip5", vec!["activity".into(), "product".into()]).unwrap()
    }

    #[test]
    fn select_rendering() {
        let q = SelectQuery::new("cmip5", "name").with_predicates(vec![
            Predicate::new("activity", "X"),
            Predicate::new("product", "Y"),
        ]);
        assert_eq!(
            q.to_string(),
            "SELECT name FROM cmip5 WHERE activity='X' AND product='Y';"
        );
        assert_eq!(
            q.to_sql(),
            "SELECT name FROM cmip5 WHERE activity = ? AND product = ?"
        );
        assert_eq!(q.bind_values(), vec!["X", "Y"]);
    }

    #[test]
    fn distinct_without_where() {
        let q = SelectQuery::new("cmip5", "activity").distinct();
        assert_eq!(q.to_string(), "SELECT DISTINCT activity FROM cmip5;");
        assert!(q.bind_values().is_empty());
    }

    #[test]
    fn literals_are_escaped() {
        let q = SelectQuery::new("t", "name").with_predicates(vec![Predicate::new("a", "it's")]);
        assert_eq!(q.to_string(), "SELECT name FROM t WHERE a='it''s';");
    }

    #[test]
    fn select_validation() {
        assert!(SelectQuery::new("t", "name").validate().is_ok());
        let bad = SelectQuery::new("t", "name").with_predicates(vec![Predicate::new("a=1 OR 1", "x")]);
        assert!(matches!(bad.validate(), Err(DbError::InvalidIdentifier(_))));
    }

    #[test]
    fn insert_batch() {
        let s = schema();
        let records = vec![
            CatalogRecord::from_name(&s, "/A/B").unwrap(),
            CatalogRecord::from_name(&s, "/C/D").unwrap(),
        ];
        let batch = WriteBatch::insert(&s, records);
        assert!(batch.validate().is_ok());
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.to_sql(),
            "INSERT IGNORE INTO cmip5 (sha256, name, activity, product) VALUES (?, ?, ?, ?), (?, ?, ?, ?)"
        );
        let binds = batch.bind_values();
        assert_eq!(binds.len(), 8);
        assert_eq!(binds[1], "/A/B");
        assert_eq!(binds[7], "D");
    }

    #[test]
    fn insert_batch_rejects_wrong_width() {
        let s = schema();
        let mut record = CatalogRecord::from_name(&s, "/A/B").unwrap();
        record.fields.push("extra".into());
        let batch = WriteBatch::insert(&s, vec![record]);
        assert!(matches!(
            batch.validate(),
            Err(DbError::ColumnMismatch {
                expected: 4,
                actual: 5
            })
        ));
    }

    #[test]
    fn delete_batch() {
        let batch = WriteBatch::delete_by_name(&schema(), vec!["/A/B".into(), "/C/D".into()]);
        assert_eq!(batch.to_sql(), "DELETE FROM cmip5 WHERE name IN (?, ?)");
        assert_eq!(batch.to_string(), "DELETE FROM cmip5 WHERE name IN ('/A/B', '/C/D');");
        assert_eq!(batch.bind_values(), vec!["/A/B", "/C/D"]);
    }

    #[test]
    fn large_batches_split_under_placeholder_limit() {
        let s = schema();
        let records: Vec<CatalogRecord> = (0..10)
            .map(|i| CatalogRecord::from_name(&s, &format!("/A/{i}")).unwrap())
            .collect();
        let batch = WriteBatch::insert(&s, records);

        // 4 columns per row, so 9 placeholders fit 2 rows
        let parts = batch.split(9);
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|p| p.bind_values().len() <= 9));
        assert_eq!(parts.iter().map(WriteBatch::len).sum::<usize>(), 10);
        assert_eq!(parts[4].bind_values()[1], "/A/9");

        assert_eq!(batch.split(65_535), vec![batch.clone()]);

        let names: Vec<String> = (0..7).map(|i| format!("/A/{i}")).collect();
        let delete = WriteBatch::delete_by_name(&s, names);
        let parts = delete.split(3);
        assert_eq!(parts.iter().map(WriteBatch::len).collect::<Vec<_>>(), vec![3, 3, 1]);
    }
}
