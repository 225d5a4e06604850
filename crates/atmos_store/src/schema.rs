//! Catalog table layout and record construction.

use crate::error::{DbError, DbResult};
use sha2::{Digest, Sha256};

/// Column holding the content hash (unique dedup key).
pub const HASH_COLUMN: &str = "sha256";
/// Column holding the full dataset name.
pub const NAME_COLUMN: &str = "name";

/// Returns true if `text` is a plain SQL identifier (`[A-Za-z0-9_]+`).
///
/// Identifiers cannot be bound as parameters, so every table and column
/// name is checked before it is spliced into SQL text.
pub fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Content hash of a dataset name: lower-case hex SHA-256 of the name string.
///
/// This is a primary/dedup key only, compatible with rows written by the
/// legacy insertion tool. It makes no integrity claim about dataset content.
pub fn content_hash(name: &str) -> String {
    Sha256::digest(name.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Layout of the catalog table: two fixed columns plus the configured
/// classification columns, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSchema {
    table: String,
    name_fields: Vec<String>,
}

impl CatalogSchema {
    /// Creates a schema, validating every identifier.
    pub fn new(table: impl Into<String>, name_fields: Vec<String>) -> DbResult<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(DbError::InvalidIdentifier(table));
        }
        if let Some(bad) = name_fields.iter().find(|f| !is_identifier(f)) {
            return Err(DbError::InvalidIdentifier(bad.clone()));
        }
        Ok(Self { table, name_fields })
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the classification columns.
    pub fn name_fields(&self) -> &[String] {
        &self.name_fields
    }

    /// Returns every column in insertion order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.name_fields.len() + 2);
        columns.push(HASH_COLUMN.to_string());
        columns.push(NAME_COLUMN.to_string());
        columns.extend(self.name_fields.iter().cloned());
        columns
    }

    /// Returns the DDL that creates the table if it does not exist.
    pub fn create_table_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id INT AUTO_INCREMENT NOT NULL, \
             {HASH_COLUMN} VARCHAR(64) UNIQUE NOT NULL, {NAME_COLUMN} VARCHAR(1000) NOT NULL",
            self.table
        );
        for field in &self.name_fields {
            sql.push_str(&format!(", {field} VARCHAR(100) NOT NULL"));
        }
        sql.push_str(", PRIMARY KEY (id)) ENGINE=InnoDB");
        sql
    }
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Content hash of the name.
    pub content_hash: String,
    /// Full hierarchical dataset name.
    pub name: String,
    /// One value per classification column.
    pub fields: Vec<String>,
}

impl CatalogRecord {
    /// Decomposes a dataset name into a record.
    ///
    /// The name's non-empty `/`-separated components map positionally to the
    /// schema's classification columns; any other count is rejected.
    pub fn from_name(schema: &CatalogSchema, name: &str) -> DbResult<Self> {
        let fields: Vec<String> = name
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if fields.len() != schema.name_fields.len() {
            return Err(DbError::ColumnMismatch {
                expected: schema.name_fields.len(),
                actual: fields.len(),
            });
        }
        Ok(Self {
            content_hash: content_hash(name),
            name: name.to_string(),
            fields,
        })
    }

    /// Returns every value in table column order.
    pub fn values(&self) -> Vec<&str> {
        let mut values = Vec::with_capacity(self.fields.len() + 2);
        values.push(self.content_hash.as_str());
        values.push(self.name.as_str());
        values.extend(self.fields.iter().map(String::as_str));
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CatalogSchema {
        CatalogSchema::new(
            "cmip5",
            vec!["activity".into(), "product".into(), "model".into()],
        )
        .unwrap()
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("modeling_realm"));
        assert!(is_identifier("cmip5"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("name; DROP TABLE"));
        assert!(!is_identifier("a`b"));
        assert!(CatalogSchema::new("bad table", vec![]).is_err());
        assert!(CatalogSchema::new("t", vec!["ok".into(), "no-dash".into()]).is_err());
    }

    #[test]
    fn hash_is_sha256_hex() {
        let h = content_hash("/CMIP5/output");
        assert_eq!(h.len(), 64);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(h, content_hash("/CMIP5/output"));
        assert_ne!(h, content_hash("/CMIP5/output2"));
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn record_from_name() {
        let rec = CatalogRecord::from_name(&schema(), "/CMIP5/output/HadCM3").unwrap();
        assert_eq!(rec.fields, vec!["CMIP5", "output", "HadCM3"]);
        assert_eq!(rec.values().len(), 5);
        assert_eq!(rec.values()[1], "/CMIP5/output/HadCM3");
    }

    #[test]
    fn record_wrong_component_count() {
        let err = CatalogRecord::from_name(&schema(), "/CMIP5/output").unwrap_err();
        assert!(matches!(
            err,
            DbError::ColumnMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(CatalogRecord::from_name(&schema(), "/a/b/c/d").is_err());
    }

    #[test]
    fn columns_and_ddl() {
        let s = schema();
        assert_eq!(s.columns(), vec!["sha256", "name", "activity", "product", "model"]);
        let ddl = s.create_table_sql();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS cmip5"));
        assert!(ddl.contains("sha256 VARCHAR(64) UNIQUE NOT NULL"));
        assert!(ddl.contains("model VARCHAR(100) NOT NULL"));
    }
}
