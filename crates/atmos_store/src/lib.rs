//! # NDN-Atmos Store
//!
//! Database gateway and sync watermark store for the catalog.
//!
//! The catalog never talks to a database engine directly. It builds typed
//! statements ([`SelectQuery`], [`WriteBatch`]) and hands them to a
//! [`CatalogDatabase`]. Statements render themselves to SQL with bound
//! parameters, so one implementation per backend is enough.
//!
//! ## Available Backends
//!
//! - [`MemoryCatalog`] / [`MemoryWatermarkStore`] - For testing
//! - [`MySqlCatalog`] / [`SqlWatermarkStore`] - Pooled MySQL via sqlx
//!
//! ## Example
//!
//! ```rust
//! use atmos_store::{CatalogSchema, SelectQuery, Predicate};
//!
//! let schema = CatalogSchema::new("cmip5", vec!["activity".into(), "product".into()]).unwrap();
//! let query = SelectQuery::new(schema.table(), "name")
//!     .with_predicates(vec![Predicate::new("activity", "X")]);
//! assert_eq!(query.to_string(), "SELECT name FROM cmip5 WHERE activity='X';");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod gateway;
mod memory;
mod mysql;
mod schema;
mod statement;
mod watermark;

pub use error::{DbError, DbResult};
pub use gateway::{BatchOutcome, CatalogDatabase};
pub use memory::MemoryCatalog;
pub use mysql::{MySqlCatalog, MySqlOptions};
pub use schema::{content_hash, is_identifier, CatalogRecord, CatalogSchema, HASH_COLUMN, NAME_COLUMN};
pub use statement::{Predicate, SelectQuery, WriteBatch};
pub use watermark::{MemoryWatermarkStore, SqlWatermarkStore, WatermarkStore};
