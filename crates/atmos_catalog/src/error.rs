//! Error types for the catalog engines.

use atmos_ndn::{Name, NameError};
use atmos_store::DbError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Top-level catalog errors.
///
/// Only [`CatalogError::Config`] and [`CatalogError::Registration`] are
/// fatal, and only at startup. Everything else is logged by the request
/// path that produced it.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Prefix registration was refused by the forwarder.
    #[error("failed to register prefix {prefix}: {reason}")]
    Registration {
        /// Prefix that could not be registered.
        prefix: Name,
        /// Reason reported by the face.
        reason: String,
    },

    /// Database gateway failure.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// Query could not be compiled.
    #[error("query error: {0}")]
    Compile(#[from] CompileError),

    /// Publication content was rejected.
    #[error("publication rejected: {0}")]
    Validation(#[from] ValidationError),

    /// A remote fetch failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// No async runtime was available to run workers on.
    #[error("no async runtime: {0}")]
    Runtime(String),
}

/// Configuration errors. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON or has the wrong shape.
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required option is absent or empty.
    #[error("missing required option {0}")]
    Missing(&'static str),

    /// A column or table name is not a plain identifier.
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    /// A name option could not be parsed.
    #[error("invalid name in {key}: {source}")]
    InvalidName {
        /// Option key.
        key: &'static str,
        /// Parse failure.
        #[source]
        source: NameError,
    },

    /// Any other out-of-range value.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Option key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Query compilation failures. Answered with a NACK.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The query text is not valid JSON.
    #[error("query is not valid JSON: {0}")]
    Json(String),

    /// The query is not a JSON object.
    #[error("query is not a JSON object")]
    NotAnObject,

    /// Both `?` and `??` were given.
    #[error("autocomplete and prefix search are mutually exclusive")]
    ConflictingShapes,

    /// A value is null, an array or an object.
    #[error("value of {0:?} is not a scalar")]
    InvalidValue(String),

    /// A filter key is not a catalog column.
    #[error("unknown column {0:?}")]
    UnknownColumn(String),

    /// A filter query carried no predicates.
    #[error("no predicates")]
    NoPredicates,

    /// An autocomplete or prefix path is malformed.
    #[error("malformed path {0:?}")]
    MalformedPath(String),

    /// A path has more components than there are name fields.
    #[error("path has {typed} components, catalog has {columns} name fields")]
    TooManyComponents {
        /// Components in the path.
        typed: usize,
        /// Configured name fields.
        columns: usize,
    },
}

/// Publication validation failures. The whole segment is dropped.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Content is not UTF-8 JSON of the expected shape.
    #[error("malformed publication: {0}")]
    Malformed(String),

    /// An entry falls outside the publisher's namespace.
    #[error("{entry} is outside publisher prefix {prefix}")]
    OutsidePrefix {
        /// Offending add/remove entry.
        entry: String,
        /// Publisher prefix.
        prefix: Name,
    },

    /// An added name does not decompose into the configured fields.
    #[error("cannot decompose {name}: {source}")]
    Decomposition {
        /// Offending name.
        name: String,
        /// Decomposition failure.
        #[source]
        source: DbError,
    },
}

/// Remote fetch failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No Data arrived within the Interest lifetime.
    #[error("timed out fetching {0}")]
    Timeout(Name),

    /// The network answered with a NACK.
    #[error("nack for {0}")]
    Nack(Name),

    /// The sync layer's validator rejected the Data.
    #[error("validation failed for {0}")]
    ValidationFailed(Name),
}

impl FetchError {
    /// Returns true if retrying the same fetch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_retry_classification() {
        let name: Name = "/pub/data".parse().unwrap();
        assert!(FetchError::Timeout(name.clone()).is_retryable());
        assert!(!FetchError::Nack(name.clone()).is_retryable());
        assert!(!FetchError::ValidationFailed(name).is_retryable());
    }

    #[test]
    fn error_conversion() {
        let err: CatalogError = CompileError::NoPredicates.into();
        assert!(matches!(err, CatalogError::Compile(CompileError::NoPredicates)));
        assert_eq!(err.to_string(), "query error: no predicates");

        let err: CatalogError = DbError::Unavailable("pool".into()).into();
        assert!(matches!(err, CatalogError::Database(ref e) if e.is_transient()));
    }
}
