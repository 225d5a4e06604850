//! Catalog configuration.
//!
//! The configuration is read once, validated once and then shared as an
//! immutable `Arc<CatalogConfig>` by every engine.
//!
//! ```json
//! {
//!   "prefix": "/catalog/myUniqueName",
//!   "filterCategoryNames": ["activity", "product", "model"],
//!   "database": {
//!     "dbServer": "localhost", "dbName": "atmos",
//!     "dbUser": "atmos", "dbPasswd": "secret"
//!   },
//!   "sync": { "prefix": "/ndn-atmos/broadcast/chronosync" }
//! }
//! ```

use crate::error::ConfigError;
use atmos_ndn::{Name, SigningIdentity};
use atmos_store::{is_identifier, CatalogSchema, MySqlOptions};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Catalog id used when none is configured.
pub const DEFAULT_CATALOG_ID: &str = "catalogIdPlaceHolder";
/// Sync group prefix used when none is configured.
pub const DEFAULT_SYNC_PREFIX: &str = "/ndn-atmos/broadcast/chronosync";

fn de_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Name, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
}

fn de_opt_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Name>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(text) if !text.is_empty() => text.parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

fn default_catalog_id() -> String {
    DEFAULT_CATALOG_ID.to_string()
}

/// Top-level catalog configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    /// Catalog prefix every filter is registered under.
    #[serde(default, deserialize_with = "de_name")]
    pub prefix: Name,
    /// Catalog instance id, part of every result name.
    #[serde(default = "default_catalog_id")]
    pub catalog_id: String,
    /// Identity used to sign replies. `None` selects the default identity.
    #[serde(default, deserialize_with = "de_opt_name")]
    pub signing_id: Option<Name>,
    /// Columns offered in the filter menu, in menu order.
    #[serde(default)]
    pub filter_category_names: Vec<String>,
    /// Ordered name fields used by autocomplete, prefix search and
    /// publish decomposition. Empty means `filter_category_names`.
    #[serde(default)]
    pub name_fields: Vec<String>,
    /// Database connection.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Sync group settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Tunable limits.
    #[serde(default)]
    pub limits: Limits,
}

/// Database connection options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    /// `host` or `host:port`.
    pub db_server: String,
    /// Database name.
    pub db_name: String,
    /// User name.
    pub db_user: String,
    /// Password.
    pub db_passwd: String,
    /// Catalog table.
    pub table: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Connection acquire timeout in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Creates database options with default table and pool settings.
    pub fn new(
        server: impl Into<String>,
        name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            db_server: server.into(),
            db_name: name.into(),
            db_user: user.into(),
            db_passwd: password.into(),
            ..Self::default()
        }
    }

    /// Sets the catalog table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Converts to pool options.
    pub fn to_mysql_options(&self) -> MySqlOptions {
        MySqlOptions::new(&self.db_server, &self.db_name, &self.db_user, &self.db_passwd)
            .with_pool_size(self.pool_size)
            .with_acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_server: String::new(),
            db_name: String::new(),
            db_user: String::new(),
            db_passwd: String::new(),
            table: "cmip5".to_string(),
            pool_size: 8,
            acquire_timeout_ms: 2000,
        }
    }
}

fn default_sync_prefix() -> Name {
    let components = DEFAULT_SYNC_PREFIX
        .split('/')
        .filter(|c| !c.is_empty())
        .map(Into::into)
        .collect();
    Name::from_components(components)
}

/// Sync group settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Broadcast prefix of the sync group.
    #[serde(default = "default_sync_prefix", deserialize_with = "de_name")]
    pub prefix: Name,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: default_sync_prefix(),
        }
    }
}

/// Tunable limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Limits {
    /// Maximum serialized size of one segment's row array, in bytes.
    pub payload_limit: usize,
    /// Response cache capacity in bytes.
    pub cache_capacity_bytes: usize,
    /// Maximum concurrently running workers.
    pub workers: usize,
    /// Retries after the first attempt of a segment fetch.
    pub fetch_retries: u32,
    /// Lifetime of each fetch Interest, in milliseconds.
    pub fetch_lifetime_ms: u64,
    /// Freshness period of reply segments, in milliseconds.
    pub freshness_ms: u64,
}

impl Limits {
    /// Returns the fetch Interest lifetime.
    pub fn fetch_lifetime(&self) -> Duration {
        Duration::from_millis(self.fetch_lifetime_ms)
    }

    /// Returns the reply freshness period.
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            payload_limit: 7000,
            cache_capacity_bytes: 64 * 1024 * 1024,
            workers: 8,
            fetch_retries: 3,
            fetch_lifetime_ms: 4000,
            freshness_ms: 10_000,
        }
    }
}

impl CatalogConfig {
    /// Creates a configuration with defaults for every optional key.
    pub fn new(prefix: Name, filter_category_names: Vec<String>, database: DatabaseConfig) -> Self {
        Self {
            prefix,
            catalog_id: default_catalog_id(),
            signing_id: None,
            filter_category_names,
            name_fields: Vec::new(),
            database,
            sync: SyncConfig::default(),
            limits: Limits::default(),
        }
    }

    /// Sets the catalog id.
    pub fn with_catalog_id(mut self, id: impl Into<String>) -> Self {
        self.catalog_id = id.into();
        self
    }

    /// Sets the signing identity.
    pub fn with_signing_id(mut self, id: Name) -> Self {
        self.signing_id = Some(id);
        self
    }

    /// Sets the ordered name fields.
    pub fn with_name_fields(mut self, fields: Vec<String>) -> Self {
        self.name_fields = fields;
        self
    }

    /// Sets the sync group prefix.
    pub fn with_sync_prefix(mut self, prefix: Name) -> Self {
        self.sync.prefix = prefix;
        self
    }

    /// Sets the limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks required options and identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::Missing("prefix"));
        }
        if self.catalog_id.is_empty() {
            return Err(ConfigError::Missing("catalogId"));
        }
        if self.filter_category_names.is_empty() {
            return Err(ConfigError::Missing("filterCategoryNames"));
        }
        let db = &self.database;
        for (key, value) in [
            ("database.dbServer", &db.db_server),
            ("database.dbName", &db.db_name),
            ("database.dbUser", &db.db_user),
            ("database.dbPasswd", &db.db_passwd),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }
        let identifiers = std::iter::once(&db.table)
            .chain(&self.filter_category_names)
            .chain(&self.name_fields);
        for ident in identifiers {
            if !is_identifier(ident) {
                return Err(ConfigError::InvalidIdentifier(ident.clone()));
            }
        }
        if self.limits.payload_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "limits.payloadLimit",
                reason: "must be positive".into(),
            });
        }
        if self.limits.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "limits.workers",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Returns the ordered name fields.
    pub fn name_fields(&self) -> &[String] {
        if self.name_fields.is_empty() {
            &self.filter_category_names
        } else {
            &self.name_fields
        }
    }

    /// Returns the catalog table layout.
    pub fn schema(&self) -> Result<CatalogSchema, ConfigError> {
        CatalogSchema::new(&self.database.table, self.name_fields().to_vec()).map_err(|e| {
            match e {
                atmos_store::DbError::InvalidIdentifier(ident) => ConfigError::InvalidIdentifier(ident),
                other => ConfigError::Invalid {
                    key: "nameFields",
                    reason: other.to_string(),
                },
            }
        })
    }

    /// Returns the signing identity.
    pub fn signing_identity(&self) -> SigningIdentity {
        SigningIdentity::from_option(self.signing_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"{
        "prefix": "/test",
        "signingId": "/test/signingId",
        "filterCategoryNames": ["activity", "product"],
        "nameFields": ["activity", "product", "model"],
        "database": {
            "dbServer": "localhost", "dbName": "testdb",
            "dbUser": "testuser", "dbPasswd": "testpwd",
            "poolSize": 4
        },
        "sync": { "prefix": "ndn:/ndn/broadcast1" },
        "limits": { "payloadLimit": 512 }
    }"#;

    #[test]
    fn parse_full_document() {
        let config = CatalogConfig::from_json_str(FULL).unwrap();
        assert_eq!(config.prefix, "/test".parse().unwrap());
        assert_eq!(config.signing_id, Some("/test/signingId".parse().unwrap()));
        assert_eq!(config.sync.prefix, "/ndn/broadcast1".parse().unwrap());
        assert_eq!(config.name_fields(), ["activity", "product", "model"]);
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.database.table, "cmip5");
        assert_eq!(config.limits.payload_limit, 512);
        assert_eq!(config.limits.fetch_retries, 3);
        assert_eq!(config.catalog_id, DEFAULT_CATALOG_ID);
    }

    #[test]
    fn defaults_for_optional_keys() {
        let config = CatalogConfig::from_json_str(
            r#"{"prefix": "/test", "filterCategoryNames": ["activity"],
                "database": {"dbServer": "h", "dbName": "d", "dbUser": "u", "dbPasswd": "p"}}"#,
        )
        .unwrap();
        assert_eq!(config.signing_identity(), SigningIdentity::Default);
        assert_eq!(config.sync.prefix.to_uri(), DEFAULT_SYNC_PREFIX);
        assert_eq!(config.name_fields(), ["activity"]);
        assert_eq!(config.limits, Limits::default());
        assert_eq!(config.limits.freshness(), Duration::from_secs(10));
    }

    #[test]
    fn missing_required_options() {
        let err = CatalogConfig::from_json_str(
            r#"{"prefix": "/test", "database": {"dbServer": "h", "dbName": "d", "dbUser": "u", "dbPasswd": "p"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("filterCategoryNames")));

        let err = CatalogConfig::from_json_str(
            r#"{"prefix": "/test", "filterCategoryNames": ["a"], "database": {"dbServer": "h", "dbName": "d", "dbUser": "u"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("database.dbPasswd")));

        let err = CatalogConfig::from_json_str(r#"{"filterCategoryNames": ["a"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("prefix")));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let config = CatalogConfig::new(
            "/test".parse().unwrap(),
            vec!["activity; DROP TABLE cmip5".into()],
            DatabaseConfig::new("h", "d", "u", "p"),
        );
        assert!(matches!(config.validate(), Err(ConfigError::InvalidIdentifier(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            CatalogConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = CatalogConfig::from_file(file.path()).unwrap();
        assert_eq!(config.filter_category_names.len(), 2);

        let missing = CatalogConfig::from_file("/nonexistent/catalog.json");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
