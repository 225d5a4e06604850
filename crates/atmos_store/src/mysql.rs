//! MySQL catalog backend.

use crate::error::{DbError, DbResult};
use crate::gateway::{BatchOutcome, CatalogDatabase};
use crate::schema::CatalogSchema;
use crate::statement::{SelectQuery, WriteBatch};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_PORT: u16 = 3306;

/// Most placeholders MySQL accepts in one prepared statement.
const MAX_PLACEHOLDERS: usize = 65_535;

/// Connection parameters for [`MySqlCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlOptions {
    /// Server address, `host` or `host:port`.
    pub server: String,
    /// Database (schema) name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// How long a request waits for a pooled connection.
    pub acquire_timeout: Duration,
}

impl MySqlOptions {
    /// Creates options with a pool of 8 and a 2 s acquire timeout.
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            pool_size: 8,
            acquire_timeout: Duration::from_secs(2),
        }
    }

    /// Sets the pool size.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the acquire timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn host_and_port(&self) -> DbResult<(&str, u16)> {
        match self.server.rsplit_once(':') {
            Some((host, port)) => port
                .parse()
                .map(|port| (host, port))
                .map_err(|_| DbError::Unavailable(format!("bad server address {}", self.server))),
            None => Ok((self.server.as_str(), DEFAULT_PORT)),
        }
    }

    fn connect_options(&self) -> DbResult<MySqlConnectOptions> {
        let (host, port) = self.host_and_port()?;
        Ok(MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database))
    }

    fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.pool_size.max(1))
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Duration::from_secs(300))
    }
}

/// Catalog table backed by a pooled MySQL connection.
///
/// Pool exhaustion surfaces after `acquire_timeout` as
/// [`DbError::Unavailable`]; requests never block indefinitely.
#[derive(Debug, Clone)]
pub struct MySqlCatalog {
    pool: MySqlPool,
    schema: CatalogSchema,
}

impl MySqlCatalog {
    /// Connects eagerly, failing if the server is unreachable.
    pub async fn connect(options: &MySqlOptions, schema: CatalogSchema) -> DbResult<Self> {
        let pool = options
            .pool_options()
            .connect_with(options.connect_options()?)
            .await?;
        info!(server = %options.server, database = %options.database, "connected to catalog database");
        Ok(Self { pool, schema })
    }

    /// Creates the pool without connecting; connections open on first use.
    pub fn connect_lazy(options: &MySqlOptions, schema: CatalogSchema) -> DbResult<Self> {
        let pool = options
            .pool_options()
            .connect_lazy_with(options.connect_options()?);
        Ok(Self { pool, schema })
    }

    /// Creates a catalog over an existing pool.
    pub fn from_pool(pool: MySqlPool, schema: CatalogSchema) -> Self {
        Self { pool, schema }
    }

    /// Returns a clone of the pool, for sharing with the watermark store.
    pub fn pool(&self) -> MySqlPool {
        self.pool.clone()
    }

    /// Returns the schema.
    pub fn schema(&self) -> &CatalogSchema {
        &self.schema
    }

    /// Creates the catalog table if it does not exist.
    pub async fn ensure_schema(&self) -> DbResult<()> {
        sqlx::query(&self.schema.create_table_sql())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogDatabase for MySqlCatalog {
    async fn execute(&self, query: &SelectQuery) -> DbResult<Vec<String>> {
        query.validate()?;
        let sql = query.to_sql();
        debug!(%sql, "executing select");

        let mut statement = sqlx::query(&sql);
        for value in query.bind_values() {
            statement = statement.bind(value);
        }
        let rows = statement.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(DbError::from))
            .collect()
    }

    async fn execute_batch(&self, batch: &WriteBatch) -> DbResult<BatchOutcome> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let parts = batch.split(MAX_PLACEHOLDERS);
        debug!(rows = batch.len(), statements = parts.len(), "executing batch");

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for part in &parts {
            let sql = part.to_sql();
            let mut statement = sqlx::query(&sql);
            for value in part.bind_values() {
                statement = statement.bind(value);
            }
            affected += statement.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        let skipped = match batch {
            WriteBatch::Insert { records, .. } => (records.len() as u64).saturating_sub(affected),
            WriteBatch::DeleteByName { .. } => 0,
        };
        Ok(BatchOutcome { affected, skipped })
    }
}
