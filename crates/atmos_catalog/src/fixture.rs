//! Shared wiring for unit tests.

use crate::adapter::AdapterContext;
use crate::cache::ResponseCache;
use crate::config::{CatalogConfig, DatabaseConfig};
use crate::transport::{MockFace, MockSyncSocket};
use crate::version::VersionTracker;
use crate::worker::WorkerPool;
use atmos_ndn::{DigestSha256Signer, Name};
use atmos_store::MemoryCatalog;
use std::sync::Arc;

pub(crate) const FIELDS: [&str; 10] = [
    "activity",
    "product",
    "organization",
    "model",
    "experiment",
    "frequency",
    "modeling_realm",
    "variable_name",
    "ensemble",
    "time",
];

pub(crate) fn name(uri: &str) -> Name {
    uri.parse().unwrap()
}

pub(crate) fn config() -> CatalogConfig {
    CatalogConfig::new(
        name("/catalog/myUniqueName"),
        vec!["activity".into(), "product".into()],
        DatabaseConfig::new("localhost", "testdb", "testuser", "testpwd"),
    )
    .with_name_fields(FIELDS.iter().map(|s| s.to_string()).collect())
}

pub(crate) struct Fixture {
    pub face: Arc<MockFace>,
    pub sync: Arc<MockSyncSocket>,
    pub db: Arc<MemoryCatalog>,
    pub ctx: Arc<AdapterContext>,
}

impl Fixture {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: CatalogConfig) -> Self {
        let face = Arc::new(MockFace::new());
        let sync = Arc::new(MockSyncSocket::new());
        let db = Arc::new(MemoryCatalog::new(config.schema().unwrap()));
        let ctx = Arc::new(AdapterContext {
            face: face.clone(),
            signer: Arc::new(DigestSha256Signer::new()),
            identity: config.signing_identity(),
            cache: Arc::new(ResponseCache::new(config.limits.cache_capacity_bytes)),
            database: db.clone(),
            workers: WorkerPool::current(config.limits.workers).unwrap(),
            version: Arc::new(VersionTracker::new(sync.clone())),
            config: Arc::new(config),
        });
        Self { face, sync, db, ctx }
    }
}
