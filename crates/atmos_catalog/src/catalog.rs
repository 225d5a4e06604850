//! The catalog service facade.

use crate::adapter::AdapterContext;
use crate::cache::ResponseCache;
use crate::config::CatalogConfig;
use crate::error::CatalogResult;
use crate::menu::FilterMenu;
use crate::publish::PublishEngine;
use crate::query::QueryEngine;
use crate::router::RequestRouter;
use crate::transport::{Face, MissingDataInfo, SyncSocket};
use crate::version::VersionTracker;
use crate::worker::WorkerPool;
use atmos_ndn::{DigestSha256Signer, Interest, Signer};
use atmos_store::{CatalogDatabase, MySqlCatalog, SqlWatermarkStore, WatermarkStore};
use std::sync::Arc;
use tracing::info;

/// External collaborators the catalog runs against.
pub struct Services {
    /// Network face.
    pub face: Arc<dyn Face>,
    /// Sync group socket.
    pub sync: Arc<dyn SyncSocket>,
    /// Catalog table gateway.
    pub database: Arc<dyn CatalogDatabase>,
    /// Sync watermark store.
    pub watermarks: Arc<dyn WatermarkStore>,
    /// Reply signer.
    pub signer: Arc<dyn Signer>,
}

impl Services {
    /// Bundles collaborators with the DigestSha256 signer.
    pub fn new(
        face: Arc<dyn Face>,
        sync: Arc<dyn SyncSocket>,
        database: Arc<dyn CatalogDatabase>,
        watermarks: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            face,
            sync,
            database,
            watermarks,
            signer: Arc::new(DigestSha256Signer::new()),
        }
    }

    /// Replaces the signer.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    /// Connects to MySQL with the configured pool and creates the catalog
    /// and watermark tables if missing.
    pub async fn connect_mysql(
        config: &CatalogConfig,
        face: Arc<dyn Face>,
        sync: Arc<dyn SyncSocket>,
    ) -> CatalogResult<Self> {
        let catalog = MySqlCatalog::connect(&config.database.to_mysql_options(), config.schema()?).await?;
        catalog.ensure_schema().await?;
        let watermarks = SqlWatermarkStore::new(catalog.pool());
        watermarks.ensure_table().await?;
        info!(server = %config.database.db_server, table = %config.database.table, "database connected");
        Ok(Self::new(face, sync, Arc::new(catalog), Arc::new(watermarks)))
    }
}

/// A running catalog: query, filter menu and publish engines behind one
/// router.
pub struct Catalog {
    ctx: Arc<AdapterContext>,
    router: RequestRouter,
    query: Arc<QueryEngine>,
    menu: Arc<FilterMenu>,
    publish: Arc<PublishEngine>,
}

impl Catalog {
    /// Wires the engines. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no runtime is
    /// available.
    pub fn new(config: CatalogConfig, services: Services) -> CatalogResult<Self> {
        config.validate()?;
        let workers = WorkerPool::current(config.limits.workers)?;
        let ctx = Arc::new(AdapterContext {
            face: Arc::clone(&services.face),
            signer: services.signer,
            identity: config.signing_identity(),
            cache: Arc::new(ResponseCache::new(config.limits.cache_capacity_bytes)),
            database: services.database,
            workers,
            version: Arc::new(VersionTracker::new(Arc::clone(&services.sync))),
            config: Arc::new(config),
        });

        let query = Arc::new(QueryEngine::new(Arc::clone(&ctx))?);
        let menu = Arc::new(FilterMenu::new(Arc::clone(&ctx)));
        let publish = Arc::new(PublishEngine::new(
            Arc::clone(&ctx),
            services.sync,
            services.watermarks,
        ));

        let mut router = RequestRouter::new(services.face, ctx.prefix().clone());
        router.mount(query.clone());
        router.mount(menu.clone());
        router.mount(publish.clone());

        Ok(Self {
            ctx,
            router,
            query,
            menu,
            publish,
        })
    }

    /// Registers every filter with the forwarder.
    pub fn start(&self) -> CatalogResult<()> {
        self.router.register()?;
        info!(prefix = %self.ctx.prefix(), "catalog serving");
        Ok(())
    }

    /// Dispatches an incoming Interest. Never blocks on request work.
    pub fn on_interest(&self, interest: Interest) -> bool {
        self.router.dispatch(interest)
    }

    /// Queues sync-layer notifications.
    pub fn on_sync_update(&self, updates: Vec<MissingDataInfo>) {
        self.publish.on_sync_update(updates);
    }

    /// Waits until all queued request work has finished.
    pub async fn idle(&self) {
        self.ctx.workers.idle().await;
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CatalogConfig {
        &self.ctx.config
    }

    /// Returns the response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.ctx.cache
    }

    /// Returns the query engine.
    pub fn query_engine(&self) -> &Arc<QueryEngine> {
        &self.query
    }

    /// Returns the filter menu.
    pub fn filter_menu(&self) -> &Arc<FilterMenu> {
        &self.menu
    }

    /// Returns the publish engine.
    pub fn publish_engine(&self) -> &Arc<PublishEngine> {
        &self.publish
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("router", &self.router)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
