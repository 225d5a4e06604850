//! Shared adapter context and the adapter contract.

use crate::cache::ResponseCache;
use crate::config::CatalogConfig;
use crate::segment::build_segments;
use crate::transport::Face;
use crate::version::VersionTracker;
use crate::worker::WorkerPool;
use atmos_ndn::{Component, ContentType, Data, Interest, Name, Signer, SigningIdentity};
use atmos_store::CatalogDatabase;
use std::sync::Arc;

/// Final name component of every acknowledgment.
pub const ACK_MARKER: &str = "OK";

/// A protocol engine mounted under the catalog prefix.
///
/// Each adapter claims one or more filter components; the router registers
/// `<prefix>/<filter>` for each and hands over matching Interests.
pub trait CatalogAdapter: Send + Sync {
    /// Filter components this adapter serves.
    fn filters(&self) -> &'static [&'static str];

    /// Handles an Interest routed through `filter`.
    ///
    /// Runs on the dispatch loop and must not block; expensive work goes to
    /// the worker pool.
    fn on_interest(self: Arc<Self>, filter: &str, interest: Interest);
}

/// Everything an adapter needs to answer requests.
pub struct AdapterContext {
    /// Network face.
    pub face: Arc<dyn Face>,
    /// Reply signer.
    pub signer: Arc<dyn Signer>,
    /// Identity replies are signed with.
    pub identity: SigningIdentity,
    /// Reply segment store.
    pub cache: Arc<ResponseCache>,
    /// Catalog table.
    pub database: Arc<dyn CatalogDatabase>,
    /// Immutable configuration.
    pub config: Arc<CatalogConfig>,
    /// Worker pool for off-loop work.
    pub workers: WorkerPool,
    /// Version token source.
    pub version: Arc<VersionTracker>,
}

impl AdapterContext {
    /// Returns the catalog prefix.
    pub fn prefix(&self) -> &Name {
        &self.config.prefix
    }

    /// Returns `<prefix>/<kind>`.
    pub fn namespace(&self, kind: &str) -> Name {
        self.config.prefix.clone().append(kind)
    }

    /// Signs `data` with the configured identity.
    pub fn sign(&self, mut data: Data) -> Arc<Data> {
        self.signer.sign(&mut data, &self.identity);
        Arc::new(data)
    }

    /// Signs and sends `data`.
    pub fn reply(&self, data: Data) -> Arc<Data> {
        let data = self.sign(data);
        self.face.put(Arc::clone(&data));
        data
    }

    /// Builds the acknowledgment for `interest`:
    /// `<interest>/<version>/<catalog-id>/OK` with empty content.
    pub fn ack(&self, interest: &Interest, version: &Component) -> Arc<Data> {
        let name = interest
            .name()
            .clone()
            .append(version.clone())
            .append(self.config.catalog_id.as_str())
            .append(ACK_MARKER);
        self.sign(Data::new(name).with_freshness(self.config.limits.freshness()))
    }

    /// Signs and caches a terminal NACK at segment 0 of `prefix`.
    pub fn publish_nack(&self, prefix: &Name) -> Arc<Data> {
        let name = prefix.clone().append_segment(0);
        let data = self.sign(
            Data::new(name)
                .with_content_type(ContentType::Nack)
                .with_freshness(self.config.limits.freshness())
                .with_final_block_id(Component::segment(0)),
        );
        self.cache.insert(Arc::clone(&data));
        data
    }

    /// Frames, signs and caches `payloads` as segments of `prefix`.
    pub fn publish_segments(&self, prefix: &Name, payloads: Vec<Vec<u8>>) -> Vec<Arc<Data>> {
        build_segments(prefix, payloads, self.config.limits.freshness())
            .into_iter()
            .map(|segment| {
                let data = self.sign(segment);
                self.cache.insert(Arc::clone(&data));
                data
            })
            .collect()
    }
}

impl std::fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("prefix", &self.config.prefix)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
