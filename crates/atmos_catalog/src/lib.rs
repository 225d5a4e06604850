//! # NDN-Atmos Catalog
//!
//! Query and publish protocol engines for a named-data dataset catalog.
//!
//! This crate provides:
//! - Query compilation (filter, autocomplete, prefix search)
//! - Acknowledge-then-segment query answering with replay of duplicates
//! - The filter menu served to browsing clients
//! - Publication fetch, trust validation and apply
//! - Sync-group update consumption with per-session watermarks
//! - A byte-bounded LRU response cache
//!
//! ## Architecture
//!
//! A [`RequestRouter`] dispatches each Interest by the component after the
//! catalog prefix:
//!
//! | Component | Adapter |
//! |---|---|
//! | `query`, `query-results` | [`QueryEngine`] |
//! | `filters-initialization` | [`FilterMenu`] |
//! | `publish` | [`PublishEngine`] |
//!
//! Dispatch never blocks. Compilation, database work, segmentation and
//! signing run on a bounded [`WorkerPool`], and their output reaches
//! requesters only through the [`ResponseCache`].
//!
//! ## Key Invariants
//!
//! - Equal predicate sets compile to identical statements
//! - A request name is executed at most once per catalog version
//! - Every reply has exactly one final segment
//! - A publisher only changes names under its own namespace
//! - Sync watermarks never move backwards
//! - No single request can terminate the process

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod cache;
mod catalog;
mod compiler;
mod config;
mod error;
mod menu;
mod publish;
mod query;
mod router;
mod segment;
mod transport;
mod version;
mod worker;

#[cfg(test)]
mod fixture;

pub use adapter::{AdapterContext, CatalogAdapter, ACK_MARKER};
pub use cache::ResponseCache;
pub use catalog::{Catalog, Services};
pub use compiler::{
    Autocompletion, CompiledQuery, QueryCompiler, QueryShape, AUTOCOMPLETE_KEY, PREFIX_SEARCH_KEY,
};
pub use config::{
    CatalogConfig, DatabaseConfig, Limits, SyncConfig, DEFAULT_CATALOG_ID, DEFAULT_SYNC_PREFIX,
};
pub use error::{
    CatalogError, CatalogResult, CompileError, ConfigError, FetchError, ValidationError,
};
pub use menu::{FilterMenu, MENU_FILTER};
pub use publish::{
    publisher_prefix, validate_publication, ApplyOutcome, PublicationChanges, PublishEngine,
    PublishState, PUBLISH_FILTER,
};
pub use query::{QueryEngine, QueryState, QueryStats, QUERY_FILTER, RESULTS_FILTER};
pub use router::RequestRouter;
pub use segment::{
    build_segments, chunk_payload, plan_segments, reply_payload, reply_payloads, ReplyKind,
};
pub use transport::{Face, MissingDataInfo, MockFace, MockSyncSocket, SyncSocket};
pub use version::{VersionTracker, INITIAL_VERSION};
pub use worker::WorkerPool;
