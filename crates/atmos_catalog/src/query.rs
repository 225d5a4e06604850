//! Query engine.
//!
//! Serves `<prefix>/query/<json>` and `<prefix>/query-results/...`.
//!
//! A query request is answered at once with an acknowledgment naming
//! where the results will appear:
//!
//! ```text
//! <prefix>/query/<json>/<version>/<catalog-id>/OK                  (ack)
//! <prefix>/query-results/<catalog-id>/<json>/<version>/<segment>   (results)
//! ```
//!
//! Compilation, execution and segmentation then run on the worker pool and
//! deliver their output to the response cache. Retrieval Interests under
//! `query-results` are served from the cache only.

use crate::adapter::{AdapterContext, CatalogAdapter};
use crate::compiler::QueryCompiler;
use crate::error::{CatalogResult, CompileError};
use crate::segment::reply_payloads;
use atmos_ndn::{Component, Data, Interest, Name};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Filter component for query requests.
pub const QUERY_FILTER: &str = "query";
/// Filter component for result retrieval.
pub const RESULTS_FILTER: &str = "query-results";

/// Lifecycle of one query request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Not yet seen.
    Idle,
    /// Acknowledgment sent, work queued.
    AckSent,
    /// Backend query running.
    Executing,
    /// Rows being framed into segments.
    Segmenting,
    /// Results cached.
    Done,
    /// Answered from the cache or the active-query map.
    Replayed,
    /// Terminal NACK cached.
    Nacked,
    /// Dropped without a reply (malformed name or backend failure).
    Abandoned,
}

impl QueryState {
    /// Returns true if no further work happens for the request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Done | QueryState::Replayed | QueryState::Nacked | QueryState::Abandoned
        )
    }
}

/// Counters for query handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Query requests received.
    pub received: u64,
    /// Requests answered by replay.
    pub replayed: u64,
    /// Queries executed against the backend.
    pub executed: u64,
    /// Queries answered with a NACK.
    pub nacked: u64,
    /// Queries abandoned after a backend failure.
    pub failed: u64,
}

type ActiveQueries = Arc<Mutex<HashMap<Name, Arc<Data>>>>;

/// Answers catalog queries.
pub struct QueryEngine {
    ctx: Arc<AdapterContext>,
    compiler: QueryCompiler,
    active: ActiveQueries,
    stats: Mutex<QueryStats>,
}

impl QueryEngine {
    /// Creates the engine and hooks active-query invalidation to version
    /// changes.
    pub fn new(ctx: Arc<AdapterContext>) -> CatalogResult<Self> {
        let compiler = QueryCompiler::from_config(&ctx.config)?;
        let active: ActiveQueries = Arc::default();
        let on_change = Arc::clone(&active);
        ctx.version.on_change(move || {
            let mut active = on_change.lock();
            debug!(entries = active.len(), "clearing active queries");
            active.clear();
        });
        Ok(Self {
            ctx,
            compiler,
            active,
            stats: Mutex::new(QueryStats::default()),
        })
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> QueryStats {
        self.stats.lock().clone()
    }

    /// Returns the number of acknowledged, not yet invalidated requests.
    pub fn active_len(&self) -> usize {
        self.active.lock().len()
    }

    /// Handles `<prefix>/query/<json>`.
    ///
    /// Returns [`QueryState::AckSent`] when work was queued.
    pub fn handle_query(self: &Arc<Self>, interest: Interest) -> QueryState {
        let prefix_len = self.ctx.prefix().len();
        if interest.name().len() != prefix_len + 2 {
            debug!(name = %interest.name(), "ignoring query with unexpected shape");
            return QueryState::Abandoned;
        }
        self.stats.lock().received += 1;

        if let Some(data) = self.ctx.cache.find(&interest) {
            self.replay(data);
            return QueryState::Replayed;
        }

        // May run invalidation hooks, so it must not be called under `active`.
        let version = self.ctx.version.current();
        let key = interest.name().clone().append(version.clone());

        let ack = {
            let mut active = self.active.lock();
            if let Some(ack) = active.get(&key) {
                let ack = Arc::clone(ack);
                drop(active);
                self.replay(ack);
                return QueryState::Replayed;
            }
            let ack = self.ctx.ack(&interest, &version);
            active.insert(key.clone(), Arc::clone(&ack));
            ack
        };
        self.ctx.face.put(ack);

        let query = interest.name().get(prefix_len + 1).cloned().unwrap_or_default();
        let results = self.result_prefix(&query, &version);
        debug!(name = %interest.name(), results = %results, "query acknowledged");

        let engine = Arc::clone(self);
        self.ctx.workers.spawn(async move {
            engine.execute(&query, &results, &key).await;
        });
        QueryState::AckSent
    }

    /// Handles a retrieval Interest under `query-results`.
    pub fn handle_results(&self, interest: &Interest) -> QueryState {
        self.ctx.version.current();
        match self.ctx.cache.find(interest) {
            Some(data) => {
                self.ctx.face.put(data);
                QueryState::Replayed
            }
            None => {
                debug!(name = %interest.name(), "no cached results yet");
                QueryState::Idle
            }
        }
    }

    /// Returns `<prefix>/query-results/<catalog-id>/<query>/<version>`.
    pub fn result_prefix(&self, query: &Component, version: &Component) -> Name {
        self.ctx
            .namespace(RESULTS_FILTER)
            .append(self.ctx.config.catalog_id.as_str())
            .append(query.clone())
            .append(version.clone())
    }

    /// Compiles, executes and segments one query. Runs on a worker.
    #[instrument(skip_all, fields(results = %results))]
    pub async fn execute(&self, query: &Component, results: &Name, key: &Name) -> QueryState {
        let compiled = query
            .as_str()
            .ok_or_else(|| CompileError::Json("query is not valid UTF-8".into()))
            .and_then(|text| self.compiler.compile(text));
        let compiled = match compiled {
            Ok(compiled) => compiled,
            Err(e) => {
                info!(results = %results, error = %e, "rejecting query");
                self.ctx.publish_nack(results);
                self.stats.lock().nacked += 1;
                return QueryState::Nacked;
            }
        };

        debug!(query = %compiled.query, "executing");
        let rows = match self.ctx.database.execute(&compiled.query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(query = %compiled.query, error = %e, "query failed; leaving request unanswered");
                self.active.lock().remove(key);
                self.stats.lock().failed += 1;
                return QueryState::Abandoned;
            }
        };
        self.stats.lock().executed += 1;

        let payloads = reply_payloads(
            &rows,
            self.ctx.config.limits.payload_limit,
            compiled.reply_kind(),
        );
        let segments = self.ctx.publish_segments(results, payloads);
        debug!(results = %results, rows = rows.len(), segments = segments.len(), "query answered");
        QueryState::Done
    }

    fn replay(&self, data: Arc<Data>) {
        debug!(name = %data.name(), "replaying");
        self.stats.lock().replayed += 1;
        self.ctx.face.put(data);
    }
}

impl CatalogAdapter for QueryEngine {
    fn filters(&self) -> &'static [&'static str] {
        &[QUERY_FILTER, RESULTS_FILTER]
    }

    fn on_interest(self: Arc<Self>, filter: &str, interest: Interest) {
        match filter {
            QUERY_FILTER => {
                self.handle_query(interest);
            }
            RESULTS_FILTER => {
                self.handle_results(&interest);
            }
            other => debug!(filter = other, "query engine ignoring filter"),
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("active", &self.active_len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
