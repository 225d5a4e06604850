//! Publish engine.
//!
//! Two paths change the catalog table:
//!
//! - **Publish intents.** `<prefix>/publish/<data-name>` is acknowledged at
//!   once; the engine then fetches `<data-name>/<segment>` one segment at a
//!   time, validates and applies each, and republishes the raw payload to
//!   the sync group.
//! - **Sync updates.** The sync layer reports missing `(session, seq)`
//!   ranges from other replicas; only sequence numbers above the stored
//!   watermark are fetched and applied.
//!
//! A publisher may only add or remove names under its own namespace, the
//! parent of the Data name that carried the changes.

use crate::adapter::{AdapterContext, CatalogAdapter, ACK_MARKER};
use crate::error::{CatalogError, CatalogResult, FetchError, ValidationError};
use crate::transport::{MissingDataInfo, SyncSocket};
use atmos_ndn::{Data, Interest, Name};
use atmos_store::{CatalogRecord, DbError, WatermarkStore, WriteBatch};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Filter component for publish intents.
pub const PUBLISH_FILTER: &str = "publish";

/// Lifecycle of one published segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    /// Intent acknowledged.
    Acked,
    /// Waiting for a content segment.
    FetchingSegments,
    /// Checking the segment against the publisher's namespace.
    Validating,
    /// Running the add and remove batches.
    Applying,
    /// Raw payload handed to the sync group.
    PublishedToSync,
    /// Last segment processed.
    Done,
    /// Abandoned after a fetch, validation or backend failure.
    Failed,
}

/// Add and remove lists carried by one publication segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationChanges {
    /// Names to catalog.
    pub add: Vec<String>,
    /// Names to drop from the catalog.
    pub remove: Vec<String>,
}

impl PublicationChanges {
    /// Parses `{"add": [...], "remove": [...]}`. A missing list is empty.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::Malformed("content is not a JSON object".into()))?;
        Ok(Self {
            add: string_list(object.get("add"), "add")?,
            remove: string_list(object.get("remove"), "remove")?,
        })
    }

    /// Returns true if nothing is added or removed.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Checks that every entry lies under `prefix`.
    pub fn check_prefix(&self, prefix: &Name) -> Result<(), ValidationError> {
        for entry in self.add.iter().chain(&self.remove) {
            let name = Name::from_uri(entry)
                .map_err(|e| ValidationError::Malformed(format!("{entry}: {e}")))?;
            if !prefix.is_prefix_of(&name) {
                return Err(ValidationError::OutsidePrefix {
                    entry: entry.clone(),
                    prefix: prefix.clone(),
                });
            }
        }
        Ok(())
    }
}

fn string_list(value: Option<&Value>, key: &str) -> Result<Vec<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::Malformed(format!("{key} entry is not a string")))
            })
            .collect(),
        Some(_) => Err(ValidationError::Malformed(format!("{key} is not an array"))),
    }
}

/// Returns the namespace a publication Data may modify: its name without a
/// trailing segment component, minus one more component.
pub fn publisher_prefix(data_name: &Name) -> Name {
    let unsegmented = match data_name.last() {
        Some(last) if last.is_segment() => data_name.parent(),
        _ => data_name.clone(),
    };
    unsegmented.parent()
}

/// Parses `data` and checks every entry against its publisher prefix.
pub fn validate_publication(data: &Data) -> Result<PublicationChanges, ValidationError> {
    let changes = parse_content(data)?;
    changes.check_prefix(&publisher_prefix(data.name()))?;
    Ok(changes)
}

fn parse_content(data: &Data) -> Result<PublicationChanges, ValidationError> {
    let text = data
        .content_str()
        .ok_or_else(|| ValidationError::Malformed("content is not UTF-8".into()))?;
    PublicationChanges::parse(text)
}

/// Rows changed by one applied segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Rows inserted.
    pub inserted: u64,
    /// Adds skipped as already cataloged.
    pub skipped: u64,
    /// Rows deleted.
    pub removed: u64,
}

/// Applies publications and sync updates to the catalog table.
pub struct PublishEngine {
    ctx: Arc<AdapterContext>,
    sync: Arc<dyn SyncSocket>,
    watermarks: Arc<dyn WatermarkStore>,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PublishEngine {
    /// Creates the engine.
    pub fn new(
        ctx: Arc<AdapterContext>,
        sync: Arc<dyn SyncSocket>,
        watermarks: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            ctx,
            sync,
            watermarks,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Handles `<prefix>/publish/<data-name>`: acknowledges and starts
    /// fetching segment 0 on a worker.
    pub fn handle_publish(self: &Arc<Self>, interest: &Interest) -> PublishState {
        let data_name = interest.name().suffix_from(self.ctx.prefix().len() + 1);
        if data_name.is_empty() {
            debug!(name = %interest.name(), "publish intent without data name");
            return PublishState::Failed;
        }

        self.ctx.reply(
            Data::new(interest.name().clone())
                .with_content(ACK_MARKER)
                .with_freshness(self.ctx.config.limits.freshness()),
        );
        info!(data = %data_name, "publish intent acknowledged");

        let engine = Arc::clone(self);
        self.ctx.workers.spawn(async move {
            engine.process_publication(&data_name).await;
        });
        PublishState::Acked
    }

    /// Fetches, validates and applies every segment of `data_name`.
    #[instrument(skip_all, fields(data = %data_name))]
    pub async fn process_publication(&self, data_name: &Name) -> PublishState {
        let mut segment = 0;
        loop {
            let data = match self.fetch_segment(data_name, segment).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(data = %data_name, segment, error = %e, "abandoning publication");
                    return PublishState::Failed;
                }
            };
            let changes = match validate_publication(&data) {
                Ok(changes) => changes,
                Err(e) => {
                    warn!(data = %data.name(), error = %e, "dropping publication segment");
                    return PublishState::Failed;
                }
            };
            match self.apply(&changes).await {
                Ok(outcome) => debug!(data = %data.name(), ?outcome, "publication applied"),
                Err(e) => {
                    warn!(data = %data.name(), error = %e, "publication not applied");
                    return PublishState::Failed;
                }
            }
            self.sync
                .publish_data(data.content(), self.ctx.config.limits.freshness());

            if data.is_final_block() {
                return PublishState::Done;
            }
            segment += 1;
        }
    }

    async fn fetch_segment(&self, data_name: &Name, segment: u64) -> Result<Data, FetchError> {
        let limits = &self.ctx.config.limits;
        let name = data_name.clone().append_segment(segment);
        let mut attempt = 0;
        loop {
            let interest = Interest::new(name.clone()).with_lifetime(limits.fetch_lifetime());
            match self.ctx.face.express_interest(interest).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() && attempt < limits.fetch_retries => {
                    attempt += 1;
                    debug!(name = %name, attempt, "fetch timed out, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs the add batch then the remove batch.
    ///
    /// Every added name is decomposed before anything is written, so a bad
    /// name leaves the table untouched.
    pub async fn apply(&self, changes: &PublicationChanges) -> CatalogResult<ApplyOutcome> {
        let schema = self.ctx.config.schema()?;
        let records = changes
            .add
            .iter()
            .map(|name| {
                CatalogRecord::from_name(&schema, name).map_err(|source| {
                    ValidationError::Decomposition {
                        name: name.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let added = self
            .ctx
            .database
            .execute_batch(&WriteBatch::insert(&schema, records))
            .await?;
        let removed = self
            .ctx
            .database
            .execute_batch(&WriteBatch::delete_by_name(&schema, changes.remove.clone()))
            .await?;
        Ok(ApplyOutcome {
            inserted: added.affected,
            skipped: added.skipped,
            removed: removed.affected,
        })
    }

    /// Queues every reported session range on the worker pool.
    pub fn on_sync_update(self: &Arc<Self>, updates: Vec<MissingDataInfo>) {
        for info in updates {
            let engine = Arc::clone(self);
            self.ctx.workers.spawn(async move {
                if let Err(e) = engine.process_sync_update(&info).await {
                    warn!(session = %info.session, error = %e, "sync update failed");
                }
            });
        }
    }

    /// Fetches and applies one session range above its watermark, then
    /// stores the new watermark.
    ///
    /// Returns the stored watermark. Ranges for the same session are
    /// serialized; different sessions proceed independently. A database
    /// failure stops the range: the watermark only covers sequence numbers
    /// before it, so a later delivery retries the rest.
    #[instrument(skip_all, fields(session = %info.session, low = info.low_seq, high = info.high_seq))]
    pub async fn process_sync_update(&self, info: &MissingDataInfo) -> CatalogResult<u64> {
        let key = info.session.to_uri();
        let lock = self.session_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.sync_range(&key, info).await
        };

        let mut sessions = self.sessions.lock();
        if Arc::strong_count(&lock) == 2 {
            sessions.remove(&key);
        }
        result
    }

    async fn sync_range(&self, key: &str, info: &MissingDataInfo) -> CatalogResult<u64> {
        let watermark = self.watermarks.latest(key).await?;
        let start = watermark.map_or(info.low_seq, |mark| info.low_seq.max(mark + 1));
        if start > info.high_seq {
            debug!(session = %key, ?watermark, high = info.high_seq, "sync range already applied");
            return Ok(watermark.unwrap_or(info.high_seq));
        }

        let retries = self.ctx.config.limits.fetch_retries;
        let mut reached = None;
        let mut failure = None;
        for seq in start..=info.high_seq {
            match self.sync.fetch_data(&info.session, seq, retries).await {
                Ok(data) => match self.apply_sync_data(&data).await {
                    Ok(_) => {}
                    Err(CatalogError::Database(e)) => {
                        warn!(session = %key, seq, error = %e, "sync apply stopped");
                        failure = Some(e);
                        break;
                    }
                    Err(e) => warn!(session = %key, seq, error = %e, "sync update dropped"),
                },
                Err(e) => warn!(session = %key, seq, error = %e, "sync fetch failed"),
            }
            reached = Some(seq);
        }

        if let Some(seq) = reached {
            self.store_watermark(key, watermark, seq).await?;
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(info.high_seq),
        }
    }

    async fn store_watermark(&self, key: &str, previous: Option<u64>, seq: u64) -> CatalogResult<()> {
        match previous {
            Some(_) => self.watermarks.renew(key, seq).await?,
            None => match self.watermarks.insert(key, seq).await {
                Err(DbError::DuplicateSession(_)) => self.watermarks.renew(key, seq).await?,
                other => other?,
            },
        }
        debug!(session = %key, watermark = seq, "watermark stored");
        Ok(())
    }

    async fn apply_sync_data(&self, data: &Data) -> CatalogResult<ApplyOutcome> {
        let changes = parse_content(data)?;
        self.apply(&changes).await
    }

    fn session_lock(&self, session: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.sessions.lock().entry(session.to_string()).or_default())
    }

    /// Number of sessions with a range in flight.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl CatalogAdapter for PublishEngine {
    fn filters(&self) -> &'static [&'static str] {
        &[PUBLISH_FILTER]
    }

    fn on_interest(self: Arc<Self>, _filter: &str, interest: Interest) {
        self.handle_publish(&interest);
    }
}

impl std::fmt::Debug for PublishEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishEngine")
            .field("sessions", &self.sessions.lock().len())
            .finish_non_exhaustive()
    }
}
