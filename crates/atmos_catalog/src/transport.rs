//! Transport and sync-layer contracts.
//!
//! The catalog never owns a socket. It consumes a [`Face`] for Interest /
//! Data exchange and a [`SyncSocket`] for the group-synchronization layer.
//! [`MockFace`] and [`MockSyncSocket`] are in-process doubles for tests
//! and offline tooling.

use crate::error::FetchError;
use async_trait::async_trait;
use atmos_ndn::{Data, Interest, Name};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Named-network face.
#[async_trait]
pub trait Face: Send + Sync {
    /// Sends a signed Data packet.
    fn put(&self, data: Arc<Data>);

    /// Asks the forwarder to route Interests under `prefix` to us.
    ///
    /// # Errors
    ///
    /// Returns the forwarder's refusal reason.
    fn register_prefix(&self, prefix: &Name) -> Result<(), String>;

    /// Expresses an Interest and waits for the matching Data.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] when the lifetime elapses, or
    /// [`FetchError::Nack`] when the network refuses the Interest.
    async fn express_interest(&self, interest: Interest) -> Result<Data, FetchError>;
}

/// One session's range of missing sync updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDataInfo {
    /// Session (producer) name.
    pub session: Name,
    /// Lowest missing sequence number.
    pub low_seq: u64,
    /// Highest missing sequence number.
    pub high_seq: u64,
}

/// Group-synchronization layer.
#[async_trait]
pub trait SyncSocket: Send + Sync {
    /// Returns the current state digest, `None` before the first round.
    fn current_digest(&self) -> Option<Vec<u8>>;

    /// Appends a payload to this node's own sync log.
    fn publish_data(&self, payload: &[u8], freshness: Duration);

    /// Fetches one sequence number of a session, retrying timeouts up to
    /// `retries` times.
    ///
    /// # Errors
    ///
    /// Returns the last failure once retries are exhausted, or
    /// [`FetchError::ValidationFailed`] if the sync validator rejects it.
    async fn fetch_data(&self, session: &Name, seq: u64, retries: u32) -> Result<Data, FetchError>;
}

#[derive(Debug, Default)]
struct FaceState {
    sent: Vec<Arc<Data>>,
    registered: Vec<Name>,
    refused: Vec<Name>,
    served: HashMap<Name, Data>,
    timeouts: HashMap<Name, u32>,
    expressed: Vec<Interest>,
}

/// An in-process face that records everything sent through it.
///
/// Fetches are answered from Data registered with [`MockFace::serve`];
/// anything else times out immediately.
#[derive(Debug, Default)]
pub struct MockFace {
    state: Mutex<FaceState>,
}

impl MockFace {
    /// Creates a mock face.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `data` available to `express_interest`.
    pub fn serve(&self, data: Data) {
        self.state.lock().served.insert(data.name().clone(), data);
    }

    /// Makes the next `count` fetches of `name` time out.
    pub fn time_out(&self, name: Name, count: u32) {
        self.state.lock().timeouts.insert(name, count);
    }

    /// Makes registration of `prefix` fail.
    pub fn refuse(&self, prefix: Name) {
        self.state.lock().refused.push(prefix);
    }

    /// Returns every Data sent so far.
    pub fn sent(&self) -> Vec<Arc<Data>> {
        self.state.lock().sent.clone()
    }

    /// Returns and forgets every Data sent so far.
    pub fn take_sent(&self) -> Vec<Arc<Data>> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Returns every registered prefix.
    pub fn registered(&self) -> Vec<Name> {
        self.state.lock().registered.clone()
    }

    /// Returns every expressed Interest.
    pub fn expressed(&self) -> Vec<Interest> {
        self.state.lock().expressed.clone()
    }
}

#[async_trait]
impl Face for MockFace {
    fn put(&self, data: Arc<Data>) {
        self.state.lock().sent.push(data);
    }

    fn register_prefix(&self, prefix: &Name) -> Result<(), String> {
        let mut state = self.state.lock();
        if state.refused.contains(prefix) {
            return Err("registration refused".into());
        }
        state.registered.push(prefix.clone());
        Ok(())
    }

    async fn express_interest(&self, interest: Interest) -> Result<Data, FetchError> {
        let mut state = self.state.lock();
        state.expressed.push(interest.clone());
        let name = interest.name().clone();
        if let Some(remaining) = state.timeouts.get_mut(&name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Timeout(name));
            }
        }
        state
            .served
            .values()
            .filter(|data| interest.matches(data))
            .min_by(|a, b| a.name().cmp(b.name()))
            .cloned()
            .ok_or(FetchError::Timeout(name))
    }
}

#[derive(Debug, Default)]
struct SyncState {
    digest: Option<Vec<u8>>,
    published: Vec<Vec<u8>>,
    log: HashMap<(Name, u64), Data>,
    fetches: Vec<(Name, u64)>,
}

/// An in-process sync layer.
#[derive(Debug, Default)]
pub struct MockSyncSocket {
    state: Mutex<SyncState>,
}

impl MockSyncSocket {
    /// Creates a mock sync socket with no digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state digest.
    pub fn set_digest(&self, digest: Option<Vec<u8>>) {
        self.state.lock().digest = digest;
    }

    /// Makes `data` the payload of `(session, seq)`.
    pub fn add_update(&self, session: Name, seq: u64, data: Data) {
        self.state.lock().log.insert((session, seq), data);
    }

    /// Returns every payload published so far.
    pub fn published(&self) -> Vec<Vec<u8>> {
        self.state.lock().published.clone()
    }

    /// Returns every `(session, seq)` fetched so far, in order.
    pub fn fetches(&self) -> Vec<(Name, u64)> {
        self.state.lock().fetches.clone()
    }
}

#[async_trait]
impl SyncSocket for MockSyncSocket {
    fn current_digest(&self) -> Option<Vec<u8>> {
        self.state.lock().digest.clone()
    }

    fn publish_data(&self, payload: &[u8], _freshness: Duration) {
        self.state.lock().published.push(payload.to_vec());
    }

    async fn fetch_data(&self, session: &Name, seq: u64, _retries: u32) -> Result<Data, FetchError> {
        let mut state = self.state.lock();
        state.fetches.push((session.clone(), seq));
        state
            .log
            .get(&(session.clone(), seq))
            .cloned()
            .ok_or_else(|| FetchError::Timeout(session.clone().append_segment(seq)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[tokio::test]
    async fn mock_face_serves_and_times_out() {
        let face = MockFace::new();
        face.serve(Data::new(name("/pub/x/%00%00")));
        face.time_out(name("/pub/x/%00%00"), 1);

        let interest = Interest::new(name("/pub/x/%00%00"));
        assert!(matches!(
            face.express_interest(interest.clone()).await,
            Err(FetchError::Timeout(_))
        ));
        assert!(face.express_interest(interest).await.is_ok());
        assert_eq!(face.expressed().len(), 2);

        let prefix = Interest::new(name("/pub")).with_can_be_prefix(true);
        assert!(face.express_interest(prefix).await.is_ok());
    }

    #[test]
    fn mock_face_registration() {
        let face = MockFace::new();
        face.refuse(name("/bad"));
        assert!(face.register_prefix(&name("/good")).is_ok());
        assert!(face.register_prefix(&name("/bad")).is_err());
        assert_eq!(face.registered(), vec![name("/good")]);
    }

    #[tokio::test]
    async fn mock_sync_socket() {
        let sync = MockSyncSocket::new();
        assert_eq!(sync.current_digest(), None);
        sync.set_digest(Some(vec![1, 2]));
        assert_eq!(sync.current_digest(), Some(vec![1, 2]));

        sync.add_update(name("/s"), 1, Data::new(name("/s/1")));
        assert!(sync.fetch_data(&name("/s"), 1, 3).await.is_ok());
        assert!(sync.fetch_data(&name("/s"), 2, 3).await.is_err());
        assert_eq!(sync.fetches().len(), 2);

        sync.publish_data(b"{}", Duration::from_secs(1));
        assert_eq!(sync.published(), vec![b"{}".to_vec()]);
    }
}
