//! Response cache.
//!
//! Signed reply segments are kept here keyed by full name. The cache is
//! the retrieval backend for every result namespace and, because replies
//! are content-addressed, also the deduplication point for retransmitted
//! requests.

use atmos_ndn::{Data, Interest, Name};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct Entry {
    data: Arc<Data>,
    size: usize,
    tick: u64,
    inserted: Instant,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted) < self.data.freshness()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<Name, Entry>,
    lru: BTreeMap<u64, Name>,
    next_tick: u64,
    used: usize,
}

impl Inner {
    fn touch(&mut self, name: &Name) {
        let tick = self.next_tick;
        if let Some(entry) = self.entries.get_mut(name) {
            self.lru.remove(&entry.tick);
            entry.tick = tick;
            self.lru.insert(tick, name.clone());
            self.next_tick += 1;
        }
    }

    fn remove(&mut self, name: &Name) -> Option<Entry> {
        let entry = self.entries.remove(name)?;
        self.lru.remove(&entry.tick);
        self.used -= entry.size;
        Some(entry)
    }

    fn evict_until(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.used > capacity {
            let Some((_, name)) = self.lru.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&name) {
                self.used -= entry.size;
                evicted += 1;
            }
        }
        evicted
    }
}

/// A byte-bounded, LRU-evicting store of signed Data.
///
/// All operations run under one short critical section, so a reader never
/// observes a partially inserted segment.
///
/// # Example
///
/// ```rust
/// use atmos_catalog::ResponseCache;
/// use atmos_ndn::{Data, Interest, Name};
/// use std::sync::Arc;
///
/// let cache = ResponseCache::new(1 << 20);
/// let name: Name = "/catalog/query-results/id/q/v/%00%00".parse().unwrap();
/// cache.insert(Arc::new(Data::new(name.clone())));
///
/// let prefix: Name = "/catalog/query-results/id/q".parse().unwrap();
/// let hit = cache.find(&Interest::new(prefix).with_can_be_prefix(true)).unwrap();
/// assert_eq!(hit.name(), &name);
/// ```
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ResponseCache {
    /// Creates a cache holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Inserts (or replaces) a segment, evicting least-recently-used
    /// entries as needed. Segments larger than the whole cache are dropped.
    pub fn insert(&self, data: Arc<Data>) {
        let size = data.wire_size();
        if size > self.capacity {
            warn!(name = %data.name(), size, "segment larger than cache capacity");
            return;
        }
        let name = data.name().clone();
        let mut inner = self.inner.lock();
        inner.remove(&name);

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.lru.insert(tick, name.clone());
        inner.used += size;
        inner.entries.insert(
            name,
            Entry {
                data,
                size,
                tick,
                inserted: Instant::now(),
            },
        );
        let evicted = inner.evict_until(self.capacity);
        if evicted > 0 {
            debug!(evicted, "cache eviction");
        }
    }

    /// Finds a segment satisfying `interest`.
    ///
    /// Exact-name lookup by default. With CanBePrefix the leftmost entry
    /// (in canonical order) under the Interest name is returned, which for
    /// a segmented reply is its first segment. MustBeFresh skips entries
    /// whose freshness period has elapsed.
    pub fn find(&self, interest: &Interest) -> Option<Arc<Data>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let name = interest.name();

        let found = if interest.can_be_prefix() {
            inner
                .entries
                .range::<Name, _>((Bound::Included(name), Bound::Unbounded))
                .take_while(|(key, _)| name.is_prefix_of(key))
                .find(|(_, entry)| !interest.must_be_fresh() || entry.is_fresh(now))
                .map(|(key, entry)| (key.clone(), Arc::clone(&entry.data)))
        } else {
            inner
                .entries
                .get(name)
                .filter(|entry| !interest.must_be_fresh() || entry.is_fresh(now))
                .map(|entry| (name.clone(), Arc::clone(&entry.data)))
        };

        let (key, data) = found?;
        inner.touch(&key);
        Some(data)
    }

    /// Removes every entry under `prefix`. Returns how many were removed.
    pub fn erase(&self, prefix: &Name) -> usize {
        let mut inner = self.inner.lock();
        let doomed: Vec<Name> = inner
            .entries
            .range::<Name, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| prefix.is_prefix_of(key))
            .map(|(key, _)| key.clone())
            .collect();
        for name in &doomed {
            inner.remove(name);
        }
        doomed.len()
    }

    /// Returns the number of cached segments.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Returns the accounted size of all cached segments.
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().used
    }

    /// Returns the byte capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
