//! Request routing by filter component.

use crate::adapter::CatalogAdapter;
use crate::error::{CatalogError, CatalogResult};
use crate::transport::Face;
use atmos_ndn::{Interest, Name};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes Interests under the catalog prefix to the adapter owning the
/// component right after the prefix.
pub struct RequestRouter {
    face: Arc<dyn Face>,
    prefix: Name,
    routes: BTreeMap<&'static str, Arc<dyn CatalogAdapter>>,
}

impl RequestRouter {
    /// Creates an empty router.
    pub fn new(face: Arc<dyn Face>, prefix: Name) -> Self {
        Self {
            face,
            prefix,
            routes: BTreeMap::new(),
        }
    }

    /// Mounts `adapter` under every filter it claims. A later mount of
    /// the same filter replaces the earlier one.
    pub fn mount(&mut self, adapter: Arc<dyn CatalogAdapter>) {
        for filter in adapter.filters() {
            self.routes.insert(*filter, Arc::clone(&adapter));
        }
    }

    /// Returns the mounted filter components in order.
    pub fn filters(&self) -> Vec<&'static str> {
        self.routes.keys().copied().collect()
    }

    /// Registers `<prefix>/<filter>` for every mounted filter.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Registration`] on the first refusal.
    pub fn register(&self) -> CatalogResult<()> {
        for filter in self.routes.keys() {
            let prefix = self.prefix.clone().append(*filter);
            self.face
                .register_prefix(&prefix)
                .map_err(|reason| CatalogError::Registration {
                    prefix: prefix.clone(),
                    reason,
                })?;
            info!(prefix = %prefix, "registered");
        }
        Ok(())
    }

    /// Hands `interest` to its adapter. Returns false if no adapter owns it.
    pub fn dispatch(&self, interest: Interest) -> bool {
        if !self.prefix.is_prefix_of(interest.name()) {
            debug!(name = %interest.name(), "interest outside catalog prefix");
            return false;
        }
        let filter = interest.name().get(self.prefix.len()).and_then(|c| c.as_str());
        let Some((filter, adapter)) = filter.and_then(|f| self.routes.get_key_value(f)) else {
            debug!(name = %interest.name(), "no adapter for interest");
            return false;
        };
        Arc::clone(adapter).on_interest(filter, interest);
        true
    }
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRouter")
            .field("prefix", &self.prefix)
            .field("filters", &self.filters())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockFace;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Name)>>,
    }

    impl CatalogAdapter for Recorder {
        fn filters(&self) -> &'static [&'static str] {
            &["query", "query-results"]
        }

        fn on_interest(self: Arc<Self>, filter: &str, interest: Interest) {
            self.seen.lock().push((filter.to_string(), interest.name().clone()));
        }
    }

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn registers_every_filter() {
        let face = Arc::new(MockFace::new());
        let mut router = RequestRouter::new(face.clone(), name("/catalog"));
        router.mount(Arc::new(Recorder::default()));
        router.register().unwrap();
        assert_eq!(
            face.registered(),
            vec![name("/catalog/query"), name("/catalog/query-results")]
        );
    }

    #[test]
    fn registration_failure_is_reported() {
        let face = Arc::new(MockFace::new());
        face.refuse(name("/catalog/query-results"));
        let mut router = RequestRouter::new(face, name("/catalog"));
        router.mount(Arc::new(Recorder::default()));
        assert!(matches!(
            router.register(),
            Err(CatalogError::Registration { prefix, .. }) if prefix == name("/catalog/query-results")
        ));
    }

    #[test]
    fn dispatches_on_component_after_prefix() {
        let recorder = Arc::new(Recorder::default());
        let mut router = RequestRouter::new(Arc::new(MockFace::new()), name("/catalog"));
        router.mount(recorder.clone());

        assert!(router.dispatch(Interest::new(name("/catalog/query/x"))));
        assert!(router.dispatch(Interest::new(name("/catalog/query-results/a/b"))));
        assert!(!router.dispatch(Interest::new(name("/catalog/publish/x"))));
        assert!(!router.dispatch(Interest::new(name("/elsewhere/query/x"))));
        assert!(!router.dispatch(Interest::new(name("/catalog"))));

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "query");
        assert_eq!(seen[1].0, "query-results");
    }
}
