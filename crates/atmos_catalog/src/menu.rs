//! Filter menu served under `<prefix>/filters-initialization`.
//!
//! The menu is a JSON array with one single-key object per configured
//! filter category, listing that column's distinct values:
//!
//! ```json
//! [{"activity": ["CMIP5", ...]}, {"product": ["output", ...]}]
//! ```
//!
//! At most one build runs per catalog version. The result is split into
//! segments and cached; a version change erases it, and a menu evicted
//! from the cache is rebuilt on the next request.

use crate::adapter::{AdapterContext, CatalogAdapter};
use crate::error::CatalogResult;
use crate::segment::chunk_payload;
use atmos_ndn::{Component, Interest, Name};
use atmos_store::SelectQuery;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Filter component for the menu.
pub const MENU_FILTER: &str = "filters-initialization";

/// Builds and serves the filter menu.
pub struct FilterMenu {
    ctx: Arc<AdapterContext>,
    namespace: Name,
    building: Arc<Mutex<HashSet<Component>>>,
}

impl FilterMenu {
    /// Creates the menu and hooks its invalidation to version changes.
    pub fn new(ctx: Arc<AdapterContext>) -> Self {
        let namespace = ctx.namespace(MENU_FILTER);
        let building: Arc<Mutex<HashSet<Component>>> = Arc::default();

        let cache = Arc::clone(&ctx.cache);
        let erased = namespace.clone();
        let versions = Arc::clone(&building);
        ctx.version.on_change(move || {
            versions.lock().clear();
            let removed = cache.erase(&erased);
            debug!(removed, "filter menu invalidated");
        });

        Self {
            ctx,
            namespace,
            building,
        }
    }

    /// Returns `<prefix>/filters-initialization`.
    pub fn namespace(&self) -> &Name {
        &self.namespace
    }

    /// Answers a menu Interest from the cache, or starts a build.
    ///
    /// Returns true if the Interest was answered immediately.
    pub fn handle(self: &Arc<Self>, interest: &Interest) -> bool {
        let version = self.ctx.version.current();
        let wanted = self.segment_name(interest);
        if self.answer(&wanted) {
            return true;
        }

        if !self.building.lock().insert(version.clone()) {
            debug!(version = %version, "filter menu build already running");
            return false;
        }

        let menu = Arc::clone(self);
        self.ctx.workers.spawn(async move {
            match menu.collect().await {
                Ok(chunks) if menu.ctx.version.current() == version => {
                    let segments = menu.ctx.publish_segments(&menu.namespace, chunks).len();
                    info!(version = %version, segments, "filter menu built");
                    menu.answer(&wanted);
                }
                Ok(_) => debug!(version = %version, "catalog changed during menu build"),
                Err(e) => warn!(error = %e, "filter menu build failed"),
            }
            menu.building.lock().remove(&version);
        });
        false
    }

    /// Queries every category, then segments and caches the menu.
    ///
    /// Returns the number of segments cached.
    pub async fn build(&self) -> CatalogResult<usize> {
        let chunks = self.collect().await?;
        Ok(self.ctx.publish_segments(&self.namespace, chunks).len())
    }

    async fn collect(&self) -> CatalogResult<Vec<Vec<u8>>> {
        let config = &self.ctx.config;
        let mut menu = Vec::with_capacity(config.filter_category_names.len());
        for category in &config.filter_category_names {
            let query = SelectQuery::new(&config.database.table, category.as_str()).distinct();
            let values = self.ctx.database.execute(&query).await?;
            let mut entry = Map::new();
            entry.insert(
                category.clone(),
                Value::Array(values.into_iter().map(Value::String).collect()),
            );
            menu.push(Value::Object(entry));
        }
        let payload = Value::Array(menu).to_string();
        Ok(chunk_payload(payload.as_bytes(), config.limits.payload_limit))
    }

    fn segment_name(&self, interest: &Interest) -> Name {
        if interest.name().len() > self.namespace.len() {
            interest.name().clone()
        } else {
            self.namespace.clone().append_segment(0)
        }
    }

    fn answer(&self, wanted: &Name) -> bool {
        match self.ctx.cache.find(&Interest::new(wanted.clone())) {
            Some(data) => {
                self.ctx.face.put(data);
                true
            }
            None => false,
        }
    }
}

impl CatalogAdapter for FilterMenu {
    fn filters(&self) -> &'static [&'static str] {
        &[MENU_FILTER]
    }

    fn on_interest(self: Arc<Self>, _filter: &str, interest: Interest) {
        self.handle(&interest);
    }
}

impl std::fmt::Debug for FilterMenu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterMenu")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::fixture::{config, Fixture};
    use serde_json::json;

    fn seed(fx: &Fixture) {
        fx.db
            .insert_names([
                "/CMIP5/output/a/b/c/d/e/f/g/h",
                "/CMIP5/input/a/b/c/d/e/f/g/h",
                "/NARR/output/a/b/c/d/e/f/g/h",
            ])
            .unwrap();
    }

    fn reassemble(fx: &Fixture, menu: &FilterMenu) -> Value {
        let mut bytes = Vec::new();
        let mut seg = 0;
        loop {
            let name = menu.namespace().clone().append_segment(seg);
            let data = fx.ctx.cache.find(&Interest::new(name)).unwrap();
            bytes.extend_from_slice(data.content());
            if data.is_final_block() {
                break;
            }
            seg += 1;
        }
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn builds_once_and_answers() {
        let fx = Fixture::new();
        seed(&fx);
        let menu = Arc::new(FilterMenu::new(fx.ctx.clone()));
        let interest = Interest::new(menu.namespace().clone());

        assert!(!menu.handle(&interest));
        assert!(!menu.handle(&interest));
        fx.ctx.workers.idle().await;
        assert_eq!(fx.db.executions(), 2);
        assert_eq!(fx.face.take_sent().len(), 1);

        assert_eq!(
            reassemble(&fx, &menu),
            json!([
                {"activity": ["CMIP5", "NARR"]},
                {"product": ["output", "input"]}
            ])
        );

        assert!(menu.handle(&interest));
        assert_eq!(fx.db.executions(), 2);
    }

    #[tokio::test]
    async fn large_menu_is_segmented() {
        let fx = Fixture::with_config(config().with_limits(Limits {
            payload_limit: 16,
            ..Limits::default()
        }));
        seed(&fx);
        let menu = Arc::new(FilterMenu::new(fx.ctx.clone()));
        let segments = menu.build().await.unwrap();
        assert!(segments > 1);
        assert_eq!(reassemble(&fx, &menu)[0]["activity"], json!(["CMIP5", "NARR"]));
    }

    #[tokio::test]
    async fn version_change_erases_menu() {
        let fx = Fixture::new();
        seed(&fx);
        let menu = Arc::new(FilterMenu::new(fx.ctx.clone()));
        let interest = Interest::new(menu.namespace().clone().append_segment(0));
        menu.handle(&interest);
        fx.ctx.workers.idle().await;
        assert!(menu.handle(&interest));

        fx.sync.set_digest(Some(vec![9]));
        assert!(!menu.handle(&interest));
        assert!(fx.ctx.cache.find(&interest).is_none());
        fx.ctx.workers.idle().await;
        assert_eq!(fx.db.executions(), 4);
    }

    #[tokio::test]
    async fn changed_catalog_is_not_served_stale() {
        let fx = Fixture::new();
        seed(&fx);
        let menu = Arc::new(FilterMenu::new(fx.ctx.clone()));
        let interest = Interest::new(menu.namespace().clone().append_segment(0));
        menu.handle(&interest);
        fx.ctx.workers.idle().await;
        fx.face.take_sent();

        fx.db.insert_names(["/GFDL/output/a/b/c/d/e/f/g/h"]).unwrap();
        fx.sync.set_digest(Some(vec![1]));
        assert!(!menu.handle(&interest));
        fx.ctx.workers.idle().await;

        assert_eq!(fx.face.take_sent().len(), 1);
        assert_eq!(
            reassemble(&fx, &menu)[0]["activity"],
            json!(["CMIP5", "NARR", "GFDL"])
        );
    }

    #[tokio::test]
    async fn evicted_menu_is_rebuilt() {
        let fx = Fixture::new();
        seed(&fx);
        let menu = Arc::new(FilterMenu::new(fx.ctx.clone()));
        let interest = Interest::new(menu.namespace().clone());
        menu.handle(&interest);
        fx.ctx.workers.idle().await;
        assert_eq!(fx.db.executions(), 2);

        fx.ctx.cache.erase(menu.namespace());
        assert!(!menu.handle(&interest));
        fx.ctx.workers.idle().await;
        assert_eq!(fx.db.executions(), 4);
        assert_eq!(fx.face.sent().len(), 2);
        assert!(menu.handle(&interest));
    }

    #[tokio::test]
    async fn failed_build_can_retry() {
        let fx = Fixture::new();
        fx.db.set_available(false);
        let menu = Arc::new(FilterMenu::new(fx.ctx.clone()));
        let interest = Interest::new(menu.namespace().clone());
        menu.handle(&interest);
        fx.ctx.workers.idle().await;
        assert!(fx.face.sent().is_empty());

        fx.db.set_available(true);
        menu.handle(&interest);
        fx.ctx.workers.idle().await;
        assert_eq!(fx.face.sent().len(), 1);
    }
}
