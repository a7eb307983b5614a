//! Keeps cached weather consistent with the widget's settings and credential.

use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    error::WidgetError,
    fingerprint::{WEATHER_CACHE_PREFIX, cache_key},
    model::Unit,
    store::CacheStore,
};

#[derive(Clone)]
pub struct InvalidationPolicy {
    cache: Arc<dyn CacheStore>,
}

impl InvalidationPolicy {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Drop the entry for the old `(city, unit)` when either changed. The new
    /// key is left alone so a fresh city falls through to a real fetch.
    pub fn on_config_change(
        &self,
        old_city: &str,
        old_unit: Unit,
        new_city: &str,
        new_unit: Unit,
    ) -> Result<(), WidgetError> {
        if old_city.is_empty() || (old_city == new_city && old_unit == new_unit) {
            return Ok(());
        }

        debug!(old_city, %old_unit, "invalidating cached weather for previous settings");
        self.cache.delete(&cache_key(old_city, old_unit))
    }

    /// Purge every cached weather entry; data fetched under the old key is stale.
    pub fn on_credential_replaced(&self) -> Result<usize, WidgetError> {
        let removed = self.cache.delete_by_prefix(WEATHER_CACHE_PREFIX)?;
        info!(removed, "purged cached weather after API key change");
        Ok(removed)
    }
}
