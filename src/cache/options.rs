//! Process-wide option cache.
//!
//! Entries are keyed by *logical* option name and hold the resolution decision
//! taken on the miss that populated them: either the winning value or a
//! "not found" marker. A missing map entry means the name was never looked up
//! (or was invalidated). Entries have no TTL; writers invalidate explicitly.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

use crate::application::repos::{OptionsRepo, RepoError};
use crate::domain::options::OptionNamespace;

use super::config::CacheConfig;

pub(crate) const METRIC_OPTION_CACHE_HIT: &str = "arbor_option_cache_hit_total";
pub(crate) const METRIC_OPTION_CACHE_MISS: &str = "arbor_option_cache_miss_total";
pub(crate) const METRIC_OPTION_CACHE_INVALIDATE: &str = "arbor_option_cache_invalidate_total";

/// Cached resolution of a logical option name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedOption {
    Value(String),
    Missing,
}

impl CachedOption {
    fn into_value(self) -> Option<String> {
        match self {
            Self::Value(value) => Some(value),
            Self::Missing => None,
        }
    }
}

impl From<Option<String>> for CachedOption {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Missing,
        }
    }
}

/// In-memory map fronting [`OptionsRepo`].
///
/// Construct once at startup and share via `Arc`; tests build isolated instances.
pub struct OptionCache {
    repo: Arc<dyn OptionsRepo>,
    namespace: OptionNamespace,
    config: CacheConfig,
    entries: DashMap<String, CachedOption>,
}

impl OptionCache {
    pub fn new(repo: Arc<dyn OptionsRepo>, namespace: OptionNamespace, config: CacheConfig) -> Self {
        Self {
            repo,
            namespace,
            config,
            entries: DashMap::new(),
        }
    }

    pub fn namespace(&self) -> &OptionNamespace {
        &self.namespace
    }

    /// Resolve a logical option name, reading the store at most once on a miss.
    ///
    /// Store failures are returned without caching anything, so the next call
    /// retries.
    pub async fn get_value(&self, name: &str) -> Result<Option<String>, RepoError> {
        if self.config.enable_option_cache
            && let Some(cached) = self.peek(name)
        {
            counter!(METRIC_OPTION_CACHE_HIT).increment(1);
            debug!(option = name, "option cache hit");
            return Ok(cached.into_value());
        }

        counter!(METRIC_OPTION_CACHE_MISS).increment(1);
        let resolved = self.load(name).await?;

        if self.config.enable_option_cache {
            self.entries
                .insert(name.to_string(), CachedOption::from(resolved.clone()));
        }
        debug!(
            option = name,
            found = resolved.is_some(),
            "option cache populated"
        );

        Ok(resolved)
    }

    /// Bulk fetch of every autoload option, bypassing the single-entry map.
    pub async fn autoload_options(&self) -> Result<BTreeMap<String, String>, RepoError> {
        let rows = self.repo.list_autoload().await?;
        Ok(self.namespace.fold_logical(rows.iter()))
    }

    /// Record a value known to be the current resolution for `name`.
    pub fn prime(&self, name: &str, value: String) {
        if self.config.enable_option_cache {
            self.entries
                .insert(name.to_string(), CachedOption::Value(value));
        }
    }

    pub fn invalidate(&self, name: &str) {
        if self.entries.remove(name).is_some() {
            counter!(METRIC_OPTION_CACHE_INVALIDATE).increment(1);
            debug!(option = name, "option cache entry invalidated");
        }
    }

    /// Invalidate the logical entry that a stored row name belongs to.
    pub fn invalidate_physical(&self, physical: &str) {
        let (logical, _) = self.namespace.logical_name(physical);
        self.invalidate(logical);
    }

    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "option cache cleared");
    }

    pub fn peek(&self, name: &str) -> Option<CachedOption> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn load(&self, name: &str) -> Result<Option<String>, RepoError> {
        let keys = self.namespace.physical_keys(name);
        let rows = self.repo.find_by_names(&keys).await?;
        Ok(self
            .namespace
            .resolve(name, rows.iter())
            .map(|row| row.option_value.clone()))
    }
}
