//! In-process caching for the data-access core.
//!
//! A single [`OptionCache`] is built at startup and shared by every consumer.
//! It fronts the option store, resolves tenant-prefixed aliases and is
//! invalidated by the write paths in [`crate::application::options`].
//!
//! ```toml
//! [cache]
//! enable_option_cache = true
//! ```

mod config;
pub(crate) mod lock;
mod options;

pub use config::CacheConfig;
pub use options::{CachedOption, OptionCache};
pub(crate) use options::{
    METRIC_OPTION_CACHE_HIT, METRIC_OPTION_CACHE_INVALIDATE, METRIC_OPTION_CACHE_MISS,
};
