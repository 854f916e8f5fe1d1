//! Cache configuration.
//!
//! Controls the process-wide option cache via the `[cache]` section of `arbor.toml`.

use serde::Deserialize;

/// Option cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve option reads from memory. When off, every read goes to the store.
    pub enable_option_cache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_option_cache: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_option_cache: settings.enable_option_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_cache_enabled_by_default() {
        assert!(CacheConfig::default().enable_option_cache);
    }
}
