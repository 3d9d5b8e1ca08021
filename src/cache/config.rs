//! Cache configuration.
//!
//! Controls TTLs and capacity limits for the in-process cache via
//! `flusso.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_FLAG_TTL_SECONDS: u64 = 3600;
const DEFAULT_LIST_TTL_SECONDS: u64 = 3600;
const DEFAULT_PENDING_VIEWS_TTL_SECONDS: u64 = 21_600;
const DEFAULT_PAIR_FLAG_LIMIT: usize = 10_000;
const DEFAULT_LIST_PAGE_LIMIT: usize = 1_000;
const DEFAULT_LATEST_LIST_LIMIT: usize = 1_000;
const DEFAULT_LATEST_LIST_SIZE: u32 = 10;

/// Cache configuration from `flusso.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for pair subscription-state flags.
    pub flag_ttl_seconds: u64,
    /// TTL for paginated and "latest" list entries.
    pub list_ttl_seconds: u64,
    /// TTL stamped on a pending view counter at its first increment, so
    /// counters for cold videos expire instead of leaking.
    pub pending_views_ttl_seconds: u64,
    /// Maximum pair flags held in the LRU.
    pub pair_flag_limit: usize,
    /// Maximum list pages held per list family.
    pub list_page_limit: usize,
    /// Maximum "latest" lists held per family.
    pub latest_list_limit: usize,
    /// Number of rows in the "latest" convenience lists.
    pub latest_list_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flag_ttl_seconds: DEFAULT_FLAG_TTL_SECONDS,
            list_ttl_seconds: DEFAULT_LIST_TTL_SECONDS,
            pending_views_ttl_seconds: DEFAULT_PENDING_VIEWS_TTL_SECONDS,
            pair_flag_limit: DEFAULT_PAIR_FLAG_LIMIT,
            list_page_limit: DEFAULT_LIST_PAGE_LIMIT,
            latest_list_limit: DEFAULT_LATEST_LIST_LIMIT,
            latest_list_size: DEFAULT_LATEST_LIST_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn flag_ttl(&self) -> Duration {
        Duration::from_secs(self.flag_ttl_seconds)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_seconds)
    }

    pub fn pending_views_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_views_ttl_seconds)
    }

    /// Returns the pair flag limit as NonZeroUsize, clamping to 1 if zero.
    pub fn pair_flag_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.pair_flag_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the list page limit as NonZeroUsize, clamping to 1 if zero.
    pub fn list_page_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.list_page_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the latest list limit as NonZeroUsize, clamping to 1 if zero.
    pub fn latest_list_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.latest_list_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
