//! Flusso cache system.
//!
//! An in-process, TTL-bounded read accelerator in front of the durable store:
//!
//! - **Pair flags**: per-`(subscriber, channel)` subscription state booleans
//! - **List pages**: paginated subscriber / subscription list entries
//! - **Latest lists**: per-channel unpaginated convenience lists
//! - **Pending views**: write-back view counters drained by the flush job
//!
//! Every entry is derived — always reconstructable from the store. The
//! [`CacheRegistry`] tracks which cache keys depend on which entities so the
//! mutation worker can invalidate whole cache classes without scanning.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! flag_ttl_seconds = 3600
//! list_ttl_seconds = 3600
//! pending_views_ttl_seconds = 21600
//! ```

mod config;
mod keys;
mod lock;
mod registry;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, EntityKey};
pub use registry::CacheRegistry;
pub use store::CacheStore;
