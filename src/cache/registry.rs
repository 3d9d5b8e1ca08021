//! Bidirectional cache registry.
//!
//! Tracks which cache entries were derived from which entities, so an edge
//! change can invalidate every dependent entry through an explicit index
//! instead of a pattern scan over the whole key space.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, EntityKey};
use super::lock::rw_write;

const SOURCE: &str = "cache::registry";

/// Tracks entity → cache_keys and cache_key → entities mappings.
///
/// The bidirectional mapping enables:
/// - Finding all cache entries affected by an entity change
/// - Cleaning up entity mappings when cache entries are dropped
pub struct CacheRegistry {
    /// Maps entities to all cache keys that depend on them
    entity_to_keys: RwLock<HashMap<EntityKey, HashSet<CacheKey>>>,
    /// Maps cache keys to all entities they depend on
    key_to_entities: RwLock<HashMap<CacheKey, HashSet<EntityKey>>>,
}

impl CacheRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entity_to_keys: RwLock::new(HashMap::new()),
            key_to_entities: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cache entry against the entities it was derived from.
    pub fn register(&self, cache_key: CacheKey) {
        let entities = cache_key.entities();
        if entities.is_empty() {
            return;
        }

        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "register.e2k");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "register.k2e");

        for entity in &entities {
            e2k.entry(entity.clone())
                .or_default()
                .insert(cache_key.clone());
        }
        k2e.insert(cache_key, entities);
    }

    /// Get all cache keys affected by an entity change.
    pub fn keys_for_entity(&self, entity: &EntityKey) -> HashSet<CacheKey> {
        rw_write(&self.entity_to_keys, SOURCE, "keys_for_entity")
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a cache key and clean up its entity mappings.
    pub fn unregister(&self, cache_key: &CacheKey) {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "unregister.e2k");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "unregister.k2e");

        if let Some(entities) = k2e.remove(cache_key) {
            for entity in entities {
                if let Some(keys) = e2k.get_mut(&entity) {
                    keys.remove(cache_key);
                    if keys.is_empty() {
                        e2k.remove(&entity);
                    }
                }
            }
        }
    }

    /// Remove all mappings for an entity.
    ///
    /// Returns the set of cache keys that were affected; the caller drops the
    /// actual entries from the store.
    pub fn unregister_entity(&self, entity: &EntityKey) -> HashSet<CacheKey> {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "unregister_entity.e2k");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "unregister_entity.k2e");

        let affected_keys = e2k.remove(entity).unwrap_or_default();

        for cache_key in &affected_keys {
            if let Some(entities) = k2e.get_mut(cache_key) {
                entities.remove(entity);
                if entities.is_empty() {
                    k2e.remove(cache_key);
                }
            }
        }

        affected_keys
    }

    /// Get the number of tracked entities.
    pub fn entity_count(&self) -> usize {
        rw_write(&self.entity_to_keys, SOURCE, "entity_count").len()
    }

    /// Get the number of tracked cache keys.
    pub fn key_count(&self) -> usize {
        rw_write(&self.key_to_entities, SOURCE, "key_count").len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
