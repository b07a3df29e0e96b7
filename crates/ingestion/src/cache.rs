//! Decoded-block cache.
//!
//! Owned by the caller and passed into a run, so repeated runs over
//! overlapping ranges skip decoding. Least recently used blocks are evicted
//! first.
//!
//! A decoded block depends on the filter policy it was decoded under, so the
//! cache is bound to one policy and empties itself when bound to another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use oracle_core::{config::TxFilterConfig, Block, Height};
use tracing::debug;

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Bounded LRU cache of decoded blocks keyed by height.
///
/// A capacity of zero disables caching.
#[derive(Debug, Clone)]
pub struct BlockCache {
    capacity: usize,
    policy: Option<TxFilterConfig>,
    // height -> (block, recency stamp)
    blocks: HashMap<Height, (Arc<Block>, u64)>,
    // recency stamp -> height; first entry is least recently used
    order: BTreeMap<u64, Height>,
    clock: u64,
    stats: CacheStats,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            policy: None,
            blocks: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Filter policy the cached blocks were decoded under.
    pub fn policy(&self) -> Option<&TxFilterConfig> {
        self.policy.as_ref()
    }

    /// Bind the cache to `policy`, dropping blocks decoded under another one.
    pub fn bind_policy(&mut self, policy: &TxFilterConfig) {
        if self.policy.as_ref() == Some(policy) {
            return;
        }
        if !self.blocks.is_empty() {
            debug!(dropped = self.blocks.len(), "filter policy changed, clearing block cache");
        }
        self.clear();
        self.policy = Some(policy.clone());
    }

    /// Whether `height` is cached, without touching recency or stats.
    pub fn contains(&self, height: Height) -> bool {
        self.blocks.contains_key(&height)
    }

    /// Look up a block, marking it most recently used.
    pub fn get(&mut self, height: Height) -> Option<Arc<Block>> {
        let stamp = self.next_stamp();
        match self.blocks.get_mut(&height) {
            Some((block, last)) => {
                self.order.remove(&*last);
                *last = stamp;
                self.order.insert(stamp, height);
                self.stats.hits += 1;
                Some(Arc::clone(block))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a block, evicting the least recently used one when full.
    pub fn insert(&mut self, block: Arc<Block>) {
        if self.capacity == 0 {
            return;
        }
        let height = block.height;
        let stamp = self.next_stamp();
        if let Some((_, last)) = self.blocks.insert(height, (block, stamp)) {
            self.order.remove(&last);
        }
        self.order.insert(stamp, height);

        while self.blocks.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.blocks.remove(&oldest);
            self.stats.evictions += 1;
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.order.clear();
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
