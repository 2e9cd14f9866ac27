//! Result cache
//!
//! Stores step results keyed by `(image id, fingerprint)`. Entries are evicted
//! least-recently-used first once the entry or byte bound is exceeded, but an
//! entry pinned by an in-flight run is never evicted.
//!
//! The cache also remembers, per image, the chain of `(step id, fingerprint)`
//! links computed by the most recent run. This is what exposes results by
//! step id and what downstream invalidation walks.
//!
//! A single mutex guards the index. It is never held while a step executor
//! runs, so concurrent files only contend on index updates.

use phantast_core::domain::result::StepResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::fingerprint::Fingerprint;

/// Bounds applied to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: Option<usize>,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 512,
            max_bytes: None,
        }
    }
}

/// Counters describing cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
    /// Images whose latest chain is still tracked
    pub images: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    image_id: Uuid,
    fingerprint: Fingerprint,
}

struct Entry {
    result: Arc<StepResult>,
    size: usize,
    pins: usize,
    last_used: u64,
    /// Invalidated while pinned; dropped when the last pin goes away
    doomed: bool,
}

#[derive(Debug, Clone, Copy)]
struct ChainLink {
    /// Position of the step in the execution order
    position: usize,
    step_id: Uuid,
    fingerprint: Fingerprint,
}

#[derive(Default)]
struct Index {
    entries: HashMap<CacheKey, Entry>,
    recency: BTreeMap<u64, CacheKey>,
    chains: HashMap<Uuid, Vec<ChainLink>>,
    tick: u64,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Index {
    fn touch(&mut self, key: CacheKey) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.last_used);
            entry.last_used = tick;
            self.recency.insert(tick, key);
        }
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.last_used);
                self.bytes -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Removes the entry now, or marks it doomed while it is pinned
    fn invalidate(&mut self, key: &CacheKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.pins > 0 => {
                entry.doomed = true;
                return true;
            }
            Some(_) => {}
            None => return false,
        }
        self.remove(key)
    }

    fn over_limits(&self, limits: &CacheLimits) -> bool {
        self.entries.len() > limits.max_entries
            || limits.max_bytes.is_some_and(|max| self.bytes > max)
    }

    /// Forgets an image's chain once none of its links has a live entry
    fn prune_chain(&mut self, image_id: Uuid) {
        let Some(chain) = self.chains.get(&image_id) else {
            return;
        };
        let live = chain.iter().any(|link| {
            self.entries.contains_key(&CacheKey {
                image_id,
                fingerprint: link.fingerprint,
            })
        });
        if !live {
            self.chains.remove(&image_id);
        }
    }

    fn evict(&mut self, limits: &CacheLimits) {
        while self.over_limits(limits) {
            let victim = self
                .recency
                .values()
                .find(|key| self.entries.get(key).is_some_and(|e| e.pins == 0))
                .copied();

            match victim {
                Some(key) => {
                    self.remove(&key);
                    self.prune_chain(key.image_id);
                    self.evictions += 1;
                    tracing::trace!("Evicted cache entry {}", key.fingerprint);
                }
                // Everything left is pinned; retry when a pin is released
                None => break,
            }
        }
    }
}

struct Shared {
    limits: CacheLimits,
    index: Mutex<Index>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded, shareable store of step results
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Clone)]
pub struct ResultCache {
    shared: Arc<Shared>,
}

impl ResultCache {
    /// Creates a cache with the given bounds
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            shared: Arc::new(Shared {
                limits,
                index: Mutex::new(Index::default()),
            }),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.shared.limits
    }

    /// Looks up a result, pinning it until the returned handle is dropped
    pub fn get(&self, image_id: Uuid, fingerprint: Fingerprint) -> Option<PinnedResult> {
        let key = CacheKey {
            image_id,
            fingerprint,
        };
        let mut guard = self.shared.lock();
        let index = &mut *guard;

        let result = match index.entries.get_mut(&key) {
            Some(entry) if !entry.doomed => {
                entry.pins += 1;
                Arc::clone(&entry.result)
            }
            _ => {
                index.misses += 1;
                return None;
            }
        };
        index.hits += 1;
        index.touch(key);

        Some(PinnedResult {
            result,
            key,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Stores a result and returns it pinned
    ///
    /// An existing entry for the same key is replaced.
    pub fn put(&self, image_id: Uuid, fingerprint: Fingerprint, result: StepResult) -> PinnedResult {
        let key = CacheKey {
            image_id,
            fingerprint,
        };
        let result = Arc::new(result);
        let size = result.approximate_size();

        let mut index = self.shared.lock();
        let pins = match index.entries.get(&key) {
            Some(existing) => existing.pins,
            None => 0,
        };
        index.remove(&key);

        index.bytes += size;
        index.entries.insert(
            key,
            Entry {
                result: Arc::clone(&result),
                size,
                pins: pins + 1,
                last_used: 0,
                doomed: false,
            },
        );
        index.touch(key);
        index.evict(&self.shared.limits);

        PinnedResult {
            result,
            key,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Records that `step_id` at `position` of the latest run for `image_id`
    /// resolved to `fingerprint`.
    ///
    /// Links after `position` from earlier runs are discarded.
    pub fn record_step(&self, image_id: Uuid, position: usize, step_id: Uuid, fingerprint: Fingerprint) {
        let mut index = self.shared.lock();
        let chain = index.chains.entry(image_id).or_default();
        chain.retain(|link| link.position < position);
        chain.push(ChainLink {
            position,
            step_id,
            fingerprint,
        });
    }

    /// Forgets the links at and after `position` of the latest run
    pub fn truncate_chain(&self, image_id: Uuid, position: usize) {
        let mut index = self.shared.lock();
        if let Some(chain) = index.chains.get_mut(&image_id) {
            chain.retain(|link| link.position < position);
        }
    }

    /// The result for the most recently computed fingerprint of a step
    pub fn latest(&self, image_id: Uuid, step_id: Uuid) -> Option<Arc<StepResult>> {
        let index = self.shared.lock();
        let link = index
            .chains
            .get(&image_id)?
            .iter()
            .find(|link| link.step_id == step_id)?;
        let key = CacheKey {
            image_id,
            fingerprint: link.fingerprint,
        };
        index
            .entries
            .get(&key)
            .filter(|entry| !entry.doomed)
            .map(|entry| for_step(&entry.result, step_id))
    }

    /// Latest results for an image in execution order
    ///
    /// Stops at the first link whose entry has been evicted.
    pub fn results_for(&self, image_id: Uuid) -> Vec<Arc<StepResult>> {
        let index = self.shared.lock();
        let Some(chain) = index.chains.get(&image_id) else {
            return Vec::new();
        };

        chain
            .iter()
            .enumerate()
            .map_while(|(position, link)| {
                if link.position != position {
                    return None;
                }
                let key = CacheKey {
                    image_id,
                    fingerprint: link.fingerprint,
                };
                index
                    .entries
                    .get(&key)
                    .filter(|entry| !entry.doomed)
                    .map(|entry| for_step(&entry.result, link.step_id))
            })
            .collect()
    }

    /// Drops the cached results of `step_id` and every step after it in the
    /// latest run for `image_id`.
    ///
    /// Returns the number of links invalidated (0 if the step never ran).
    pub fn invalidate_downstream(&self, image_id: Uuid, step_id: Uuid) -> usize {
        let mut index = self.shared.lock();
        let Some(chain) = index.chains.get_mut(&image_id) else {
            return 0;
        };
        let Some(position) = chain.iter().position(|link| link.step_id == step_id) else {
            return 0;
        };

        let dropped: Vec<ChainLink> = chain.drain(position..).collect();
        for link in &dropped {
            index.invalidate(&CacheKey {
                image_id,
                fingerprint: link.fingerprint,
            });
        }
        tracing::debug!(
            "Invalidated {} cached step(s) for image {} from step {}",
            dropped.len(),
            image_id,
            step_id
        );
        dropped.len()
    }

    /// Drops everything cached for one image
    pub fn invalidate_image(&self, image_id: Uuid) -> usize {
        let mut index = self.shared.lock();
        index.chains.remove(&image_id);
        let keys: Vec<CacheKey> = index
            .entries
            .keys()
            .filter(|key| key.image_id == image_id)
            .copied()
            .collect();
        keys.iter().filter(|key| index.invalidate(key)).count()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.shared.lock();
        CacheStats {
            hits: index.hits,
            misses: index.misses,
            evictions: index.evictions,
            entries: index.entries.len(),
            bytes: index.bytes,
            images: index.chains.len(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

/// Results are shared by content; the step id reflects the step asking.
pub(crate) fn for_step(result: &Arc<StepResult>, step_id: Uuid) -> Arc<StepResult> {
    if result.step_id == step_id {
        Arc::clone(result)
    } else {
        Arc::new(StepResult {
            step_id,
            ..StepResult::clone(result)
        })
    }
}

/// A cached result that cannot be evicted while this handle lives
pub struct PinnedResult {
    result: Arc<StepResult>,
    key: CacheKey,
    shared: Arc<Shared>,
}

impl PinnedResult {
    pub fn result(&self) -> &Arc<StepResult> {
        &self.result
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.key.fingerprint
    }
}

impl Deref for PinnedResult {
    type Target = StepResult;

    fn deref(&self) -> &StepResult {
        &self.result
    }
}

impl std::fmt::Debug for PinnedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedResult")
            .field("result", &self.result)
            .field("fingerprint", &self.key.fingerprint)
            .finish()
    }
}

impl Drop for PinnedResult {
    fn drop(&mut self) {
        let mut index = self.shared.lock();
        let release = match index.entries.get_mut(&self.key) {
            // The entry may have been replaced; only the pin count carries over
            Some(entry) => {
                entry.pins = entry.pins.saturating_sub(1);
                entry.pins == 0 && entry.doomed
            }
            None => false,
        };
        if release {
            index.remove(&self.key);
        }
        index.evict(&self.shared.limits);
    }
}
