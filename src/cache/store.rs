use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::image::{Image, ImageId, ImageKey, ImageParams};
use crate::foundation::core::{NodeHash, NodeId};
use crate::foundation::error::{FxError, FxResult};

/// Contract of the shared image cache.
///
/// Implementations synchronise per entry; the engine never assumes it owns a cached image across
/// calls. An entry is never replaced in place: an incompatible entry is removed and a new one
/// created.
pub trait ImageCache: Send + Sync {
    /// Every image stored under `key` (all planes, depths and mip levels).
    fn lookup(&self, key: &ImageKey) -> Vec<Arc<Image>>;

    /// Return the entry under `key` whose parameters match `params`, creating it if needed.
    fn get_or_create(&self, key: &ImageKey, params: &ImageParams) -> FxResult<Arc<Image>>;

    /// Drop one image from the cache. Outstanding `Arc`s stay valid.
    fn remove(&self, image: &Image);

    /// Drop every entry a node produced under `hash`.
    fn remove_hash(&self, node: NodeId, hash: NodeHash);

    /// Whether the cache is close enough to its budget that callers should not keep partially
    /// rendered entries alive.
    fn is_nearly_full(&self) -> bool;

    fn contains(&self, id: ImageId) -> bool;
}

/// In-memory cache configuration.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheOpts {
    /// Maximum bytes retained across all entries.
    pub capacity_bytes: u64,
    /// Fraction of `capacity_bytes` above which the cache reports itself nearly full.
    pub near_full_ratio: f64,
}

impl Default for CacheOpts {
    fn default() -> Self {
        Self {
            capacity_bytes: 1 << 30,
            near_full_ratio: 0.9,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub created: u64,
    pub evicted: u64,
}

struct Entry {
    image: Arc<Image>,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ImageKey, Vec<Entry>>,
    bytes: u64,
    tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn touch(&mut self) -> u64 {
        self.tick = self.tick.wrapping_add(1);
        self.tick
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&ImageKey, &Image) -> bool) {
        let mut freed = 0u64;
        let mut count = 0u64;
        self.entries.retain(|k, list| {
            list.retain(|e| {
                let drop = pred(k, &e.image);
                if drop {
                    freed += e.image.byte_size();
                    count += 1;
                }
                !drop
            });
            !list.is_empty()
        });
        self.bytes = self.bytes.saturating_sub(freed);
        self.stats.evicted += count;
    }

    /// Evict least recently used entries until `incoming` more bytes fit.
    fn make_room(&mut self, incoming: u64, capacity: u64) {
        while self.bytes.saturating_add(incoming) > capacity {
            let oldest = self
                .entries
                .values()
                .flat_map(|l| l.iter())
                .min_by_key(|e| e.last_used)
                .map(|e| e.image.id());
            let Some(id) = oldest else {
                break;
            };
            self.remove_where(|_, img| img.id() == id);
        }
    }
}

/// Bounded in-memory [`ImageCache`] with least-recently-used eviction.
pub struct MemoryImageCache {
    opts: CacheOpts,
    inner: Mutex<Inner>,
}

impl MemoryImageCache {
    pub fn new(opts: CacheOpts) -> Self {
        Self {
            opts,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner();
        CacheStats {
            entries: inner.entries.values().map(Vec::len).sum(),
            bytes: inner.bytes,
            ..inner.stats
        }
    }

    pub fn clear(&self) {
        self.inner().remove_where(|_, _| true);
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::new(CacheOpts::default())
    }
}

impl ImageCache for MemoryImageCache {
    fn lookup(&self, key: &ImageKey) -> Vec<Arc<Image>> {
        let mut inner = self.inner();
        let now = inner.touch();
        match inner.entries.get_mut(key) {
            Some(list) => list
                .iter_mut()
                .map(|e| {
                    e.last_used = now;
                    Arc::clone(&e.image)
                })
                .collect(),
            None => Vec::new(),
        }
    }

    fn get_or_create(&self, key: &ImageKey, params: &ImageParams) -> FxResult<Arc<Image>> {
        let mut inner = self.inner();
        let now = inner.touch();
        if let Some(list) = inner.entries.get_mut(key)
            && let Some(e) = list.iter_mut().find(|e| e.image.params() == params)
        {
            e.last_used = now;
            return Ok(Arc::clone(&e.image));
        }

        let bytes = params.byte_size();
        if bytes > self.opts.capacity_bytes {
            return Err(FxError::Allocation { bytes });
        }
        inner.make_room(bytes, self.opts.capacity_bytes);

        let image = Arc::new(Image::new(key.clone(), params.clone(), true)?);
        inner.bytes = inner.bytes.saturating_add(bytes);
        inner.stats.created += 1;
        inner.entries.entry(key.clone()).or_default().push(Entry {
            image: Arc::clone(&image),
            last_used: now,
        });
        Ok(image)
    }

    fn remove(&self, image: &Image) {
        let id = image.id();
        self.inner().remove_where(|_, img| img.id() == id);
    }

    fn remove_hash(&self, node: NodeId, hash: NodeHash) {
        self.inner()
            .remove_where(|k, _| k.node == node && k.hash == hash);
    }

    fn is_nearly_full(&self) -> bool {
        let bytes = self.inner().bytes;
        bytes as f64 >= self.opts.capacity_bytes as f64 * self.opts.near_full_ratio
    }

    fn contains(&self, id: ImageId) -> bool {
        self.inner()
            .entries
            .values()
            .any(|l| l.iter().any(|e| e.image.id() == id))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
