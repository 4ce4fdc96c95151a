use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::foundation::core::{MipLevel, NodeHash, Rect, Time, TimeKey, ViewIdx};
use crate::graph::effect::{Identity, TimeDomain};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ActionKey {
    time: TimeKey,
    view: ViewIdx,
    mip: MipLevel,
}

#[derive(Clone, Copy, Debug, Default)]
struct Memo {
    rod: Option<Rect>,
    identity: Option<Identity>,
}

struct Inner {
    hash: NodeHash,
    capacity: usize,
    entries: HashMap<ActionKey, Memo>,
    order: VecDeque<ActionKey>,
    time_domain: Option<TimeDomain>,
}

/// Per-node memoization of the idempotent metadata actions.
///
/// Every entry is gated by the hash it was computed under: a lookup with another hash misses,
/// and [`ActionsCache::invalidate_all`] clears everything and adopts the new hash under one lock.
/// Setters are first-writer-wins so racing recursive calls computing the same value are harmless.
pub struct ActionsCache {
    inner: Mutex<Inner>,
}

impl ActionsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                hash: NodeHash::default(),
                capacity: capacity.max(1),
                entries: HashMap::new(),
                order: VecDeque::new(),
                time_domain: None,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.inner();
        inner.capacity = capacity.max(1);
        while inner.order.len() > inner.capacity {
            if let Some(k) = inner.order.pop_front() {
                inner.entries.remove(&k);
            }
        }
    }

    pub fn hash(&self) -> NodeHash {
        self.inner().hash
    }

    pub fn invalidate_all(&self, new_hash: NodeHash) {
        let mut inner = self.inner();
        inner.hash = new_hash;
        inner.entries.clear();
        inner.order.clear();
        inner.time_domain = None;
    }

    fn get(&self, hash: NodeHash, time: Time, view: ViewIdx, mip: MipLevel) -> Option<Memo> {
        let inner = self.inner();
        if inner.hash != hash {
            return None;
        }
        inner
            .entries
            .get(&ActionKey {
                time: TimeKey::new(time),
                view,
                mip,
            })
            .copied()
    }

    fn update(
        &self,
        hash: NodeHash,
        time: Time,
        view: ViewIdx,
        mip: MipLevel,
        f: impl FnOnce(&mut Memo),
    ) {
        let mut inner = self.inner();
        if inner.hash != hash {
            return;
        }
        let key = ActionKey {
            time: TimeKey::new(time),
            view,
            mip,
        };
        if !inner.entries.contains_key(&key) {
            if inner.order.len() >= inner.capacity
                && let Some(old) = inner.order.pop_front()
            {
                inner.entries.remove(&old);
            }
            inner.order.push_back(key);
        }
        f(inner.entries.entry(key).or_default());
    }

    /// Memoized region of definition. A null rectangle means "produces nothing".
    pub fn get_rod(
        &self,
        hash: NodeHash,
        time: Time,
        view: ViewIdx,
        mip: MipLevel,
    ) -> Option<Rect> {
        self.get(hash, time, view, mip)?.rod
    }

    pub fn set_rod(&self, hash: NodeHash, time: Time, view: ViewIdx, mip: MipLevel, rod: Rect) {
        self.update(hash, time, view, mip, |m| {
            m.rod.get_or_insert(rod);
        });
    }

    pub fn get_identity(
        &self,
        hash: NodeHash,
        time: Time,
        view: ViewIdx,
        mip: MipLevel,
    ) -> Option<Identity> {
        self.get(hash, time, view, mip)?.identity
    }

    pub fn set_identity(
        &self,
        hash: NodeHash,
        time: Time,
        view: ViewIdx,
        mip: MipLevel,
        identity: Identity,
    ) {
        self.update(hash, time, view, mip, |m| {
            m.identity.get_or_insert(identity);
        });
    }

    pub fn get_time_domain(&self, hash: NodeHash) -> Option<TimeDomain> {
        let inner = self.inner();
        if inner.hash != hash {
            return None;
        }
        inner.time_domain
    }

    pub fn set_time_domain(&self, hash: NodeHash, domain: TimeDomain) {
        let mut inner = self.inner();
        if inner.hash == hash && inner.time_domain.is_none() {
            inner.time_domain = Some(domain);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/actions_cache.rs"]
mod tests;
