use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated by a [`RenderEngine`](crate::RenderEngine) since it was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub render_calls: u64,
    pub identity_short_circuits: u64,
    /// Calls fully satisfied by the image cache.
    pub cache_hits: u64,
    pub tiles_rendered: u64,
    pub non_finite_pixels: u64,
    /// `get_image` calls that found no render context bound to the thread.
    pub get_image_fallbacks: u64,
    pub pressure_releases: u64,
    /// Released entries found again after input rendering.
    pub pressure_relookups: u64,
    pub aborts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub(crate) render_calls: AtomicU64,
    pub(crate) identity_short_circuits: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) tiles_rendered: AtomicU64,
    pub(crate) non_finite_pixels: AtomicU64,
    pub(crate) get_image_fallbacks: AtomicU64,
    pub(crate) pressure_releases: AtomicU64,
    pub(crate) pressure_relookups: AtomicU64,
    pub(crate) aborts: AtomicU64,
}

impl StatCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineStats {
            render_calls: get(&self.render_calls),
            identity_short_circuits: get(&self.identity_short_circuits),
            cache_hits: get(&self.cache_hits),
            tiles_rendered: get(&self.tiles_rendered),
            non_finite_pixels: get(&self.non_finite_pixels),
            get_image_fallbacks: get(&self.get_image_fallbacks),
            pressure_releases: get(&self.pressure_releases),
            pressure_relookups: get(&self.pressure_relookups),
            aborts: get(&self.aborts),
        }
    }
}
