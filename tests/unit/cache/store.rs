use super::*;

use crate::foundation::core::{BitDepth, ImageComponents, MipLevel, ViewIdx};
use crate::foundation::math::RectI;
use crate::graph::effect::FramesNeeded;

fn key(node: u32, hash: u64) -> ImageKey {
    ImageKey::new(NodeId(node), NodeHash(hash), 0.0, ViewIdx(0), true)
}

fn params(side: i32, mip: MipLevel) -> ImageParams {
    let bounds = RectI::new(0, 0, side, side);
    ImageParams {
        rod: bounds.upscale_pow2(mip).to_canonical(MipLevel::FULL, 1.0),
        bounds,
        mip,
        pixel_aspect: 1.0,
        components: ImageComponents::alpha(),
        depth: BitDepth::Byte,
        frames_needed: FramesNeeded::default(),
    }
}

#[test]
fn get_or_create_returns_same_entry_for_same_params() {
    let cache = MemoryImageCache::default();
    let a = cache.get_or_create(&key(0, 1), &params(8, MipLevel::FULL)).unwrap();
    let b = cache.get_or_create(&key(0, 1), &params(8, MipLevel::FULL)).unwrap();
    assert_eq!(a.id(), b.id());
    assert!(a.is_cached());

    let c = cache.get_or_create(&key(0, 1), &params(4, MipLevel(1))).unwrap();
    assert_ne!(a.id(), c.id());
    assert_eq!(cache.lookup(&key(0, 1)).len(), 2);
    assert_eq!(cache.stats().created, 2);
}

#[test]
fn remove_keeps_outstanding_arcs_valid() {
    let cache = MemoryImageCache::default();
    let a = cache.get_or_create(&key(0, 1), &params(8, MipLevel::FULL)).unwrap();
    cache.remove(&a);
    assert!(!cache.contains(a.id()));
    assert!(cache.lookup(&key(0, 1)).is_empty());
    assert_eq!(a.bounds(), RectI::new(0, 0, 8, 8));
}

#[test]
fn remove_hash_only_drops_that_partition() {
    let cache = MemoryImageCache::default();
    cache.get_or_create(&key(0, 1), &params(4, MipLevel::FULL)).unwrap();
    cache.get_or_create(&key(0, 2), &params(4, MipLevel::FULL)).unwrap();
    cache.get_or_create(&key(1, 1), &params(4, MipLevel::FULL)).unwrap();

    cache.remove_hash(NodeId(0), NodeHash(1));
    assert!(cache.lookup(&key(0, 1)).is_empty());
    assert_eq!(cache.lookup(&key(0, 2)).len(), 1);
    assert_eq!(cache.lookup(&key(1, 1)).len(), 1);
}

#[test]
fn lru_eviction_and_pressure_reporting() {
    let cache = MemoryImageCache::new(CacheOpts {
        capacity_bytes: 200,
        near_full_ratio: 0.5,
    });
    let first = cache.get_or_create(&key(0, 1), &params(8, MipLevel::FULL)).unwrap();
    assert!(!cache.is_nearly_full());
    cache.get_or_create(&key(0, 2), &params(8, MipLevel::FULL)).unwrap();
    assert!(cache.is_nearly_full());

    cache.get_or_create(&key(0, 3), &params(8, MipLevel::FULL)).unwrap();
    assert_eq!(cache.stats().entries, 3);

    // Touch the first entry so the second becomes the eviction victim.
    cache.lookup(&key(0, 1));
    cache.get_or_create(&key(0, 4), &params(8, MipLevel::FULL)).unwrap();
    assert!(cache.contains(first.id()));
    assert!(cache.lookup(&key(0, 2)).is_empty());
    assert_eq!(cache.stats().evicted, 1);
}

#[test]
fn oversized_request_is_an_allocation_error() {
    let cache = MemoryImageCache::new(CacheOpts {
        capacity_bytes: 16,
        near_full_ratio: 0.9,
    });
    let err = cache
        .get_or_create(&key(0, 1), &params(8, MipLevel::FULL))
        .unwrap_err();
    assert!(matches!(err, FxError::Allocation { bytes: 64 }));
}
