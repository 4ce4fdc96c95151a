use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::bitmap::{Bitmap, Claim, PixelState, RectList};
use crate::foundation::core::{
    BitDepth, ImageComponents, MipLevel, NodeHash, NodeId, Rect, Time, TimeKey, ViewIdx,
};
use crate::foundation::error::{FxError, FxResult};
use crate::foundation::math::RectI;
use crate::graph::effect::FramesNeeded;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one image buffer.
///
/// Used as a non-dereferencing token: holding an `ImageId` does not keep the image alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(pub u64);

/// Content key shared by every plane and mip level of one node output.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub node: NodeId,
    pub hash: NodeHash,
    pub time: TimeKey,
    pub view: ViewIdx,
    pub frame_varying: bool,
}

impl ImageKey {
    /// Non frame-varying outputs are keyed at time 0 so one entry serves every frame.
    pub fn new(
        node: NodeId,
        hash: NodeHash,
        time: Time,
        view: ViewIdx,
        frame_varying: bool,
    ) -> Self {
        Self {
            node,
            hash,
            time: TimeKey::new(if frame_varying { time } else { 0.0 }),
            view,
            frame_varying,
        }
    }
}

/// Storage parameters of one image plane.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageParams {
    /// Region of definition in canonical coordinates.
    pub rod: Rect,
    /// Allocated pixel bounds at `mip`.
    pub bounds: RectI,
    pub mip: MipLevel,
    pub pixel_aspect: f64,
    pub components: ImageComponents,
    pub depth: BitDepth,
    pub frames_needed: FramesNeeded,
}

impl ImageParams {
    pub fn byte_size(&self) -> u64 {
        self.bounds
            .area()
            .saturating_mul(self.components.n_comps() as u64)
            .saturating_mul(self.depth.bytes_per_channel())
    }
}

/// A computed (and usually cached) image plane.
///
/// Pixels are `f32`, interleaved, row-major over `bounds`. The rendered-region bitmap has its
/// own mutex and a condition variable that is signalled whenever it changes.
pub struct Image {
    id: ImageId,
    key: ImageKey,
    params: ImageParams,
    cached: bool,
    pixels: RwLock<Vec<f32>>,
    bitmap: Mutex<Bitmap>,
    bitmap_changed: Condvar,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("bounds", &self.params.bounds)
            .field("mip", &self.params.mip)
            .field("components", &self.params.components)
            .field("depth", &self.params.depth)
            .field("cached", &self.cached)
            .finish()
    }
}

impl Image {
    /// Allocate a zeroed image. `cached` records whether it lives in an image cache.
    pub fn new(key: ImageKey, params: ImageParams, cached: bool) -> FxResult<Self> {
        if params.bounds.is_empty() {
            return Err(FxError::validation("image bounds must be non-empty"));
        }
        let len = (params.bounds.area() as usize)
            .checked_mul(params.components.n_comps())
            .ok_or(FxError::Allocation {
                bytes: params.byte_size(),
            })?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| FxError::Allocation {
                bytes: params.byte_size(),
            })?;
        pixels.resize(len, 0.0);

        Ok(Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            key,
            bitmap: Mutex::new(Bitmap::new(params.bounds)),
            params,
            cached,
            pixels: RwLock::new(pixels),
            bitmap_changed: Condvar::new(),
        })
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    pub fn params(&self) -> &ImageParams {
        &self.params
    }

    pub fn bounds(&self) -> RectI {
        self.params.bounds
    }

    pub fn mip(&self) -> MipLevel {
        self.params.mip
    }

    pub fn components(&self) -> &ImageComponents {
        &self.params.components
    }

    pub fn depth(&self) -> BitDepth {
        self.params.depth
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn byte_size(&self) -> u64 {
        self.params.byte_size()
    }

    fn bitmap(&self) -> MutexGuard<'_, Bitmap> {
        self.bitmap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pixels_read(&self) -> RwLockReadGuard<'_, Vec<f32>> {
        self.pixels.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pixels_write(&self) -> RwLockWriteGuard<'_, Vec<f32>> {
        self.pixels.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rectangles of `roi` not yet rendered and not claimed by anybody.
    pub fn rest_to_render(&self, roi: RectI) -> RectList {
        self.bitmap().rest_to_render(roi)
    }

    pub fn is_fully_rendered(&self, roi: RectI) -> bool {
        self.bitmap().is_fully_rendered(roi)
    }

    pub fn has_pending(&self, roi: RectI) -> bool {
        self.bitmap().any(roi, PixelState::Pending)
    }

    /// Atomically claim the unrendered part of `roi` for the caller (trimap).
    pub fn claim(&self, roi: RectI) -> Claim {
        self.bitmap().claim(roi)
    }

    /// Mark `rect` as rendered and wake waiters.
    pub fn mark_rendered(&self, rect: RectI) {
        self.bitmap().set(rect, PixelState::Rendered);
        self.bitmap_changed.notify_all();
    }

    /// Forget the rendered state of `rect` and wake waiters.
    pub fn mark_unrendered(&self, rect: RectI) {
        self.bitmap().set(rect, PixelState::Unrendered);
        self.bitmap_changed.notify_all();
    }

    /// Release pending marks inside `rects`: rendered on success, back to unrendered on failure.
    pub fn release_claim(&self, rects: &[RectI], success: bool) {
        {
            let mut bm = self.bitmap();
            let to = if success {
                PixelState::Rendered
            } else {
                PixelState::Unrendered
            };
            for r in rects {
                bm.replace(*r, PixelState::Pending, to);
            }
        }
        self.bitmap_changed.notify_all();
    }

    /// Block until no pixel of `roi` is pending. Returns `true` when `roi` ended up fully
    /// rendered, `false` when another render released its claim as failed.
    pub fn wait_pending(&self, roi: RectI) -> bool {
        let mut bm = self.bitmap();
        while bm.any(roi, PixelState::Pending) {
            bm = self
                .bitmap_changed
                .wait(bm)
                .unwrap_or_else(PoisonError::into_inner);
        }
        bm.is_fully_rendered(roi)
    }

    /// Read access to the pixels.
    pub fn read(&self) -> PixelsRead<'_> {
        PixelsRead {
            bounds: self.params.bounds,
            n_comps: self.params.components.n_comps(),
            guard: self.pixels_read(),
        }
    }
}

/// Shared read view over an image's pixels.
pub struct PixelsRead<'a> {
    bounds: RectI,
    n_comps: usize,
    guard: RwLockReadGuard<'a, Vec<f32>>,
}

impl PixelsRead<'_> {
    pub fn bounds(&self) -> RectI {
        self.bounds
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<&[f32]> {
        if !self.bounds.contains_point(x, y) {
            return None;
        }
        let i = pixel_offset(self.bounds, self.n_comps, x, y);
        Some(&self.guard[i..i + self.n_comps])
    }
}

pub(crate) fn pixel_offset(bounds: RectI, n_comps: usize, x: i32, y: i32) -> usize {
    (((y - bounds.y1) as usize) * (bounds.width() as usize) + (x - bounds.x1) as usize) * n_comps
}

/// Scratch buffer a render action writes into for one tile of one plane.
#[derive(Clone, Debug)]
pub struct PlaneBuffer {
    bounds: RectI,
    components: ImageComponents,
    depth: BitDepth,
    data: Vec<f32>,
}

impl PlaneBuffer {
    pub fn new(bounds: RectI, components: ImageComponents, depth: BitDepth) -> FxResult<Self> {
        let len = (bounds.area() as usize) * components.n_comps();
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| FxError::Allocation {
            bytes: (len as u64).saturating_mul(depth.bytes_per_channel()),
        })?;
        data.resize(len, 0.0);
        Ok(Self {
            bounds,
            components,
            depth,
            data,
        })
    }

    pub fn bounds(&self) -> RectI {
        self.bounds
    }

    pub fn components(&self) -> &ImageComponents {
        &self.components
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<&[f32]> {
        if !self.bounds.contains_point(x, y) {
            return None;
        }
        let n = self.components.n_comps();
        let i = pixel_offset(self.bounds, n, x, y);
        Some(&self.data[i..i + n])
    }

    pub fn pixel_mut(&mut self, x: i32, y: i32) -> Option<&mut [f32]> {
        if !self.bounds.contains_point(x, y) {
            return None;
        }
        let n = self.components.n_comps();
        let i = pixel_offset(self.bounds, n, x, y);
        Some(&mut self.data[i..i + n])
    }

    /// Set every pixel to `value` (missing trailing channels are zero).
    pub fn fill(&mut self, value: &[f32]) {
        let n = self.components.n_comps();
        for px in self.data.chunks_exact_mut(n) {
            for (c, v) in px.iter_mut().enumerate() {
                *v = value.get(c).copied().unwrap_or(0.0);
            }
        }
    }

    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn count_non_finite(&self) -> usize {
        self.data.iter().filter(|v| !v.is_finite()).count()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/image.rs"]
mod tests;
