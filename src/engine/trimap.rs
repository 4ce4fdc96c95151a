//! Partial-render conflict avoidance for non-abortable interactive renders.
//!
//! Before dispatch the caller claims the unrendered part of its window on every plane (pixels
//! flip to pending). Other threads asking for the same pixels see them pending, skip them, and
//! wait on the image's condition variable once their own share is done.

use std::sync::Arc;

use crate::cache::bitmap::RectList;
use crate::cache::image::Image;
use crate::engine::reconcile::{PlaneToRender, merge_plane_rects};
use crate::foundation::math::RectI;

/// Claims taken by one render call. Released as failed on drop unless released explicitly.
pub(crate) struct TrimapClaims {
    claims: Vec<(Arc<Image>, RectList)>,
    pending_elsewhere: bool,
    released: bool,
}

impl TrimapClaims {
    pub(crate) fn claim(planes: &[PlaneToRender], rects: &[RectI]) -> Self {
        let mut claims = Vec::with_capacity(planes.len());
        let mut pending_elsewhere = false;
        for p in planes {
            let img = p.render_mapped();
            let mut mine = RectList::new();
            for r in rects {
                let c = img.claim(*r);
                pending_elsewhere |= c.pending_elsewhere;
                mine.extend(c.claimed);
            }
            claims.push((Arc::clone(img), mine));
        }
        Self {
            claims,
            pending_elsewhere,
            released: false,
        }
    }

    /// Rectangles this call now owns, merged across planes.
    pub(crate) fn rects(&self) -> RectList {
        let per_plane: Vec<RectList> = self.claims.iter().map(|(_, r)| r.clone()).collect();
        merge_plane_rects(&per_plane)
    }

    /// Part of the window is being rendered by another call.
    pub(crate) fn pending_elsewhere(&self) -> bool {
        self.pending_elsewhere
    }

    /// Unmark the claimed pixels: rendered on success, unrendered otherwise. Wakes waiters.
    pub(crate) fn release(mut self, success: bool) {
        self.release_all(success);
    }

    fn release_all(&mut self, success: bool) {
        if self.released {
            return;
        }
        self.released = true;
        for (img, rects) in &self.claims {
            img.release_claim(rects, success);
        }
    }
}

impl Drop for TrimapClaims {
    fn drop(&mut self) {
        self.release_all(false);
    }
}

/// Block until no pixel of `region` is pending on any plane. Returns `true` when every plane
/// ended up fully rendered over `region`.
pub(crate) fn wait_for_pending(planes: &[PlaneToRender], region: RectI) -> bool {
    planes
        .iter()
        .map(|p| p.render_mapped().wait_pending(region))
        .fold(true, |acc, ok| acc && ok)
}

#[cfg(test)]
#[path = "../../tests/unit/engine/trimap.rs"]
mod tests;
