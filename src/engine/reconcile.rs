//! Cache reconciliation: decide, per plane, which image the effect writes into and which
//! rectangles are still missing.

use std::cmp::Reverse;
use std::sync::Arc;

use smallvec::smallvec;
use tracing::debug;

use crate::cache::bitmap::RectList;
use crate::cache::image::{Image, ImageId, ImageKey, ImageParams};
use crate::engine::RenderEngine;
use crate::engine::opts::PressureGranularity;
use crate::engine::stats::StatCounters;
use crate::foundation::core::{BitDepth, ImageComponents, MipLevel, Rect};
use crate::foundation::error::FxResult;
use crate::foundation::math::{RectI, canonical_to_pixel};
use crate::graph::effect::FramesNeeded;

/// Working set of one plane during a render call.
#[derive(Clone, Debug)]
pub(crate) struct PlaneToRender {
    pub(crate) components: ImageComponents,
    /// Image at the requested mip level; this is what the call returns.
    pub(crate) image: Arc<Image>,
    /// Full-scale image the effect writes into when it cannot render at the requested scale.
    pub(crate) full_scale: Option<Arc<Image>>,
}

impl PlaneToRender {
    /// Image the effect's output is pasted into.
    pub(crate) fn render_mapped(&self) -> &Arc<Image> {
        self.full_scale.as_ref().unwrap_or(&self.image)
    }
}

/// Outcome of reconciling one plane.
#[derive(Debug)]
pub(crate) enum PlaneSlot {
    Resident(PlaneToRender),
    /// A partially rendered entry whose pointer was released under memory pressure. Only its
    /// identity is remembered so it can be found again once inputs are rendered.
    Released {
        components: ImageComponents,
        token: ImageId,
        params: ImageParams,
        /// Requested-scale image when the released entry is the full-scale one.
        downscaled: Option<Arc<Image>>,
    },
}

/// Inputs of the reconciliation shared by every plane of one call.
pub(crate) struct ReconcileArgs<'a> {
    pub(crate) key: &'a ImageKey,
    pub(crate) use_cache: bool,
    pub(crate) rod: Rect,
    pub(crate) pixel_aspect: f64,
    pub(crate) depth: BitDepth,
    pub(crate) frames_needed: &'a FramesNeeded,
    pub(crate) req_mip: MipLevel,
    /// The effect renders at full scale on behalf of a reduced-scale request.
    pub(crate) render_full_scale: bool,
    /// Requested window at `req_mip`.
    pub(crate) roi: RectI,
    /// Window the effect renders, at the render mip level.
    pub(crate) render_roi: RectI,
}

impl ReconcileArgs<'_> {
    fn params(&self, components: &ImageComponents, mip: MipLevel) -> ImageParams {
        ImageParams {
            rod: self.rod,
            bounds: canonical_to_pixel(self.rod, mip, self.pixel_aspect),
            mip,
            pixel_aspect: self.pixel_aspect,
            components: components.clone(),
            depth: self.depth,
            frames_needed: self.frames_needed.clone(),
        }
    }
}

impl RenderEngine {
    /// Reconcile one plane against the cache and return its slot plus the rectangles still
    /// missing, at the render mip level.
    pub(crate) fn reconcile_plane(
        &self,
        a: &ReconcileArgs<'_>,
        components: &ImageComponents,
    ) -> FxResult<(PlaneSlot, RectList)> {
        let image = self.find_or_create(a, components, a.req_mip, a.roi)?;
        if !a.render_full_scale {
            let rest = image.rest_to_render(a.render_roi);
            return Ok(self.apply_pressure(a, components, image, None, rest));
        }

        if image.is_fully_rendered(a.roi) {
            let plane = PlaneToRender {
                components: components.clone(),
                image,
                full_scale: None,
            };
            return Ok((PlaneSlot::Resident(plane), RectList::new()));
        }
        let full = self.find_or_create(a, components, MipLevel::FULL, a.render_roi)?;
        let rest = full.rest_to_render(a.render_roi);
        Ok(self.apply_pressure(a, components, full, Some(image), rest))
    }

    /// Give a plane already complete at the requested scale a full-scale target, so it can
    /// share the rectangles another plane of the same call still renders.
    pub(crate) fn ensure_full_scale(
        &self,
        a: &ReconcileArgs<'_>,
        slot: &mut PlaneSlot,
    ) -> FxResult<()> {
        if let PlaneSlot::Resident(p) = slot
            && p.full_scale.is_none()
        {
            let full = self.find_or_create(a, &p.components, MipLevel::FULL, a.render_roi)?;
            p.full_scale = Some(full);
        }
        Ok(())
    }

    /// Exact cache match, else a converted copy of a finer/wider source, else a fresh entry.
    /// Entries with the same format but incompatible geometry are evicted, never reused.
    fn find_or_create(
        &self,
        a: &ReconcileArgs<'_>,
        components: &ImageComponents,
        mip: MipLevel,
        needed: RectI,
    ) -> FxResult<Arc<Image>> {
        let params = a.params(components, mip);
        if !a.use_cache {
            return Ok(Arc::new(Image::new(a.key.clone(), params, false)?));
        }

        let candidates = self.cache.lookup(a.key);
        let mut exact = None;
        for c in &candidates {
            if c.mip() == mip && c.components() == components && c.depth() == a.depth {
                if c.params() == &params {
                    exact = Some(Arc::clone(c));
                } else {
                    debug!(image = c.id().0, "evicting incompatible cache entry");
                    self.cache.remove(c);
                }
            }
        }
        if let Some(img) = exact {
            return Ok(img);
        }

        let source = candidates
            .iter()
            .filter(|c| {
                c.mip() <= mip
                    && components.is_subset_of(c.components())
                    && c.depth() >= a.depth
                    && self.cache.contains(c.id())
                    && c.is_fully_rendered(needed.upscale_pow2(mip).downscale_pow2(c.mip()))
            })
            .max_by_key(|c| (c.mip(), Reverse(c.components().n_comps())));

        let img = self.cache.get_or_create(a.key, &params)?;
        if let Some(src) = source
            && let Some(region) = needed.intersect(img.bounds())
        {
            debug!(src = src.id().0, dst = img.id().0, "converting cached source");
            if src.mip() == mip {
                img.copy_region_from(src, region);
            } else {
                img.downscale_from(src, region);
            }
            img.mark_rendered(region);
        }
        Ok(img)
    }

    fn apply_pressure(
        &self,
        a: &ReconcileArgs<'_>,
        components: &ImageComponents,
        mapped: Arc<Image>,
        downscaled: Option<Arc<Image>>,
        rest: RectList,
    ) -> (PlaneSlot, RectList) {
        let missing: u64 = rest.iter().map(|r| r.area()).sum();
        let partially_rendered = !rest.is_empty() && missing < a.render_roi.area();
        let policy = self.opts.memory_pressure;
        if policy.enabled && a.use_cache && partially_rendered && self.cache.is_nearly_full() {
            debug!(
                image = mapped.id().0,
                "releasing partially rendered entry under memory pressure"
            );
            StatCounters::bump(&self.stats.pressure_releases);
            let rest = match policy.granularity {
                PressureGranularity::FullWindow => smallvec![a.render_roi],
                PressureGranularity::MissingRects => rest,
            };
            let slot = PlaneSlot::Released {
                components: components.clone(),
                token: mapped.id(),
                params: mapped.params().clone(),
                downscaled,
            };
            return (slot, rest);
        }

        let plane = match downscaled {
            Some(image) => PlaneToRender {
                components: components.clone(),
                image,
                full_scale: Some(mapped),
            },
            None => PlaneToRender {
                components: components.clone(),
                image: mapped,
                full_scale: None,
            },
        };
        (PlaneSlot::Resident(plane), rest)
    }

    /// Turn released slots back into resident planes. The remembered entry is reused when it is
    /// still cached; otherwise a fresh one is created.
    pub(crate) fn reacquire(
        &self,
        key: &ImageKey,
        slots: Vec<PlaneSlot>,
    ) -> FxResult<Vec<PlaneToRender>> {
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                PlaneSlot::Resident(p) => out.push(p),
                PlaneSlot::Released {
                    components,
                    token,
                    params,
                    downscaled,
                } => {
                    let found = self.cache.lookup(key).into_iter().find(|c| c.id() == token);
                    let mapped = match found {
                        Some(img) => {
                            StatCounters::bump(&self.stats.pressure_relookups);
                            img
                        }
                        None => {
                            debug!(token = token.0, "released entry was evicted, recreating");
                            self.cache.get_or_create(key, &params)?
                        }
                    };
                    out.push(match downscaled {
                        Some(image) => PlaneToRender {
                            components,
                            image,
                            full_scale: Some(mapped),
                        },
                        None => PlaneToRender {
                            components,
                            image: mapped,
                            full_scale: None,
                        },
                    });
                }
            }
        }
        Ok(out)
    }
}

/// One rectangle list for all planes: identical lists are kept, differing ones collapse to their
/// common bounding box.
pub(crate) fn merge_plane_rects(per_plane: &[RectList]) -> RectList {
    let Some(first) = per_plane.first() else {
        return RectList::new();
    };
    if per_plane.iter().all(|r| r == first) {
        return first.clone();
    }
    let bbox = RectI::bbox(per_plane.iter().flat_map(|r| r.iter()));
    if bbox.is_empty() {
        RectList::new()
    } else {
        smallvec![bbox]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/reconcile.rs"]
mod tests;
