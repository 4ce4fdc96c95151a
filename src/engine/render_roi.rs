//! `render_roi`: one demand-driven render of a node over a pixel window.

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::smallvec;
use tracing::{debug, warn};

use crate::cache::bitmap::RectList;
use crate::cache::image::{Image, ImageKey, ImageParams};
use crate::engine::RenderEngine;
use crate::engine::context::{CallArgs, FrameArgs, InputReroute, RenderContext};
use crate::engine::dispatch::{TileJob, TileStatus, WorkRect};
use crate::engine::reconcile::{PlaneSlot, PlaneToRender, ReconcileArgs, merge_plane_rects};
use crate::engine::stats::StatCounters;
use crate::engine::trimap::{TrimapClaims, wait_for_pending};
use crate::foundation::core::{
    Affine, BitDepth, ImageComponents, MipLevel, NodeId, Rect, Time, ViewIdx,
};
use crate::foundation::error::{FxError, FxResult};
use crate::foundation::math::{RectI, canonical_to_pixel, is_null_rect, union_rect};
use crate::graph::effect::{
    ActionArgs, FramesNeeded, Identity, InputFrame, InputImages, PlanesNeeded,
};
use crate::graph::node::Node;

/// What to render.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub time: Time,
    pub view: ViewIdx,
    pub mip: MipLevel,
    /// Pixel window at `mip`.
    pub roi: RectI,
    /// Planes the caller wants back.
    pub planes: Vec<ImageComponents>,
    /// Depth of the returned images.
    pub depth: BitDepth,
    /// Region of definition already known by the caller; skips the RoD query.
    pub rod: Option<Rect>,
    /// Never read from nor write to the image cache.
    pub bypass_cache: bool,
    /// Inputs already rendered by the caller; skips upstream recursion.
    pub input_images: Option<Arc<InputImages>>,
}

impl RenderRequest {
    /// Full-scale RGBA float request of view 0.
    pub fn new(time: Time, roi: RectI) -> Self {
        Self {
            time,
            view: ViewIdx(0),
            mip: MipLevel::FULL,
            roi,
            planes: vec![ImageComponents::rgba()],
            depth: BitDepth::Float,
            rod: None,
            bypass_cache: false,
            input_images: None,
        }
    }

    pub fn with_view(mut self, view: ViewIdx) -> Self {
        self.view = view;
        self
    }

    pub fn with_mip(mut self, mip: MipLevel) -> Self {
        self.mip = mip;
        self
    }

    pub fn with_planes(mut self, planes: Vec<ImageComponents>) -> Self {
        self.planes = planes;
        self
    }

    pub fn with_depth(mut self, depth: BitDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_rod(mut self, rod: Rect) -> Self {
        self.rod = Some(rod);
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn with_input_images(mut self, inputs: Arc<InputImages>) -> Self {
        self.input_images = Some(inputs);
        self
    }

    fn retimed(&self, time: Time) -> Self {
        Self {
            time,
            rod: None,
            input_images: None,
            ..self.clone()
        }
    }
}

/// Images produced by one render, one per plane.
#[derive(Clone, Debug, Default)]
pub struct RenderOutput {
    planes: BTreeMap<ImageComponents, Arc<Image>>,
}

impl RenderOutput {
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn first(&self) -> Option<&Arc<Image>> {
        self.planes.values().next()
    }

    pub fn get(&self, components: &ImageComponents) -> Option<&Arc<Image>> {
        self.planes.get(components)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageComponents, &Arc<Image>)> {
        self.planes.iter()
    }

    pub(crate) fn insert(&mut self, components: ImageComponents, image: Arc<Image>) {
        self.planes.insert(components, image);
    }

    pub(crate) fn extend(&mut self, other: RenderOutput) {
        self.planes.extend(other.planes);
    }
}

/// Requested planes split by who produces them.
struct PlanePlan {
    /// Distinct planes the node renders itself.
    produced: Vec<ImageComponents>,
    /// `(requested, produced)`: which produced plane answers each requested one.
    mapping: Vec<(ImageComponents, ImageComponents)>,
    passthrough: Vec<ImageComponents>,
}

fn plan_planes(requested: &[ImageComponents], needed: &PlanesNeeded) -> PlanePlan {
    let mut plan = PlanePlan {
        produced: Vec::new(),
        mapping: Vec::new(),
        passthrough: Vec::new(),
    };
    for want in requested {
        let source = needed
            .produced
            .iter()
            .find(|p| *p == want)
            .or_else(|| needed.produced.iter().find(|p| want.can_convert_from(p)));
        match source {
            Some(p) => {
                if !plan.produced.contains(p) {
                    plan.produced.push(p.clone());
                }
                plan.mapping.push((want.clone(), p.clone()));
            }
            None => plan.passthrough.push(want.clone()),
        }
    }
    plan
}

/// Geometry of one call, resolved once the RoD is known.
#[derive(Clone, Copy, Debug)]
struct Windows {
    render_full_scale: bool,
    render_mip: MipLevel,
    /// Requested window clipped to the RoD, at the requested mip. Returned images cover it.
    out_roi: RectI,
    /// Window reconciled at the requested mip.
    roi: RectI,
    /// Window the effect renders, at `render_mip`.
    render_roi: RectI,
}

impl RenderEngine {
    /// Render `node` over `req.roi`, recursing upstream as needed.
    ///
    /// An empty output means the node produces nothing there (null RoD, window outside the RoD,
    /// or unconnected identity input). `Err(FxError::Aborted)` means the render was cancelled;
    /// any partially written cache entries have been evicted.
    #[tracing::instrument(
        level = "debug",
        skip(self, req, ctx),
        fields(node = node.0, time = req.time, mip = req.mip.0, roi = %req.roi)
    )]
    pub fn render_roi(
        &self,
        node: NodeId,
        req: &RenderRequest,
        ctx: &mut RenderContext,
    ) -> FxResult<RenderOutput> {
        if ctx.depth() >= self.opts.max_recursion_depth {
            return Err(FxError::RecursionLimit { depth: ctx.depth() });
        }
        StatCounters::bump(&self.stats.render_calls);
        let n = self.graph.node(node)?;

        let mut frame_scope = ctx.ensure_frame(node, || FrameArgs {
            time: req.time,
            view: req.view,
            requester: node,
            node_hash: n.hash(),
            sequential: false,
            abortable: false,
            user_interaction: false,
            render_age: 0,
        });
        let frame = frame_scope
            .frame_args(node)
            .cloned()
            .ok_or_else(|| FxError::graph(format!("no frame arguments for node {}", node.0)))?;

        let mut call = frame_scope.push_call(
            node,
            CallArgs {
                time: req.time,
                view: req.view,
                mip: req.mip,
                ..CallArgs::default()
            },
        );
        self.render_node(&n, req, &frame, &mut call)
    }

    fn render_node(
        &self,
        n: &Arc<Node>,
        req: &RenderRequest,
        frame: &FrameArgs,
        ctx: &mut RenderContext,
    ) -> FxResult<RenderOutput> {
        let node = n.id();
        let hash = frame.node_hash;
        if let Some(prev) = n.last_rendered()
            && prev != hash
        {
            debug!(node = node.0, "node changed since its last render, dropping stale images");
            self.cache.remove_hash(node, prev);
        }

        let caps = n.capabilities().clone();
        let args = ActionArgs {
            time: req.time,
            view: req.view,
            mip: req.mip,
        };

        let rod = match req.rod {
            Some(r) if is_null_rect(r) => None,
            Some(r) => Some(r),
            None => self.region_of_definition(n, hash, &args, 0),
        };
        let Some(rod) = rod else {
            debug!(node = node.0, "empty region of definition");
            return Ok(RenderOutput::default());
        };

        let identity = self.identity(n, hash, &args, req.roi, rod);
        if let Some(top) = ctx.top_call_mut() {
            top.rod = rod;
            top.identity = identity;
        }
        match identity {
            Identity::Input { input_nb, time } => {
                StatCounters::bump(&self.stats.identity_short_circuits);
                let Some(input) = n.input(input_nb) else {
                    debug!(node = node.0, input_nb, "identity on an unconnected input");
                    return Ok(RenderOutput::default());
                };
                return self.render_roi(input, &req.retimed(time), ctx);
            }
            Identity::SelfAt { time } if time != req.time => {
                StatCounters::bump(&self.stats.identity_short_circuits);
                return self.render_roi(node, &req.retimed(time), ctx);
            }
            Identity::SelfAt { .. } => {
                warn!(node = node.0, "node reported itself as identity at the same time");
            }
            Identity::None => {}
        }

        let connected = n.connected_inputs();
        let needed = n.effect().planes_needed(req.time, req.view, &connected);
        let plan = plan_planes(&req.planes, &needed);

        let mut output = RenderOutput::default();
        if !plan.passthrough.is_empty() {
            match needed.pass_through_input.and_then(|i| n.input(i)) {
                Some(input) => {
                    let sub = RenderRequest {
                        planes: plan.passthrough.clone(),
                        ..req.retimed(req.time)
                    };
                    output.extend(self.render_roi(input, &sub, ctx)?);
                }
                None => debug!(
                    node = node.0,
                    planes = ?plan.passthrough,
                    "planes not produced and no pass-through input"
                ),
            }
        }
        if plan.produced.is_empty() {
            return Ok(output);
        }

        let reroutes = self.concatenate_transforms(n, &args);
        let Some(win) = self.windows(n, req, rod) else {
            return Ok(output);
        };
        let render_args = ActionArgs {
            mip: win.render_mip,
            ..args
        };
        let frames_needed = n.effect().frames_needed(req.time, req.view, &connected);
        if let Some(top) = ctx.top_call_mut() {
            top.mip = win.render_mip;
            top.frames_needed = frames_needed.clone();
            top.reroutes = reroutes.clone();
            top.valid = true;
        }

        let key = ImageKey::new(node, hash, req.time, req.view, caps.frame_varying);
        let use_cache = !(caps.is_writer || req.bypass_cache);
        let rargs = ReconcileArgs {
            key: &key,
            use_cache,
            rod,
            pixel_aspect: caps.pixel_aspect,
            depth: caps.preferred_depth,
            frames_needed: &frames_needed,
            req_mip: req.mip,
            render_full_scale: win.render_full_scale,
            roi: win.roi,
            render_roi: win.render_roi,
        };
        let mut slots = Vec::with_capacity(plan.produced.len());
        let mut rests = Vec::with_capacity(plan.produced.len());
        for comps in &plan.produced {
            let (slot, rest) = self
                .reconcile_plane(&rargs, comps)
                .map_err(|e| self.report_failure(n, e))?;
            slots.push(slot);
            rests.push(rest);
        }

        let mut rects = self.missing_rects(caps.supports_tiles, &rests, win.render_roi);
        let pending = rects.is_empty()
            && use_cache
            && slots.iter().any(|s| match s {
                PlaneSlot::Resident(p) => p.render_mapped().has_pending(win.render_roi),
                PlaneSlot::Released { .. } => false,
            });
        if rects.is_empty() && !pending {
            StatCounters::bump(&self.stats.cache_hits);
            debug!(node = node.0, "served from cache");
        } else if win.render_full_scale {
            for slot in &mut slots {
                self.ensure_full_scale(&rargs, slot)
                    .map_err(|e| self.report_failure(n, e))?;
            }
        }

        let released = slots.iter().any(|s| matches!(s, PlaneSlot::Released { .. }));
        let trimap = self.opts.trimap
            && use_cache
            && !frame.abortable
            && frame.user_interaction
            && !released;

        let mut pending_slots = Some(slots);
        let mut planes: Vec<PlaneToRender> = Vec::new();
        if !released {
            planes = self.reacquire(&key, pending_slots.take().unwrap_or_default())?;
        }

        let transforms: BTreeMap<usize, Affine> =
            reroutes.iter().map(|(i, r)| (*i, r.matrix)).collect();
        let tile_align = if win.render_full_scale {
            req.mip.alignment()
        } else {
            1
        };

        loop {
            let claims =
                (trimap && !rects.is_empty()).then(|| TrimapClaims::claim(&planes, &rects));
            let mut must_wait = match &claims {
                Some(c) => c.pending_elsewhere(),
                // Nothing left for this call but another render still holds part of the window.
                None => {
                    use_cache
                        && rects.is_empty()
                        && planes
                            .iter()
                            .any(|p| p.render_mapped().has_pending(win.render_roi))
                }
            };
            let work_rects = match &claims {
                Some(c) => c.rects(),
                None => rects.clone(),
            };

            if !work_rects.is_empty() {
                if self.is_aborted(n, frame) {
                    drop(claims);
                    if planes.is_empty()
                        || !self.discard_aborted(n, &planes, win.roi, win.render_roi)
                    {
                        return Err(FxError::Aborted);
                    }
                    break;
                }

                let mut inputs = Vec::with_capacity(work_rects.len());
                for r in &work_rects {
                    let imgs = match &req.input_images {
                        Some(pre) => Arc::clone(pre),
                        None => Arc::new(self.render_inputs(
                            n,
                            &render_args,
                            *r,
                            &reroutes,
                            &frames_needed,
                            &needed,
                            ctx,
                        )?),
                    };
                    inputs.push(imgs);
                }

                if planes.is_empty() {
                    planes = self.reacquire(&key, pending_slots.take().unwrap_or_default())?;
                    let rests: Vec<RectList> = planes
                        .iter()
                        .map(|p| p.render_mapped().rest_to_render(win.render_roi))
                        .collect();
                    let now = self.missing_rects(caps.supports_tiles, &rests, win.render_roi);
                    if now.iter().any(|r| !work_rects.iter().any(|w| w.contains(*r))) {
                        debug!(node = node.0, "released entry was lost, widening the render");
                        rects = now;
                        continue;
                    }
                }
                if let Some(top) = ctx.top_call_mut() {
                    top.output_planes = planes
                        .iter()
                        .map(|p| (p.components.clone(), Arc::clone(p.render_mapped())))
                        .collect();
                }

                let work: Vec<WorkRect> = work_rects
                    .iter()
                    .zip(inputs)
                    .map(|(r, imgs)| {
                        let mut snapshot = RenderContext::clone(ctx);
                        if let Some(top) = snapshot.top_call_mut() {
                            top.input_images = Some(Arc::clone(&imgs));
                        }
                        WorkRect {
                            rect: *r,
                            inputs: imgs,
                            ctx: Arc::new(snapshot),
                        }
                    })
                    .collect();

                let job = TileJob {
                    node: n,
                    frame,
                    time: req.time,
                    view: req.view,
                    mip: win.render_mip,
                    depth: caps.preferred_depth,
                    planes: &planes,
                    transforms: &transforms,
                    trimap: claims.is_some(),
                    tile_align,
                };
                match self.dispatch(&job, &work) {
                    TileStatus::Ok => {}
                    TileStatus::TakeImageLock => must_wait = true,
                    TileStatus::Failed(e) => {
                        drop(claims);
                        return Err(e);
                    }
                    TileStatus::Aborted => {
                        drop(claims);
                        if !self.discard_aborted(n, &planes, win.roi, win.render_roi) {
                            return Err(FxError::Aborted);
                        }
                        break;
                    }
                }
                if let Some(c) = claims {
                    c.release(true);
                }

                if self.is_aborted(n, frame)
                    && !self.discard_aborted(n, &planes, win.roi, win.render_roi)
                {
                    return Err(FxError::Aborted);
                }
            }

            if !must_wait {
                break;
            }
            if wait_for_pending(&planes, win.render_roi) {
                break;
            }
            // Another render gave up part of the window: take it over.
            let rests: Vec<RectList> = planes
                .iter()
                .map(|p| p.render_mapped().rest_to_render(win.render_roi))
                .collect();
            rects = self.missing_rects(caps.supports_tiles, &rests, win.render_roi);
            if rects.is_empty() {
                break;
            }
        }

        if planes.is_empty() {
            planes = self.reacquire(&key, pending_slots.take().unwrap_or_default())?;
        }
        for p in &planes {
            if let Some(full) = &p.full_scale
                && !p.image.is_fully_rendered(win.roi)
            {
                p.image.downscale_from(full, win.roi);
                p.image.mark_rendered(win.roi);
            }
        }

        for (want, produced) in &plan.mapping {
            let Some(p) = planes.iter().find(|p| &p.components == produced) else {
                continue;
            };
            let img = if p.image.components() == want && p.image.depth() == req.depth {
                Arc::clone(&p.image)
            } else {
                self.convert_plane(&p.image, want, req.depth, win.out_roi)
                    .map_err(|e| self.report_failure(n, e))?
            };
            output.insert(want.clone(), img);
        }
        n.swap_last_rendered(hash);
        if let Some(top) = ctx.top_call_mut() {
            top.output_planes = output.iter().map(|(c, i)| (c.clone(), Arc::clone(i))).collect();
        }
        Ok(output)
    }

    /// Resolve the working resolution and pixel windows. `None` when the request does not touch
    /// the RoD.
    fn windows(&self, n: &Node, req: &RenderRequest, rod: Rect) -> Option<Windows> {
        let caps = n.capabilities();
        let par = caps.pixel_aspect;
        let render_full_scale = !req.mip.is_full()
            && (!caps.supports_render_scale
                || !caps.supports_multi_resolution
                || n.forces_full_scale());
        let render_mip = if render_full_scale {
            MipLevel::FULL
        } else {
            req.mip
        };
        let rod_px = canonical_to_pixel(rod, req.mip, par);
        let rod_px_render = canonical_to_pixel(rod, render_mip, par);

        let out_roi = req.roi.intersect(rod_px)?;
        if !caps.supports_tiles {
            return Some(Windows {
                render_full_scale,
                render_mip,
                out_roi,
                roi: rod_px,
                render_roi: rod_px_render,
            });
        }
        let render_roi = if render_full_scale {
            out_roi.upscale_pow2(req.mip).intersect(rod_px_render)?
        } else {
            out_roi
        };
        Some(Windows {
            render_full_scale,
            render_mip,
            out_roi,
            roi: out_roi,
            render_roi,
        })
    }

    /// Merge per-plane rests. Effects without tile support always render their whole window.
    fn missing_rects(&self, supports_tiles: bool, rests: &[RectList], window: RectI) -> RectList {
        let rects = merge_plane_rects(rests);
        if !supports_tiles && !rects.is_empty() {
            smallvec![window]
        } else {
            rects
        }
    }

    /// Render every input frame the effect needs for `rect`, recording the RoIs in the current
    /// call arguments.
    #[allow(clippy::too_many_arguments)]
    fn render_inputs(
        &self,
        n: &Node,
        args: &ActionArgs,
        rect: RectI,
        reroutes: &BTreeMap<usize, InputReroute>,
        frames_needed: &FramesNeeded,
        needed: &PlanesNeeded,
        ctx: &mut RenderContext,
    ) -> FxResult<InputImages> {
        let canonical = rect.to_canonical(args.mip, n.capabilities().pixel_aspect);
        let roi_map = self.input_rois(n, args, canonical, reroutes);
        if let Some(top) = ctx.top_call_mut() {
            for (i, r) in &roi_map {
                top.roi_map
                    .entry(*i)
                    .and_modify(|u| *u = union_rect(*u, *r))
                    .or_insert(*r);
            }
        }

        let mut images = InputImages::default();
        for (input_nb, spans) in &frames_needed.0 {
            let Some(roi) = roi_map.get(input_nb) else {
                continue;
            };
            let target = match reroutes.get(input_nb) {
                Some(r) => Some(r.node),
                None => n.input(*input_nb),
            };
            let Some(target) = target else {
                continue;
            };
            let up = self.graph.node(target)?;
            let up_caps = up.capabilities();
            let planes = needed
                .input_planes
                .get(input_nb)
                .cloned()
                .unwrap_or_else(|| vec![up_caps.preferred_components.clone()]);
            let roi_px = canonical_to_pixel(*roi, args.mip, up_caps.pixel_aspect);
            if roi_px.is_empty() {
                continue;
            }

            let domain = self.time_domain(&up, 0);
            let frames = images.0.entry(*input_nb).or_default();
            for span in spans {
                for t in span.within(domain).frames() {
                    if frames.iter().any(|f| f.time == t && f.view == span.view) {
                        continue;
                    }
                    let sub = RenderRequest {
                        time: self.clamp_to_domain(&up, t),
                        view: span.view,
                        mip: args.mip,
                        roi: roi_px,
                        planes: planes.clone(),
                        depth: up_caps.preferred_depth,
                        rod: None,
                        bypass_cache: false,
                        input_images: None,
                    };
                    let output = self.render_roi(target, &sub, ctx)?;
                    frames.push(InputFrame {
                        time: t,
                        view: span.view,
                        output,
                    });
                }
            }
        }
        Ok(images)
    }

    /// Uncached copy of `src` over `roi` in another layout or depth.
    fn convert_plane(
        &self,
        src: &Image,
        components: &ImageComponents,
        depth: BitDepth,
        roi: RectI,
    ) -> FxResult<Arc<Image>> {
        let params = ImageParams {
            bounds: roi,
            components: components.clone(),
            depth,
            ..src.params().clone()
        };
        let img = Image::new(src.key().clone(), params, false)?;
        img.copy_region_from(src, roi);
        img.mark_rendered(roi);
        Ok(Arc::new(img))
    }

    fn report_failure(&self, n: &Node, err: FxError) -> FxError {
        if let FxError::Allocation { bytes } = &err {
            self.diagnostics.allocation_failed(n.id(), n.label(), *bytes);
        }
        err
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/render_roi.rs"]
mod tests;
