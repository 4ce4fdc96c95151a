//! On-demand input fetch from inside a render action.

use std::sync::Arc;

use tracing::debug;

use crate::cache::image::Image;
use crate::engine::RenderEngine;
use crate::engine::context::{CallArgs, RenderContext};
use crate::engine::render_roi::{RenderOutput, RenderRequest};
use crate::engine::stats::StatCounters;
use crate::foundation::core::{ImageComponents, MipLevel, NodeId, Rect, Time, ViewIdx};
use crate::foundation::error::FxResult;
use crate::foundation::math::canonical_to_pixel;
use crate::graph::effect::{ActionArgs, Identity};
use crate::graph::node::Node;

fn pick(out: &RenderOutput, components: Option<&ImageComponents>) -> Option<Arc<Image>> {
    match components {
        Some(c) => out.get(c).cloned(),
        None => out.first().cloned(),
    }
}

impl RenderEngine {
    /// Fetch input `input_nb` of `node` at `time`/`view`.
    ///
    /// Inside a render action the context bound to the worker thread supplies the pre-rendered
    /// inputs, the RoIs and the mip level of the running call. Without one (a plugin calling from
    /// its own thread or outside a render), the RoD, identity and RoIs are recomputed at full
    /// scale and the input is rendered in a fresh context.
    pub fn get_image(
        &self,
        node: NodeId,
        input_nb: usize,
        time: Time,
        view: ViewIdx,
        components: Option<&ImageComponents>,
    ) -> FxResult<Option<Arc<Image>>> {
        let n = self.graph.node(node)?;
        let bound = self.contexts.current();
        let call = bound.as_deref().and_then(|c| c.call_args(node)).cloned();
        match (bound, call) {
            (Some(ctx), Some(call)) => {
                self.get_image_in_context(&n, input_nb, time, view, components, &ctx, &call)
            }
            _ => self.get_image_fallback(&n, input_nb, time, view, components),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn get_image_in_context(
        &self,
        n: &Node,
        input_nb: usize,
        time: Time,
        view: ViewIdx,
        components: Option<&ImageComponents>,
        ctx: &RenderContext,
        call: &CallArgs,
    ) -> FxResult<Option<Arc<Image>>> {
        if let Some(pre) = &call.input_images
            && let Some(out) = pre.get(input_nb, time, view)
            && let Some(img) = pick(out, components)
        {
            return Ok(Some(img));
        }

        let target = match call.reroutes.get(&input_nb) {
            Some(r) => Some(r.node),
            None => n.input(input_nb),
        };
        let Some(target) = target else {
            return Ok(None);
        };
        let Some(roi) = call.roi_map.get(&input_nb).copied() else {
            debug!(node = n.id().0, input_nb, "input not in the regions of interest");
            return Ok(None);
        };
        let mut ctx = ctx.clone();
        self.render_input_for(target, roi, call.mip, time, view, components, &mut ctx)
    }

    fn get_image_fallback(
        &self,
        n: &Node,
        input_nb: usize,
        time: Time,
        view: ViewIdx,
        components: Option<&ImageComponents>,
    ) -> FxResult<Option<Arc<Image>>> {
        StatCounters::bump(&self.stats.get_image_fallbacks);
        debug!(node = n.id().0, input_nb, "no render context bound, resolving from scratch");

        let Some(target) = n.input(input_nb) else {
            return Ok(None);
        };
        let args = ActionArgs {
            time,
            view,
            mip: MipLevel::FULL,
        };
        let Some(rod) = self.region_of_definition(n, n.hash(), &args, 0) else {
            return Ok(None);
        };
        let full = canonical_to_pixel(rod, MipLevel::FULL, n.capabilities().pixel_aspect);
        let roi = match self.identity(n, n.hash(), &args, full, rod) {
            Identity::Input { input_nb: i, .. } if i == input_nb => Some(rod),
            _ => self
                .input_rois(n, &args, rod, &Default::default())
                .get(&input_nb)
                .copied(),
        };
        let Some(roi) = roi else {
            return Ok(None);
        };
        let mut ctx = RenderContext::new();
        self.render_input_for(target, roi, MipLevel::FULL, time, view, components, &mut ctx)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_input_for(
        &self,
        target: NodeId,
        roi: Rect,
        mip: MipLevel,
        time: Time,
        view: ViewIdx,
        components: Option<&ImageComponents>,
        ctx: &mut RenderContext,
    ) -> FxResult<Option<Arc<Image>>> {
        let up = self.graph.node(target)?;
        let caps = up.capabilities();
        let planes = match components {
            Some(c) => vec![c.clone()],
            None => vec![caps.preferred_components.clone()],
        };
        let roi_px = canonical_to_pixel(roi, mip, caps.pixel_aspect);
        if roi_px.is_empty() {
            return Ok(None);
        }
        let req = RenderRequest {
            time: self.clamp_to_domain(&up, time),
            view,
            mip,
            roi: roi_px,
            planes,
            depth: caps.preferred_depth,
            rod: None,
            bypass_cache: false,
            input_images: None,
        };
        let out = self.render_roi(target, &req, ctx)?;
        Ok(pick(&out, components))
    }
}
