use tracing::debug;

use crate::engine::RenderEngine;
use crate::engine::context::FrameArgs;
use crate::engine::reconcile::PlaneToRender;
use crate::engine::stats::StatCounters;
use crate::foundation::math::RectI;
use crate::graph::node::Node;

impl RenderEngine {
    /// Advisory abort predicate for a render of `node` within `frame`.
    ///
    /// Interactive abortable renders stop when the node changed, the playhead moved, the node was
    /// removed, or a newer request from the same requester superseded them. Background sequential
    /// renders stop when their requester raised its abort flag. Anything else runs to completion.
    pub(crate) fn is_aborted(&self, node: &Node, frame: &FrameArgs) -> bool {
        let Ok(requester) = self.graph.node(frame.requester) else {
            return false;
        };
        if frame.abortable && frame.user_interaction {
            node.hash() != frame.node_hash
                || self.timeline.current_frame() != frame.time
                || !node.is_activated()
                || frame.render_age < requester.latest_render_age()
        } else {
            frame.sequential && requester.is_sequential_aborted()
        }
    }

    /// Discard the partial output of an aborted call.
    ///
    /// Returns `true` when every plane was already fully rendered over `roi` (at the requested
    /// scale) or `render_roi` (at the render scale); the result is then still valid and kept.
    pub(crate) fn discard_aborted(
        &self,
        node: &Node,
        planes: &[PlaneToRender],
        roi: RectI,
        render_roi: RectI,
    ) -> bool {
        let already_rendered = planes.iter().all(|p| {
            p.image.is_fully_rendered(roi)
                || p
                    .full_scale
                    .as_ref()
                    .is_some_and(|f| f.is_fully_rendered(render_roi))
        });
        if already_rendered {
            debug!(node = node.id().0, "abort observed after the image was rendered");
            return true;
        }
        StatCounters::bump(&self.stats.aborts);
        debug!(node = node.id().0, "render aborted, evicting partial images");
        for p in planes {
            for img in std::iter::once(&p.image).chain(p.full_scale.as_ref()) {
                if img.is_cached() {
                    self.cache.remove(img);
                }
            }
        }
        false
    }
}
