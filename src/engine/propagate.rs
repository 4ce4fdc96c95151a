//! RoD / identity / time-domain resolution, transform concatenation and per-input RoIs.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::engine::RenderEngine;
use crate::engine::context::InputReroute;
use crate::foundation::core::{Affine, NodeHash, Rect, Time};
use crate::foundation::math::{
    RectI, clip_infinite_edges, has_infinite_edge, is_null_rect, is_well_formed, union_rect,
};
use crate::graph::effect::{ActionArgs, Identity, RoiMap, TimeDomain};
use crate::graph::node::Node;

impl RenderEngine {
    /// Memoized region of definition of `node`. `None` means the node produces nothing.
    ///
    /// Plugin failures are absorbed here: they log and yield `None`. Infinite edges are clipped
    /// against the union of the input RoDs, or the project format for generators.
    pub(crate) fn region_of_definition(
        &self,
        node: &Node,
        hash: NodeHash,
        args: &ActionArgs,
        depth: usize,
    ) -> Option<Rect> {
        if let Some(r) = node.actions.get_rod(hash, args.time, args.view, args.mip) {
            return (!is_null_rect(r)).then_some(r);
        }
        if depth >= self.opts.max_recursion_depth {
            warn!(node = node.id().0, depth, "RoD recursion limit reached");
            return None;
        }

        let mut input_rods = BTreeMap::new();
        for i in node.connected_inputs() {
            let Some(up) = node.input(i).and_then(|id| self.graph.node(id).ok()) else {
                continue;
            };
            if let Some(r) = self.region_of_definition(&up, up.hash(), args, depth + 1) {
                input_rods.insert(i, r);
            }
        }

        let rod = if node.is_disabled() {
            input_rods.get(&0).copied()
        } else {
            match node.effect().region_of_definition(args, &input_rods) {
                Ok(r) => r,
                Err(e) => {
                    debug!(node = node.id().0, error = %e, "RoD action failed, treating as empty");
                    None
                }
            }
        };
        let rod = rod.filter(|r| {
            let ok = is_well_formed(*r);
            if !ok {
                warn!(node = node.id().0, ?r, "ignoring malformed region of definition");
            }
            ok
        });
        let rod = rod.map(|r| {
            if has_infinite_edge(r) {
                let clip = input_rods
                    .values()
                    .copied()
                    .reduce(union_rect)
                    .unwrap_or_else(|| self.opts.project_format.rect());
                clip_infinite_edges(r, clip)
            } else {
                r
            }
        });

        node.actions.set_rod(
            hash,
            args.time,
            args.view,
            args.mip,
            rod.unwrap_or(Rect::ZERO),
        );
        rod.filter(|r| !is_null_rect(*r))
    }

    /// Memoized identity query. A disabled node is identity on its first input; a failing query
    /// is logged and treated as "not identity".
    pub(crate) fn identity(
        &self,
        node: &Node,
        hash: NodeHash,
        args: &ActionArgs,
        roi: RectI,
        rod: Rect,
    ) -> Identity {
        if node.is_disabled() {
            return Identity::Input {
                input_nb: 0,
                time: args.time,
            };
        }
        if let Some(id) = node.actions.get_identity(hash, args.time, args.view, args.mip) {
            return id;
        }
        let id = match node.effect().is_identity(args, roi, rod) {
            Ok(id) => id,
            Err(e) => {
                warn!(node = node.id().0, error = %e, "identity query failed, rendering normally");
                Identity::None
            }
        };
        node.actions
            .set_identity(hash, args.time, args.view, args.mip, id);
        id
    }

    /// Memoized frame range of `node`.
    pub(crate) fn time_domain(&self, node: &Node, depth: usize) -> TimeDomain {
        let hash = node.hash();
        if let Some(d) = node.actions.get_time_domain(hash) {
            return d;
        }
        if depth >= self.opts.max_recursion_depth {
            return TimeDomain::UNBOUNDED;
        }
        let inputs: Vec<TimeDomain> = node
            .connected_inputs()
            .into_iter()
            .filter_map(|i| node.input(i))
            .filter_map(|id| self.graph.node(id).ok())
            .map(|up| self.time_domain(&up, depth + 1))
            .collect();
        let d = node.effect().time_domain(&inputs);
        node.actions.set_time_domain(hash, d);
        d
    }

    /// Fold chains of transform nodes feeding inputs that can apply a matrix themselves.
    ///
    /// For each such input the walk follows `transform()` upstream while nodes can transform,
    /// accumulating `acc = acc * T`. Inputs whose chain folded at least one node are rerouted to
    /// the first node that does not transform.
    pub(crate) fn concatenate_transforms(
        &self,
        node: &Node,
        args: &ActionArgs,
    ) -> BTreeMap<usize, InputReroute> {
        let mut out = BTreeMap::new();
        for i in node.connected_inputs() {
            if !node.effect().input_can_receive_transform(i) {
                continue;
            }
            let Some(mut cur) = node.input(i).and_then(|id| self.graph.node(id).ok()) else {
                continue;
            };
            let mut acc = Affine::IDENTITY;
            let mut folded = 0usize;
            while folded < self.opts.max_recursion_depth
                && cur.capabilities().can_transform
                && !cur.is_disabled()
            {
                let t = match cur.effect().transform(args) {
                    Ok(Some(t)) => t,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(node = cur.id().0, error = %e, "transform action failed");
                        break;
                    }
                };
                let Some(next) = cur.input(t.input_nb).and_then(|id| self.graph.node(id).ok())
                else {
                    break;
                };
                acc = acc * t.matrix;
                folded += 1;
                cur = next;
            }
            if folded > 0 {
                debug!(
                    node = node.id().0,
                    input = i,
                    to = cur.id().0,
                    folded,
                    "concatenated transforms"
                );
                out.insert(
                    i,
                    InputReroute {
                        node: cur.id(),
                        matrix: acc,
                    },
                );
            }
        }
        out
    }

    /// Canonical region needed from each input to produce `output`, with rerouted inputs mapped
    /// back through their concatenated matrix.
    pub(crate) fn input_rois(
        &self,
        node: &Node,
        args: &ActionArgs,
        output: Rect,
        reroutes: &BTreeMap<usize, InputReroute>,
    ) -> RoiMap {
        let connected = node.connected_inputs();
        let mut map = node.effect().regions_of_interest(args, output, &connected);
        for (i, r) in reroutes {
            if let Some(roi) = map.get_mut(i) {
                *roi = r.matrix.inverse().transform_rect_bbox(*roi);
            }
        }
        map.retain(|_, r| !is_null_rect(*r));
        map
    }

    /// Clamp `time` into the frame range of `node`.
    pub(crate) fn clamp_to_domain(&self, node: &Node, time: Time) -> Time {
        let d = self.time_domain(node, 0);
        if d.first <= d.last {
            time.clamp(d.first, d.last)
        } else {
            time
        }
    }
}
