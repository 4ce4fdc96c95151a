//! Render context: the per-frame and per-call state a render carries down its recursion.
//!
//! The context is an explicit value threaded by `&mut` through `render_roi`. Scopes push onto it
//! and pop on drop, so every exit path (including `?`) restores the caller's view. Worker threads
//! never share a context: the dispatch layer snapshots it and binds the snapshot to the worker in
//! a [`ContextTable`] for the duration of one tile.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;

use crate::cache::image::Image;
use crate::foundation::core::{
    Affine, ImageComponents, MipLevel, NodeHash, NodeId, Rect, Time, ViewIdx,
};
use crate::graph::effect::{FramesNeeded, Identity, InputImages, RoiMap};

/// Frame-level arguments, set once per rendered frame for every node of the upstream tree.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameArgs {
    pub time: Time,
    pub view: ViewIdx,
    /// Node the frame was requested on (viewer, writer...).
    pub requester: NodeId,
    /// Content hash of the node this entry belongs to when the frame started.
    pub node_hash: NodeHash,
    /// Background sequential render (playback, disk write).
    pub sequential: bool,
    pub abortable: bool,
    pub user_interaction: bool,
    /// Monotonic age of the frame request; newer requests supersede older abortable ones.
    pub render_age: u64,
}

#[derive(Clone, Debug)]
struct FrameEntry {
    node: NodeId,
    args: FrameArgs,
    validity: u32,
}

/// Input `input_nb` is read from `node` through `matrix` instead of through the transform chain
/// in between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputReroute {
    pub node: NodeId,
    pub matrix: Affine,
}

/// Arguments of one `render_roi` invocation.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    pub time: Time,
    pub view: ViewIdx,
    /// Mip level the effect renders at.
    pub mip: MipLevel,
    pub rod: Rect,
    pub roi_map: RoiMap,
    pub identity: Identity,
    pub frames_needed: FramesNeeded,
    pub output_planes: BTreeMap<ImageComponents, Arc<Image>>,
    pub reroutes: BTreeMap<usize, InputReroute>,
    /// Inputs pre-rendered for the rectangle currently being computed.
    pub input_images: Option<Arc<InputImages>>,
    /// Set once the call arguments are resolved; readers ignore invalid entries.
    pub valid: bool,
}

/// Stack of frame and call arguments for one render recursion.
#[derive(Clone, Debug, Default)]
pub struct RenderContext {
    frames: Vec<FrameEntry>,
    calls: Vec<(NodeId, CallArgs)>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `render_roi` nesting depth.
    pub fn depth(&self) -> usize {
        self.calls.len()
    }

    /// Innermost frame arguments pushed for `node`.
    pub fn frame_args(&self, node: NodeId) -> Option<&FrameArgs> {
        self.frames
            .iter()
            .rev()
            .find(|e| e.node == node && e.validity > 0)
            .map(|e| &e.args)
    }

    /// Innermost valid call arguments of `node`.
    pub fn call_args(&self, node: NodeId) -> Option<&CallArgs> {
        self.calls
            .iter()
            .rev()
            .find(|(n, c)| *n == node && c.valid)
            .map(|(_, c)| c)
    }

    /// Arguments of the innermost call, valid or not.
    pub(crate) fn top_call_mut(&mut self) -> Option<&mut CallArgs> {
        self.calls.last_mut().map(|(_, c)| c)
    }

    fn push_frame_entry(&mut self, node: NodeId, args: FrameArgs) {
        if let Some(top) = self.frames.iter_mut().rev().find(|e| e.node == node)
            && top.args == args
        {
            top.validity += 1;
            return;
        }
        self.frames.push(FrameEntry {
            node,
            args,
            validity: 1,
        });
    }

    fn pop_frame_entry(&mut self, node: NodeId) {
        let Some(pos) = self.frames.iter().rposition(|e| e.node == node) else {
            return;
        };
        let e = &mut self.frames[pos];
        e.validity = e.validity.saturating_sub(1);
        if e.validity == 0 {
            self.frames.remove(pos);
        }
    }

    /// Begin a frame for every `(node, hash)` of an upstream tree. `template.node_hash` is
    /// replaced by each node's own hash.
    pub fn begin_frame(
        &mut self,
        nodes: &[(NodeId, NodeHash)],
        template: FrameArgs,
    ) -> FrameScope<'_> {
        let mut pushed = Vec::with_capacity(nodes.len());
        for &(node, hash) in nodes {
            self.push_frame_entry(
                node,
                FrameArgs {
                    node_hash: hash,
                    ..template.clone()
                },
            );
            pushed.push(node);
        }
        FrameScope { ctx: self, pushed }
    }

    /// Push frame arguments for `node` only when none are visible yet.
    pub(crate) fn ensure_frame(
        &mut self,
        node: NodeId,
        make: impl FnOnce() -> FrameArgs,
    ) -> FrameScope<'_> {
        let mut pushed = Vec::new();
        if self.frame_args(node).is_none() {
            self.push_frame_entry(node, make());
            pushed.push(node);
        }
        FrameScope { ctx: self, pushed }
    }

    pub(crate) fn push_call(&mut self, node: NodeId, args: CallArgs) -> CallScope<'_> {
        self.calls.push((node, args));
        CallScope { ctx: self }
    }
}

/// Frame arguments pushed for a set of nodes; popped on drop.
pub struct FrameScope<'a> {
    ctx: &'a mut RenderContext,
    pushed: Vec<NodeId>,
}

impl Deref for FrameScope<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &RenderContext {
        self.ctx
    }
}

impl DerefMut for FrameScope<'_> {
    fn deref_mut(&mut self) -> &mut RenderContext {
        self.ctx
    }
}

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        for node in self.pushed.iter().rev() {
            self.ctx.pop_frame_entry(*node);
        }
    }
}

/// One `render_roi` call's arguments; popped on drop.
pub struct CallScope<'a> {
    ctx: &'a mut RenderContext,
}

impl Deref for CallScope<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &RenderContext {
        self.ctx
    }
}

impl DerefMut for CallScope<'_> {
    fn deref_mut(&mut self) -> &mut RenderContext {
        self.ctx
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        if let Some((_, mut args)) = self.ctx.calls.pop() {
            args.output_planes.clear();
            args.valid = false;
        }
    }
}

/// Render contexts bound to worker threads by the dispatch layer.
///
/// A thread may hold several bindings when a tile it runs recursively dispatches more work; the
/// most recent one is current.
#[derive(Debug, Default)]
pub(crate) struct ContextTable {
    bound: Mutex<HashMap<ThreadId, Vec<Arc<RenderContext>>>>,
}

impl ContextTable {
    pub(crate) fn bind(&self, ctx: Arc<RenderContext>) -> ThreadBinding<'_> {
        let thread = std::thread::current().id();
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(thread)
            .or_default()
            .push(ctx);
        ThreadBinding {
            table: self,
            thread,
        }
    }

    /// Context bound to the calling thread, if any.
    pub(crate) fn current(&self) -> Option<Arc<RenderContext>> {
        let thread = std::thread::current().id();
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&thread)
            .and_then(|s| s.last().cloned())
    }
}

pub(crate) struct ThreadBinding<'a> {
    table: &'a ContextTable,
    thread: ThreadId,
}

impl Drop for ThreadBinding<'_> {
    fn drop(&mut self) {
        let mut bound = self
            .table
            .bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(stack) = bound.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                bound.remove(&self.thread);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/context.rs"]
mod tests;
