use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::engine::actions_cache::ActionsCache;
use crate::foundation::core::{NodeHash, NodeId};
use crate::foundation::error::{FxError, FxResult};
use crate::graph::effect::{Capabilities, Effect};
use crate::graph::hash::StableHasher;

const DEFAULT_MEMO_ENTRIES: usize = 64;

/// One effect instance in the graph, plus the per-node state the engine needs.
pub struct Node {
    id: NodeId,
    label: String,
    effect: Arc<dyn Effect>,
    caps: Capabilities,
    inputs: RwLock<Vec<Option<NodeId>>>,
    hash: AtomicU64,
    revision: AtomicU64,
    disabled: AtomicBool,
    activated: AtomicBool,
    force_full_scale: AtomicBool,
    sequential_abort: AtomicBool,
    latest_render_age: AtomicU64,
    pub(crate) actions: ActionsCache,
    pub(crate) instance_lock: Mutex<()>,
    last_rendered: Mutex<Option<NodeHash>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("plugin", &self.effect.plugin_id())
            .field("hash", &self.hash())
            .finish()
    }
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn effect(&self) -> &dyn Effect {
        self.effect.as_ref()
    }

    /// Capabilities captured when the node was created.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn hash(&self) -> NodeHash {
        NodeHash(self.hash.load(Ordering::Acquire))
    }

    pub fn input(&self, input_nb: usize) -> Option<NodeId> {
        self.inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(input_nb)
            .copied()
            .flatten()
    }

    pub fn max_input_count(&self) -> usize {
        self.effect.max_input_count()
    }

    /// Indices of the connected inputs.
    pub fn connected_inputs(&self) -> Vec<usize> {
        self.inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.map(|_| i))
            .collect()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// `false` once the node was removed from the graph.
    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// The node treats reduced-scale renders as unsupported and always renders at full scale.
    pub fn forces_full_scale(&self) -> bool {
        self.force_full_scale.load(Ordering::Acquire)
    }

    pub fn set_force_full_scale(&self, v: bool) {
        self.force_full_scale.store(v, Ordering::Release);
    }

    /// Ask every background render requested by this node to stop.
    pub fn abort_sequential(&self) {
        self.sequential_abort.store(true, Ordering::Release);
    }

    pub fn clear_sequential_abort(&self) {
        self.sequential_abort.store(false, Ordering::Release);
    }

    pub fn is_sequential_aborted(&self) -> bool {
        self.sequential_abort.load(Ordering::Acquire)
    }

    pub(crate) fn latest_render_age(&self) -> u64 {
        self.latest_render_age.load(Ordering::Acquire)
    }

    pub(crate) fn bump_render_age(&self, age: u64) {
        self.latest_render_age.fetch_max(age, Ordering::AcqRel);
    }

    pub(crate) fn instance_lock(&self) -> MutexGuard<'_, ()> {
        self.instance_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the recorded "last rendered" hash, returning the previous one.
    pub(crate) fn swap_last_rendered(&self, hash: NodeHash) -> Option<NodeHash> {
        self.last_rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(hash)
    }

    pub(crate) fn last_rendered(&self) -> Option<NodeHash> {
        *self
            .last_rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_hash(&self, hash: NodeHash) {
        let prev = self.hash.swap(hash.0, Ordering::AcqRel);
        if prev != hash.0 || self.actions.hash() != hash {
            self.actions.invalidate_all(hash);
        }
    }
}

/// The node graph: topology provider and content-hash owner.
///
/// Every mutation recomputes the content hashes of the affected nodes; a hash change invalidates
/// the node's memoized actions.
pub struct NodeGraph {
    nodes: RwLock<Vec<Arc<Node>>>,
    memo_entries: AtomicUsize,
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            memo_entries: AtomicUsize::new(DEFAULT_MEMO_ENTRIES),
        }
    }

    fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add_node(&self, label: impl Into<String>, effect: Arc<dyn Effect>) -> NodeId {
        let id = {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            let id = NodeId(nodes.len() as u32);
            let n_inputs = effect.max_input_count();
            let caps = effect.capabilities();
            nodes.push(Arc::new(Node {
                id,
                label: label.into(),
                effect,
                caps,
                inputs: RwLock::new(vec![None; n_inputs]),
                hash: AtomicU64::new(0),
                revision: AtomicU64::new(0),
                disabled: AtomicBool::new(false),
                activated: AtomicBool::new(true),
                force_full_scale: AtomicBool::new(false),
                sequential_abort: AtomicBool::new(false),
                latest_render_age: AtomicU64::new(0),
                actions: ActionsCache::new(self.memo_entries.load(Ordering::Relaxed)),
                instance_lock: Mutex::new(()),
                last_rendered: Mutex::new(None),
            }));
            id
        };
        self.refresh_hashes();
        id
    }

    pub fn node(&self, id: NodeId) -> FxResult<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.0 as usize)
            .cloned()
            .ok_or_else(|| FxError::graph(format!("unknown node {}", id.0)))
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connect output of `src` into input `input_nb` of `dst`.
    pub fn connect(&self, dst: NodeId, input_nb: usize, src: NodeId) -> FxResult<()> {
        let dst_node = self.node(dst)?;
        self.node(src)?;
        if input_nb >= dst_node.max_input_count() {
            return Err(FxError::graph(format!(
                "node '{}' has no input {input_nb}",
                dst_node.label()
            )));
        }
        if src == dst || self.upstream(src)?.contains(&dst) {
            return Err(FxError::graph("connection would create a cycle"));
        }
        dst_node
            .inputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)[input_nb] = Some(src);
        self.refresh_hashes();
        Ok(())
    }

    pub fn disconnect(&self, dst: NodeId, input_nb: usize) -> FxResult<()> {
        let dst_node = self.node(dst)?;
        if let Some(slot) = dst_node
            .inputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(input_nb)
        {
            *slot = None;
        }
        self.refresh_hashes();
        Ok(())
    }

    /// Record a parameter change on `id`.
    pub fn touch(&self, id: NodeId) -> FxResult<()> {
        self.node(id)?.revision.fetch_add(1, Ordering::AcqRel);
        self.refresh_hashes();
        Ok(())
    }

    pub fn set_disabled(&self, id: NodeId, disabled: bool) -> FxResult<()> {
        self.node(id)?.disabled.store(disabled, Ordering::Release);
        self.refresh_hashes();
        Ok(())
    }

    /// Remove a node from rendering. In-flight abortable renders of it observe the change.
    pub fn deactivate(&self, id: NodeId) -> FxResult<()> {
        self.node(id)?.activated.store(false, Ordering::Release);
        self.refresh_hashes();
        Ok(())
    }

    pub(crate) fn set_memo_capacity(&self, entries: usize) {
        self.memo_entries.store(entries, Ordering::Relaxed);
        for n in self.nodes() {
            n.actions.set_capacity(entries);
        }
    }

    /// `id` and every node it (transitively) reads from.
    pub fn upstream(&self, id: NodeId) -> FxResult<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if out.contains(&n) {
                continue;
            }
            out.push(n);
            let node = self.node(n)?;
            stack.extend(node.connected_inputs().into_iter().filter_map(|i| node.input(i)));
        }
        Ok(out)
    }

    /// Recompute every content hash from parameters and upstream hashes.
    pub fn refresh_hashes(&self) {
        let nodes = self.nodes();
        let mut memo = HashMap::<NodeId, NodeHash>::new();
        for n in &nodes {
            compute_hash(&nodes, n.id, &mut memo, 0);
        }
        for n in &nodes {
            if let Some(h) = memo.get(&n.id) {
                n.set_hash(*h);
            }
        }
    }
}

fn compute_hash(
    nodes: &[Arc<Node>],
    id: NodeId,
    memo: &mut HashMap<NodeId, NodeHash>,
    depth: usize,
) -> NodeHash {
    if let Some(h) = memo.get(&id) {
        return *h;
    }
    let Some(node) = nodes.get(id.0 as usize) else {
        return NodeHash::default();
    };
    let mut h = StableHasher::new();
    h.write_u32(id.0);
    h.write_str(node.effect.plugin_id());
    h.write_u64(node.revision.load(Ordering::Acquire));
    h.write_bool(node.is_disabled());
    h.write_bool(node.is_activated());
    let inputs = node
        .inputs
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    h.write_u32(inputs.len() as u32);
    for input in inputs {
        match input {
            // Connections are acyclic; the depth bound only protects against corrupted state.
            Some(up) if depth < nodes.len() => {
                h.write_u8(1);
                h.write_u64(compute_hash(nodes, up, memo, depth + 1).0);
            }
            _ => h.write_u8(0),
        }
    }
    let out = h.finish();
    memo.insert(id, out);
    out
}

#[cfg(test)]
#[path = "../../tests/unit/graph/node.rs"]
mod tests;
