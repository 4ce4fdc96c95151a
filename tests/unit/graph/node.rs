use super::*;

use crate::foundation::core::{MipLevel, Rect, ViewIdx};
use crate::graph::effect::RenderActionArgs;

struct Noop {
    inputs: usize,
}

impl Effect for Noop {
    fn plugin_id(&self) -> &str {
        "test.noop"
    }

    fn max_input_count(&self) -> usize {
        self.inputs
    }

    fn render(&self, _args: &mut RenderActionArgs<'_>) -> FxResult<()> {
        Ok(())
    }
}

fn graph3() -> (NodeGraph, NodeId, NodeId, NodeId) {
    let g = NodeGraph::new();
    let a = g.add_node("a", Arc::new(Noop { inputs: 0 }));
    let b = g.add_node("b", Arc::new(Noop { inputs: 1 }));
    let c = g.add_node("c", Arc::new(Noop { inputs: 2 }));
    g.connect(b, 0, a).unwrap();
    g.connect(c, 0, b).unwrap();
    (g, a, b, c)
}

#[test]
fn touching_a_node_changes_downstream_hashes_only() {
    let (g, a, b, c) = graph3();
    let before: Vec<_> = [a, b, c].iter().map(|id| g.node(*id).unwrap().hash()).collect();

    g.touch(b).unwrap();
    let after: Vec<_> = [a, b, c].iter().map(|id| g.node(*id).unwrap().hash()).collect();

    assert_eq!(before[0], after[0]);
    assert_ne!(before[1], after[1]);
    assert_ne!(before[2], after[2]);
}

#[test]
fn hash_change_invalidates_memoized_actions() {
    let (g, a, _, _) = graph3();
    let node = g.node(a).unwrap();
    let h = node.hash();
    node.actions
        .set_rod(h, 0.0, ViewIdx(0), MipLevel(0), Rect::new(0.0, 0.0, 4.0, 4.0));
    assert!(node.actions.get_rod(h, 0.0, ViewIdx(0), MipLevel(0)).is_some());

    g.touch(a).unwrap();
    let h2 = node.hash();
    assert_ne!(h, h2);
    assert_eq!(node.actions.hash(), h2);
    assert!(node.actions.get_rod(h2, 0.0, ViewIdx(0), MipLevel(0)).is_none());
}

#[test]
fn connect_rejects_cycles_and_bad_inputs() {
    let (g, a, b, c) = graph3();
    assert!(matches!(g.connect(b, 0, c), Err(FxError::Graph(_))));
    assert!(matches!(g.connect(a, 0, c), Err(FxError::Graph(_))));
    assert!(matches!(g.connect(c, 1, c), Err(FxError::Graph(_))));
    assert!(g.connect(c, 1, a).is_ok());
    assert_eq!(g.node(c).unwrap().connected_inputs(), vec![0, 1]);
}

#[test]
fn upstream_walks_every_input() {
    let (g, a, b, c) = graph3();
    let mut up = g.upstream(c).unwrap();
    up.sort();
    assert_eq!(up, vec![a, b, c]);
    g.disconnect(c, 0).unwrap();
    assert_eq!(g.upstream(c).unwrap(), vec![c]);
}

#[test]
fn disabling_changes_hash_and_is_observable() {
    let (g, _, b, _) = graph3();
    let node = g.node(b).unwrap();
    let h = node.hash();
    g.set_disabled(b, true).unwrap();
    assert!(node.is_disabled());
    assert_ne!(node.hash(), h);
    g.set_disabled(b, false).unwrap();
    assert_eq!(node.hash(), h);
}

#[test]
fn unknown_node_is_a_graph_error() {
    let g = NodeGraph::new();
    assert!(g.is_empty());
    assert!(matches!(g.node(NodeId(3)), Err(FxError::Graph(_))));
}
