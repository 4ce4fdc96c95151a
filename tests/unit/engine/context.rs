use super::*;

fn frame(time: Time) -> FrameArgs {
    FrameArgs {
        time,
        view: ViewIdx(0),
        requester: NodeId(9),
        node_hash: NodeHash(0),
        sequential: false,
        abortable: true,
        user_interaction: true,
        render_age: 1,
    }
}

fn call(rod_w: f64) -> CallArgs {
    CallArgs {
        rod: Rect::new(0.0, 0.0, rod_w, rod_w),
        valid: true,
        ..CallArgs::default()
    }
}

#[test]
fn begin_frame_assigns_each_node_its_own_hash() {
    let mut ctx = RenderContext::new();
    let scope = ctx.begin_frame(
        &[(NodeId(1), NodeHash(10)), (NodeId(2), NodeHash(20))],
        frame(3.0),
    );
    assert_eq!(scope.frame_args(NodeId(1)).unwrap().node_hash, NodeHash(10));
    assert_eq!(scope.frame_args(NodeId(2)).unwrap().node_hash, NodeHash(20));
    assert!(scope.frame_args(NodeId(3)).is_none());
    drop(scope);
    assert!(ctx.frame_args(NodeId(1)).is_none());
}

#[test]
fn identical_nested_frames_stack_through_validity() {
    let mut ctx = RenderContext::new();
    let nodes = [(NodeId(1), NodeHash(10))];
    let mut outer = ctx.begin_frame(&nodes, frame(1.0));
    {
        let inner = outer.begin_frame(&nodes, frame(1.0));
        assert_eq!(inner.frames.len(), 1);
        assert_eq!(inner.frames[0].validity, 2);
    }
    assert_eq!(outer.frames[0].validity, 1);
    assert!(outer.frame_args(NodeId(1)).is_some());
}

#[test]
fn innermost_frame_wins_and_unwinds() {
    let mut ctx = RenderContext::new();
    let nodes = [(NodeId(1), NodeHash(10))];
    let mut outer = ctx.begin_frame(&nodes, frame(1.0));
    {
        let inner = outer.begin_frame(&nodes, frame(2.0));
        assert_eq!(inner.frame_args(NodeId(1)).unwrap().time, 2.0);
    }
    assert_eq!(outer.frame_args(NodeId(1)).unwrap().time, 1.0);
}

#[test]
fn ensure_frame_only_pushes_when_absent() {
    let mut ctx = RenderContext::new();
    let nodes = [(NodeId(1), NodeHash(10))];
    let mut outer = ctx.begin_frame(&nodes, frame(1.0));
    {
        let scope = outer.ensure_frame(NodeId(1), || frame(7.0));
        assert_eq!(scope.frame_args(NodeId(1)).unwrap().time, 1.0);
    }
    {
        let scope = outer.ensure_frame(NodeId(2), || frame(7.0));
        assert_eq!(scope.frame_args(NodeId(2)).unwrap().time, 7.0);
    }
    assert!(outer.frame_args(NodeId(2)).is_none());
}

#[test]
fn call_scope_pops_on_every_exit_path() {
    fn fails(ctx: &mut RenderContext) -> Result<(), ()> {
        let scope = ctx.push_call(NodeId(4), call(8.0));
        assert_eq!(scope.depth(), 1);
        Err(())
    }

    let mut ctx = RenderContext::new();
    assert!(fails(&mut ctx).is_err());
    assert_eq!(ctx.depth(), 0);
    assert!(ctx.call_args(NodeId(4)).is_none());
}

#[test]
fn nested_calls_resolve_innermost_and_skip_invalid() {
    let mut ctx = RenderContext::new();
    let mut outer = ctx.push_call(NodeId(1), call(4.0));
    {
        let mut inner = outer.push_call(NodeId(1), call(8.0));
        assert_eq!(inner.call_args(NodeId(1)).unwrap().rod.width(), 8.0);
        inner.top_call_mut().unwrap().valid = false;
        assert_eq!(inner.call_args(NodeId(1)).unwrap().rod.width(), 4.0);
        assert_eq!(inner.depth(), 2);
    }
    assert_eq!(outer.depth(), 1);
}

#[test]
fn thread_bindings_are_per_thread_and_stacked() {
    let table = ContextTable::default();
    assert!(table.current().is_none());

    let a = Arc::new(RenderContext::new());
    let b = Arc::new(RenderContext::new());
    let _ga = table.bind(Arc::clone(&a));
    {
        let _gb = table.bind(Arc::clone(&b));
        assert!(Arc::ptr_eq(&table.current().unwrap(), &b));
        std::thread::scope(|s| {
            s.spawn(|| assert!(table.current().is_none()));
        });
    }
    assert!(Arc::ptr_eq(&table.current().unwrap(), &a));
}
