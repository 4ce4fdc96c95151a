use super::*;

fn cond(supports_tiles: bool, available_threads: usize, locked: bool) -> DispatchConditions {
    DispatchConditions {
        supports_tiles,
        available_threads,
        exclusive_project_lock: locked,
    }
}

#[test]
fn lock_classes_map_to_their_strategy() {
    let c = cond(true, 8, false);
    assert_eq!(
        select_strategy(ThreadSafety::Unsafe, c),
        ExecutionStrategy::GlobalLock
    );
    assert_eq!(
        select_strategy(ThreadSafety::InstanceSafe, c),
        ExecutionStrategy::InstanceLock
    );
    assert_eq!(
        select_strategy(ThreadSafety::FullySafe, c),
        ExecutionStrategy::Sequential
    );
    assert_eq!(
        select_strategy(ThreadSafety::FullySafeFrame, c),
        ExecutionStrategy::Parallel { tiles: 8 }
    );
}

#[test]
fn fully_safe_frame_degrades_to_sequential() {
    for c in [
        cond(false, 8, false),
        cond(true, 1, false),
        cond(true, 0, false),
        cond(true, 8, true),
    ] {
        assert_eq!(
            select_strategy(ThreadSafety::FullySafeFrame, c),
            ExecutionStrategy::Sequential,
            "{c:?}"
        );
    }
}

#[test]
fn tile_status_merge_prefers_failure_then_abort() {
    let s = TileStatus::Ok
        .merge(TileStatus::TakeImageLock)
        .merge(TileStatus::Aborted);
    assert!(matches!(s, TileStatus::Aborted));
    let s = s.merge(TileStatus::Failed(FxError::action("boom")));
    assert!(matches!(s, TileStatus::Failed(FxError::Action(_))));
    assert!(matches!(
        TileStatus::Ok.merge(TileStatus::TakeImageLock),
        TileStatus::TakeImageLock
    ));
}

#[test]
fn plugin_lock_is_reentrant_on_the_owning_thread() {
    let lock = PluginLock::default();
    let outer = lock.acquire();
    {
        let _inner = lock.acquire();
        assert_eq!(lock.depth(), 2);
    }
    assert_eq!(lock.depth(), 1);
    drop(outer);
    assert_eq!(lock.depth(), 0);
}

#[test]
fn plugin_lock_excludes_other_threads() {
    let lock = Arc::new(PluginLock::default());
    let held = lock.acquire();
    let (tx, rx) = std::sync::mpsc::channel();
    let other = {
        let lock = Arc::clone(&lock);
        std::thread::spawn(move || {
            let _g = lock.acquire();
            tx.send(()).unwrap();
        })
    };
    assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
    drop(held);
    rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    other.join().unwrap();
    assert_eq!(lock.depth(), 0);
}
