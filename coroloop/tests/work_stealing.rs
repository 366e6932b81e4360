use coroloop::{EventLoop, LoopHandle, go};
use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

const TASKS: usize = 1000;

#[test]
fn test_every_spawned_coroutine_runs_exactly_once() {
    let loops: Vec<EventLoop> = (0..4)
        .map(|i| {
            let event_loop = EventLoop::new(format!("stealer-{i}")).unwrap();
            event_loop.start().unwrap();
            event_loop
        })
        .collect();

    let (tx, rx) = mpsc::channel();

    for i in 0..TASKS {
        let tx = tx.clone();
        go(move || {
            let on_loop = LoopHandle::current().is_some();
            tx.send((i, on_loop && coroloop::can_yield())).unwrap();
        });

        // Give the explicit loops a reason to tick and steal.
        if i % 100 == 0 {
            for event_loop in &loops {
                event_loop.post_task(|| {}).unwrap();
            }
        }
    }
    drop(tx);

    let mut seen = HashSet::new();
    for _ in 0..TASKS {
        let (i, in_coroutine) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(in_coroutine);
        assert!(seen.insert(i), "task {i} ran twice");
    }

    assert_eq!(seen.len(), TASKS);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_go_from_a_loop_thread() {
    let event_loop = EventLoop::new("spawner").unwrap();
    event_loop.start().unwrap();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task(move || {
            go(move || tx.send(coroloop::can_yield()).unwrap());
        })
        .unwrap();

    assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
}
