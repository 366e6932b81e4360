use coroloop::{Error, EventLoop, LoopBuilder, LoopHandle, LoopState};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn started(name: &str) -> EventLoop {
    let event_loop = EventLoop::new(name).unwrap();
    event_loop.start().unwrap();
    event_loop
}

#[test]
fn test_builder_applies_name() {
    let event_loop = LoopBuilder::new().name("configured").build().unwrap();

    assert_eq!(event_loop.name(), "configured");
    assert_eq!(event_loop.state(), LoopState::Initializing);
}

#[test]
fn test_posting_before_start_fails() {
    let event_loop = EventLoop::new("not-started").unwrap();

    let result = event_loop.post_task(|| {});
    assert!(matches!(result, Err(Error::NotRunning(_))));
}

#[test]
fn test_start_is_idempotent() {
    let event_loop = started("twice");

    event_loop.start().unwrap();
    assert_eq!(event_loop.state(), LoopState::Started);
}

#[test]
fn test_tasks_run_in_posting_order() {
    let event_loop = started("fifo");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    for i in 0..200 {
        let seen = seen.clone();
        event_loop
            .post_task(move || seen.lock().unwrap().push(i))
            .unwrap();
    }
    event_loop.post_task(move || tx.send(()).unwrap()).unwrap();

    rx.recv_timeout(WAIT).unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..200).collect::<Vec<_>>());
}

#[test]
fn test_tasks_run_on_the_loop_thread() {
    let event_loop = started("identity");
    let expected = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task(move || {
            let current = LoopHandle::current();
            tx.send((
                current == Some(expected.clone()),
                expected.is_in_loop_thread(),
                thread::current().name().map(str::to_owned),
            ))
            .unwrap();
        })
        .unwrap();

    let (same_loop, in_thread, name) = rx.recv_timeout(WAIT).unwrap();
    assert!(same_loop);
    assert!(in_thread);
    assert_eq!(name.as_deref(), Some("identity"));
    assert!(!event_loop.is_in_loop_thread());
}

#[test]
fn test_task_posted_from_the_loop_runs_later() {
    let event_loop = started("nested");
    let handle = event_loop.handle();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    let outer = order.clone();
    event_loop
        .post_task(move || {
            let inner = outer.clone();
            handle
                .post_task(move || {
                    inner.lock().unwrap().push("nested");
                    tx.send(()).unwrap();
                })
                .unwrap();
            outer.lock().unwrap().push("outer");
        })
        .unwrap();

    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["outer", "nested"]);
}

#[test]
fn test_reply_runs_on_the_calling_loop_after_the_task() {
    let caller = started("caller");
    let worker = started("worker");
    let caller_handle = caller.handle();
    let worker_handle = worker.handle();
    let (tx, rx) = mpsc::channel();

    caller
        .post_task(move || {
            let finished = Arc::new(Mutex::new(false));
            let set = finished.clone();
            let expected = caller_handle.clone();
            let worker_check = worker_handle.clone();

            worker_handle
                .post_task_and_reply(
                    move || {
                        assert!(worker_check.is_in_loop_thread());
                        thread::sleep(Duration::from_millis(20));
                        *set.lock().unwrap() = true;
                    },
                    move || {
                        let on_caller = LoopHandle::current() == Some(expected);
                        tx.send((on_caller, *finished.lock().unwrap())).unwrap();
                    },
                )
                .unwrap();
        })
        .unwrap();

    let (on_caller, task_finished) = rx.recv_timeout(WAIT).unwrap();
    assert!(on_caller);
    assert!(task_finished);
}

#[test]
fn test_reply_without_calling_loop_runs_on_the_target() {
    let event_loop = started("reply-target");
    let expected = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task_and_reply(
            || {},
            move || tx.send(LoopHandle::current() == Some(expected)).unwrap(),
        )
        .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap());
}

#[test]
fn test_reply_still_runs_when_the_task_panics() {
    let event_loop = started("reply-panic");
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task_and_reply(|| panic!("task failure"), move || tx.send(()).unwrap())
        .unwrap();

    rx.recv_timeout(WAIT).unwrap();
}

#[test]
fn test_delayed_task_waits_for_its_delay() {
    let event_loop = started("delay");
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();

    event_loop
        .post_delay_task(Duration::from_millis(50), move || {
            tx.send(start.elapsed()).unwrap();
        })
        .unwrap();

    let elapsed = rx.recv_timeout(WAIT).unwrap();
    assert!(elapsed >= Duration::from_millis(50), "fired after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(70), "fired after {elapsed:?}");
}

#[test]
fn test_delayed_tasks_fire_in_deadline_order() {
    let event_loop = started("delay-order");
    let (tx, rx) = mpsc::channel();

    for delay in [60u64, 20, 40] {
        let tx = tx.clone();
        event_loop
            .post_delay_task(Duration::from_millis(delay), move || tx.send(delay).unwrap())
            .unwrap();
    }

    let order: Vec<u64> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    assert_eq!(order, vec![20, 40, 60]);
}

#[test]
fn test_panicking_task_does_not_stop_the_loop() {
    let event_loop = started("survivor");
    let (tx, rx) = mpsc::channel();

    event_loop.post_task(|| panic!("boom")).unwrap();
    event_loop.post_task(move || tx.send(7).unwrap()).unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
    assert_eq!(event_loop.state(), LoopState::Started);
}

#[test]
fn test_quit_stops_the_loop() {
    let event_loop = started("quit");

    event_loop.quit_loop();
    event_loop.wait_loop_end().unwrap();

    assert_eq!(event_loop.state(), LoopState::Stopped);
    assert!(matches!(
        event_loop.post_task(|| {}),
        Err(Error::NotRunning(_))
    ));
}

#[test]
fn test_quit_from_inside_the_loop() {
    let event_loop = started("self-quit");
    let handle = event_loop.handle();

    event_loop
        .post_task(move || handle.quit_loop())
        .unwrap();

    event_loop.wait_loop_end().unwrap();
    assert_eq!(event_loop.state(), LoopState::Stopped);
}

#[test]
fn test_wait_loop_end_on_the_loop_thread_fails() {
    let event_loop = started("self-wait");
    let handle = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task(move || {
            let result = handle.wait_loop_end();
            tx.send(matches!(result, Err(Error::InLoopThread(_)))).unwrap();
        })
        .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap());
}

#[test]
fn test_drop_joins_the_loop_thread() {
    let event_loop = started("dropped");
    let handle = event_loop.handle();

    drop(event_loop);

    assert_eq!(handle.state(), LoopState::Stopped);
}

#[test]
fn test_loops_have_distinct_ids() {
    let first = EventLoop::new("first").unwrap();
    let second = EventLoop::new("second").unwrap();

    assert_ne!(first.id(), second.id());
    assert_ne!(first.handle(), second.handle());
    assert_eq!(first.handle(), first.handle());
}
