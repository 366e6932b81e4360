use coroloop::coroutine::{self, RunnerStats};
use coroloop::time::sleep;
use coroloop::{Error, EventLoop, LoopBuilder, LoopHandle, block_on, go_on, pause, resumer};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn started(name: &str) -> EventLoop {
    let event_loop = EventLoop::new(name).unwrap();
    event_loop.start().unwrap();
    event_loop
}

#[test]
fn test_outside_a_coroutine() {
    assert!(!coroloop::can_yield());
    assert!(resumer().is_none());
    assert!(coroutine::stats().is_none());
    assert!(matches!(pause(), Err(Error::NotYieldable)));
}

#[test]
fn test_go_on_runs_inside_a_coroutine_of_the_target() {
    let event_loop = started("go-on");
    let expected = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    go_on(&event_loop, move || {
        let here = LoopHandle::current() == Some(expected);
        tx.send((coroloop::can_yield(), here)).unwrap();
    })
    .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (true, true));
}

#[test]
fn test_go_on_keeps_submission_order() {
    let event_loop = started("go-on-order");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    for i in 0..50 {
        let seen = seen.clone();
        go_on(&event_loop, move || seen.lock().unwrap().push(i)).unwrap();
    }
    go_on(&event_loop, move || tx.send(()).unwrap()).unwrap();

    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_block_on_returns_the_value() {
    let event_loop = started("block-on");

    let value = block_on(&event_loop, || {
        assert!(coroloop::can_yield());
        6 * 7
    })
    .unwrap();

    assert_eq!(value, 42);
}

#[test]
fn test_block_on_from_the_loop_thread_fails() {
    let event_loop = started("block-on-self");
    let handle = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task(move || {
            let result = block_on(&handle, || ());
            tx.send(matches!(result, Err(Error::InLoopThread(_)))).unwrap();
        })
        .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap());
}

#[test]
fn test_block_on_propagates_panics() {
    let event_loop = started("block-on-panic");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        block_on(&event_loop, || panic!("inside the coroutine"))
    }));
    assert!(outcome.is_err());

    assert_eq!(block_on(&event_loop, || 1).unwrap(), 1);
}

#[test]
fn test_block_on_a_stopped_loop_fails() {
    let event_loop = started("block-on-stopped");
    event_loop.quit_loop();
    event_loop.wait_loop_end().unwrap();

    let result = block_on(&event_loop, || ());
    assert!(matches!(result, Err(Error::NotRunning(_))));
}

#[test]
fn test_resume_from_another_thread() {
    let event_loop = started("cross-resume");

    let (thread_before, thread_after) = block_on(&event_loop, || {
        let before = thread::current().id();
        let resumer = resumer().unwrap();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resumer.resume();
        });

        pause().unwrap();
        (before, thread::current().id())
    })
    .unwrap();

    assert_eq!(thread_before, thread_after);
}

#[test]
fn test_paused_coroutine_lets_others_run() {
    let event_loop = started("interleave");
    let handle = event_loop.handle();

    let order = block_on(&event_loop, move || {
        let order = Arc::new(Mutex::new(Vec::new()));
        let resumer = resumer().unwrap();

        let other = order.clone();
        go_on(&handle, move || {
            other.lock().unwrap().push("other");
            resumer.resume();
        })
        .unwrap();

        order.lock().unwrap().push("before pause");
        pause().unwrap();
        order.lock().unwrap().push("after pause");

        let order = order.lock().unwrap().clone();
        order
    })
    .unwrap();

    assert_eq!(order, vec!["before pause", "other", "after pause"]);
}

#[test]
fn test_stale_resume_is_ignored() {
    let event_loop = started("stale");

    let elapsed = block_on(&event_loop, || {
        let first = resumer().unwrap();
        let wake = first.clone();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            wake.resume();
        });
        pause().unwrap();

        // `first` was consumed by the wake above; resuming it again must
        // not cut the next suspension short.
        first.resume();

        let start = Instant::now();
        sleep(Duration::from_millis(40));
        start.elapsed()
    })
    .unwrap();

    assert!(elapsed >= Duration::from_millis(40), "woke after {elapsed:?}");
}

#[test]
fn test_resumer_of_a_finished_coroutine_does_not_wake_its_successor() {
    let event_loop = started("recycled");
    let handle = event_loop.handle();

    let woke = block_on(&event_loop, move || {
        let (tx, rx) = mpsc::channel();
        go_on(&handle, move || tx.send(resumer().unwrap()).unwrap()).unwrap();
        sleep(Duration::from_millis(10));
        let old = rx.recv().unwrap();

        let woke = Arc::new(AtomicBool::new(false));
        let flag = woke.clone();
        go_on(&handle, move || {
            let _keep = resumer();
            pause().unwrap();
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        sleep(Duration::from_millis(10));

        old.resume();
        sleep(Duration::from_millis(30));
        woke.load(Ordering::SeqCst)
    })
    .unwrap();

    assert!(!woke);
}

#[test]
fn test_resumer_of_a_finished_task_does_not_wake_the_next_task_on_its_stack() {
    let event_loop = started("reused-stack");
    let handle = event_loop.handle();
    let (tx, rx) = mpsc::channel();
    let woke = Arc::new(AtomicBool::new(false));

    // Both coroutines are queued by one task, so the second runs on the
    // stack the first one just finished on.
    let flag = woke.clone();
    event_loop
        .post_task(move || {
            go_on(&handle, move || tx.send(resumer().unwrap()).unwrap()).unwrap();
            go_on(&handle, move || {
                let _keep = resumer();
                pause().unwrap();
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        })
        .unwrap();

    let old = rx.recv_timeout(WAIT).unwrap();
    thread::sleep(Duration::from_millis(20));

    old.resume();
    thread::sleep(Duration::from_millis(50));

    assert!(!woke.load(Ordering::SeqCst));
}

#[test]
fn test_concurrent_resumes_wake_once() {
    let event_loop = started("multi-resume");

    let elapsed = block_on(&event_loop, || {
        let resumer = resumer().unwrap();

        for _ in 0..4 {
            let resumer = resumer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                resumer.resume();
            });
        }
        pause().unwrap();

        let start = Instant::now();
        sleep(Duration::from_millis(50));
        start.elapsed()
    })
    .unwrap();

    assert!(elapsed >= Duration::from_millis(50), "woke after {elapsed:?}");
}

#[test]
fn test_sleep_keeps_the_loop_serving() {
    let event_loop = started("sleep");
    let handle = event_loop.handle();

    let (elapsed, other_ran) = block_on(&event_loop, move || {
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        go_on(&handle, move || flag.store(true, Ordering::SeqCst)).unwrap();

        let start = Instant::now();
        sleep(Duration::from_millis(30));
        (start.elapsed(), ran.load(Ordering::SeqCst))
    })
    .unwrap();

    assert!(elapsed >= Duration::from_millis(30));
    assert!(other_ran);
}

#[test]
fn test_sleep_outside_a_coroutine_blocks() {
    let start = Instant::now();
    sleep(Duration::from_millis(20));
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn test_finished_coroutines_are_parked_up_to_the_limit() {
    let event_loop = LoopBuilder::new()
        .name("parking")
        .max_parked(2)
        .stack_size(64 * 1024)
        .build()
        .unwrap();
    event_loop.start().unwrap();
    let handle = event_loop.handle();

    let stats: RunnerStats = block_on(&event_loop, move || {
        for _ in 0..10 {
            go_on(&handle, || sleep(Duration::from_millis(5))).unwrap();
        }
        sleep(Duration::from_millis(100));
        coroutine::stats().unwrap()
    })
    .unwrap();

    assert!(!stats.on_main);
    assert_eq!(stats.parked, 2);
    assert_eq!(stats.live, stats.parked + 1);
    assert_eq!(stats.local_tasks, 0);
}

#[test]
fn test_panicking_coroutine_does_not_stop_the_loop() {
    let event_loop = started("coroutine-panic");

    go_on(&event_loop, || panic!("coroutine failure")).unwrap();

    assert_eq!(block_on(&event_loop, || "alive").unwrap(), "alive");
}
