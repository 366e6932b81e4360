use coroloop::sync::{WaitGroup, WaitStatus};
use coroloop::time::sleep;
use coroloop::{Error, EventLoop, block_on, go_on};
use std::thread;
use std::time::{Duration, Instant};

fn started(name: &str) -> EventLoop {
    let event_loop = EventLoop::new(name).unwrap();
    event_loop.start().unwrap();
    event_loop
}

#[test]
fn test_wait_with_nothing_pending_returns_at_once() {
    let group = WaitGroup::new();

    assert_eq!(group.wait(None).unwrap(), WaitStatus::Done);
}

#[test]
fn test_wait_outside_a_coroutine_fails() {
    let group = WaitGroup::new();
    group.add(1);

    assert!(matches!(group.wait(None), Err(Error::NotYieldable)));
}

#[test]
fn test_wait_for_coroutines() {
    let event_loop = started("wg-coroutines");
    let handle = event_loop.handle();

    let (status, count) = block_on(&event_loop, move || {
        let group = WaitGroup::new();

        for delay in [5u64, 15, 25] {
            group.add(1);
            let group = group.clone();
            go_on(&handle, move || {
                sleep(Duration::from_millis(delay));
                group.done();
            })
            .unwrap();
        }

        (group.wait(None).unwrap(), group.count())
    })
    .unwrap();

    assert_eq!(status, WaitStatus::Done);
    assert_eq!(count, 0);
}

#[test]
fn test_wait_for_threads() {
    let event_loop = started("wg-threads");

    let status = block_on(&event_loop, || {
        let group = WaitGroup::new();
        group.add(4);

        for _ in 0..4 {
            let group = group.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                group.done();
            });
        }

        group.wait(Some(Duration::from_secs(5))).unwrap()
    })
    .unwrap();

    assert_eq!(status, WaitStatus::Done);
}

#[test]
fn test_wait_times_out() {
    let event_loop = started("wg-timeout");

    let (status, elapsed, group) = block_on(&event_loop, || {
        let group = WaitGroup::new();
        group.add(1);

        let start = Instant::now();
        let status = group.wait(Some(Duration::from_millis(20))).unwrap();
        (status, start.elapsed(), group)
    })
    .unwrap();

    assert_eq!(status, WaitStatus::TimedOut);
    assert!(elapsed >= Duration::from_millis(20));

    group.done();
    assert_eq!(group.count(), 0);
}

#[test]
fn test_extra_done_is_ignored() {
    let group = WaitGroup::new();
    group.add(1);
    group.done();
    group.done();

    assert_eq!(group.count(), 0);
}
