use coroloop::EventLoop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

fn started(name: &str) -> EventLoop {
    let event_loop = EventLoop::new(name).unwrap();
    event_loop.start().unwrap();
    event_loop
}

#[test]
fn test_one_shot_timer_fires_once() {
    let event_loop = started("one-shot");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    event_loop
        .add_timer(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timer_ids_are_unique() {
    let event_loop = started("ids");

    let first = event_loop.add_timer(Duration::from_secs(60), || {}).unwrap();
    let second = event_loop.add_timer(Duration::from_secs(60), || {}).unwrap();

    assert_ne!(first, second);
}

#[test]
fn test_repeating_timer_fires_until_removed() {
    let event_loop = started("repeating");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    let id = event_loop
        .add_repeating_timer(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    thread::sleep(Duration::from_millis(120));
    event_loop.remove_timer(id).unwrap();
    thread::sleep(Duration::from_millis(30));

    let after_removal = fired.load(Ordering::SeqCst);
    assert!(after_removal >= 3, "fired {after_removal} times");

    thread::sleep(Duration::from_millis(80));
    assert_eq!(fired.load(Ordering::SeqCst), after_removal);
}

#[test]
fn test_removed_timer_never_fires() {
    let event_loop = started("removed");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    let id = event_loop
        .add_timer(Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    event_loop.remove_timer(id).unwrap();

    thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_timer_armed_on_the_loop_thread() {
    let event_loop = started("local-timer");
    let handle = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task(move || {
            let start = Instant::now();
            let armed = handle.add_timer(Duration::from_millis(20), move || {
                tx.send(start.elapsed()).unwrap();
            });
            assert!(armed.is_ok());
        })
        .unwrap();

    let elapsed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(elapsed >= Duration::from_millis(20), "fired after {elapsed:?}");
}

#[test]
fn test_panicking_timer_does_not_stop_repeats() {
    let event_loop = started("panicky");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    let id = event_loop
        .add_repeating_timer(Duration::from_millis(10), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first run fails");
            }
        })
        .unwrap();

    thread::sleep(Duration::from_millis(100));
    event_loop.remove_timer(id).unwrap();

    assert!(fired.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_one_shot_timer_is_not_late() {
    let event_loop = started("punctual");
    let handle = event_loop.handle();
    let (tx, rx) = mpsc::channel();

    event_loop
        .post_task(move || {
            let start = Instant::now();
            let armed = handle.add_timer(Duration::from_millis(500), move || {
                tx.send(start.elapsed()).unwrap();
            });
            assert!(armed.is_ok());
        })
        .unwrap();

    let elapsed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(elapsed >= Duration::from_millis(500), "fired after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(520), "fired after {elapsed:?}");
}
