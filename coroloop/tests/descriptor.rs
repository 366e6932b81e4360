use coroloop::{Error, EventLoop, LoopHandle, Ready, WatchedDescriptor, block_on, pause, resumer};
use std::cell::RefCell;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

fn started(name: &str) -> EventLoop {
    let event_loop = EventLoop::new(name).unwrap();
    event_loop.start().unwrap();
    event_loop
}

#[test]
fn test_read_callback_sees_incoming_data() {
    let event_loop = started("readable");
    let (reader, mut writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();

    let received = block_on(&event_loop, move || {
        let here = LoopHandle::current().unwrap();
        let wake = resumer().unwrap();
        let data = Rc::new(RefCell::new(Vec::new()));

        let descriptor = WatchedDescriptor::borrowed(reader.as_raw_fd());
        let sink = data.clone();
        let mut reader = reader;
        descriptor.set_read_callback(move || {
            let mut buf = [0u8; 64];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => sink.borrow_mut().extend_from_slice(&buf[..n]),
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(err) => panic!("read failed: {err}"),
                }
            }
            wake.resume();
        });

        here.install_watched_descriptor(&descriptor).unwrap();
        assert!(descriptor.is_installed());
        assert!(descriptor.is_reading());

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            writer.write_all(b"ping").unwrap();
        });

        pause().unwrap();

        here.remove_watched_descriptor(&descriptor).unwrap();
        assert!(!descriptor.is_installed());

        let received = data.borrow().clone();
        received
    })
    .unwrap();

    assert_eq!(received, b"ping");
}

#[test]
fn test_close_callback_sees_peer_hangup() {
    let event_loop = started("hangup");
    let (reader, writer) = UnixStream::pair().unwrap();

    let closed = block_on(&event_loop, move || {
        let here = LoopHandle::current().unwrap();
        let wake = resumer().unwrap();
        let closed = Rc::new(RefCell::new(false));

        let descriptor = WatchedDescriptor::new(OwnedFd::from(reader));
        let flag = closed.clone();
        descriptor.set_close_callback(move || {
            *flag.borrow_mut() = true;
            wake.resume();
        });
        here.install_watched_descriptor(&descriptor).unwrap();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            drop(writer);
        });

        pause().unwrap();
        here.remove_watched_descriptor(&descriptor).unwrap();

        let closed = *closed.borrow();
        closed
    })
    .unwrap();

    assert!(closed);
}

#[test]
fn test_write_interest_reports_writable() {
    let event_loop = started("writable");
    let (_reader, writer) = UnixStream::pair().unwrap();

    let writable = block_on(&event_loop, move || {
        let here = LoopHandle::current().unwrap();
        let wake = resumer().unwrap();
        let fired = Rc::new(RefCell::new(false));

        let descriptor = WatchedDescriptor::new(OwnedFd::from(writer));
        descriptor.disable_reading();
        descriptor.enable_writing();
        assert_eq!(descriptor.interest(), Ready::WRITABLE);

        let flag = fired.clone();
        descriptor.set_write_callback(move || {
            *flag.borrow_mut() = true;
            wake.resume();
        });
        here.install_watched_descriptor(&descriptor).unwrap();

        pause().unwrap();
        descriptor.disable_all();
        here.remove_watched_descriptor(&descriptor).unwrap();

        let fired = *fired.borrow();
        fired
    })
    .unwrap();

    assert!(writable);
}

#[test]
fn test_install_requires_the_loop_thread() {
    let event_loop = started("off-thread");
    let (reader, _writer) = UnixStream::pair().unwrap();
    let descriptor = WatchedDescriptor::borrowed(reader.as_raw_fd());

    let result = event_loop.install_watched_descriptor(&descriptor);
    assert!(matches!(result, Err(Error::NotInLoopThread(_))));
}

#[test]
fn test_install_and_remove_are_checked() {
    let event_loop = started("checked");
    let (reader, _writer) = UnixStream::pair().unwrap();

    let (twice, removed_twice) = block_on(&event_loop, move || {
        let here = LoopHandle::current().unwrap();
        let descriptor = WatchedDescriptor::new(OwnedFd::from(reader));

        here.install_watched_descriptor(&descriptor).unwrap();
        let twice = here.install_watched_descriptor(&descriptor);

        here.remove_watched_descriptor(&descriptor).unwrap();
        let removed_twice = here.remove_watched_descriptor(&descriptor);

        (
            matches!(twice, Err(Error::AlreadyInstalled(_))),
            matches!(removed_twice, Err(Error::NotInstalled(_))),
        )
    })
    .unwrap();

    assert!(twice);
    assert!(removed_twice);
}
