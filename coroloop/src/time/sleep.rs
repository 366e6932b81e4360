use crate::coroutine;

use std::thread;
use std::time::Duration;

/// Suspends the calling coroutine for at least `duration`.
///
/// The loop keeps serving I/O, timers and other coroutines meanwhile. Called
/// outside a coroutine there is nothing to suspend, so the thread itself
/// sleeps and a warning is logged. The same blocking fallback applies if
/// the wake-up timer cannot be armed.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// coroloop::go(|| {
///     coroloop::time::sleep(Duration::from_millis(10));
/// });
/// ```
pub fn sleep(duration: Duration) {
    let Some(resumer) = coroutine::resumer() else {
        log::warn!("sleep({duration:?}) outside a coroutine blocks the thread");
        thread::sleep(duration);
        return;
    };

    let owner = resumer.owner().clone();
    if let Err(err) = owner.post_delay_task(duration, move || resumer.resume()) {
        log::warn!("sleep({duration:?}) falls back to blocking: {err}");
        thread::sleep(duration);
        return;
    }

    if let Err(err) = coroutine::pause() {
        log::error!("sleep could not suspend: {err}");
    }
}
