use crate::utils::fatal;

use libc::{
    _SC_PAGESIZE, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, MAP_STACK, PROT_NONE, PROT_READ,
    PROT_WRITE, c_void, mmap, mprotect, munmap, sysconf,
};
use std::ptr;
use std::sync::OnceLock;

/// Size of one memory page, queried once.
pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { sysconf(_SC_PAGESIZE) };
        if size <= 0 { 4096 } else { size as usize }
    })
}

/// An `mmap`-backed coroutine stack.
///
/// The lowest page is a `PROT_NONE` guard, so an overflow faults instead
/// of silently corrupting a neighbouring allocation. The usable size is
/// rounded up to whole pages.
pub(crate) struct Stack {
    base: *mut c_void,
    /// Total mapping length, guard page included.
    len: usize,
}

impl Stack {
    /// Maps a new stack with at least `size` usable bytes.
    ///
    /// Running out of address space is fatal.
    pub(crate) fn new(size: usize) -> Self {
        let page = page_size();
        let usable = size.max(page).div_ceil(page) * page;
        let len = usable + page;

        let base = unsafe {
            mmap(
                ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_STACK,
                -1,
                0,
            )
        };

        if base == MAP_FAILED {
            fatal(&format!(
                "failed to map a {len} byte coroutine stack: {}",
                std::io::Error::last_os_error()
            ));
        }

        if unsafe { mprotect(base, page, PROT_NONE) } != 0 {
            unsafe { munmap(base, len) };
            fatal(&format!(
                "failed to protect coroutine stack guard page: {}",
                std::io::Error::last_os_error()
            ));
        }

        Self { base, len }
    }

    /// Lowest usable address, just above the guard page.
    pub(crate) fn bottom(&self) -> *mut c_void {
        unsafe { self.base.cast::<u8>().add(page_size()).cast() }
    }

    /// Usable bytes between [`bottom`](Self::bottom) and the top.
    pub(crate) fn size(&self) -> usize {
        self.len - page_size()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe { munmap(self.base, self.len) };
    }
}
