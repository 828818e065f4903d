use core::ptr::NonNull;

use super::{HeapSource, MapSource};
use crate::ptr_utils::align_up;

/// Grows the process heap by moving the program break with `sbrk(2)`.
///
/// The first growth pads the break up to [`ALIGN`](crate::ALIGN). Nothing else
/// in the process may move the break while this heap is in use; if that is
/// detected, growth fails instead of handing out discontiguous memory.
#[derive(Debug)]
pub struct Sbrk {
    /// Where the break is expected to be, zero before the first growth.
    brk: usize,
}

impl Sbrk {
    /// Create a heap that takes over the program break on first use.
    pub const fn new() -> Self {
        Self { brk: 0 }
    }
}

impl Default for Sbrk {
    fn default() -> Self {
        Self::new()
    }
}

fn sbrk(increment: libc::intptr_t) -> Option<*mut u8> {
    let prev = unsafe { libc::sbrk(increment) };

    if prev as isize == -1 {
        None
    } else {
        Some(prev.cast())
    }
}

unsafe impl HeapSource for Sbrk {
    fn grow(&mut self, size: usize) -> Option<NonNull<u8>> {
        let increment = libc::intptr_t::try_from(size).ok()?;

        if self.brk == 0 {
            let current = sbrk(0)? as usize;
            let padding = align_up(current) - current;
            if padding != 0 {
                sbrk(padding as libc::intptr_t)?;
            }
            self.brk = current + padding;
        } else if sbrk(0)? as usize != self.brk {
            // someone else moved the break, our heap can't be extended
            return None;
        }

        let base = sbrk(increment)?;

        if base as usize != self.brk {
            // the break moved between the check and the growth, hand the bytes back
            sbrk(-increment);
            return None;
        }

        self.brk += size;
        NonNull::new(base)
    }
}

/// Creates a private anonymous `mmap(2)` mapping per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mmap;

unsafe impl MapSource for Mmap {
    fn map(&mut self, size: usize) -> Option<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return None;
        }

        NonNull::new(ptr.cast())
    }

    unsafe fn unmap(&mut self, base: NonNull<u8>, size: usize) {
        let result = libc::munmap(base.as_ptr().cast(), size);

        // using debug_assert may result in allocations and thus would be reentrant
        #[cfg(debug_assertions)]
        if result != 0 {
            libc::abort();
        }
        #[cfg(not(debug_assertions))]
        let _ = result;
    }
}
