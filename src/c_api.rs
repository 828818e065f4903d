//! C-callable allocator symbols over one process-wide allocator.
//!
//! The heap is the program break, so nothing else in the process may call
//! `brk`/`sbrk` (including another `malloc`) once these are in use. Should the
//! break move anyway, heap growth fails and the functions return null.
//!
//! Failures of any kind are reported as null, as with `malloc(3)`.

use core::ffi::c_void;
use core::ptr::null_mut;

use crate::{AssumeUnlockable, Mmap, Sbrk, Segalloc, Segallock};

static SEGALLOCK: Segallock<AssumeUnlockable, Sbrk, Mmap> = Segalloc::new(Sbrk::new(), Mmap).lock();

/// Allocate `size` bytes. Returns null if `size` is zero, too large, or memory is exhausted.
#[no_mangle]
pub extern "C" fn smalloc(size: usize) -> *mut c_void {
    SEGALLOCK.lock().malloc(size).map_or(null_mut(), |nn| nn.as_ptr().cast())
}

/// Allocate `num * size` zeroed bytes.
#[no_mangle]
pub extern "C" fn scalloc(num: usize, size: usize) -> *mut c_void {
    SEGALLOCK.lock().calloc(num, size).map_or(null_mut(), |nn| nn.as_ptr().cast())
}

/// Release `p`. Null is ignored.
///
/// # Safety
/// `p` must be null or a pointer returned by these functions and not since released.
#[no_mangle]
pub unsafe extern "C" fn sfree(p: *mut c_void) {
    SEGALLOCK.lock().free(p.cast())
}

/// Resize `oldp` to `size` bytes. On failure `oldp` is left untouched.
///
/// # Safety
/// `oldp` must be null or a live pointer returned by these functions.
#[no_mangle]
pub unsafe extern "C" fn srealloc(oldp: *mut c_void, size: usize) -> *mut c_void {
    SEGALLOCK.lock().realloc(oldp.cast(), size).map_or(null_mut(), |nn| nn.as_ptr().cast())
}

/// See [`Segalloc::num_free_blocks`].
#[no_mangle]
pub extern "C" fn _num_free_blocks() -> usize {
    SEGALLOCK.lock().num_free_blocks()
}

/// See [`Segalloc::num_free_bytes`].
#[no_mangle]
pub extern "C" fn _num_free_bytes() -> usize {
    SEGALLOCK.lock().num_free_bytes()
}

/// See [`Segalloc::num_allocated_blocks`].
#[no_mangle]
pub extern "C" fn _num_allocated_blocks() -> usize {
    SEGALLOCK.lock().num_allocated_blocks()
}

/// See [`Segalloc::num_allocated_bytes`].
#[no_mangle]
pub extern "C" fn _num_allocated_bytes() -> usize {
    SEGALLOCK.lock().num_allocated_bytes()
}

/// See [`Segalloc::num_meta_data_bytes`].
#[no_mangle]
pub extern "C" fn _num_meta_data_bytes() -> usize {
    SEGALLOCK.lock().num_meta_data_bytes()
}

/// See [`Segalloc::size_meta_data`].
#[no_mangle]
pub extern "C" fn _size_meta_data() -> usize {
    SEGALLOCK.lock().size_meta_data()
}
