//! Where the allocator's memory comes from.
//!
//! [`Segalloc`](crate::Segalloc) never calls the OS directly. Small and medium
//! blocks come from a [`HeapSource`], a single region that only ever grows
//! upward; requests above [`MMAP_THRESHOLD`](crate::MMAP_THRESHOLD) each get
//! their own region from a [`MapSource`].

use core::ptr::NonNull;

use crate::Span;

#[cfg(all(feature = "system-backed", target_family = "unix"))]
pub mod unix;

/// A contiguous heap that can be extended at its top, like the program break.
///
/// # Safety
/// Memory returned by `grow` must be aligned to [`ALIGN`](crate::ALIGN), valid
/// for reads and writes, and not otherwise used for the life of the allocator.
/// Each successful `grow` must return the address immediately following the
/// memory returned by the previous successful call.
pub unsafe trait HeapSource {
    /// Extend the heap by `size` bytes, returning the base of the new bytes.
    ///
    /// Failure must leave the heap as it was.
    fn grow(&mut self, size: usize) -> Option<NonNull<u8>>;
}

/// Independent anonymous memory regions, created and destroyed one at a time.
///
/// # Safety
/// Memory returned by `map` must be aligned to [`ALIGN`](crate::ALIGN), valid
/// for reads and writes, and not otherwise used until passed to `unmap`.
pub unsafe trait MapSource {
    /// Create a region of at least `size` bytes.
    fn map(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Destroy a region.
    ///
    /// # Safety
    /// `base` and `size` must match a previous successful call to `map`.
    unsafe fn unmap(&mut self, base: NonNull<u8>, size: usize);
}

/// A [`HeapSource`] handing out a fixed [`Span`] from the bottom up.
///
/// Growth fails once the span is exhausted.
#[derive(Debug)]
pub struct Arena {
    remaining: Span,
}

impl Arena {
    /// # Safety
    /// The memory within `span` must be valid for reads and writes,
    /// and must not be otherwise mutated for the life of the allocator.
    pub unsafe fn new(span: Span) -> Self {
        Self { remaining: span.word_align_inward() }
    }

    /// Bytes not yet handed out.
    pub fn remaining(&self) -> usize {
        self.remaining.size()
    }
}

unsafe impl HeapSource for Arena {
    fn grow(&mut self, size: usize) -> Option<NonNull<u8>> {
        debug_assert!(size % crate::ALIGN == 0);

        self.remaining.split_off_low(size).and_then(NonNull::new)
    }
}

/// A [`MapSource`] that never provides memory, so large requests fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMapping;

unsafe impl MapSource for NoMapping {
    fn map(&mut self, _: usize) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn unmap(&mut self, _: NonNull<u8>, _: usize) {
        unreachable!("nothing was ever mapped")
    }
}
