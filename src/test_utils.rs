//! Shared fixtures for the unit tests.

use core::ptr::NonNull;

use crate::{Arena, MapSource, Segalloc, Span, ALIGN};

/// The mapping source the fixtures use: real mappings where available.
#[cfg(all(feature = "system-backed", target_family = "unix"))]
pub type TestMaps = crate::Mmap;
/// The mapping source the fixtures use: the test harness's allocator otherwise.
#[cfg(not(all(feature = "system-backed", target_family = "unix")))]
pub type TestMaps = StdMaps;

/// A [`MapSource`] backed by `std`'s global allocator.
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)]
pub struct StdMaps;

unsafe impl MapSource for StdMaps {
    fn map(&mut self, size: usize) -> Option<NonNull<u8>> {
        let layout = std::alloc::Layout::from_size_align(size, ALIGN).ok()?;
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn unmap(&mut self, base: NonNull<u8>, size: usize) {
        std::alloc::dealloc(base.as_ptr(), std::alloc::Layout::from_size_align_unchecked(size, ALIGN));
    }
}

/// A [`MapSource`] that serves `remaining` more mappings, then fails.
#[derive(Debug)]
pub struct LimitedMaps {
    pub remaining: usize,
    inner: TestMaps,
}

impl LimitedMaps {
    pub fn new(remaining: usize) -> Self {
        Self { remaining, inner: TestMaps::default() }
    }
}

unsafe impl MapSource for LimitedMaps {
    fn map(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.remaining = self.remaining.checked_sub(1)?;
        self.inner.map(size)
    }

    unsafe fn unmap(&mut self, base: NonNull<u8>, size: usize) {
        self.inner.unmap(base, size)
    }
}

/// An arena over `size` bytes of leaked, aligned memory.
pub fn test_arena(size: usize) -> Arena {
    let memory = Box::leak(vec![0u64; size / 8].into_boxed_slice());
    unsafe { Arena::new(Span::from(&mut memory[..])) }
}

/// An allocator whose heap is capped at `size` bytes, with real mappings for large requests.
pub fn test_segalloc(size: usize) -> Segalloc<Arena, TestMaps> {
    Segalloc::new(test_arena(size), TestMaps::default())
}
