//! [`Segallock`] facilitates using [`Segalloc`] as a Rust global allocator,
//! or other usage across multiple threads.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::null_mut,
};

use crate::{HeapSource, MapSource, Segalloc, ALIGN};

/// Wraps a mutex-locked [`Segalloc`].
///
/// Only layouts aligned to at most [`ALIGN`] can be served; anything
/// stricter is reported as an allocation failure.
///
/// # Example
/// ```rust
/// # #[cfg(all(unix, feature = "system-backed"))] {
/// use segalloc::*;
/// use spin::Mutex;
///
/// let segallock = Segallock::<Mutex<()>, _, _>::new(Segalloc::new(Sbrk::new(), Mmap));
/// # }
/// ```
#[derive(Debug)]
pub struct Segallock<R: lock_api::RawMutex, H: HeapSource, M: MapSource> {
    mutex: lock_api::Mutex<R, Segalloc<H, M>>,
}

impl<R: lock_api::RawMutex, H: HeapSource, M: MapSource> Segallock<R, H, M> {
    /// Create a new [`Segallock`].
    pub const fn new(segalloc: Segalloc<H, M>) -> Self {
        Self { mutex: lock_api::Mutex::new(segalloc) }
    }

    /// Lock the mutex and access the inner [`Segalloc`].
    #[track_caller]
    pub fn lock(&self) -> lock_api::MutexGuard<R, Segalloc<H, M>> {
        self.mutex.lock()
    }

    /// Try to lock the mutex and access the inner [`Segalloc`].
    pub fn try_lock(&self) -> Option<lock_api::MutexGuard<R, Segalloc<H, M>>> {
        self.mutex.try_lock()
    }

    /// Returns a mutable reference to the inner [`Segalloc`].
    ///
    /// This avoids locking, as having a mutable reference statically
    /// guarantees that `self` is not locked.
    pub fn get_mut(&mut self) -> &mut Segalloc<H, M> {
        self.mutex.get_mut()
    }

    /// Retrieve the inner [`Segalloc`].
    pub fn into_inner(self) -> Segalloc<H, M> {
        self.mutex.into_inner()
    }
}

unsafe impl<R: lock_api::RawMutex, H: HeapSource, M: MapSource> GlobalAlloc for Segallock<R, H, M> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGN {
            return null_mut();
        }

        self.lock().malloc(layout.size()).map_or(null_mut(), |nn| nn.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _: Layout) {
        self.lock().free(ptr)
    }

    unsafe fn realloc(&self, ptr: *mut u8, _: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: guaranteed by caller that `ptr` came from this allocator,
        // so its alignment was already accepted
        self.lock().realloc(ptr, new_size).map_or(null_mut(), |nn| nn.as_ptr())
    }
}

#[cfg(feature = "allocator-api2")]
mod allocator_api {
    use core::{alloc::Layout, ptr::NonNull};

    use allocator_api2::alloc::{AllocError, Allocator};

    use super::Segallock;
    use crate::{HeapSource, MapSource, ALIGN};

    #[inline(always)]
    fn nonnull_slice_from_raw_parts(nn: NonNull<u8>, len: usize) -> NonNull<[u8]> {
        // SAFETY: if `nn` is non-null, then the resulting slice is non-null
        unsafe { NonNull::new_unchecked(core::ptr::slice_from_raw_parts_mut(nn.as_ptr(), len)) }
    }

    unsafe impl<R: lock_api::RawMutex, H: HeapSource, M: MapSource> Allocator for Segallock<R, H, M> {
        #[inline]
        fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
            if layout.size() == 0 {
                return Ok(nonnull_slice_from_raw_parts(NonNull::dangling(), 0));
            }
            if layout.align() > ALIGN {
                return Err(AllocError);
            }

            let allocation = self.lock().malloc(layout.size())?;
            Ok(nonnull_slice_from_raw_parts(allocation, layout.size()))
        }

        #[inline]
        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            if layout.size() != 0 {
                self.lock().free(ptr.as_ptr());
            }
        }

        unsafe fn grow(
            &self,
            ptr: NonNull<u8>,
            old_layout: Layout,
            new_layout: Layout,
        ) -> Result<NonNull<[u8]>, AllocError> {
            debug_assert!(new_layout.size() >= old_layout.size());

            if old_layout.size() == 0 {
                return self.allocate(new_layout);
            }
            if new_layout.align() > ALIGN {
                return Err(AllocError);
            }

            let allocation = self.lock().realloc(ptr.as_ptr(), new_layout.size())?;
            Ok(nonnull_slice_from_raw_parts(allocation, new_layout.size()))
        }

        unsafe fn grow_zeroed(
            &self,
            ptr: NonNull<u8>,
            old_layout: Layout,
            new_layout: Layout,
        ) -> Result<NonNull<[u8]>, AllocError> {
            let res = self.grow(ptr, old_layout, new_layout);

            if let Ok(allocation) = res {
                allocation
                    .as_ptr()
                    .cast::<u8>()
                    .add(old_layout.size())
                    .write_bytes(0, new_layout.size() - old_layout.size());
            }

            res
        }

        unsafe fn shrink(
            &self,
            ptr: NonNull<u8>,
            old_layout: Layout,
            new_layout: Layout,
        ) -> Result<NonNull<[u8]>, AllocError> {
            debug_assert!(new_layout.size() <= old_layout.size());

            if new_layout.size() == 0 {
                self.deallocate(ptr, old_layout);
                return Ok(nonnull_slice_from_raw_parts(NonNull::dangling(), 0));
            }
            if new_layout.align() > ALIGN {
                return Err(AllocError);
            }

            let allocation = self.lock().realloc(ptr.as_ptr(), new_layout.size())?;
            Ok(nonnull_slice_from_raw_parts(allocation, new_layout.size()))
        }
    }
}
