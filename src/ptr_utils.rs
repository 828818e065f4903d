//! Generic utilities for pointer handling and sizing.

pub const ALIGN: usize = 8;

/// Rounds `size` up to the next multiple of [`ALIGN`].
///
/// `size` must be at most `usize::MAX - (ALIGN - 1)`.
#[inline]
pub const fn align_up(size: usize) -> usize {
    (size + (ALIGN - 1)) & !(ALIGN - 1)
}

pub fn align_up_overflows(size: usize) -> bool {
    ALIGN - 1 > usize::MAX - size
}

/// Aligns `ptr` up to the next multiple of [`ALIGN`], maintaining provenance.
#[inline]
pub fn align_up_ptr(ptr: *mut u8) -> *mut u8 {
    debug_assert!(!align_up_overflows(ptr as usize));

    ptr.wrapping_add(align_up(ptr as usize) - ptr as usize)
}

/// Aligns `ptr` down to the previous multiple of [`ALIGN`], maintaining provenance.
#[inline]
pub fn align_down_ptr(ptr: *mut u8) -> *mut u8 {
    ptr.wrapping_sub(ptr as usize % ALIGN)
}

#[inline]
pub fn is_aligned(ptr: *mut u8) -> bool {
    ptr as usize % ALIGN == 0
}
