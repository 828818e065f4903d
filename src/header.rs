//! The metadata record in front of every payload, and [`Block`],
//! the handle through which the engine reads and writes it.

use core::ptr::NonNull;

use crate::ptr_utils::{align_up, is_aligned};

/// Block metadata. Lives in the managed memory, immediately below the payload.
///
/// `list_*` links are the address-ordered list membership, `class_*` links
/// the size-class list membership (meaningful only while `is_free`).
#[repr(C)]
#[derive(Debug)]
pub(crate) struct Header {
    size: usize,
    is_free: bool,
    is_mapped: bool,
    payload: *mut u8,
    list_prev: Option<Block>,
    list_next: Option<Block>,
    class_prev: Option<Block>,
    class_next: Option<Block>,
}

pub(crate) const HEADER_SIZE: usize = align_up(core::mem::size_of::<Header>());

/// Handle to a live [`Header`].
///
/// A `Block` is only ever created over a header written by [`Block::init`],
/// and is not used after the header is absorbed into a neighbor or unmapped.
/// All header accesses go through here.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub(crate) struct Block(NonNull<Header>);

impl core::fmt::Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block")
            .field("base", &self.0)
            .field("size", &self.size())
            .field("is_free", &self.is_free())
            .field("is_mapped", &self.is_mapped())
            .finish()
    }
}

impl Block {
    /// Write a fresh, unlinked header at `base`.
    ///
    /// # Safety
    /// `base` must be aligned and valid for writes of `size` bytes,
    /// and `size` must be at least [`HEADER_SIZE`].
    pub unsafe fn init(base: NonNull<u8>, size: usize, is_free: bool, is_mapped: bool) -> Self {
        debug_assert!(is_aligned(base.as_ptr()));
        debug_assert!(size >= HEADER_SIZE);

        let header = base.cast::<Header>();
        header.as_ptr().write(Header {
            size,
            is_free,
            is_mapped,
            payload: base.as_ptr().add(HEADER_SIZE),
            list_prev: None,
            list_next: None,
            class_prev: None,
            class_next: None,
        });

        Self(header)
    }

    /// Recover the block from a payload pointer previously handed out.
    ///
    /// # Safety
    /// `payload` must have been returned by [`Block::payload`] of a live block.
    pub unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        let block = Self(NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE)).cast());
        debug_assert_eq!(block.header().payload, payload.as_ptr());
        block
    }

    #[inline]
    fn header(&self) -> &Header {
        unsafe { self.0.as_ref() }
    }

    #[inline]
    fn header_mut(&mut self) -> &mut Header {
        unsafe { self.0.as_mut() }
    }

    #[inline]
    pub fn base(self) -> NonNull<u8> {
        self.0.cast()
    }

    /// One past the last byte of the block.
    #[inline]
    pub fn acme(self) -> *mut u8 {
        self.base().as_ptr().wrapping_add(self.size())
    }

    /// The user-visible region, always exactly [`HEADER_SIZE`] above the header.
    #[inline]
    pub fn payload(self) -> NonNull<u8> {
        let payload = self.base().as_ptr().wrapping_add(HEADER_SIZE);
        debug_assert_eq!(self.header().payload, payload);
        unsafe { NonNull::new_unchecked(payload) }
    }

    /// Total size, header included.
    #[inline]
    pub fn size(self) -> usize {
        self.header().size
    }

    #[inline]
    pub fn set_size(mut self, size: usize) {
        debug_assert!(size >= HEADER_SIZE && size % crate::ALIGN == 0);
        self.header_mut().size = size;
    }

    /// Payload bytes available, header excluded.
    #[inline]
    pub fn capacity(self) -> usize {
        self.size() - HEADER_SIZE
    }

    #[inline]
    pub fn is_free(self) -> bool {
        self.header().is_free
    }

    #[inline]
    pub fn set_free(mut self, is_free: bool) {
        self.header_mut().is_free = is_free;
    }

    #[inline]
    pub fn is_mapped(self) -> bool {
        self.header().is_mapped
    }

    #[inline]
    pub fn list_prev(self) -> Option<Block> {
        self.header().list_prev
    }

    #[inline]
    pub fn list_next(self) -> Option<Block> {
        self.header().list_next
    }

    #[inline]
    pub fn set_list_links(mut self, prev: Option<Block>, next: Option<Block>) {
        let header = self.header_mut();
        header.list_prev = prev;
        header.list_next = next;
    }

    #[inline]
    pub fn set_list_prev(mut self, prev: Option<Block>) {
        self.header_mut().list_prev = prev;
    }

    #[inline]
    pub fn set_list_next(mut self, next: Option<Block>) {
        self.header_mut().list_next = next;
    }

    #[inline]
    pub fn class_prev(self) -> Option<Block> {
        self.header().class_prev
    }

    #[inline]
    pub fn class_next(self) -> Option<Block> {
        self.header().class_next
    }

    #[inline]
    pub fn set_class_links(mut self, prev: Option<Block>, next: Option<Block>) {
        let header = self.header_mut();
        header.class_prev = prev;
        header.class_next = next;
    }

    #[inline]
    pub fn set_class_prev(mut self, prev: Option<Block>) {
        self.header_mut().class_prev = prev;
    }

    #[inline]
    pub fn set_class_next(mut self, next: Option<Block>) {
        self.header_mut().class_next = next;
    }
}
