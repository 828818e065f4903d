//! The allocator engine: allocation, splitting, freeing with coalescing,
//! and reallocation over the address-ordered list and the size-class bins.

mod stats;

pub use stats::Stats;

use core::ptr::NonNull;

use crate::{
    bins::Bins,
    header::{Block, HEADER_SIZE},
    llist::BlockList,
    ptr_utils::align_up,
    AllocFailure, HeapSource, MapSource, MAX_ALLOC_SIZE, MIN_SPLIT_SIZE, MMAP_THRESHOLD,
};

/// The segregated free-list allocator.
///
/// Blocks of up to [`MMAP_THRESHOLD`] payload bytes are carved out of the
/// heap `H`, kept in address order for coalescing, and indexed by size class
/// while free. Larger blocks each get their own mapping from `M` and are only
/// counted.
///
/// Call [`lock`](Segalloc::lock) to get a [`Segallock`](crate::Segallock) which
/// supports the [`GlobalAlloc`](core::alloc::GlobalAlloc) trait.
pub struct Segalloc<H: HeapSource, M: MapSource> {
    heap: H,
    maps: M,

    /// Every heap block, free or not, lowest address first.
    blocks: BlockList,
    /// Free heap blocks by size class.
    bins: Bins,

    /// Bytes obtained from `heap` so far.
    heap_bytes: usize,
    mapped_blocks: usize,
    /// Payload bytes of live mapped blocks.
    mapped_bytes: usize,
}

unsafe impl<H: HeapSource + Send, M: MapSource + Send> Send for Segalloc<H, M> {}

impl<H: HeapSource, M: MapSource> core::fmt::Debug for Segalloc<H, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Segalloc")
            .field("blocks", &self.blocks.len())
            .field("head", &self.blocks.head())
            .field("tail", &self.blocks.tail())
            .field("heap_bytes", &self.heap_bytes)
            .field("mapped_blocks", &self.mapped_blocks)
            .field("mapped_bytes", &self.mapped_bytes)
            .finish()
    }
}

/// Validate a requested payload size and round it up to the alignment unit.
#[inline]
fn checked_request(size: usize) -> Result<usize, AllocFailure> {
    if size == 0 || size > MAX_ALLOC_SIZE {
        Err(AllocFailure::InvalidSize)
    } else {
        Ok(align_up(size))
    }
}

/// Whether carving `required` bytes off a block of `size` leaves a usable remainder.
#[inline]
fn is_splittable(size: usize, required: usize) -> bool {
    size - required >= HEADER_SIZE + MIN_SPLIT_SIZE
}

impl<H: HeapSource, M: MapSource> Segalloc<H, M> {
    /// Create an allocator over the given backing stores.
    ///
    /// Nothing is requested from either until the first allocation.
    pub const fn new(heap: H, maps: M) -> Self {
        Self {
            heap,
            maps,
            blocks: BlockList::new(),
            bins: Bins::new(),
            heap_bytes: 0,
            mapped_blocks: 0,
            mapped_bytes: 0,
        }
    }

    /// The contiguous heap source.
    pub fn heap(&self) -> &H {
        &self.heap
    }

    /// The mapping source.
    pub fn maps(&self) -> &M {
        &self.maps
    }

    /// Allocate at least `size` bytes, aligned to [`ALIGN`](crate::ALIGN).
    ///
    /// # Errors
    /// [`AllocFailure::InvalidSize`] if `size` is zero or above [`MAX_ALLOC_SIZE`],
    /// [`AllocFailure::ResourceExhausted`] if the backing store is out of memory.
    pub fn malloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        let size = checked_request(size)?;
        let payload = self.alloc_block(size)?;

        scan_for_errors(self);
        Ok(payload)
    }

    /// Allocate space for `count` elements of `size` bytes each, zero-filled.
    ///
    /// # Errors
    /// As for [`malloc`](Segalloc::malloc), with an overflowing
    /// `count * size` also being [`AllocFailure::InvalidSize`].
    pub fn calloc(&mut self, count: usize, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        let total = count.checked_mul(size).ok_or(AllocFailure::InvalidSize)?;
        let payload = self.malloc(total)?;

        unsafe {
            payload.as_ptr().write_bytes(0, total);
        }

        Ok(payload)
    }

    /// Release an allocation. Null is ignored, as is freeing an already free block.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator
    /// (and not passed to [`realloc`](Segalloc::realloc) since).
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else { return };

        self.free_block(Block::from_payload(payload));

        scan_for_errors(self);
    }

    /// Resize an allocation to at least `size` bytes, preserving its contents
    /// up to the smaller of the old and new sizes. A null `ptr` allocates.
    ///
    /// # Errors
    /// As for [`malloc`](Segalloc::malloc). On failure the original
    /// allocation is left intact.
    ///
    /// # Safety
    /// `ptr` must be null or a live allocation returned by this allocator.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        let size = checked_request(size)?;

        let payload = match NonNull::new(ptr) {
            Some(payload) => self.realloc_block(Block::from_payload(payload), size)?,
            None => self.alloc_block(size)?,
        };

        scan_for_errors(self);
        Ok(payload)
    }

    /// Extend the heap by `size` bytes.
    fn grow_heap(&mut self, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        let base = self.heap.grow(size).ok_or(AllocFailure::ResourceExhausted)?;

        debug_assert!(
            self.blocks.tail().map_or(true, |tail| tail.acme() == base.as_ptr()),
            "heap growth is not contiguous"
        );

        self.heap_bytes += size;
        Ok(base)
    }

    /// Allocate `size` payload bytes. `size` must be aligned and nonzero.
    fn alloc_block(&mut self, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        if size > MMAP_THRESHOLD {
            return self.alloc_mapped(size);
        }

        let required = HEADER_SIZE + size;

        if let Some(block) = self.bins.best_fit(size) {
            self.bins.remove(block);
            block.set_free(false);
            self.split(block, required);

            return Ok(block.payload());
        }

        // nothing free fits; extend a free top block rather than
        // stacking a new block on top of it
        if let Some(wilderness) = self.blocks.wilderness() {
            debug_assert!(wilderness.size() < required);

            self.grow_heap(required - wilderness.size())?;

            self.bins.remove(wilderness);
            wilderness.set_size(required);
            wilderness.set_free(false);

            return Ok(wilderness.payload());
        }

        let base = self.grow_heap(required)?;
        let block = unsafe { Block::init(base, required, false, false) };
        self.blocks.push_back(block);

        Ok(block.payload())
    }

    fn alloc_mapped(&mut self, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        let total = HEADER_SIZE + size;
        let base = self.maps.map(total).ok_or(AllocFailure::ResourceExhausted)?;
        let block = unsafe { Block::init(base, total, false, true) };

        self.mapped_blocks += 1;
        self.mapped_bytes += size;

        Ok(block.payload())
    }

    /// Shrink an allocated `block` to `required` bytes if the excess is worth
    /// keeping track of, publishing the excess as a new free block above it.
    fn split(&mut self, block: Block, required: usize) {
        debug_assert!(!block.is_free() && !block.is_mapped());
        debug_assert!(block.size() >= required);

        if !is_splittable(block.size(), required) {
            return;
        }

        let remainder_size = block.size() - required;
        block.set_size(required);

        let remainder = unsafe {
            Block::init(NonNull::new_unchecked(block.acme()), remainder_size, true, false)
        };
        self.blocks.insert_after(remainder, block);
        self.bins.insert(remainder);

        // a shrink in place can leave the remainder next to free memory
        if let Some(next) = BlockList::next_free(remainder) {
            self.merge(remainder, next, true);
        }
    }

    /// Absorb `high` into the address-adjacent `low`, returning the survivor.
    ///
    /// With `free` the result is published in its new size class, otherwise
    /// it is left allocated, which reallocation uses to combine capacity.
    fn merge(&mut self, low: Block, high: Block, free: bool) -> Block {
        debug_assert_eq!(low.list_next(), Some(high));
        debug_assert_eq!(low.acme(), high.base().as_ptr());

        if low.is_free() {
            self.bins.remove(low);
        }
        if high.is_free() {
            self.bins.remove(high);
        }
        self.blocks.remove(high);

        low.set_size(low.size() + high.size());
        low.set_free(free);

        if free {
            self.bins.insert(low);
        }

        low
    }

    unsafe fn free_block(&mut self, block: Block) {
        if block.is_mapped() {
            self.mapped_blocks -= 1;
            self.mapped_bytes -= block.capacity();
            self.maps.unmap(block.base(), block.size());
            return;
        }

        if block.is_free() {
            return;
        }

        block.set_free(true);
        self.bins.insert(block);

        let mut block = block;
        if let Some(prev) = BlockList::prev_free(block) {
            block = self.merge(prev, block, true);
        }
        if let Some(next) = BlockList::next_free(block) {
            self.merge(block, next, true);
        }
    }

    /// Move `len` bytes from `old_payload` into the merged `block`,
    /// then trim it down to `required`.
    unsafe fn relocate(
        &mut self,
        block: Block,
        old_payload: NonNull<u8>,
        len: usize,
        required: usize,
    ) -> NonNull<u8> {
        let payload = block.payload();

        // the regions may overlap; move before a split header can land on the old bytes
        core::ptr::copy(old_payload.as_ptr(), payload.as_ptr(), len);
        self.split(block, required);

        payload
    }

    unsafe fn realloc_block(&mut self, block: Block, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        if block.is_mapped() {
            return self.realloc_mapped(block, size);
        }

        let old_payload = block.payload();
        let old_capacity = block.capacity();
        let required = HEADER_SIZE + size;

        if old_capacity >= size {
            self.split(block, required);
            return Ok(old_payload);
        }

        // the order of these attempts decides the returned address, keep it
        let prev = BlockList::prev_free(block);
        let next = BlockList::next_free(block);

        if let Some(prev) = prev {
            if prev.size() + old_capacity >= size {
                let merged = self.merge(prev, block, false);
                return Ok(self.relocate(merged, old_payload, old_capacity, required));
            }
        }

        if let Some(next) = next {
            if old_capacity + next.size() >= size {
                let merged = self.merge(block, next, false);
                return Ok(self.relocate(merged, old_payload, old_capacity, required));
            }
        }

        if let (Some(prev), Some(next)) = (prev, next) {
            if prev.size() + old_capacity + next.size() >= size {
                let merged = self.merge(prev, block, false);
                let merged = self.merge(merged, next, false);
                return Ok(self.relocate(merged, old_payload, old_capacity, required));
            }
        }

        if self.blocks.is_tail(block) {
            self.grow_heap(required - block.size())?;
            block.set_size(required);
            return Ok(old_payload);
        }

        let payload = self.alloc_block(size)?;
        payload.as_ptr().copy_from_nonoverlapping(old_payload.as_ptr(), old_capacity);
        self.free_block(block);

        Ok(payload)
    }

    unsafe fn realloc_mapped(&mut self, block: Block, size: usize) -> Result<NonNull<u8>, AllocFailure> {
        if size == block.capacity() {
            return Ok(block.payload());
        }

        let total = HEADER_SIZE + size;
        let base = self.maps.map(total).ok_or(AllocFailure::ResourceExhausted)?;
        let moved = Block::init(base, total, false, true);

        moved
            .payload()
            .as_ptr()
            .copy_from_nonoverlapping(block.payload().as_ptr(), block.capacity().min(size));

        self.mapped_bytes = self.mapped_bytes - block.capacity() + size;
        self.maps.unmap(block.base(), block.size());

        Ok(moved.payload())
    }

    /// Wrap in `Segallock`, a mutex-locked wrapper struct using [`lock_api`].
    ///
    /// This implements the [`GlobalAlloc`](core::alloc::GlobalAlloc) trait and,
    /// with the `allocator-api2` feature, `allocator_api2::alloc::Allocator`.
    ///
    /// # Examples
    /// ```
    /// # use segalloc::*;
    /// # use core::alloc::{GlobalAlloc, Layout};
    /// use spin::Mutex;
    /// let memory = Box::leak(vec![0u64; 4096].into_boxed_slice());
    /// let arena = unsafe { Arena::new(Span::from(&mut memory[..])) };
    /// let segallock = Segalloc::new(arena, NoMapping).lock::<Mutex<()>>();
    ///
    /// unsafe {
    ///     segallock.alloc(Layout::from_size_align_unchecked(32, 4));
    /// }
    /// ```
    #[cfg(feature = "lock_api")]
    pub const fn lock<R: lock_api::RawMutex>(self) -> crate::Segallock<R, H, M> {
        crate::Segallock::new(self)
    }
}

#[cfg(not(debug_assertions))]
fn scan_for_errors<H: HeapSource, M: MapSource>(_: &Segalloc<H, M>) {}

#[cfg(debug_assertions)]
/// Debugging function for checking the structural invariants.
fn scan_for_errors<H: HeapSource, M: MapSource>(segalloc: &Segalloc<H, M>) {
    use crate::bins::bin_of;

    let mut count = 0;
    let mut free_count = 0;
    let mut covered = 0;

    for block in segalloc.blocks.iter() {
        count += 1;
        covered += block.size();

        assert!(!block.is_mapped());
        assert!(block.size() >= HEADER_SIZE && block.size() % crate::ALIGN == 0);
        assert_eq!(block.payload().as_ptr(), block.base().as_ptr().wrapping_add(HEADER_SIZE));

        if block.is_free() {
            free_count += 1;
        } else {
            assert!(block.class_prev().is_none() && block.class_next().is_none());
        }

        match block.list_next() {
            Some(next) => {
                assert_eq!(next.list_prev(), Some(block));
                assert_eq!(block.acme(), next.base().as_ptr(), "gap or overlap between blocks");
                assert!(!(block.is_free() && next.is_free()), "uncoalesced free neighbors");
            }
            None => assert!(segalloc.blocks.is_tail(block)),
        }
    }

    assert_eq!(count, segalloc.blocks.len());
    assert_eq!(covered, segalloc.heap_bytes);

    let mut binned = 0;
    for (bin, class) in segalloc.bins.classes().iter().enumerate() {
        let mut prev: Option<Block> = None;

        for block in class.iter() {
            binned += 1;

            assert!(block.is_free());
            assert_eq!(bin_of(block.capacity()), bin);
            assert_eq!(block.class_prev(), prev);
            if let Some(prev) = prev {
                assert!(prev.size() <= block.size(), "size class out of order");
            }

            prev = Some(block);
        }
    }

    assert_eq!(binned, free_count, "free blocks and binned blocks differ");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::*, NoMapping, BIN_SIZE};

    fn block_of(payload: NonNull<u8>) -> Block {
        unsafe { Block::from_payload(payload) }
    }

    fn fill(payload: NonNull<u8>, len: usize, byte: u8) {
        unsafe { payload.as_ptr().write_bytes(byte, len) }
    }

    fn is_filled(payload: NonNull<u8>, len: usize, byte: u8) -> bool {
        unsafe { core::slice::from_raw_parts(payload.as_ptr(), len) }.iter().all(|&b| b == byte)
    }

    #[test]
    fn rejects_invalid_sizes() {
        let mut segalloc = test_segalloc(1 << 16);

        assert_eq!(segalloc.malloc(0), Err(AllocFailure::InvalidSize));
        assert_eq!(segalloc.malloc(MAX_ALLOC_SIZE + 1), Err(AllocFailure::InvalidSize));
        assert_eq!(segalloc.calloc(0, 8), Err(AllocFailure::InvalidSize));
        assert_eq!(segalloc.calloc(usize::MAX, 2), Err(AllocFailure::InvalidSize));
        assert_eq!(segalloc.calloc(MAX_ALLOC_SIZE, 2), Err(AllocFailure::InvalidSize));

        let p = segalloc.malloc(16).unwrap();
        let before = segalloc.stats();
        unsafe {
            assert_eq!(segalloc.realloc(p.as_ptr(), 0), Err(AllocFailure::InvalidSize));
            assert_eq!(
                segalloc.realloc(p.as_ptr(), MAX_ALLOC_SIZE + 1),
                Err(AllocFailure::InvalidSize)
            );
        }
        assert_eq!(segalloc.stats(), before);
        assert_eq!(segalloc.heap_bytes, HEADER_SIZE + 16);
    }

    #[test]
    fn sizes_are_rounded_to_alignment() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1).unwrap();
        let b = segalloc.malloc(13).unwrap();

        assert!(crate::ptr_utils::is_aligned(a.as_ptr()));
        assert!(crate::ptr_utils::is_aligned(b.as_ptr()));
        assert_eq!(block_of(a).capacity(), 8);
        assert_eq!(block_of(b).capacity(), 16);
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, HEADER_SIZE + 8);
    }

    #[test]
    fn freed_block_is_reused_without_growth() {
        let mut segalloc = test_segalloc(1 << 16);

        let p1 = segalloc.malloc(500).unwrap();
        let p2 = segalloc.malloc(900).unwrap();
        let heap_bytes = segalloc.heap_bytes;

        unsafe { segalloc.free(p1.as_ptr()) };
        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.num_free_bytes(), 504);

        let p3 = segalloc.malloc(400).unwrap();
        assert_eq!(p3, p1);
        assert_eq!(segalloc.heap_bytes, heap_bytes);
        assert_eq!(segalloc.num_free_blocks(), 0);
        // too small a remainder to split off
        assert_eq!(block_of(p3).capacity(), 504);

        assert_ne!(p2, p3);
    }

    #[test]
    fn allocation_splits_only_usable_remainders() {
        let mut segalloc = test_segalloc(1 << 16);

        let p = segalloc.malloc(2000).unwrap();
        let guard = segalloc.malloc(8).unwrap();
        unsafe { segalloc.free(p.as_ptr()) };

        // 2000 - 1000 - HEADER_SIZE >= MIN_SPLIT_SIZE
        let q = segalloc.malloc(1000).unwrap();
        assert_eq!(q, p);
        assert_eq!(block_of(q).capacity(), 1000);

        let remainder = block_of(q).list_next().unwrap();
        assert!(remainder.is_free());
        assert_eq!(remainder.base().as_ptr(), q.as_ptr().wrapping_add(1000));
        assert_eq!(remainder.capacity(), 2000 - 1000 - HEADER_SIZE);
        assert_eq!(remainder.list_next(), Some(block_of(guard)));
        assert_eq!(segalloc.num_free_bytes(), 2000 - 1000 - HEADER_SIZE);

        unsafe { segalloc.free(q.as_ptr()) };
        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.num_free_bytes(), 2000);

        // 2000 - 1856 - HEADER_SIZE < MIN_SPLIT_SIZE
        let r = segalloc.malloc(1856).unwrap();
        assert_eq!(r, p);
        assert_eq!(block_of(r).capacity(), 2000);
        assert_eq!(segalloc.num_free_blocks(), 0);
    }

    #[test]
    fn freeing_neighbors_coalesces_them() {
        for reverse in [false, true] {
            let mut segalloc = test_segalloc(1 << 16);

            let a = segalloc.malloc(1000).unwrap();
            let b = segalloc.malloc(1000).unwrap();
            let _guard = segalloc.malloc(8).unwrap();
            assert_eq!(b.as_ptr(), a.as_ptr().wrapping_add(1000 + HEADER_SIZE));

            let heap_bytes = segalloc.heap_bytes;
            let blocks = segalloc.num_allocated_blocks();

            unsafe {
                if reverse {
                    segalloc.free(b.as_ptr());
                    segalloc.free(a.as_ptr());
                } else {
                    segalloc.free(a.as_ptr());
                    segalloc.free(b.as_ptr());
                }
            }

            assert_eq!(segalloc.num_free_blocks(), 1);
            assert_eq!(segalloc.num_free_bytes(), 2000 + HEADER_SIZE);
            assert_eq!(segalloc.num_allocated_blocks(), blocks - 1);

            let merged = segalloc.malloc(2000 + HEADER_SIZE).unwrap();
            assert_eq!(merged, a);
            assert_eq!(segalloc.heap_bytes, heap_bytes);
        }
    }

    #[test]
    fn freeing_between_free_neighbors_coalesces_all_three() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        let b = segalloc.malloc(1000).unwrap();
        let c = segalloc.malloc(1000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();

        unsafe {
            segalloc.free(a.as_ptr());
            segalloc.free(c.as_ptr());
            assert_eq!(segalloc.num_free_blocks(), 2);
            segalloc.free(b.as_ptr());
        }

        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.num_free_bytes(), 3000 + 2 * HEADER_SIZE);
        assert_eq!(block_of(a).capacity(), 3000 + 2 * HEADER_SIZE);
    }

    #[test]
    fn double_free_is_ignored() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(100).unwrap();
        let _b = segalloc.malloc(100).unwrap();

        unsafe { segalloc.free(a.as_ptr()) };
        let after_first = segalloc.stats();
        unsafe { segalloc.free(a.as_ptr()) };
        assert_eq!(segalloc.stats(), after_first);

        unsafe { segalloc.free(core::ptr::null_mut()) };
        assert_eq!(segalloc.stats(), after_first);
    }

    #[test]
    fn threshold_decides_between_heap_and_mapping() {
        let mut segalloc = test_segalloc(1 << 20);

        let on_heap = segalloc.malloc(MMAP_THRESHOLD).unwrap();
        assert_eq!(segalloc.heap_bytes, HEADER_SIZE + MMAP_THRESHOLD);
        assert_eq!(segalloc.mapped_blocks, 0);

        let mapped = segalloc.malloc(MMAP_THRESHOLD + 1).unwrap();
        assert_eq!(segalloc.heap_bytes, HEADER_SIZE + MMAP_THRESHOLD);
        assert_eq!(segalloc.mapped_blocks, 1);
        assert_eq!(segalloc.mapped_bytes, MMAP_THRESHOLD + 8);
        assert!(block_of(mapped).is_mapped());

        assert_eq!(segalloc.num_allocated_blocks(), 2);
        assert_eq!(segalloc.num_allocated_bytes(), 2 * MMAP_THRESHOLD + 8);
        assert_eq!(segalloc.num_meta_data_bytes(), 2 * HEADER_SIZE);

        fill(mapped, MMAP_THRESHOLD + 8, 0x5a);
        unsafe { segalloc.free(mapped.as_ptr()) };
        assert_eq!(segalloc.mapped_blocks, 0);
        assert_eq!(segalloc.mapped_bytes, 0);

        // the exact threshold lands in the last bin once freed
        unsafe { segalloc.free(on_heap.as_ptr()) };
        assert_eq!(segalloc.bins.classes()[crate::BIN_COUNT - 1].iter().count(), 1);
    }

    #[test]
    fn largest_request_is_mapped() {
        let mut segalloc = test_segalloc(1 << 16);

        let p = segalloc.malloc(MAX_ALLOC_SIZE).unwrap();
        assert_eq!(segalloc.mapped_bytes, MAX_ALLOC_SIZE);
        unsafe { segalloc.free(p.as_ptr()) };
        assert_eq!(segalloc.mapped_blocks, 0);
    }

    #[test]
    fn free_wilderness_is_grown_in_place() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        unsafe { segalloc.free(a.as_ptr()) };
        let heap_bytes = segalloc.heap_bytes;

        let b = segalloc.malloc(3000).unwrap();
        assert_eq!(b, a);
        assert_eq!(segalloc.heap_bytes, heap_bytes + 2000);
        assert_eq!(segalloc.num_free_blocks(), 0);
        assert_eq!(segalloc.num_allocated_blocks(), 1);
    }

    #[test]
    fn calloc_zeroes_reused_memory() {
        let mut segalloc = test_segalloc(1 << 16);

        let dirty = segalloc.malloc(4000).unwrap();
        fill(dirty, 4000, 0xff);
        let _guard = segalloc.malloc(8).unwrap();
        unsafe { segalloc.free(dirty.as_ptr()) };

        let zeroed = segalloc.calloc(100, 40).unwrap();
        assert_eq!(zeroed, dirty);
        assert!(is_filled(zeroed, 4000, 0));
    }

    #[test]
    fn realloc_null_allocates() {
        let mut segalloc = test_segalloc(1 << 16);

        let p = unsafe { segalloc.realloc(core::ptr::null_mut(), 100) }.unwrap();
        assert_eq!(block_of(p).capacity(), 104);
        assert_eq!(segalloc.num_allocated_blocks(), 1);
    }

    #[test]
    fn realloc_shrink_splits_in_place() {
        let mut segalloc = test_segalloc(1 << 16);

        let p = segalloc.malloc(2000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        fill(p, 2000, 0x11);

        let q = unsafe { segalloc.realloc(p.as_ptr(), 500) }.unwrap();
        assert_eq!(q, p);
        assert!(is_filled(q, 504, 0x11));

        let remainder = block_of(q).list_next().unwrap();
        assert!(remainder.is_free());
        assert_eq!(remainder.base().as_ptr(), q.as_ptr().wrapping_add(504));
        assert_eq!(remainder.capacity(), 2000 - 504 - HEADER_SIZE);

        // no split when the remainder would be too small
        let r = unsafe { segalloc.realloc(q.as_ptr(), 400) }.unwrap();
        assert_eq!(r, q);
        assert_eq!(block_of(r).capacity(), 504);
    }

    #[test]
    fn realloc_shrink_remainder_coalesces_with_free_right_neighbor() {
        let mut segalloc = test_segalloc(1 << 16);

        let p = segalloc.malloc(2000).unwrap();
        let n = segalloc.malloc(1000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        unsafe { segalloc.free(n.as_ptr()) };

        let q = unsafe { segalloc.realloc(p.as_ptr(), 1000) }.unwrap();
        assert_eq!(q, p);
        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.num_free_bytes(), 1000 + (1000 - HEADER_SIZE) + HEADER_SIZE);
    }

    #[test]
    fn realloc_merges_with_free_left_neighbor() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        let b = segalloc.malloc(1000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        fill(b, 1000, 0x22);
        unsafe { segalloc.free(a.as_ptr()) };
        let heap_bytes = segalloc.heap_bytes;

        let c = unsafe { segalloc.realloc(b.as_ptr(), 1500) }.unwrap();
        assert_eq!(c, a);
        assert!(is_filled(c, 1000, 0x22));
        // 1500 rounds up to 1504
        assert_eq!(block_of(c).capacity(), 1504);
        assert_eq!(segalloc.heap_bytes, heap_bytes);

        // combined 2056, minus the 1504 kept and a header: 496 left over
        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.num_free_bytes(), 2000 + HEADER_SIZE - 1504 - HEADER_SIZE);
    }

    #[test]
    fn realloc_merges_with_free_right_neighbor() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        let b = segalloc.malloc(1000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        fill(a, 1000, 0x33);
        unsafe { segalloc.free(b.as_ptr()) };

        let c = unsafe { segalloc.realloc(a.as_ptr(), 1500) }.unwrap();
        assert_eq!(c, a);
        assert!(is_filled(c, 1000, 0x33));
        assert_eq!(segalloc.num_free_blocks(), 1);
    }

    #[test]
    fn realloc_prefers_left_when_both_neighbors_are_free() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        let b = segalloc.malloc(1000).unwrap();
        let c = segalloc.malloc(1000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        fill(b, 1000, 0x44);
        unsafe {
            segalloc.free(a.as_ptr());
            segalloc.free(c.as_ptr());
        }

        let d = unsafe { segalloc.realloc(b.as_ptr(), 1500) }.unwrap();
        assert_eq!(d, a);
        assert!(is_filled(d, 1000, 0x44));
        // the left remainder coalesced with the still free right neighbor
        assert_eq!(segalloc.num_free_blocks(), 1);
    }

    #[test]
    fn realloc_merges_with_both_neighbors() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(200).unwrap();
        let b = segalloc.malloc(1000).unwrap();
        let c = segalloc.malloc(200).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        fill(b, 1000, 0x55);
        unsafe {
            segalloc.free(a.as_ptr());
            segalloc.free(c.as_ptr());
        }

        // neither 200 + 56 + 1000 alone suffices, all of 1512 does
        let d = unsafe { segalloc.realloc(b.as_ptr(), 1400) }.unwrap();
        assert_eq!(d, a);
        assert!(is_filled(d, 1000, 0x55));
        assert_eq!(block_of(d).capacity(), 200 + 1000 + 200 + 2 * HEADER_SIZE);
        assert_eq!(segalloc.num_free_blocks(), 0);
    }

    #[test]
    fn realloc_grows_top_block_in_place() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        fill(a, 1000, 0x66);
        let heap_bytes = segalloc.heap_bytes;

        let b = unsafe { segalloc.realloc(a.as_ptr(), 5000) }.unwrap();
        assert_eq!(b, a);
        assert!(is_filled(b, 1000, 0x66));
        assert_eq!(segalloc.heap_bytes, heap_bytes + 4000);
        assert_eq!(block_of(b).capacity(), 5000);
    }

    #[test]
    fn realloc_falls_back_to_moving() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(1000).unwrap();
        let _guard = segalloc.malloc(8).unwrap();
        fill(a, 1000, 0x77);

        let b = unsafe { segalloc.realloc(a.as_ptr(), 5000) }.unwrap();
        assert_ne!(b, a);
        assert!(is_filled(b, 1000, 0x77));
        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.num_free_bytes(), 1000);
    }

    #[test]
    fn realloc_mapped_blocks() {
        let mut segalloc = test_segalloc(1 << 16);

        let a = segalloc.malloc(MMAP_THRESHOLD + 8).unwrap();
        fill(a, MMAP_THRESHOLD + 8, 0x88);

        let same = unsafe { segalloc.realloc(a.as_ptr(), MMAP_THRESHOLD + 8) }.unwrap();
        assert_eq!(same, a);

        let grown = unsafe { segalloc.realloc(a.as_ptr(), 2 * MMAP_THRESHOLD) }.unwrap();
        assert!(is_filled(grown, MMAP_THRESHOLD + 8, 0x88));
        assert_eq!(segalloc.mapped_blocks, 1);
        assert_eq!(segalloc.mapped_bytes, 2 * MMAP_THRESHOLD);

        let shrunk = unsafe { segalloc.realloc(grown.as_ptr(), 100) }.unwrap();
        assert!(is_filled(shrunk, 104, 0x88));
        assert!(block_of(shrunk).is_mapped());
        assert_eq!(segalloc.mapped_blocks, 1);
        assert_eq!(segalloc.mapped_bytes, 104);
        assert_eq!(segalloc.heap_bytes, 0);

        unsafe { segalloc.free(shrunk.as_ptr()) };
        assert_eq!(segalloc.mapped_blocks, 0);
        assert_eq!(segalloc.mapped_bytes, 0);
    }

    #[test]
    fn heap_exhaustion_changes_nothing() {
        let mut segalloc = test_segalloc(4096);

        let a = segalloc.malloc(1000).unwrap();
        let b = segalloc.malloc(1000).unwrap();
        fill(a, 1000, 0x99);
        let before = segalloc.stats();

        assert_eq!(segalloc.malloc(3000), Err(AllocFailure::ResourceExhausted));
        assert_eq!(segalloc.stats(), before);

        // neither neighbor helps and the top block can't grow
        assert_eq!(
            unsafe { segalloc.realloc(a.as_ptr(), 3000) },
            Err(AllocFailure::ResourceExhausted)
        );
        assert_eq!(segalloc.stats(), before);
        assert!(is_filled(a, 1000, 0x99));

        assert_eq!(
            unsafe { segalloc.realloc(b.as_ptr(), 3000) },
            Err(AllocFailure::ResourceExhausted)
        );
        assert_eq!(segalloc.stats(), before);

        // a free wilderness that can't be grown stays free and binned
        unsafe { segalloc.free(b.as_ptr()) };
        let before = segalloc.stats();
        assert_eq!(segalloc.malloc(3000), Err(AllocFailure::ResourceExhausted));
        assert_eq!(segalloc.stats(), before);
        assert_eq!(segalloc.blocks.wilderness(), Some(block_of(b)));
    }

    #[test]
    fn mapping_failure_changes_nothing() {
        let mut segalloc = Segalloc::new(test_arena(1 << 16), NoMapping);

        let a = segalloc.malloc(1000).unwrap();
        let before = segalloc.stats();

        assert_eq!(segalloc.malloc(MMAP_THRESHOLD + 8), Err(AllocFailure::ResourceExhausted));
        assert_eq!(segalloc.stats(), before);

        // the fallback allocation is what fails, the original stays put
        let _guard = segalloc.malloc(8).unwrap();
        let before = segalloc.stats();
        assert_eq!(
            unsafe { segalloc.realloc(a.as_ptr(), MMAP_THRESHOLD + 8) },
            Err(AllocFailure::ResourceExhausted)
        );
        assert_eq!(segalloc.stats(), before);
        assert!(!block_of(a).is_free());
    }

    #[test]
    fn failed_remap_keeps_the_mapped_block() {
        let mut segalloc = Segalloc::new(test_arena(1 << 16), LimitedMaps::new(1));

        let a = segalloc.malloc(MMAP_THRESHOLD + 8).unwrap();
        fill(a, MMAP_THRESHOLD + 8, 0xab);
        let before = segalloc.stats();

        for size in [2 * MMAP_THRESHOLD, 100] {
            assert_eq!(
                unsafe { segalloc.realloc(a.as_ptr(), size) },
                Err(AllocFailure::ResourceExhausted)
            );
            assert_eq!(segalloc.stats(), before);
            assert!(is_filled(a, MMAP_THRESHOLD + 8, 0xab));
            assert!(block_of(a).is_mapped());
        }

        // same size needs no new mapping
        assert_eq!(unsafe { segalloc.realloc(a.as_ptr(), MMAP_THRESHOLD + 8) }, Ok(a));

        unsafe { segalloc.free(a.as_ptr()) };
        assert_eq!(segalloc.stats().mapped_blocks, 0);
        assert_eq!(segalloc.stats().mapped_bytes, 0);
    }

    #[test]
    fn big_free_blocks_land_in_the_last_bin() {
        let mut segalloc = test_segalloc(1 << 20);

        let a = segalloc.malloc(100 * BIN_SIZE).unwrap();
        let b = segalloc.malloc(100 * BIN_SIZE).unwrap();
        let _guard = segalloc.malloc(8).unwrap();

        unsafe {
            segalloc.free(a.as_ptr());
            segalloc.free(b.as_ptr());
        }

        // coalesced past the threshold, still a heap block
        let merged = block_of(a);
        assert!(merged.capacity() > MMAP_THRESHOLD);
        assert!(!merged.is_mapped());
        assert_eq!(segalloc.bins.classes()[crate::BIN_COUNT - 1].iter().count(), 1);

        let c = segalloc.malloc(MMAP_THRESHOLD).unwrap();
        assert_eq!(c, a);
        unsafe { segalloc.free(c.as_ptr()) };
        assert_eq!(segalloc.mapped_blocks, 0);
    }

    #[test]
    fn random_actions_keep_the_heap_consistent() {
        let mut segalloc = test_segalloc(16 << 20);
        let rng = fastrand::Rng::with_seed(0x5e6a110c);

        // (payload, requested size, fill byte)
        let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

        for step in 0..4000 {
            let byte = (step % 251) as u8;

            match rng.u8(0..10) {
                0..=3 => {
                    let size = if rng.u8(0..50) == 0 {
                        rng.usize(MMAP_THRESHOLD - 64..MMAP_THRESHOLD + 5000)
                    } else {
                        rng.usize(1..6000)
                    };

                    if let Ok(p) = segalloc.malloc(size) {
                        fill(p, size, byte);
                        live.push((p, size, byte));
                    }
                }
                4..=6 if !live.is_empty() => {
                    let (p, size, old) = live.swap_remove(rng.usize(..live.len()));
                    assert!(is_filled(p, size, old));
                    unsafe { segalloc.free(p.as_ptr()) };
                }
                7..=9 if !live.is_empty() => {
                    let index = rng.usize(..live.len());
                    let (p, size, old) = live[index];
                    let new_size = rng.usize(1..9000);

                    if let Ok(q) = unsafe { segalloc.realloc(p.as_ptr(), new_size) } {
                        assert!(is_filled(q, size.min(new_size), old));
                        fill(q, new_size, byte);
                        live[index] = (q, new_size, byte);
                    }
                }
                _ => {}
            }

            if step % 64 == 0 {
                let mut spans: Vec<(usize, usize)> =
                    live.iter().map(|&(p, size, _)| (p.as_ptr() as usize, size)).collect();
                spans.sort_unstable();
                for pair in spans.windows(2) {
                    assert!(pair[0].0 + pair[0].1 <= pair[1].0, "live payloads overlap");
                }

                let stats = segalloc.stats();
                assert_eq!(
                    stats.free_bytes
                        + (stats.in_use_bytes() - stats.mapped_bytes)
                        + (stats.meta_data_bytes - stats.mapped_blocks * HEADER_SIZE),
                    stats.heap_bytes
                );
            }
        }

        for (p, size, byte) in live {
            assert!(is_filled(p, size, byte));
            unsafe { segalloc.free(p.as_ptr()) };
        }

        assert_eq!(segalloc.num_free_blocks(), 1);
        assert_eq!(segalloc.mapped_blocks, 0);
        assert_eq!(segalloc.num_free_bytes() + HEADER_SIZE, segalloc.heap_bytes);
    }
}
