//! The size-class free-list index.
//!
//! Free blocks are bucketed by payload capacity into [`BIN_COUNT`] bins of
//! [`BIN_SIZE`] bytes each; everything from the last bin's lower bound upward
//! shares the last bin. Each bin is a list kept sorted ascending by size, so
//! the first fitting entry of the first bin that has one is the best fit.

use crate::{header::Block, llist::Iter, BIN_COUNT, BIN_SIZE, MMAP_THRESHOLD};

/// Bin index for a free payload capacity (header excluded).
#[inline]
pub(crate) fn bin_of(capacity: usize) -> usize {
    if capacity == MMAP_THRESHOLD {
        return BIN_COUNT - 1;
    }

    (capacity / BIN_SIZE).min(BIN_COUNT - 1)
}

/// One size class: a doubly linked list through the blocks' class links.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassList {
    head: Option<Block>,
    tail: Option<Block>,
}

impl ClassList {
    pub const EMPTY: Self = Self { head: None, tail: None };

    /// Insert before the first entry at least as large, keeping the list sorted.
    fn insert_sorted(&mut self, block: Block) {
        let mut cursor = self.head;
        while let Some(node) = cursor {
            if node.size() >= block.size() {
                break;
            }
            cursor = node.class_next();
        }

        match cursor {
            Some(next) => {
                let prev = next.class_prev();
                block.set_class_links(prev, Some(next));
                next.set_class_prev(Some(block));
                match prev {
                    Some(prev) => prev.set_class_next(Some(block)),
                    None => self.head = Some(block),
                }
            }
            None => {
                block.set_class_links(self.tail, None);
                match self.tail {
                    Some(tail) => tail.set_class_next(Some(block)),
                    None => self.head = Some(block),
                }
                self.tail = Some(block);
            }
        }
    }

    fn remove(&mut self, block: Block) {
        let prev = block.class_prev();
        let next = block.class_next();

        match prev {
            Some(prev) => prev.set_class_next(next),
            None => {
                debug_assert_eq!(self.head, Some(block));
                self.head = next;
            }
        }
        match next {
            Some(next) => next.set_class_prev(prev),
            None => {
                debug_assert_eq!(self.tail, Some(block));
                self.tail = prev;
            }
        }

        block.set_class_links(None, None);
    }

    /// The smallest entry with at least `capacity` payload bytes.
    fn first_fit(&self, capacity: usize) -> Option<Block> {
        self.iter().find(|block| block.capacity() >= capacity)
    }

    pub fn iter(&self) -> Iter {
        Iter { next: self.head, step: Block::class_next }
    }
}

/// The array of size classes.
#[derive(Debug)]
pub(crate) struct Bins([ClassList; BIN_COUNT]);

impl Bins {
    pub const fn new() -> Self {
        Self([ClassList::EMPTY; BIN_COUNT])
    }

    /// Publish a free block in the bin of its capacity.
    pub fn insert(&mut self, block: Block) {
        debug_assert!(block.is_free());
        self.0[bin_of(block.capacity())].insert_sorted(block);
    }

    /// Withdraw a block from its bin. Must be called before its size changes.
    pub fn remove(&mut self, block: Block) {
        self.0[bin_of(block.capacity())].remove(block);
    }

    /// Scan bins upward from the request's class for the first entry that fits.
    pub fn best_fit(&self, capacity: usize) -> Option<Block> {
        self.0[bin_of(capacity)..].iter().find_map(|class| class.first_fit(capacity))
    }

    pub fn classes(&self) -> &[ClassList; BIN_COUNT] {
        &self.0
    }

    /// Every free block, in bin order.
    pub fn iter(&self) -> impl Iterator<Item = Block> + '_ {
        self.0.iter().flat_map(ClassList::iter)
    }
}
