use crate::header::Block;

/// The address-ordered list of every block carved out of the contiguous heap.
///
/// The list is:
///  * **Intrusive**: the links live in the block headers
///  * **Doubly linked** to allow neighbor lookup and single ref removal
///  * **Gapless**: consecutive entries are address-adjacent, so the list
///    always covers the whole heap grown so far
///
/// The tail is the highest-addressed block, the "wilderness" when free.
///
/// This data structure is not thread-safe, use mutexes/locks to mutually exclude data access.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockList {
    head: Option<Block>,
    tail: Option<Block>,
    len: usize,
}

impl BlockList {
    pub const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn head(&self) -> Option<Block> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<Block> {
        self.tail
    }

    /// Append a block freshly grown at the top of the heap.
    pub fn push_back(&mut self, block: Block) {
        match self.tail {
            Some(tail) => self.insert_after(block, tail),
            None => {
                block.set_list_links(None, None);
                self.head = Some(block);
                self.tail = Some(block);
                self.len = 1;
            }
        }
    }

    /// Link `block` immediately after `before`, e.g. the remainder of a split.
    pub fn insert_after(&mut self, block: Block, before: Block) {
        let after = before.list_next();

        block.set_list_links(Some(before), after);
        before.set_list_next(Some(block));

        match after {
            Some(after) => after.set_list_prev(Some(block)),
            None => self.tail = Some(block),
        }

        self.len += 1;
    }

    /// Unlink `block`, e.g. ahead of it being absorbed by its lower neighbor.
    pub fn remove(&mut self, block: Block) {
        let prev = block.list_prev();
        let next = block.list_next();

        match prev {
            Some(prev) => prev.set_list_next(next),
            None => self.head = next,
        }
        match next {
            Some(next) => next.set_list_prev(prev),
            None => self.tail = prev,
        }

        block.set_list_links(None, None);
        self.len -= 1;
    }

    #[inline]
    pub fn is_tail(&self, block: Block) -> bool {
        self.tail == Some(block)
    }

    /// The tail block, if it is free.
    #[inline]
    pub fn wilderness(&self) -> Option<Block> {
        self.tail.filter(|tail| tail.is_free())
    }

    #[inline]
    pub fn prev_free(block: Block) -> Option<Block> {
        block.list_prev().filter(|prev| prev.is_free())
    }

    #[inline]
    pub fn next_free(block: Block) -> Option<Block> {
        block.list_next().filter(|next| next.is_free())
    }

    /// Iterate in ascending address order.
    pub fn iter(&self) -> Iter {
        Iter { next: self.head, step: Block::list_next }
    }
}

/// An iterator along either of the two block link chains.
#[derive(Clone, Copy)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub(crate) struct Iter {
    pub(crate) next: Option<Block>,
    pub(crate) step: fn(Block) -> Option<Block>,
}

impl Iterator for Iter {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next?;
        self.next = (self.step)(block);
        Some(block)
    }
}
