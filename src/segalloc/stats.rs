//! Heap statistics, computed by walking the allocator's lists.

use super::Segalloc;
use crate::{header::HEADER_SIZE, HeapSource, MapSource};

/// A snapshot of the allocator's statistics.
///
/// The `allocated_*` figures count every block the allocator manages: heap
/// blocks, free or not, and mapped blocks. The free figures are a subset of
/// these. Byte counts are payload capacities, headers excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stats {
    /// Number of free heap blocks.
    pub free_blocks: usize,
    /// Sum of free heap blocks' payload capacities.
    pub free_bytes: usize,

    /// Number of heap blocks plus number of mapped blocks.
    pub allocated_blocks: usize,
    /// Sum of all heap and mapped blocks' payload capacities.
    pub allocated_bytes: usize,

    /// Header bytes spent across all blocks.
    pub meta_data_bytes: usize,
    /// Size of a single header.
    pub meta_data_size: usize,

    /// Bytes obtained from the heap source.
    pub heap_bytes: usize,
    /// Number of live mapped blocks.
    pub mapped_blocks: usize,
    /// Sum of live mapped blocks' payload capacities.
    pub mapped_bytes: usize,
}

impl Stats {
    /// Number of blocks currently handed out.
    pub const fn in_use_blocks(&self) -> usize {
        self.allocated_blocks - self.free_blocks
    }

    /// Payload bytes currently handed out.
    pub const fn in_use_bytes(&self) -> usize {
        self.allocated_bytes - self.free_bytes
    }
}

impl core::fmt::Display for Stats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "{:10}{:>10} | {:>18}", "", "blocks", "bytes")?;
        writeln!(f, "{:-<21}+{:-<20}", "", "")?;
        writeln!(f, "free      {:>10} | {:>18}", self.free_blocks, self.free_bytes)?;
        writeln!(f, "in use    {:>10} | {:>18}", self.in_use_blocks(), self.in_use_bytes())?;
        writeln!(f, "allocated {:>10} | {:>18}", self.allocated_blocks, self.allocated_bytes)?;
        writeln!(f, "mapped    {:>10} | {:>18}", self.mapped_blocks, self.mapped_bytes)?;
        writeln!(f, "{:-<21}+{:-<20}", "", "")?;
        writeln!(f, "heap bytes:     {}", self.heap_bytes)?;
        write!(f, "metadata bytes: {} ({} per block)", self.meta_data_bytes, self.meta_data_size)
    }
}

impl<H: HeapSource, M: MapSource> Segalloc<H, M> {
    /// Number of free heap blocks.
    pub fn num_free_blocks(&self) -> usize {
        self.bins.iter().count()
    }

    /// Sum of the free heap blocks' payload capacities.
    pub fn num_free_bytes(&self) -> usize {
        self.bins.iter().map(|block| block.capacity()).sum()
    }

    /// Number of heap blocks, free ones included, plus live mapped blocks.
    pub fn num_allocated_blocks(&self) -> usize {
        self.blocks.iter().count() + self.mapped_blocks
    }

    /// Payload capacity of every heap block, free ones included, plus live mapped blocks.
    pub fn num_allocated_bytes(&self) -> usize {
        self.blocks.iter().map(|block| block.capacity()).sum::<usize>() + self.mapped_bytes
    }

    /// Header bytes across [`num_allocated_blocks`](Segalloc::num_allocated_blocks).
    pub fn num_meta_data_bytes(&self) -> usize {
        self.num_allocated_blocks() * HEADER_SIZE
    }

    /// Size of a single block header.
    pub fn size_meta_data(&self) -> usize {
        HEADER_SIZE
    }

    /// Gather all of the above into a [`Stats`].
    pub fn stats(&self) -> Stats {
        Stats {
            free_blocks: self.num_free_blocks(),
            free_bytes: self.num_free_bytes(),
            allocated_blocks: self.num_allocated_blocks(),
            allocated_bytes: self.num_allocated_bytes(),
            meta_data_bytes: self.num_meta_data_bytes(),
            meta_data_size: HEADER_SIZE,
            heap_bytes: self.heap_bytes,
            mapped_blocks: self.mapped_blocks,
            mapped_bytes: self.mapped_bytes,
        }
    }
}
