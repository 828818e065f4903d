#![no_main]

use std::ptr::NonNull;

use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use segalloc::{
    AllocFailure, Arena, Mmap, Segalloc, Span, HEADER_SIZE, MAX_ALLOC_SIZE, MMAP_THRESHOLD,
};

#[derive(Arbitrary, Debug)]
enum Actions {
    /// Allocate `size` bytes, or `size` pages with `mapped`
    Malloc { size: u16, mapped: bool },
    /// Allocate `count * size` zeroed bytes
    Calloc { count: u8, size: u16 },
    /// Free the ith allocation
    Free { index: u8 },
    /// Free the ith allocation twice
    DoubleFree { index: u8 },
    /// Realloc the ith allocation
    Realloc { index: u8, new_size: u16 },
}
use Actions::*;

fuzz_target!(|actions: Vec<Actions>| fuzz_segalloc(actions));

const ARENA_SIZE: usize = 1 << 24;

fn fuzz_segalloc(actions: Vec<Actions>) {
    let memory = vec![0u64; ARENA_SIZE / 8].into_boxed_slice();
    let memory = Box::into_raw(memory);
    let arena = unsafe { Arena::new(Span::from(memory)) };

    // debug builds check the heap's structure after every operation
    let segallock = Segalloc::new(arena, Mmap).lock::<spin::Mutex<()>>();

    // (payload, size, fill byte)
    let mut allocations: Vec<(NonNull<u8>, usize, u8)> = vec![];

    for (step, action) in actions.into_iter().enumerate() {
        let byte = step as u8;
        let mut segalloc = segallock.lock();

        match action {
            Malloc { size, mapped } => {
                let size = if mapped { size as usize * 4096 } else { size as usize };

                match segalloc.malloc(size) {
                    Ok(ptr) => {
                        unsafe { ptr.as_ptr().write_bytes(byte, size) };
                        allocations.push((ptr, size, byte));
                    }
                    Err(AllocFailure::InvalidSize) => assert!(size == 0 || size > MAX_ALLOC_SIZE),
                    Err(AllocFailure::ResourceExhausted) => assert!(
                        size > MMAP_THRESHOLD || segalloc.heap().remaining() < size + HEADER_SIZE + 8
                    ),
                }
            }
            Calloc { count, size } => {
                let total = count as usize * size as usize;

                if let Ok(ptr) = segalloc.calloc(count as usize, size as usize) {
                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), total) };
                    assert!(bytes.iter().all(|&b| b == 0));
                    allocations.push((ptr, total, 0));
                }
            }
            Free { index } => {
                if !allocations.is_empty() {
                    let index = index as usize % allocations.len();
                    let (ptr, size, fill) = allocations.swap_remove(index);

                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                    assert!(bytes.iter().all(|&b| b == fill));

                    unsafe { segalloc.free(ptr.as_ptr()) };
                }
            }
            DoubleFree { index } => {
                if !allocations.is_empty() {
                    let index = index as usize % allocations.len();
                    let (ptr, _, _) = allocations.swap_remove(index);

                    let mapped_blocks = segalloc.stats().mapped_blocks;
                    unsafe { segalloc.free(ptr.as_ptr()) };

                    // mapped blocks are gone once freed, heap blocks are still tracked
                    if segalloc.stats().mapped_blocks == mapped_blocks {
                        let stats = segalloc.stats();
                        unsafe { segalloc.free(ptr.as_ptr()) };
                        assert_eq!(segalloc.stats(), stats);
                    }
                }
            }
            Realloc { index, new_size } => {
                if !allocations.is_empty() {
                    let index = index as usize % allocations.len();
                    let (ptr, size, fill) = allocations[index];
                    let new_size = new_size as usize;

                    if let Ok(new_ptr) = unsafe { segalloc.realloc(ptr.as_ptr(), new_size) } {
                        let kept = size.min(new_size);
                        let bytes = unsafe { std::slice::from_raw_parts(new_ptr.as_ptr(), kept) };
                        assert!(bytes.iter().all(|&b| b == fill));

                        unsafe { new_ptr.as_ptr().write_bytes(byte, new_size) };
                        allocations[index] = (new_ptr, new_size, byte);
                    }
                }
            }
        }
    }

    let mut segalloc = segallock.lock();
    for (ptr, _, _) in allocations {
        unsafe { segalloc.free(ptr.as_ptr()) };
    }

    let stats = segalloc.stats();
    assert_eq!(stats.in_use_blocks(), 0);
    assert_eq!(stats.mapped_bytes, 0);
    drop(segalloc);

    unsafe { drop(Box::from_raw(memory)) };
}
