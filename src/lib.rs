//! The segalloc allocator crate.
//!
//! A `malloc`-style allocator over a single contiguous heap grown with `sbrk`,
//! with every large request served from its own anonymous mapping.
//!
//! ```text
//!   contiguous heap (address order, no gaps)
//!   ┌────────┬─────────┬────────┬──────────────┬────────┬──────────────┐
//!   │ header │ payload │ header │ payload      │ header │ payload      │ <- program break
//!   │ used   │         │ free   │              │ free   │ (wilderness) │
//!   └────────┴─────────┴────────┴──────────────┴────────┴──────────────┘
//!
//!   bins[0..128]: free blocks by payload / 1024, each sorted by size
//!   mapped blocks: counted, never linked
//! ```
//!
//! For getting started:
//! - Build a [`Segalloc`] over a [`HeapSource`] and a [`MapSource`].
//! - Call [`Segalloc::lock`] to get a [`Segallock`], which implements
//!   [`GlobalAlloc`](core::alloc::GlobalAlloc) and, with the `allocator-api2`
//!   feature, `allocator_api2::alloc::Allocator`.
//!
//! ```rust
//! # #[cfg(all(unix, feature = "system-backed", feature = "lock_api"))] {
//! use segalloc::*;
//!
//! // as a global allocator:
//! // #[global_allocator]
//! static ALLOCATOR: Segallock<AssumeUnlockable, Sbrk, Mmap> = Segalloc::new(Sbrk::new(), Mmap).lock();
//! # }
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]

#[cfg(test)]
mod test_utils;

pub(crate) mod ptr_utils;

mod bins;
mod error;
mod header;
mod llist;
mod segalloc;
mod source;
mod span;

#[cfg(feature = "lock_api")]
mod locking;
#[cfg(feature = "lock_api")]
mod segallock;

#[cfg(all(feature = "c-api", feature = "system-backed", target_family = "unix"))]
pub mod c_api;

pub use error::AllocFailure;
pub use segalloc::{Segalloc, Stats};
pub use source::{Arena, HeapSource, MapSource, NoMapping};
pub use span::Span;

#[cfg(all(feature = "system-backed", target_family = "unix"))]
pub use source::unix::{Mmap, Sbrk};

#[cfg(feature = "lock_api")]
pub use locking::AssumeUnlockable;
#[cfg(feature = "lock_api")]
pub use segallock::Segallock;

/// Largest payload size, in bytes, any single request may ask for.
pub const MAX_ALLOC_SIZE: usize = 100_000_000;

/// Number of size-class bins in the free-list index.
pub const BIN_COUNT: usize = 128;

/// Payload size range covered by each bin.
pub const BIN_SIZE: usize = 1024;

/// A split only happens if the carved-off remainder can hold at least this many payload bytes.
pub const MIN_SPLIT_SIZE: usize = 128;

/// Requests for more payload bytes than this get a dedicated mapping.
pub const MMAP_THRESHOLD: usize = 128 * BIN_SIZE;

/// Alignment of every header, payload and block size.
pub const ALIGN: usize = ptr_utils::ALIGN;

/// Size of the metadata record in front of every payload.
pub const HEADER_SIZE: usize = header::HEADER_SIZE;
