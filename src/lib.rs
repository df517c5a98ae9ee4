//! A user-space dynamic memory allocator over a growable arena of raw
//! address space, in the classic free-list style.
//!
//! Every block, free or allocated, is prefixed by a one-unit header holding
//! its size in header units; free blocks additionally thread a circular,
//! address-ordered list through their headers. Freeing coalesces
//! address-adjacent neighbors immediately, so the list never holds two
//! touching blocks:
//!
//! ```text
//!              Arena (grows monotonically, never shrinks)
//!
//! +--------+-------------+--------+-----------+--------+----------------+
//! | Header |   payload   | Header |  payload  | Header |    payload     |
//! | (live) |             | (free) |           | (live) |                |
//! +--------+-------------+---|----+-----------+--------+----------------+
//!                            |
//!                            v  circular free list, ordered by address
//! ```
//!
//! Raw memory comes from a [`BackingStore`] injected at construction:
//! [`BrkStore`] extends the program break in place (unix), [`MmapStore`]
//! maps anonymous pages after a logical end-of-heap pointer, and
//! [`FixedStore`] simulates a bounded arena so tests can exhaust it
//! deterministically. The fit [`Strategy`] (first-fit, best-fit, or
//! segregated quick-fit) is likewise chosen per instance.
//!
//! ```no_run
//! use fitalloc::{Allocator, MmapStore, Strategy};
//!
//! let mut heap = Allocator::new(MmapStore::new(), Strategy::FirstFit);
//! let ptr = heap.alloc(128)?;
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x2a, 128);
//!     heap.free(ptr.as_ptr())?;
//! }
//! # Ok::<(), fitalloc::AllocError>(())
//! ```
//!
//! A single logical owner drives each allocator; nothing is synchronized.
//! Embedders calling from several threads must serialize every call behind
//! one lock.

mod alloc;
mod error;
mod freelist;
mod header;
mod quick;
mod store;
mod utils;

pub use crate::alloc::{Allocator, HeapStats, Strategy};
pub use crate::error::AllocError;
pub use crate::header::{UNIT, units_for};
#[cfg(unix)]
pub use crate::store::BrkStore;
pub use crate::store::{BackingStore, FixedStore, Grant, MmapStore};
