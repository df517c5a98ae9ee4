use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
};

use crate::header::Header;

/// The primary free list: a circular, singly-linked chain of free block
/// headers kept in ascending address order, anchored by a size-0 sentinel.
///
/// ```text
///    freep ------+
///                v
/// +--------+   +--------+      +--------+      +--------+
/// |  base  |-->|  Free  |- - ->|  Free  |- - ->|  Free  |--+
/// | size 0 |   +--------+      +--------+      +--------+  |
/// +--------+                                               |
///      ^----------------------------------------------------+
/// ```
///
/// The links live inside the free blocks themselves, so the list never
/// allocates for its nodes; only the sentinel comes from the host allocator,
/// once, and keeps a stable address for the lifetime of the list. The cursor
/// `freep` marks the most recently touched node and is where every search
/// starts; it is re-seated after each insertion and removal.
///
/// Two invariants hold between calls:
///
/// - following `next` from any node comes back to that node (closed cycle),
/// - no two nodes are directly address-adjacent, because [`FreeList::insert`]
///   coalesces eagerly.
pub(crate) struct FreeList {
    /// Sentinel anchoring the circle. Its size stays 0 forever, so the
    /// lower merge in `insert` can never absorb it; the upper merge skips
    /// it explicitly, since the host allocator may place it directly above
    /// a listed block.
    base: NonNull<Header>,
    /// Scan cursor. Null until the list is seeded.
    freep: *mut Header,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        let layout = Layout::new::<Header>();
        let raw = unsafe { alloc::alloc_zeroed(layout) }.cast::<Header>();
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Self {
            base,
            freep: ptr::null_mut(),
        }
    }

    /// Links the sentinel to itself, forming the empty circle. Idempotent;
    /// every public operation calls this before touching the list.
    pub(crate) fn seed(&mut self) {
        if !self.freep.is_null() {
            return;
        }
        let base = self.base.as_ptr();
        unsafe {
            (*base).next = base;
            (*base).size = 0;
        }
        self.freep = base;
    }

    /// Returns `block` to the list at its address-ordered position, merging
    /// it with an address-adjacent neighbor on either side, and re-seats the
    /// cursor to the predecessor of the insertion point.
    ///
    /// The scan looks for the unique pair `(p, p.next)` with
    /// `p < block < p.next`. At the seam of the circle, where `p >= p.next`,
    /// the block is accepted when it lies above the highest node or below
    /// the lowest one.
    ///
    /// # Safety
    /// `block` must be a valid header not currently on any list, its range
    /// must not overlap any listed block, and the list must be seeded.
    pub(crate) unsafe fn insert(&mut self, block: *mut Header) {
        debug_assert!(!self.freep.is_null());
        unsafe {
            let mut p = self.freep;
            while !(block > p && block < (*p).next) {
                if p >= (*p).next && (block > p || block < (*p).next) {
                    break;
                }
                p = (*p).next;
            }

            // The sentinel is excluded from the upper merge: it lives in
            // host memory, which may sit directly above a listed block, and
            // absorbing it would unlink the circle's anchor.
            if block.add((*block).size) == (*p).next && (*p).next != self.base.as_ptr() {
                // Join with the upper neighbor: absorb it whole.
                (*block).size += (*(*p).next).size;
                (*block).next = (*(*p).next).next;
            } else {
                (*block).next = (*p).next;
            }

            if p.add((*p).size) == block {
                // Join with the lower neighbor.
                (*p).size += (*block).size;
                (*p).next = (*block).next;
            } else {
                (*p).next = block;
            }

            self.freep = p;
        }
    }

    /// First-fit scan from the cursor: the first node holding at least
    /// `nunits` is taken. Returns `None` after one full circuit without a
    /// fit.
    pub(crate) fn first_fit(&mut self, nunits: usize) -> Option<NonNull<Header>> {
        debug_assert!(!self.freep.is_null());
        let mut prev = self.freep;
        let mut p = unsafe { (*prev).next };
        loop {
            unsafe {
                if (*p).size >= nunits {
                    return Some(self.take(prev, p, nunits));
                }
                if p == self.freep {
                    return None;
                }
                prev = p;
                p = (*p).next;
            }
        }
    }

    /// One full circular pass recording the smallest node that still holds
    /// `nunits`. The comparison is strict, so the first node reaching the
    /// minimum wins ties. The winner is carved exactly like in the
    /// first-fit path.
    pub(crate) fn best_fit(&mut self, nunits: usize) -> Option<NonNull<Header>> {
        debug_assert!(!self.freep.is_null());
        let start = self.freep;
        let mut prev = start;
        let mut p = unsafe { (*prev).next };
        let mut best: Option<(*mut Header, *mut Header)> = None;
        loop {
            unsafe {
                let better = match best {
                    None => true,
                    Some((_, b)) => (*p).size < (*b).size,
                };
                if (*p).size >= nunits && better {
                    best = Some((prev, p));
                }
                if p == start {
                    break;
                }
                prev = p;
                p = (*p).next;
            }
        }
        let (prev, p) = best?;
        Some(unsafe { self.take(prev, p, nunits) })
    }

    /// Carves `nunits` out of the fitting node `p`, whose predecessor is
    /// `prev`. An exact fit is unlinked; a larger node shrinks in place and
    /// the allocation is taken from its tail, so the free node keeps its
    /// address. The cursor re-seats to the predecessor.
    unsafe fn take(&mut self, prev: *mut Header, p: *mut Header, nunits: usize) -> NonNull<Header> {
        unsafe {
            let block = if (*p).size == nunits {
                (*prev).next = (*p).next;
                p
            } else {
                (*p).size -= nunits;
                let tail = p.add((*p).size);
                (*tail).size = nunits;
                tail
            };
            self.freep = prev;
            NonNull::new_unchecked(block)
        }
    }

    /// Walks the circle once, reporting every node as `(address, units)` in
    /// list order starting after the sentinel. The sentinel itself is
    /// skipped.
    pub(crate) fn ranges(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        if self.freep.is_null() {
            return out;
        }
        let base = self.base.as_ptr();
        unsafe {
            let mut p = (*base).next;
            while p != base {
                out.push((p as usize, (*p).size));
                p = (*p).next;
            }
        }
        out
    }
}

impl Drop for FreeList {
    fn drop(&mut self) {
        // Only the sentinel belongs to the host allocator; the listed blocks
        // live in the backing store's memory.
        unsafe { alloc::dealloc(self.base.as_ptr().cast(), Layout::new::<Header>()) }
    }
}
