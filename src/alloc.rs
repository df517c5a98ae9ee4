use std::ptr::{self, NonNull};

use log::{debug, trace};

use crate::error::AllocError;
use crate::freelist::FreeList;
use crate::header::{self, Header, NALLOC, UNIT};
use crate::quick::{self, QuickLists};
use crate::store::{BackingStore, Grant};

/// Algorithm used to pick the free block serving a request. Chosen per
/// allocator instance at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// First node on the circular list able to hold the request.
    FirstFit,
    /// Smallest node able to hold the request; on ties, the first such node
    /// in traversal order.
    BestFit,
    /// Segregated power-of-two class lists with constant-time pops;
    /// requests above the largest class fall back to first-fit.
    QuickFit,
}

/// Point-in-time accounting of an allocator's heap, in header units.
///
/// Everything the backing store ever granted is either live (handed out),
/// on the primary free list, or parked on a quick-fit class list, so
/// `granted_units - free_units - quick_units` is the live footprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Units ever granted by the backing store.
    pub granted_units: usize,
    /// Units sitting on the primary free list.
    pub free_units: usize,
    /// Node count of the primary free list.
    pub free_blocks: usize,
    /// Units parked on quick-fit class lists.
    pub quick_units: usize,
    /// Block count across all quick-fit class lists.
    pub quick_blocks: usize,
}

/// A dynamic memory allocator over a growable arena of raw address space.
///
/// Blocks are carved from memory granted by the injected [`BackingStore`];
/// freed blocks return to a circular, address-ordered free list and merge
/// with address-adjacent neighbors on the spot. The arena only ever grows,
/// and grown memory is folded in through the same coalescing path a user
/// free takes.
///
/// One instance owns its arena outright. Nothing here is synchronized: a
/// host sharing an instance between threads must serialize every call, and
/// interleaving two calls corrupts the lists irrecoverably.
pub struct Allocator<S: BackingStore> {
    store: S,
    strategy: Strategy,
    list: FreeList,
    quick: Option<QuickLists>,
    granted: usize,
}

impl<S: BackingStore> Allocator<S> {
    pub fn new(store: S, strategy: Strategy) -> Self {
        Self {
            store,
            strategy,
            list: FreeList::new(),
            quick: None,
            granted: 0,
        }
    }

    /// Hands out a block with at least `nbytes` of payload, aligned for any
    /// scalar type.
    ///
    /// Zero-byte requests are rejected with [`AllocError::InvalidSize`]. On
    /// exhaustion the backing store is grown once and the search retried
    /// once; only when that also fails is [`AllocError::OutOfMemory`]
    /// returned.
    pub fn alloc(&mut self, nbytes: usize) -> Result<NonNull<u8>, AllocError> {
        if nbytes == 0 {
            return Err(AllocError::InvalidSize);
        }
        let nunits = header::units_for(nbytes);
        self.list.seed();

        let block = match self.strategy {
            Strategy::FirstFit => self.carve_first(nunits)?,
            Strategy::BestFit => self.carve_best(nunits)?,
            Strategy::QuickFit => self.carve_quick(nunits)?,
        };

        unsafe {
            header::mark_live(block.as_ptr());
            Ok(header::payload_of(block))
        }
    }

    /// Returns a block to the allocator. A null pointer is a no-op.
    ///
    /// Debug builds validate the header tag and reject pointers that were
    /// not handed out by this instance, or were freed already, with
    /// [`AllocError::CorruptedBlock`]. Release builds keep only the null
    /// fast path.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer obtained from this allocator that has
    /// not been freed since.
    pub unsafe fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Ok(());
        }
        let block = unsafe { header::header_of(ptr) };
        if cfg!(debug_assertions) && !unsafe { header::is_live(block) } {
            return Err(AllocError::CorruptedBlock);
        }
        unsafe { header::mark_free(block) };

        if self.strategy == Strategy::QuickFit {
            let size = unsafe { (*block).size };
            if let Some(class) = quick::exact_class(size) {
                let lists = self.quick.get_or_insert_with(QuickLists::new);
                unsafe { lists.class(class).push(block) };
                return Ok(());
            }
        }

        self.list.seed();
        unsafe { self.list.insert(block) };
        Ok(())
    }

    /// Resizes `ptr` to hold `nbytes`, moving the payload to a fresh block.
    ///
    /// A null `ptr` behaves as [`Allocator::alloc`]; `nbytes == 0` frees the
    /// block and returns null. When the new allocation fails the original
    /// block is left untouched and stays valid.
    ///
    /// # Safety
    /// Same as [`Allocator::free`].
    pub unsafe fn realloc(&mut self, ptr: *mut u8, nbytes: usize) -> Result<*mut u8, AllocError> {
        if ptr.is_null() {
            return self.alloc(nbytes).map(NonNull::as_ptr);
        }
        if nbytes == 0 {
            unsafe { self.free(ptr)? };
            return Ok(ptr::null_mut());
        }

        let block = unsafe { header::header_of(ptr) };
        if cfg!(debug_assertions) && !unsafe { header::is_live(block) } {
            return Err(AllocError::CorruptedBlock);
        }
        let old_payload = (unsafe { (*block).size } - 1) * UNIT;

        // Allocate before touching the old block: a failure here must leave
        // the caller's block alive.
        let new = self.alloc(nbytes)?;
        unsafe {
            ptr::copy_nonoverlapping(ptr, new.as_ptr(), old_payload.min(nbytes));
            self.free(ptr)?;
        }
        Ok(new.as_ptr())
    }

    /// High-water mark of the backing store.
    pub fn heap_extent(&self) -> *mut u8 {
        self.store.extent()
    }

    /// Current accounting of the heap.
    pub fn stats(&self) -> HeapStats {
        let ranges = self.list.ranges();
        let (quick_blocks, quick_units) = self.quick.as_ref().map_or((0, 0), QuickLists::totals);
        HeapStats {
            granted_units: self.granted,
            free_units: ranges.iter().map(|&(_, units)| units).sum(),
            free_blocks: ranges.len(),
            quick_units,
            quick_blocks,
        }
    }

    /// Every node on the primary free list as `(address, units)`, in list
    /// order starting after the sentinel.
    pub fn free_ranges(&self) -> Vec<(usize, usize)> {
        self.list.ranges()
    }

    /// Borrow of the injected backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// First-fit with a single growth retry on exhaustion.
    fn carve_first(&mut self, nunits: usize) -> Result<NonNull<Header>, AllocError> {
        if let Some(block) = self.list.first_fit(nunits) {
            return Ok(block);
        }
        self.grow(nunits)?;
        self.list.first_fit(nunits).ok_or(AllocError::OutOfMemory)
    }

    /// Best-fit with a single growth retry on exhaustion.
    fn carve_best(&mut self, nunits: usize) -> Result<NonNull<Header>, AllocError> {
        if let Some(block) = self.list.best_fit(nunits) {
            return Ok(block);
        }
        self.grow(nunits)?;
        self.list.best_fit(nunits).ok_or(AllocError::OutOfMemory)
    }

    /// Quick-fit: constant-time pop from the request's size class, refilled
    /// through the primary machinery when empty. Oversized requests go to
    /// first-fit.
    fn carve_quick(&mut self, nunits: usize) -> Result<NonNull<Header>, AllocError> {
        let Some(class) = quick::class_index(nunits) else {
            return self.carve_first(nunits);
        };
        let units = quick::class_units(class);

        if self.quick.is_none() {
            trace!("initializing {} quick-fit class lists", quick::QUICK_CLASSES);
        }
        let lists = self.quick.get_or_insert_with(QuickLists::new);
        if let Some(block) = lists.class(class).pop() {
            return Ok(block);
        }

        // Refill: carve one block of exactly the class size through the
        // first-fit path (growing if needed), park it on the class list,
        // then retry the pop.
        let block = self.carve_first(units)?;
        let lists = self.quick.get_or_insert_with(QuickLists::new);
        unsafe { lists.class(class).push(block.as_ptr()) };
        lists.class(class).pop().ok_or(AllocError::OutOfMemory)
    }

    /// Requests more memory from the backing store and folds the new block
    /// into the primary list through the same path a user free takes, so it
    /// merges with an address-adjacent grant if there is one.
    fn grow(&mut self, nunits: usize) -> Result<(), AllocError> {
        let request = nunits.max(NALLOC);
        let Some(Grant { addr, units }) = self.store.grow(request) else {
            trace!("backing store refused {request} units");
            return Err(AllocError::OutOfMemory);
        };
        debug_assert!(units >= request);
        debug!("backing store grew by {units} units ({} bytes)", units * UNIT);

        let block = addr.cast::<Header>().as_ptr();
        unsafe {
            (*block).size = units;
            (*block).next = ptr::null_mut();
            header::mark_free(block);
            self.list.insert(block);
        }
        self.granted += units;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FixedStore;

    fn heap(units: usize, strategy: Strategy) -> Allocator<FixedStore> {
        Allocator::new(FixedStore::with_capacity(units), strategy)
    }

    #[test]
    fn basic_alloc() {
        let mut heap = heap(2048, Strategy::FirstFit);
        let block = heap.alloc(std::mem::size_of::<u32>()).unwrap();
        unsafe {
            *block.cast::<u32>().as_ptr() = 23;
            assert_eq!(23, *block.cast::<u32>().as_ptr());
            heap.free(block.as_ptr()).unwrap();
        }
    }

    #[test]
    fn space_for_freed_block_is_reused() {
        let mut heap = heap(2048, Strategy::FirstFit);
        let first = heap.alloc(64).unwrap();
        let _second = heap.alloc(64).unwrap();

        unsafe { heap.free(first.as_ptr()).unwrap() };

        // An exact-size request finds the freed block again.
        let third = heap.alloc(64).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn zero_byte_requests_are_rejected() {
        let mut heap = heap(2048, Strategy::FirstFit);
        assert_eq!(heap.alloc(0), Err(AllocError::InvalidSize));
    }

    #[test]
    fn growth_is_batched() {
        let mut heap = heap(2048, Strategy::FirstFit);
        heap.alloc(8).unwrap();
        // A tiny request still grows by the full batch.
        assert_eq!(heap.stats().granted_units, NALLOC);
    }

    #[test]
    fn realloc_moves_the_payload() {
        let mut heap = heap(4096, Strategy::FirstFit);
        let small = heap.alloc(16).unwrap();
        unsafe {
            small.as_ptr().copy_from_nonoverlapping(b"abcdefghijklmnop".as_ptr(), 16);
            let big = heap.realloc(small.as_ptr(), 1024).unwrap();
            assert_eq!(std::slice::from_raw_parts(big, 16), b"abcdefghijklmnop");
            heap.free(big).unwrap();
        }
    }

    #[test]
    fn heap_extent_is_monotonic() {
        let mut heap = heap(4096, Strategy::FirstFit);
        let before = heap.heap_extent() as usize;
        heap.alloc(64).unwrap();
        let after = heap.heap_extent() as usize;
        assert!(after > before);

        // Served from the free list; no further growth.
        heap.alloc(64).unwrap();
        assert_eq!(heap.heap_extent() as usize, after);
    }
}
