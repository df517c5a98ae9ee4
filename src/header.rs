use std::{mem, ptr::NonNull};

/// Minimum number of units requested from the backing store in one growth.
/// Growing in batches amortizes the syscall cost over many small
/// allocations.
pub(crate) const NALLOC: usize = 1024;

/// Smallest block ever minted: one unit of header plus one unit of payload.
///
/// One exception, inherited from the classic C allocator: splitting a free
/// node one unit larger than a request leaves a 1-unit free remainder. Such
/// a node holds no payload and no fit ever selects it; it sits on the list
/// until a neighboring free merges it away.
pub(crate) const MIN_UNITS: usize = 2;

/// Size of one header unit in bytes. Every block size in this crate is
/// counted in these units, and every block spans a whole number of them.
pub const UNIT: usize = mem::size_of::<Header>();

/// Tag stamped on a block while it is handed out to a caller.
pub(crate) const MAGIC_LIVE: usize = 0xA110_C8ED;

/// Tag stamped on a block while it sits on a free list.
pub(crate) const MAGIC_FREE: usize = 0xF4EE_B10C;

/// Metadata that prefixes every block, free or allocated. The payload starts
/// immediately after the header and spans `size - 1` units:
///
/// ```text
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        |
/// |    size (units)     |        | -> Header (exactly one unit)
/// +---------------------+        |
/// |        magic        |        |
/// +---------------------+ <------+
/// |       Payload       |        |
/// |         ...         |        | -> size - 1 units
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// The classic C formulation forces block alignment by overlaying the header
/// with the most aligned scalar of the platform in a union; `repr(align(16))`
/// plays that role here, so a payload pointer one unit past the header is
/// valid for any scalar type.
#[repr(C, align(16))]
pub(crate) struct Header {
    /// Next block, while this one sits on a free list.
    pub next: *mut Header,
    /// Size of this block in header units, the header itself included.
    pub size: usize,
    /// Debug tag telling live blocks apart from freed ones. Release builds
    /// carry the field but never look at it, so the unit size is the same in
    /// both profiles.
    pub magic: usize,
}

// Blocks are laid out back to back on the unit grid, so `Header` must tile.
const _: () = assert!(mem::size_of::<Header>() % mem::align_of::<Header>() == 0);

/// Units needed to serve `nbytes` of payload: the byte count rounded up to
/// whole units, plus one unit for the header itself.
pub fn units_for(nbytes: usize) -> usize {
    nbytes / UNIT + usize::from(nbytes % UNIT != 0) + 1
}

/// Payload pointer handed to callers: one unit past the header.
///
/// # Safety
/// `header` must point to a block of at least [`MIN_UNITS`] units.
pub(crate) unsafe fn payload_of(header: NonNull<Header>) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(header.as_ptr().add(1)).cast() }
}

/// Recovers the header from a pointer previously produced by [`payload_of`].
///
/// # Safety
/// `ptr` must have been returned by this allocator and not freed since; in
/// release builds nothing validates the result.
pub(crate) unsafe fn header_of(ptr: *mut u8) -> *mut Header {
    unsafe { ptr.cast::<Header>().sub(1) }
}

/// Stamps `header` as handed out. Only debug builds ever read the tag back.
///
/// # Safety
/// `header` must be a valid block header.
pub(crate) unsafe fn mark_live(header: *mut Header) {
    if cfg!(debug_assertions) {
        unsafe { (*header).magic = MAGIC_LIVE };
    }
}

/// Stamps `header` as returned to a free list.
///
/// # Safety
/// `header` must be a valid block header.
pub(crate) unsafe fn mark_free(header: *mut Header) {
    if cfg!(debug_assertions) {
        unsafe { (*header).magic = MAGIC_FREE };
    }
}

/// Whether `header` carries the live tag.
///
/// # Safety
/// `header` must be readable as a `Header`.
pub(crate) unsafe fn is_live(header: *const Header) -> bool {
    unsafe { (*header).magic == MAGIC_LIVE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_math_reserves_the_header() {
        // Any request of up to one unit of payload costs two units in total.
        assert_eq!(units_for(1), 2);
        assert_eq!(units_for(UNIT), 2);
        assert_eq!(units_for(UNIT + 1), 3);
        assert_eq!(units_for(10 * UNIT), 11);
    }

    #[test]
    fn minimum_block_holds_a_payload_unit() {
        assert!(units_for(1) >= MIN_UNITS);
    }

    #[test]
    fn header_satisfies_scalar_alignment() {
        assert!(mem::align_of::<Header>() >= mem::align_of::<u128>());
        assert!(mem::align_of::<Header>() >= mem::align_of::<f64>());
        assert!(mem::align_of::<Header>() >= mem::align_of::<*mut u8>());
    }
}
