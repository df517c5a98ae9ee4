use std::ptr::NonNull;

use crate::header::{Header, UNIT};
use crate::utils::align;

/// A chunk of raw memory handed over by a [`BackingStore`]. The address is
/// suitably aligned for a block header and the range spans exactly `units`
/// header units.
pub struct Grant {
    pub addr: NonNull<u8>,
    pub units: usize,
}

/// Source of raw address space for an allocator instance.
///
/// Implementations only ever grow. Once a grant is handed out the store
/// keeps no claim on the range, and the range is never returned to the OS;
/// the extent is monotonic. Grants are whole or absent, never partial, and
/// arrive zero-initialized.
pub trait BackingStore {
    /// Acquires at least `units` header units of fresh memory. A grant may
    /// exceed the request (page rounding); a `None` is terminal for this
    /// call only.
    fn grow(&mut self, units: usize) -> Option<Grant>;

    /// Current high-water mark of the store. The measurement harness reads
    /// this to compute memory overhead.
    fn extent(&self) -> *mut u8;
}

/// Platform layer for the mapped policy. The store above only deals in
/// pages; which syscall provides them differs per target, exactly as the
/// split between `libc::mmap` and `VirtualAlloc` does.
mod sys {
    use std::ptr::NonNull;
    use std::sync::OnceLock;

    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    /// Virtual memory page size of the machine, queried once.
    pub(super) fn page_size() -> usize {
        *PAGE_SIZE.get_or_init(query_page_size)
    }

    #[cfg(unix)]
    fn query_page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }

    /// Maps `len` bytes of anonymous read-write memory, preferably at
    /// `hint`. The hint is advisory; the mapping lands wherever the OS puts
    /// it.
    #[cfg(unix)]
    pub(super) unsafe fn map_pages(hint: *mut u8, len: usize) -> Option<NonNull<u8>> {
        use libc::{mmap, off_t, size_t};
        use std::os::raw::{c_int, c_void};

        const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
        const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        const FD: c_int = -1;
        const OFFSET: off_t = 0;

        unsafe {
            let addr = mmap(hint.cast::<c_void>(), len as size_t, PROT, FLAGS, FD, OFFSET);

            if addr == libc::MAP_FAILED {
                None
            } else {
                Some(NonNull::new_unchecked(addr).cast::<u8>())
            }
        }
    }

    #[cfg(windows)]
    fn query_page_size() -> usize {
        use std::mem::MaybeUninit;
        use windows::Win32::System::SystemInformation;

        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }

    #[cfg(windows)]
    pub(super) unsafe fn map_pages(hint: *mut u8, len: usize) -> Option<NonNull<u8>> {
        use std::os::raw::c_void;
        use windows::Win32::System::Memory;

        let protection = Memory::PAGE_READWRITE;
        let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

        unsafe {
            let wanted = (!hint.is_null()).then_some(hint.cast_const().cast::<c_void>());
            let addr = Memory::VirtualAlloc(wanted, len, flags, protection);
            if addr.is_null() && wanted.is_some() {
                // The hinted range may be taken; let the OS place it.
                return NonNull::new(Memory::VirtualAlloc(None, len, flags, protection).cast());
            }

            NonNull::new(addr.cast())
        }
    }
}

/// Contiguous growth policy: the arena is the program break, extended in
/// place with `sbrk`. Consecutive grants are address-adjacent, so they
/// coalesce into one ever-growing free run as they pass through the free
/// list.
///
/// The break is process-wide state; keep a single live instance per process.
#[cfg(unix)]
pub struct BrkStore(());

#[cfg(unix)]
impl BrkStore {
    pub fn new() -> Self {
        Self(())
    }
}

#[cfg(unix)]
impl Default for BrkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl BackingStore for BrkStore {
    fn grow(&mut self, units: usize) -> Option<Grant> {
        let bytes = units.checked_mul(UNIT)?;
        unsafe {
            let cur = libc::sbrk(0);
            if cur == usize::MAX as *mut libc::c_void {
                return None;
            }
            // Keep the break on the unit grid so blocks from consecutive
            // extensions stay adjacent in whole unit steps.
            let pad = align(cur as usize, UNIT) - cur as usize;
            let total = pad.checked_add(bytes)?;
            if total > isize::MAX as usize {
                return None;
            }

            let old = libc::sbrk(total as libc::intptr_t);
            if old == usize::MAX as *mut libc::c_void {
                return None;
            }

            let start = old.cast::<u8>().add(pad);
            Some(Grant {
                addr: NonNull::new_unchecked(start),
                units,
            })
        }
    }

    fn extent(&self) -> *mut u8 {
        unsafe { libc::sbrk(0).cast::<u8>() }
    }
}

/// Mapped growth policy: page-granular anonymous mappings, hinted to land
/// right after a logical end-of-heap pointer that doubles as the extent.
/// Byte requests round up to whole pages, so a grant may carry more units
/// than asked for.
pub struct MmapStore {
    /// Logical end of the heap: placement hint for the next mapping and the
    /// reported extent.
    end: *mut u8,
}

impl MmapStore {
    pub fn new() -> Self {
        Self {
            end: initial_heap_end(),
        }
    }
}

impl Default for MmapStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Seeds the logical heap end from the current program break, rounded up to
/// a whole page so it can serve as a mapping hint.
#[cfg(unix)]
fn initial_heap_end() -> *mut u8 {
    unsafe {
        let brk = libc::sbrk(0);
        if brk == usize::MAX as *mut libc::c_void {
            return std::ptr::null_mut();
        }
        align(brk as usize, sys::page_size()) as *mut u8
    }
}

/// No break to anchor to; the first mapping goes wherever the OS puts it.
#[cfg(windows)]
fn initial_heap_end() -> *mut u8 {
    std::ptr::null_mut()
}

impl BackingStore for MmapStore {
    fn grow(&mut self, units: usize) -> Option<Grant> {
        let bytes = units.checked_mul(UNIT)?;
        let page = sys::page_size();
        if bytes > usize::MAX - page {
            return None;
        }
        let len = align(bytes, page);

        let addr = unsafe { sys::map_pages(self.end, len)? };
        // The granted unit count is recomputed from the page-rounded size.
        let granted = len / UNIT;
        self.end = unsafe { addr.as_ptr().add(len) };

        Some(Grant {
            addr,
            units: granted,
        })
    }

    fn extent(&self) -> *mut u8 {
        self.end
    }
}

/// Bounded simulated arena for tests: a single zeroed host allocation
/// carved front to back. Growth fails once the capacity is spent, which
/// makes exhaustion paths deterministic.
pub struct FixedStore {
    buf: NonNull<u8>,
    layout: std::alloc::Layout,
    capacity: usize,
    used: usize,
}

impl FixedStore {
    /// A store able to grant `units` header units in total.
    pub fn with_capacity(units: usize) -> Self {
        let layout = std::alloc::Layout::array::<Header>(units)
            .expect("arena capacity overflows the address space");
        let buf = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            let raw = unsafe { std::alloc::alloc_zeroed(layout) };
            let Some(buf) = NonNull::new(raw) else {
                std::alloc::handle_alloc_error(layout);
            };
            buf
        };
        Self {
            buf,
            layout,
            capacity: units,
            used: 0,
        }
    }

    /// Total units this store can ever grant.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units granted so far.
    pub fn granted(&self) -> usize {
        self.used
    }
}

impl BackingStore for FixedStore {
    fn grow(&mut self, units: usize) -> Option<Grant> {
        if units > self.capacity - self.used {
            return None;
        }
        let addr = unsafe { NonNull::new_unchecked(self.buf.as_ptr().add(self.used * UNIT)) };
        self.used += units;
        Some(Grant { addr, units })
    }

    fn extent(&self) -> *mut u8 {
        unsafe { self.buf.as_ptr().add(self.used * UNIT) }
    }
}

impl Drop for FixedStore {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            unsafe { std::alloc::dealloc(self.buf.as_ptr(), self.layout) }
        }
    }
}
