use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::header::{Header, MIN_UNITS};

/// Number of segregated size classes. Class `k` holds blocks of exactly
/// `MIN_UNITS << k` units: {2, 4, 8, 16, 32, 64}.
pub(crate) const QUICK_CLASSES: usize = 6;

/// Unit size assigned to class `k`.
pub(crate) fn class_units(k: usize) -> usize {
    MIN_UNITS << k
}

/// Smallest class able to hold `nunits`, or `None` when the request exceeds
/// the largest class and must fall back to the primary list.
pub(crate) fn class_index(nunits: usize) -> Option<usize> {
    (0..QUICK_CLASSES).find(|&k| nunits <= class_units(k))
}

/// Class whose unit size is exactly `nunits`, if any. Freed blocks are
/// routed back to their class by this exact match, which is what keeps every
/// class list uniform.
pub(crate) fn exact_class(nunits: usize) -> Option<usize> {
    class_index(nunits).filter(|&k| class_units(k) == nunits)
}

/// One segregated free list. Same circular sentinel construction as the
/// primary list, but every node has the same unit size, so a pop never
/// searches past the first node and a push never splits or coalesces.
pub(crate) struct ClassList {
    base: NonNull<Header>,
    freep: *mut Header,
}

impl ClassList {
    fn new() -> Self {
        let layout = Layout::new::<Header>();
        let raw = unsafe { alloc::alloc_zeroed(layout) }.cast::<Header>();
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        unsafe {
            (*base.as_ptr()).next = base.as_ptr();
            (*base.as_ptr()).size = 0;
        }
        Self {
            base,
            freep: base.as_ptr(),
        }
    }

    /// Parks `block` on this class list, right after the cursor.
    ///
    /// # Safety
    /// `block` must be a valid header of exactly this class's unit size, not
    /// on any other list.
    pub(crate) unsafe fn push(&mut self, block: *mut Header) {
        unsafe {
            let p = self.freep;
            (*block).next = (*p).next;
            (*p).next = block;
        }
    }

    /// Unlinks and returns a block, or `None` when only the sentinel is
    /// left.
    pub(crate) fn pop(&mut self) -> Option<NonNull<Header>> {
        unsafe {
            let mut prev = self.freep;
            let mut p = (*prev).next;
            loop {
                // The sentinel is the only size-0 node on the circle.
                if (*p).size != 0 {
                    (*prev).next = (*p).next;
                    self.freep = prev;
                    return Some(NonNull::new_unchecked(p));
                }
                if p == self.freep {
                    return None;
                }
                prev = p;
                p = (*p).next;
            }
        }
    }

    /// `(blocks, units)` currently parked on this list.
    fn totals(&self) -> (usize, usize) {
        let mut blocks = 0;
        let mut units = 0;
        let base = self.base.as_ptr();
        unsafe {
            let mut p = (*base).next;
            while p != base {
                blocks += 1;
                units += (*p).size;
                p = (*p).next;
            }
        }
        (blocks, units)
    }
}

impl Drop for ClassList {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.base.as_ptr().cast(), Layout::new::<Header>()) }
    }
}

/// The full set of segregated lists, one per power-of-two class. Built
/// lazily on the first quick-fit request.
pub(crate) struct QuickLists {
    classes: [ClassList; QUICK_CLASSES],
}

impl QuickLists {
    pub(crate) fn new() -> Self {
        Self {
            classes: std::array::from_fn(|_| ClassList::new()),
        }
    }

    pub(crate) fn class(&mut self, k: usize) -> &mut ClassList {
        &mut self.classes[k]
    }

    /// `(blocks, units)` across every class list.
    pub(crate) fn totals(&self) -> (usize, usize) {
        self.classes
            .iter()
            .map(ClassList::totals)
            .fold((0, 0), |(b, u), (cb, cu)| (b + cb, u + cu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_double_from_the_minimum() {
        let sizes: Vec<usize> = (0..QUICK_CLASSES).map(class_units).collect();
        assert_eq!(sizes, vec![2, 4, 8, 16, 32, 64]);
    }

    #[test]
    fn requests_map_to_the_smallest_holding_class() {
        assert_eq!(class_index(2), Some(0));
        assert_eq!(class_index(3), Some(1));
        assert_eq!(class_index(5), Some(2));
        assert_eq!(class_index(8), Some(2));
        assert_eq!(class_index(64), Some(5));
        assert_eq!(class_index(65), None);
    }

    #[test]
    fn exact_class_requires_an_exact_size() {
        assert_eq!(exact_class(8), Some(2));
        assert_eq!(exact_class(6), None);
        assert_eq!(exact_class(65), None);
    }

    #[test]
    fn push_pop_is_lifo_per_class() {
        let mut list = ClassList::new();
        let layout = Layout::array::<Header>(8).unwrap();
        let arena = unsafe { alloc::alloc_zeroed(layout) }.cast::<Header>();
        assert!(!arena.is_null());
        unsafe {
            let a = arena;
            let b = arena.add(4);
            (*a).size = 4;
            (*b).size = 4;
            list.push(a);
            list.push(b);
            assert_eq!(list.totals(), (2, 8));
            assert_eq!(list.pop().unwrap().as_ptr(), b);
            assert_eq!(list.pop().unwrap().as_ptr(), a);
            assert!(list.pop().is_none());
            alloc::dealloc(arena.cast(), layout);
        }
    }
}
