//! Helper functions that don't particularly belong to any concrete module of
//! the allocator.

/// Rounds `n` up to the next multiple of `to`, which must be a power of two.
///
/// This is used to keep the program break on the header-unit grid and to
/// round byte requests up to whole pages before mapping them.
pub(crate) fn align(n: usize, to: usize) -> usize {
    (n + to - 1) & !(to - 1)
}
