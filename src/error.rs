use thiserror::Error;

/// Failures surfaced by the allocator.
///
/// Every error is reported to the caller; nothing is swallowed and nothing
/// panics across the public boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// A zero-byte allocation was requested.
    #[error("zero-byte allocation request")]
    InvalidSize,
    /// The backing store could not satisfy a growth request, even after the
    /// single retried attempt.
    #[error("backing store exhausted")]
    OutOfMemory,
    /// Debug-build tag validation failed: the pointer does not reference a
    /// live block handed out by this allocator.
    #[error("block header failed validation")]
    CorruptedBlock,
}
