//! # Pool Errors
//!
//! Every fallible pool operation reports a [`PoolError`]. Callers that only
//! care about the coarse outcome can collapse it with [`PoolError::kind`]:
//!
//! | Kind | Raised by |
//! |------|-----------|
//! | [`ErrorKind::CalledAgain`] | repeated `init` / `teardown` |
//! | [`ErrorKind::NotFreed`] | closing a pool with live allocations, freeing a stale or foreign handle |
//! | [`ErrorKind::Fail`] | growth refused, backing memory exhausted, unknown pool, uninitialized registry |
//!
//! Searches that simply find no room (no fitting gap) are not errors; they
//! return `None`.

use thiserror::Error;

use crate::handle::{Generation, PoolHandle, PoolId};

/// Coarse classification of a [`PoolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A lifecycle call was repeated.
    CalledAgain,
    /// Memory is still held, or the handle does not name a live allocation.
    NotFreed,
    /// A growth or acquisition step could not complete.
    Fail,
}

/// Errors returned by pool, registry and global operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// `init` or `teardown` was called out of order.
    #[error("{operation} called again")]
    CalledAgain {
        /// The repeated operation.
        operation: &'static str,
    },

    /// The pool still has live allocations.
    #[error("pool still holds {allocations} live allocation(s)")]
    NotFreed {
        /// Number of outstanding allocations.
        allocations: usize,
    },

    /// The allocation handle was already freed or its segment was merged away.
    #[error("stale allocation handle: expected generation {expected}, found {actual}")]
    StaleHandle {
        /// Generation recorded in the handle.
        expected: Generation,
        /// Generation currently stored in the segment slot.
        actual: Generation,
    },

    /// The allocation handle was issued by a different pool.
    #[error("allocation handle belongs to pool {actual}, not pool {expected}")]
    ForeignHandle {
        /// Pool the call was made on.
        expected: PoolId,
        /// Pool recorded in the handle.
        actual: PoolId,
    },

    /// The pool handle does not name an open pool.
    #[error("unknown pool handle {0}")]
    UnknownPool(PoolHandle),

    /// The registry has not been initialized.
    #[error("pool registry is not initialized")]
    NotInitialized,

    /// A pool or allocation size of zero was requested.
    #[error("size must be greater than zero")]
    InvalidSize,

    /// A growable table is at its configured ceiling.
    #[error("{table} cannot grow past {capacity} entries")]
    CapacityExhausted {
        /// Table that refused to grow.
        table: &'static str,
        /// Capacity at the ceiling.
        capacity: usize,
    },

    /// The system allocator refused a reservation.
    #[error("out of memory reserving {requested} entries for {table}")]
    OutOfMemory {
        /// Table or buffer being reserved.
        table: &'static str,
        /// Number of entries (or bytes, for the pool buffer) requested.
        requested: usize,
    },
}

impl PoolError {
    /// Collapse this error into its coarse kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::CalledAgain { .. } => ErrorKind::CalledAgain,
            PoolError::NotFreed { .. }
            | PoolError::StaleHandle { .. }
            | PoolError::ForeignHandle { .. } => ErrorKind::NotFreed,
            PoolError::UnknownPool(_)
            | PoolError::NotInitialized
            | PoolError::InvalidSize
            | PoolError::CapacityExhausted { .. }
            | PoolError::OutOfMemory { .. } => ErrorKind::Fail,
        }
    }
}

/// A broken structural invariant found by [`PoolManager::verify`].
///
/// [`PoolManager::verify`]: crate::pool::PoolManager::verify
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    /// The chain has no head segment.
    #[error("segment chain is empty")]
    EmptyChain,

    /// A segment does not start where its predecessor ended.
    #[error("segment {index} starts at {found}, expected {expected}")]
    Gap {
        /// Slot index of the offending segment.
        index: u32,
        /// Offset where the segment should start.
        expected: usize,
        /// Offset where it actually starts.
        found: usize,
    },

    /// The chain does not end exactly at the end of the buffer.
    #[error("chain covers {covered} bytes of a {total}-byte pool")]
    Coverage {
        /// Bytes covered by the chain.
        covered: usize,
        /// Pool size.
        total: usize,
    },

    /// A `prev` link does not point back at the predecessor.
    #[error("segment {index} has a broken back link")]
    BrokenLink {
        /// Slot index of the offending segment.
        index: u32,
    },

    /// The chain reaches a slot that is not in use, or a zero-sized segment.
    #[error("segment {index} is retired or empty but linked into the chain")]
    DeadSegment {
        /// Slot index of the offending segment.
        index: u32,
    },

    /// The live-slot counter disagrees with the chain length.
    #[error("segment table counts {counted} live slots, chain has {walked}")]
    LiveCount {
        /// Counter held by the table.
        counted: usize,
        /// Segments reached by walking the chain.
        walked: usize,
    },

    /// Free index entries and free segments disagree.
    #[error("free index holds {entries} entries for {gaps} free segments")]
    FreeIndexCount {
        /// Entries in the free index.
        entries: usize,
        /// Free segments in the chain.
        gaps: usize,
    },

    /// A free index entry does not describe a free segment of the recorded size.
    #[error("free index entry {position} is out of date")]
    FreeIndexEntry {
        /// Position of the entry in the index.
        position: usize,
    },

    /// Free index entries are not sorted by `(size, offset)`.
    #[error("free index is unsorted at position {position}")]
    Unsorted {
        /// First position that is smaller than its predecessor.
        position: usize,
    },

    /// Allocation counters disagree with the chain.
    #[error("pool records {recorded_bytes} bytes in {recorded_count} allocations, chain has {actual_bytes} bytes in {actual_count}")]
    Accounting {
        /// `allocated_bytes` as recorded.
        recorded_bytes: usize,
        /// `allocation_count` as recorded.
        recorded_count: usize,
        /// Sum of allocated segment sizes.
        actual_bytes: usize,
        /// Number of allocated segments.
        actual_count: usize,
    },
}
