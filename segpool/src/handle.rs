//! # Handles
//!
//! Pools and allocations are named by small copyable handles instead of
//! references into the manager's tables. Each handle carries enough identity
//! to be checked before use, so a handle that outlived its pool or its
//! allocation is rejected rather than followed.
//!
//! ## Generations
//!
//! Segment slots carry a generation counter, bumped whenever an allocated
//! segment is freed and whenever a slot is retired by coalescing. An
//! [`AllocHandle`] records the generation it was issued under; any later
//! mismatch marks it stale. This is the generational arena pattern
//! ([slotmap](https://crates.io/crates/slotmap)) applied to segment slots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Generation counter for detecting stale allocation handles.
pub type Generation = u32;

/// Reserved generation values.
pub mod generation {
    use super::Generation;

    /// Uninitialized slot.
    pub const UNINITIALIZED: Generation = 0;
    /// First valid generation.
    pub const FIRST: Generation = 1;
    /// Saturation point; a slot that reaches it stays there.
    pub const OVERFLOW_GUARD: Generation = u32::MAX - 1;

    /// The generation following `gen`, saturating at [`OVERFLOW_GUARD`].
    pub const fn next(gen: Generation) -> Generation {
        if gen < OVERFLOW_GUARD {
            gen + 1
        } else {
            OVERFLOW_GUARD
        }
    }
}

/// Process-unique pool identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub u64);

impl PoolId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Global pool ID counter.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique pool ID.
pub fn next_pool_id() -> PoolId {
    PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
}

/// Handle to a pool held by a [`PoolRegistry`](crate::registry::PoolRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pub(crate) slot: u32,
    pub(crate) id: PoolId,
}

impl PoolHandle {
    /// Registry slot the pool was stored in.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Identity of the pool.
    pub fn id(&self) -> PoolId {
        self.id
    }
}

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.slot)
    }
}

/// Handle to one live allocation inside a pool.
///
/// The handle is a copy of the allocation record at the time it was issued.
/// It does not keep the pool alive and becomes stale once the allocation is
/// freed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle {
    pub(crate) pool: PoolId,
    pub(crate) index: u32,
    pub(crate) generation: Generation,
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

impl AllocHandle {
    /// Pool that issued this handle.
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// Byte offset of the allocation inside the pool buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the allocation in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Generation the handle was issued under.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Byte range covered by the allocation.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}

impl fmt::Debug for AllocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocHandle")
            .field("pool", &self.pool)
            .field("slot", &self.index)
            .field("generation", &self.generation)
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("size", &self.size)
            .finish()
    }
}
