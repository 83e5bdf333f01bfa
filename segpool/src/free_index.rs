//! # Free Index
//!
//! A sorted array with one [`FreeEntry`] per gap in the chain, ordered
//! ascending by `(size, offset)`. The ordering makes best fit a binary search:
//! the first entry whose size is large enough is the smallest sufficient gap,
//! and among equal sizes the lowest address wins.
//!
//! Insertion appends and restores order with a single backward pass, since
//! at most one entry is out of place after an append. Removal shifts the tail
//! down by one.

use crate::error::PoolError;
use crate::growth::{self, GrowthPolicy};

const TABLE_NAME: &str = "free index";

/// A free segment as recorded in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeEntry {
    /// Size of the gap in bytes.
    pub size: usize,
    /// Start offset of the gap.
    pub offset: usize,
    /// Slot index of the gap's segment.
    pub segment: u32,
}

impl FreeEntry {
    /// Sort key.
    pub fn key(&self) -> (usize, usize) {
        (self.size, self.offset)
    }
}

/// Gaps sorted ascending by `(size, offset)`.
#[derive(Debug)]
pub struct FreeIndex {
    entries: Vec<FreeEntry>,
    capacity: usize,
    policy: GrowthPolicy,
}

impl FreeIndex {
    /// Create an empty index at the policy's initial capacity.
    pub fn new(policy: GrowthPolicy) -> Result<Self, PoolError> {
        let entries = growth::reserve_initial(&policy, TABLE_NAME)?;
        Ok(Self {
            entries,
            capacity: policy.start_capacity(),
            policy,
        })
    }

    /// Number of gaps recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no gaps.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Logical capacity of the index.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries in ascending `(size, offset)` order.
    pub fn entries(&self) -> &[FreeEntry] {
        &self.entries
    }

    /// The largest gap.
    pub fn largest(&self) -> Option<&FreeEntry> {
        self.entries.last()
    }

    /// Smallest gap of at least `size` bytes.
    pub fn best_fit(&self, size: usize) -> Option<FreeEntry> {
        let position = self.entries.partition_point(|entry| entry.size < size);
        self.entries.get(position).copied()
    }

    /// Make room for one more entry, growing past the fill factor.
    ///
    /// A refused growth is tolerated while spare capacity remains; it is
    /// retried on the next insert.
    pub(crate) fn reserve_one(&mut self) -> Result<(), PoolError> {
        let len = self.entries.len();
        if len < self.capacity && !self.policy.needs_growth(len, self.capacity) {
            return Ok(());
        }
        match growth::grow(&mut self.entries, &mut self.capacity, &self.policy, TABLE_NAME) {
            Ok(()) => Ok(()),
            Err(_) if len < self.capacity => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Insert an entry, growing the index if needed.
    pub fn insert(&mut self, entry: FreeEntry) -> Result<(), PoolError> {
        self.reserve_one()?;
        self.insert_reserved(entry);
        Ok(())
    }

    /// Insert an entry into room secured by [`reserve_one`](Self::reserve_one).
    pub(crate) fn insert_reserved(&mut self, entry: FreeEntry) {
        self.entries.push(entry);
        let mut i = self.entries.len() - 1;
        while i > 0 && self.entries[i].key() < self.entries[i - 1].key() {
            self.entries.swap(i, i - 1);
            i -= 1;
        }
    }

    /// Remove the entry for `segment`, recorded with the given size and offset.
    pub fn remove(&mut self, size: usize, offset: usize, segment: u32) -> Option<FreeEntry> {
        let position = self
            .entries
            .binary_search_by_key(&(size, offset), FreeEntry::key)
            .ok()?;
        if self.entries[position].segment != segment {
            return None;
        }
        Some(self.entries.remove(position))
    }
}
