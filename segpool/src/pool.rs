//! # Pool Manager
//!
//! A [`PoolManager`] owns one fixed-size byte buffer and carves it into
//! variable-size allocations. It keeps two views of the buffer in step:
//!
//! - the [`SegmentTable`], whose chain tiles `[0, total_size)` in address
//!   order with allocated segments and gaps;
//! - the [`FreeIndex`], one entry per gap sorted by `(size, offset)`.
//!
//! ## Allocation
//!
//! The fit policy is fixed when the pool is opened:
//!
//! - [`FitPolicy::FirstFit`] takes the first gap in *slot* order that is large
//!   enough. Slot order follows slot reuse, not addresses.
//! - [`FitPolicy::BestFit`] takes the first sufficient entry of the free index,
//!   i.e. the smallest gap that fits, lowest address first.
//!
//! The chosen gap keeps its offset and shrinks to the requested size; any
//! leftover becomes a new gap spliced in right after it.
//!
//! ## Deallocation
//!
//! A freed segment absorbs a free successor and is then absorbed by a free
//! predecessor, so a run of adjacent gaps always collapses into one entry.
//!
//! Every growth step an operation may need is secured before the operation
//! touches the chain, so a refused growth leaves the pool unchanged. Only
//! steps that add an entry ask for room: a split swaps one free-index entry
//! for another, and a free that merges never adds one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PoolConfig;
use crate::error::{InvariantError, PoolError};
use crate::free_index::{FreeEntry, FreeIndex};
use crate::handle::{generation, next_pool_id, AllocHandle, PoolId};
use crate::log::{self, LogBuilder, LogLevel};
use crate::segment::{SegmentTable, HEAD};

const TARGET: &str = "segpool::pool";

/// Gap search policy, fixed per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitPolicy {
    /// First sufficient gap in segment-table order.
    #[default]
    FirstFit,
    /// Smallest sufficient gap.
    BestFit,
}

impl FitPolicy {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FitPolicy::FirstFit => "first-fit",
            FitPolicy::BestFit => "best-fit",
        }
    }
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an inspection snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSegment {
    /// Segment size in bytes.
    pub size: usize,
    /// Whether the segment is allocated.
    pub allocated: bool,
}

/// Point-in-time pool accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Pool identity.
    pub id: PoolId,
    /// Fit policy.
    pub policy: FitPolicy,
    /// Buffer size in bytes.
    pub total_size: usize,
    /// Bytes handed out.
    pub allocated_bytes: usize,
    /// Live allocations.
    pub allocation_count: usize,
    /// Gaps in the chain.
    pub free_segment_count: usize,
    /// Segments in the chain.
    pub live_segments: usize,
    /// Segment table capacity.
    pub segment_capacity: usize,
    /// Free index capacity.
    pub free_index_capacity: usize,
}

/// Manager for one memory pool.
pub struct PoolManager {
    id: PoolId,
    policy: FitPolicy,
    buffer: Box<[u8]>,
    allocated_bytes: usize,
    allocation_count: usize,
    segments: SegmentTable,
    free_index: FreeIndex,
}

impl PoolManager {
    /// Open a pool of `size` bytes.
    ///
    /// The buffer and both tables are reserved up front; if any reservation
    /// fails, whatever was already acquired is released before returning.
    pub fn open(size: usize, policy: FitPolicy, config: &PoolConfig) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| PoolError::OutOfMemory { table: "pool buffer", requested: size })?;
        buffer.resize(size, 0u8);

        let segments = SegmentTable::new(config.segment_table, size)?;
        let mut free_index = FreeIndex::new(config.free_index)?;
        free_index.insert(FreeEntry { size, offset: 0, segment: HEAD })?;

        let pool = Self {
            id: next_pool_id(),
            policy,
            buffer: buffer.into_boxed_slice(),
            allocated_bytes: 0,
            allocation_count: 0,
            segments,
            free_index,
        };

        if log::would_log(LogLevel::Debug) {
            LogBuilder::new(LogLevel::Debug)
                .target(TARGET)
                .message("pool opened")
                .field_uint("pool", pool.id.as_u64())
                .field_uint("size", size as u64)
                .field_str("policy", policy.as_str())
                .emit();
        }
        Ok(pool)
    }

    /// Pool identity.
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Fit policy.
    pub fn policy(&self) -> FitPolicy {
        self.policy
    }

    /// Buffer size in bytes.
    pub fn total_size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Number of gaps; always equal to the free index length.
    pub fn free_segment_count(&self) -> usize {
        self.free_index.len()
    }

    /// Size of the largest gap, if any.
    pub fn largest_free(&self) -> Option<usize> {
        self.free_index.largest().map(|entry| entry.size)
    }

    /// The segment table.
    pub fn segments(&self) -> &SegmentTable {
        &self.segments
    }

    /// Free index entries, ascending by `(size, offset)`.
    pub fn free_entries(&self) -> &[FreeEntry] {
        self.free_index.entries()
    }

    /// Current accounting.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            id: self.id,
            policy: self.policy,
            total_size: self.total_size(),
            allocated_bytes: self.allocated_bytes,
            allocation_count: self.allocation_count,
            free_segment_count: self.free_index.len(),
            live_segments: self.segments.live_count(),
            segment_capacity: self.segments.capacity(),
            free_index_capacity: self.free_index.capacity(),
        }
    }

    /// Allocate `size` bytes.
    ///
    /// Returns `None` when `size` is zero, when no gap is large enough, or
    /// when a table needed to grow and could not. No state changes in any of
    /// those cases.
    pub fn allocate(&mut self, size: usize) -> Option<AllocHandle> {
        if size == 0 || self.free_index.is_empty() {
            return None;
        }

        if let Err(err) = self.segments.maybe_grow() {
            self.refused(size, &err);
            return None;
        }

        let chosen = match self.policy {
            FitPolicy::FirstFit => self.segments.first_fit(size),
            FitPolicy::BestFit => self.free_index.best_fit(size).map(|entry| entry.segment),
        }?;

        let (gap_size, offset) = {
            let seg = &self.segments[chosen];
            (seg.size, seg.offset)
        };
        let leftover = gap_size - size;

        // A split swaps the chosen gap's entry for the leftover's, so only the
        // segment table may need room.
        if leftover > 0 {
            if let Err(err) = self.segments.ensure_spare() {
                self.refused(size, &err);
                return None;
            }
        }

        let removed = self.free_index.remove(gap_size, offset, chosen);
        debug_assert!(removed.is_some(), "chosen gap missing from the free index");

        {
            let seg = &mut self.segments[chosen];
            seg.allocated = true;
            seg.size = size;
        }

        if leftover > 0 {
            let gap = self.segments.acquire(offset + size, leftover);
            self.segments.link_after(chosen, gap);
            self.free_index.insert_reserved(FreeEntry {
                size: leftover,
                offset: offset + size,
                segment: gap,
            });
        }

        self.allocation_count += 1;
        self.allocated_bytes += size;

        let handle = AllocHandle {
            pool: self.id,
            index: chosen,
            generation: self.segments[chosen].generation,
            offset,
            size,
        };

        if log::would_log(LogLevel::Trace) {
            LogBuilder::new(LogLevel::Trace)
                .target(TARGET)
                .message("allocated")
                .field_uint("pool", self.id.as_u64())
                .field_uint("offset", offset as u64)
                .field_uint("size", size as u64)
                .field_uint("leftover", leftover as u64)
                .emit();
        }
        Some(handle)
    }

    /// Free an allocation and coalesce it with adjacent gaps.
    ///
    /// Fails with a `NotFreed`-kind error when the handle was issued by
    /// another pool, was already freed, or names a merged-away segment. A
    /// free with no free neighbour adds a gap and fails with a `Fail`-kind
    /// error if the free index is full and cannot grow.
    pub fn deallocate(&mut self, handle: AllocHandle) -> Result<(), PoolError> {
        let index = self.resolve(&handle)?;

        let gap_neighbour = |link: Option<u32>| link.filter(|&i| self.segments[i].is_gap());
        let next_gap = gap_neighbour(self.segments[index].next);
        let prev_gap = gap_neighbour(self.segments[index].prev);

        // Only an isolated free adds a gap; any merge keeps or lowers the count.
        if next_gap.is_none() && prev_gap.is_none() {
            self.free_index.reserve_one()?;
        }

        let size = {
            let seg = &mut self.segments[index];
            seg.allocated = false;
            seg.generation = generation::next(seg.generation);
            seg.size
        };
        self.allocation_count -= 1;
        self.allocated_bytes -= size;

        if let Some(next) = next_gap {
            let (next_size, next_offset) = {
                let successor = &self.segments[next];
                (successor.size, successor.offset)
            };
            let removed = self.free_index.remove(next_size, next_offset, next);
            debug_assert!(removed.is_some(), "successor gap missing from the free index");
            self.segments[index].size += next_size;
            self.segments.unlink(next);
            self.segments.retire(next);
        }

        let (merged_size, offset) = {
            let seg = &self.segments[index];
            (seg.size, seg.offset)
        };

        match prev_gap {
            Some(prev) => {
                let (prev_size, prev_offset) = {
                    let predecessor = &self.segments[prev];
                    (predecessor.size, predecessor.offset)
                };
                let removed = self.free_index.remove(prev_size, prev_offset, prev);
                debug_assert!(removed.is_some(), "predecessor gap missing from the free index");
                self.segments[prev].size += merged_size;
                self.segments.unlink(index);
                self.segments.retire(index);
                self.free_index.insert_reserved(FreeEntry {
                    size: prev_size + merged_size,
                    offset: prev_offset,
                    segment: prev,
                });
            }
            None => self.free_index.insert_reserved(FreeEntry {
                size: merged_size,
                offset,
                segment: index,
            }),
        }

        if log::would_log(LogLevel::Trace) {
            LogBuilder::new(LogLevel::Trace)
                .target(TARGET)
                .message("freed")
                .field_uint("pool", self.id.as_u64())
                .field_uint("offset", handle.offset as u64)
                .field_uint("size", size as u64)
                .field_uint("gaps", self.free_index.len() as u64)
                .emit();
        }
        Ok(())
    }

    /// Chain-ordered `(size, allocated)` snapshot.
    pub fn inspect(&self) -> Vec<PoolSegment> {
        self.segments
            .chain()
            .map(|(_, seg)| PoolSegment {
                size: seg.size,
                allocated: seg.allocated,
            })
            .collect()
    }

    /// Borrow the bytes of a live allocation.
    pub fn bytes(&self, handle: &AllocHandle) -> Result<&[u8], PoolError> {
        let index = self.resolve(handle)?;
        let seg = &self.segments[index];
        Ok(&self.buffer[seg.offset..seg.end()])
    }

    /// Mutably borrow the bytes of a live allocation.
    pub fn bytes_mut(&mut self, handle: &AllocHandle) -> Result<&mut [u8], PoolError> {
        let index = self.resolve(handle)?;
        let range = {
            let seg = &self.segments[index];
            seg.offset..seg.end()
        };
        Ok(&mut self.buffer[range])
    }

    /// Fail with `NotFreed` while allocations are outstanding.
    pub fn ensure_closable(&self) -> Result<(), PoolError> {
        if self.allocation_count != 0 {
            return Err(PoolError::NotFreed {
                allocations: self.allocation_count,
            });
        }
        Ok(())
    }

    /// Map a handle to its segment slot, rejecting stale and foreign handles.
    fn resolve(&self, handle: &AllocHandle) -> Result<u32, PoolError> {
        if handle.pool != self.id {
            return Err(PoolError::ForeignHandle {
                expected: self.id,
                actual: handle.pool,
            });
        }
        let Some(seg) = self.segments.get(handle.index) else {
            return Err(PoolError::StaleHandle {
                expected: handle.generation,
                actual: generation::UNINITIALIZED,
            });
        };
        if seg.generation != handle.generation || !seg.in_use || !seg.allocated {
            return Err(PoolError::StaleHandle {
                expected: handle.generation,
                actual: seg.generation,
            });
        }
        Ok(handle.index)
    }

    fn refused(&self, size: usize, err: &PoolError) {
        if log::would_log(LogLevel::Warn) {
            LogBuilder::new(LogLevel::Warn)
                .target(TARGET)
                .message("allocation refused")
                .field_uint("pool", self.id.as_u64())
                .field_uint("size", size as u64)
                .field_str("reason", err.to_string())
                .emit();
        }
    }

    /// Check every structural invariant of the pool.
    ///
    /// The chain must tile the buffer in address order with consistent back
    /// links, the live-slot counter must match the chain, the free index must
    /// hold exactly one up-to-date entry per gap in `(size, offset)` order, and
    /// the allocation counters must match the allocated segments.
    pub fn verify(&self) -> Result<(), InvariantError> {
        let mut expected_offset = 0;
        let mut prev = None;
        let mut walked = 0;
        let mut gaps = 0;
        let mut actual_bytes = 0;
        let mut actual_count = 0;

        for (index, seg) in self.segments.chain() {
            if !seg.in_use || seg.size == 0 {
                return Err(InvariantError::DeadSegment { index });
            }
            if seg.prev != prev {
                return Err(InvariantError::BrokenLink { index });
            }
            if seg.offset != expected_offset {
                return Err(InvariantError::Gap {
                    index,
                    expected: expected_offset,
                    found: seg.offset,
                });
            }
            if seg.allocated {
                actual_bytes += seg.size;
                actual_count += 1;
            } else {
                gaps += 1;
            }
            expected_offset = seg.end();
            prev = Some(index);
            walked += 1;
        }

        if walked == 0 {
            return Err(InvariantError::EmptyChain);
        }
        if let Some(last) = prev {
            if self.segments[last].next.is_some() {
                return Err(InvariantError::BrokenLink { index: last });
            }
        }
        if expected_offset != self.total_size() {
            return Err(InvariantError::Coverage {
                covered: expected_offset,
                total: self.total_size(),
            });
        }
        if walked != self.segments.live_count() {
            return Err(InvariantError::LiveCount {
                counted: self.segments.live_count(),
                walked,
            });
        }

        let entries = self.free_index.entries();
        if entries.len() != gaps {
            return Err(InvariantError::FreeIndexCount {
                entries: entries.len(),
                gaps,
            });
        }
        for (position, entry) in entries.iter().enumerate() {
            let current = self.segments.get(entry.segment).is_some_and(|seg| {
                seg.is_gap() && seg.size == entry.size && seg.offset == entry.offset
            });
            if !current {
                return Err(InvariantError::FreeIndexEntry { position });
            }
            if position > 0 && entries[position - 1].key() >= entry.key() {
                return Err(InvariantError::Unsorted { position });
            }
        }

        if actual_bytes != self.allocated_bytes || actual_count != self.allocation_count {
            return Err(InvariantError::Accounting {
                recorded_bytes: self.allocated_bytes,
                recorded_count: self.allocation_count,
                actual_bytes,
                actual_count,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("total_size", &self.total_size())
            .field("allocated_bytes", &self.allocated_bytes)
            .field("allocation_count", &self.allocation_count)
            .field("free_segments", &self.free_index.len())
            .field("segments", &self.segments)
            .finish()
    }
}
