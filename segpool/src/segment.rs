//! # Segment Table
//!
//! Every pool tiles its buffer with a chain of [`Segment`]s. The segments
//! themselves live in a [`SegmentTable`]: an arena of slots addressed by
//! `u32` index, with `next`/`prev` stored as indices rather than references.
//! Splitting a segment acquires a slot, coalescing retires one, and retired
//! slots are recycled before the table reserves new ones.
//!
//! ## Layout
//!
//! ```text
//!  slot:   0            3           1                 2
//!        ┌────────────┬───────────┬─────────────────┬──────────┐
//!  pool  │ alloc 100  │ free  200 │ alloc 300       │ free 400 │
//!        └────────────┴───────────┴─────────────────┴──────────┘
//!  chain: 0 ──► 3 ──► 1 ──► 2        (address order, not slot order)
//! ```
//!
//! Slot 0 always holds the segment at offset 0. Coalescing only ever removes
//! a segment that has a predecessor, so the head slot is never retired.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::PoolError;
use crate::growth::{self, GrowthPolicy};
use crate::handle::{generation, Generation};

/// Slot index of the chain head.
pub const HEAD: u32 = 0;

const TABLE_NAME: &str = "segment table";

/// One contiguous range of a pool buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Segment {
    pub(crate) size: usize,
    pub(crate) offset: usize,
    pub(crate) allocated: bool,
    pub(crate) in_use: bool,
    pub(crate) generation: Generation,
    pub(crate) next: Option<u32>,
    pub(crate) prev: Option<u32>,
}

impl Segment {
    fn gap(offset: usize, size: usize, generation: Generation) -> Self {
        Self {
            size,
            offset,
            allocated: false,
            in_use: true,
            generation,
            next: None,
            prev: None,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Start offset inside the pool buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// One past the last byte of the segment.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Whether the segment is handed out to a caller.
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Whether the slot is part of the chain (as opposed to recyclable).
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Whether the segment is a gap in the chain.
    pub fn is_gap(&self) -> bool {
        self.in_use && !self.allocated
    }

    /// Current slot generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Chain successor.
    pub fn next(&self) -> Option<u32> {
        self.next
    }

    /// Chain predecessor.
    pub fn prev(&self) -> Option<u32> {
        self.prev
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("range", &(self.offset..self.end()))
            .field("allocated", &self.allocated)
            .field("in_use", &self.in_use)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Arena of segment slots with a recyclable-slot stack.
pub struct SegmentTable {
    slots: Vec<Segment>,
    /// Retired slot indices, most recently retired last.
    recycled: Vec<u32>,
    /// Logical capacity; `slots` never grows past it.
    capacity: usize,
    /// Slots currently linked into the chain.
    live: usize,
    policy: GrowthPolicy,
}

impl SegmentTable {
    /// Create a table holding one gap that spans `total_size` bytes.
    pub fn new(policy: GrowthPolicy, total_size: usize) -> Result<Self, PoolError> {
        let mut slots = growth::reserve_initial(&policy, TABLE_NAME)?;
        let capacity = policy.start_capacity();
        if capacity == 0 {
            return Err(PoolError::CapacityExhausted { table: TABLE_NAME, capacity });
        }
        slots.push(Segment::gap(0, total_size, generation::FIRST));
        Ok(Self {
            slots,
            recycled: Vec::new(),
            capacity,
            live: 1,
            policy,
        })
    }

    /// Number of slots linked into the chain.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Logical capacity of the table.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots ever initialized (live or recyclable).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Get a slot by index.
    pub fn get(&self, index: u32) -> Option<&Segment> {
        self.slots.get(index as usize)
    }

    /// Grow if the live-slot ratio is above the fill factor.
    pub(crate) fn maybe_grow(&mut self) -> Result<(), PoolError> {
        if self.policy.needs_growth(self.live, self.capacity) {
            growth::grow(&mut self.slots, &mut self.capacity, &self.policy, TABLE_NAME)?;
        }
        Ok(())
    }

    /// Make sure the next [`acquire`](Self::acquire) has a slot to use.
    pub(crate) fn ensure_spare(&mut self) -> Result<(), PoolError> {
        if self.recycled.is_empty() && self.slots.len() >= self.capacity {
            growth::grow(&mut self.slots, &mut self.capacity, &self.policy, TABLE_NAME)?;
        }
        Ok(())
    }

    /// Initialize a slot as an unlinked gap and return its index.
    ///
    /// Callers secure room with [`ensure_spare`](Self::ensure_spare) first.
    pub(crate) fn acquire(&mut self, offset: usize, size: usize) -> u32 {
        self.live += 1;
        if let Some(index) = self.recycled.pop() {
            let slot = &mut self.slots[index as usize];
            *slot = Segment::gap(offset, size, slot.generation);
            return index;
        }
        debug_assert!(self.slots.len() < self.capacity);
        let index = self.slots.len() as u32;
        self.slots.push(Segment::gap(offset, size, generation::FIRST));
        index
    }

    /// Return an unlinked slot to the recyclable pool.
    pub(crate) fn retire(&mut self, index: u32) {
        debug_assert_ne!(index, HEAD, "the head segment is never retired");
        let slot = &mut self.slots[index as usize];
        slot.in_use = false;
        slot.allocated = false;
        slot.size = 0;
        slot.next = None;
        slot.prev = None;
        slot.generation = generation::next(slot.generation);
        self.recycled.push(index);
        self.live -= 1;
    }

    /// Splice `new` into the chain directly after `anchor`.
    pub(crate) fn link_after(&mut self, anchor: u32, new: u32) {
        let after = self.slots[anchor as usize].next;
        {
            let seg = &mut self.slots[new as usize];
            seg.prev = Some(anchor);
            seg.next = after;
        }
        if let Some(after) = after {
            self.slots[after as usize].prev = Some(new);
        }
        self.slots[anchor as usize].next = Some(new);
    }

    /// Splice `index` out of the chain, joining its neighbours.
    pub(crate) fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let seg = &self.slots[index as usize];
            (seg.prev, seg.next)
        };
        if let Some(prev) = prev {
            self.slots[prev as usize].next = next;
        }
        if let Some(next) = next {
            self.slots[next as usize].prev = prev;
        }
        let seg = &mut self.slots[index as usize];
        seg.prev = None;
        seg.next = None;
    }

    /// First gap of at least `size` bytes, in slot order.
    pub(crate) fn first_fit(&self, size: usize) -> Option<u32> {
        self.slots
            .iter()
            .position(|seg| seg.is_gap() && seg.size >= size)
            .map(|index| index as u32)
    }

    /// Walk the chain from the head in address order.
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            table: self,
            next: Some(HEAD),
            remaining: self.slots.len(),
        }
    }
}

impl Index<u32> for SegmentTable {
    type Output = Segment;

    fn index(&self, index: u32) -> &Segment {
        &self.slots[index as usize]
    }
}

impl IndexMut<u32> for SegmentTable {
    fn index_mut(&mut self, index: u32) -> &mut Segment {
        &mut self.slots[index as usize]
    }
}

impl fmt::Debug for SegmentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentTable")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("recycled", &self.recycled.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Iterator over the chain, yielding `(slot index, segment)`.
///
/// Stops after visiting as many segments as the table has slots, so a
/// corrupted cycle cannot loop forever.
pub struct Chain<'a> {
    table: &'a SegmentTable,
    next: Option<u32>,
    remaining: usize,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (u32, &'a Segment);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next?;
        let seg = self.table.get(index)?;
        self.remaining -= 1;
        self.next = seg.next;
        Some((index, seg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(capacity: usize) -> SegmentTable {
        SegmentTable::new(GrowthPolicy::with_capacity(capacity), 1000).unwrap()
    }

    #[test]
    fn test_new_table_has_single_gap() {
        let table = table(4);
        assert_eq!(table.live_count(), 1);
        assert_eq!(table.capacity(), 4);
        let head = &table[HEAD];
        assert!(head.is_gap());
        assert_eq!(head.size(), 1000);
        assert_eq!(head.next(), None);
        assert_eq!(head.prev(), None);
    }

    #[test]
    fn test_link_and_unlink() {
        let mut table = table(4);
        table[HEAD].size = 100;
        table.ensure_spare().unwrap();
        let a = table.acquire(100, 900);
        table.link_after(HEAD, a);

        table[a].size = 300;
        table.ensure_spare().unwrap();
        let b = table.acquire(400, 600);
        table.link_after(a, b);

        let order: Vec<u32> = table.chain().map(|(i, _)| i).collect();
        assert_eq!(order, vec![HEAD, a, b]);
        assert_eq!(table[b].prev(), Some(a));

        table.unlink(a);
        let order: Vec<u32> = table.chain().map(|(i, _)| i).collect();
        assert_eq!(order, vec![HEAD, b]);
        assert_eq!(table[b].prev(), Some(HEAD));
    }

    #[test]
    fn test_retired_slot_is_recycled_with_new_generation() {
        let mut table = table(4);
        table.ensure_spare().unwrap();
        let a = table.acquire(10, 10);
        table.link_after(HEAD, a);
        let gen = table[a].generation();

        table.unlink(a);
        table.retire(a);
        assert!(!table[a].in_use());
        assert_eq!(table.live_count(), 1);

        table.ensure_spare().unwrap();
        let b = table.acquire(20, 5);
        assert_eq!(b, a);
        assert!(table[b].generation() > gen);
        assert_eq!(table.live_count(), 2);
    }

    #[test]
    fn test_ensure_spare_grows_when_full() {
        let mut table = table(1);
        assert_eq!(table.slot_count(), 1);
        table.ensure_spare().unwrap();
        assert_eq!(table.capacity(), 2);
    }

    #[test]
    fn test_ensure_spare_at_ceiling_fails() {
        let mut policy = GrowthPolicy::with_capacity(1);
        policy.max_capacity = 1;
        let mut table = SegmentTable::new(policy, 10).unwrap();
        let err = table.ensure_spare().unwrap_err();
        assert!(matches!(err, PoolError::CapacityExhausted { capacity: 1, .. }));
    }

    #[test]
    fn test_first_fit_uses_slot_order() {
        let mut table = table(8);
        table[HEAD].size = 50;
        table[HEAD].allocated = true;
        table.ensure_spare().unwrap();
        let big = table.acquire(50, 500);
        table.link_after(HEAD, big);
        assert_eq!(table.first_fit(100), Some(big));
        assert_eq!(table.first_fit(501), None);
    }
}
