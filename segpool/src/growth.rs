//! # Table Growth
//!
//! The segment table, the free index and the pool registry are all growable
//! arrays that double once they are more than three quarters full. Each table
//! carries its own [`GrowthPolicy`] so the three can be tuned independently.
//!
//! Reservations go through [`Vec::try_reserve_exact`], so an allocator refusal
//! surfaces as [`PoolError::OutOfMemory`] instead of aborting the process.

use crate::error::PoolError;
use crate::log::{self, LogBuilder, LogLevel};

/// Default fill factor shared by all tables.
pub const DEFAULT_FILL_FACTOR: f64 = 0.75;

/// Default expand factor shared by all tables.
pub const DEFAULT_EXPAND_FACTOR: usize = 2;

/// Hard ceiling for tables addressed by `u32` indices.
pub const INDEX_CEILING: usize = u32::MAX as usize;

/// Capacity policy for one growable table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPolicy {
    /// Capacity reserved when the table is created.
    pub initial_capacity: usize,
    /// Occupancy ratio above which the table grows.
    pub fill_factor: f64,
    /// Multiplier applied to the capacity on growth.
    pub expand_factor: usize,
    /// Capacity the table may never exceed.
    pub max_capacity: usize,
}

impl GrowthPolicy {
    /// Segment table defaults: 40 slots per pool.
    pub const SEGMENT_TABLE: Self = Self::with_capacity(40);
    /// Free index defaults: 40 entries per pool.
    pub const FREE_INDEX: Self = Self::with_capacity(40);
    /// Registry defaults: 20 pools.
    pub const REGISTRY: Self = Self::with_capacity(20);

    /// A policy with the default factors and the given initial capacity.
    pub const fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            fill_factor: DEFAULT_FILL_FACTOR,
            expand_factor: DEFAULT_EXPAND_FACTOR,
            max_capacity: INDEX_CEILING,
        }
    }

    /// Whether a table holding `len` entries in `capacity` slots should grow.
    pub fn needs_growth(&self, len: usize, capacity: usize) -> bool {
        capacity == 0 || (len as f64 / capacity as f64) > self.fill_factor
    }

    /// Effective ceiling: `max_capacity`, never above [`INDEX_CEILING`].
    pub fn ceiling(&self) -> usize {
        self.max_capacity.min(INDEX_CEILING)
    }

    /// Capacity a table starts with.
    pub fn start_capacity(&self) -> usize {
        self.initial_capacity.min(self.ceiling())
    }

    /// Capacity after one growth step, or `None` at the ceiling.
    pub fn next_capacity(&self, capacity: usize) -> Option<usize> {
        let ceiling = self.ceiling();
        if capacity >= ceiling {
            return None;
        }
        let grown = capacity
            .saturating_mul(self.expand_factor)
            .max(capacity + 1)
            .min(ceiling);
        Some(grown)
    }
}

/// Reserve a fresh vector at the policy's initial capacity.
pub(crate) fn reserve_initial<T>(
    policy: &GrowthPolicy,
    table: &'static str,
) -> Result<Vec<T>, PoolError> {
    let capacity = policy.start_capacity();
    let mut vec = Vec::new();
    vec.try_reserve_exact(capacity)
        .map_err(|_| PoolError::OutOfMemory { table, requested: capacity })?;
    Ok(vec)
}

/// Grow `vec` by one policy step, updating the logical `capacity`.
///
/// On failure neither the vector nor `capacity` change.
pub(crate) fn grow<T>(
    vec: &mut Vec<T>,
    capacity: &mut usize,
    policy: &GrowthPolicy,
    table: &'static str,
) -> Result<(), PoolError> {
    let Some(next) = policy.next_capacity(*capacity) else {
        if log::would_log(LogLevel::Warn) {
            LogBuilder::new(LogLevel::Warn)
                .target("segpool::growth")
                .message("table at capacity ceiling")
                .field_str("table", table)
                .field_uint("capacity", *capacity as u64)
                .emit();
        }
        return Err(PoolError::CapacityExhausted { table, capacity: *capacity });
    };

    vec.try_reserve_exact(next.saturating_sub(vec.len()))
        .map_err(|_| PoolError::OutOfMemory { table, requested: next })?;

    if log::would_log(LogLevel::Debug) {
        LogBuilder::new(LogLevel::Debug)
            .target("segpool::growth")
            .message("table grown")
            .field_str("table", table)
            .field_uint("from", *capacity as u64)
            .field_uint("to", next as u64)
            .emit();
    }
    *capacity = next;
    Ok(())
}
