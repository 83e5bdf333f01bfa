//! # Pool Registry
//!
//! Bookkeeping for every open pool. A [`PoolRegistry`] is an explicit
//! lifecycle object:
//!
//! ```text
//!  new ──► init ──► open / close / allocate / ... ──► teardown ──► init ...
//! ```
//!
//! Pools are appended to the next free slot and a closed pool leaves its slot
//! empty; slots are not reused until the registry is torn down. A
//! [`PoolHandle`] carries both the slot and the [`PoolId`] stored there, so a
//! handle to a closed pool is rejected even after a later epoch fills the
//! same slot.
//!
//! [`PoolId`]: crate::handle::PoolId

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::growth;
use crate::handle::{AllocHandle, PoolHandle};
use crate::log::{self, LogBuilder, LogLevel};
use crate::pool::{FitPolicy, PoolManager, PoolSegment, PoolStats};

const TARGET: &str = "segpool::registry";
const TABLE_NAME: &str = "pool registry";

/// Slots of an initialized registry.
#[derive(Debug)]
struct Slots {
    pools: Vec<Option<PoolManager>>,
    capacity: usize,
    open: usize,
}

/// Registry of open pools.
#[derive(Debug)]
pub struct PoolRegistry {
    config: PoolConfig,
    slots: Option<Slots>,
}

impl PoolRegistry {
    /// Create an uninitialized registry.
    pub fn new(config: PoolConfig) -> Self {
        Self { config, slots: None }
    }

    /// Configuration applied to every pool opened through this registry.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether [`init`](Self::init) has run without a matching teardown.
    pub fn is_initialized(&self) -> bool {
        self.slots.is_some()
    }

    /// Number of open pools.
    pub fn open_pools(&self) -> usize {
        self.slots.as_ref().map_or(0, |slots| slots.open)
    }

    /// Logical capacity of the slot table.
    pub fn capacity(&self) -> usize {
        self.slots.as_ref().map_or(0, |slots| slots.capacity)
    }

    /// Reserve the slot table.
    pub fn init(&mut self) -> Result<(), PoolError> {
        if self.slots.is_some() {
            return Err(PoolError::CalledAgain { operation: "init" });
        }
        let pools = growth::reserve_initial(&self.config.registry, TABLE_NAME)?;
        let capacity = self.config.registry.start_capacity();
        self.slots = Some(Slots { pools, capacity, open: 0 });
        log::info("pool registry initialized");
        Ok(())
    }

    /// Close every remaining pool and release the slot table.
    ///
    /// Pools that still hold allocations are dropped anyway, with a warning.
    pub fn teardown(&mut self) -> Result<(), PoolError> {
        let Some(slots) = self.slots.take() else {
            return Err(PoolError::CalledAgain { operation: "teardown" });
        };

        for (slot, pool) in slots.pools.into_iter().enumerate() {
            let Some(pool) = pool else { continue };
            if pool.allocation_count() > 0 && log::would_log(LogLevel::Warn) {
                LogBuilder::new(LogLevel::Warn)
                    .target(TARGET)
                    .message("force-closing pool with live allocations")
                    .field_uint("pool", pool.id().as_u64())
                    .field_uint("slot", slot as u64)
                    .field_uint("allocations", pool.allocation_count() as u64)
                    .field_uint("allocated_bytes", pool.allocated_bytes() as u64)
                    .emit();
            }
        }

        log::debug("pool registry torn down");
        Ok(())
    }

    /// Open a pool and register it, or return `None`.
    ///
    /// See [`try_open_pool`](Self::try_open_pool) for the reason a pool
    /// could not be opened.
    pub fn open_pool(&mut self, size: usize, policy: FitPolicy) -> Option<PoolHandle> {
        self.try_open_pool(size, policy).ok()
    }

    /// Open a pool and register it.
    ///
    /// The slot table is grown before the pool is built; if either step
    /// fails nothing is registered and the partially built pool is dropped.
    pub fn try_open_pool(&mut self, size: usize, policy: FitPolicy) -> Result<PoolHandle, PoolError> {
        let config = &self.config;
        let slots = self.slots.as_mut().ok_or(PoolError::NotInitialized)?;

        let len = slots.pools.len();
        if len >= slots.capacity || config.registry.needs_growth(len, slots.capacity) {
            if let Err(err) =
                growth::grow(&mut slots.pools, &mut slots.capacity, &config.registry, TABLE_NAME)
            {
                if len >= slots.capacity {
                    return Err(err);
                }
            }
        }

        let slot = u32::try_from(len).map_err(|_| PoolError::CapacityExhausted {
            table: TABLE_NAME,
            capacity: slots.capacity,
        })?;
        let pool = PoolManager::open(size, policy, config)?;
        let handle = PoolHandle { slot, id: pool.id() };

        slots.pools.push(Some(pool));
        slots.open += 1;

        if log::would_log(LogLevel::Debug) {
            LogBuilder::new(LogLevel::Debug)
                .target(TARGET)
                .message("pool registered")
                .field_str("handle", handle.to_string())
                .field_uint("open", slots.open as u64)
                .emit();
        }
        Ok(handle)
    }

    /// Close a pool that holds no allocations.
    ///
    /// A refused close leaves the pool registered and usable.
    pub fn close_pool(&mut self, handle: PoolHandle) -> Result<(), PoolError> {
        let slots = self.slots.as_mut().ok_or(PoolError::NotInitialized)?;
        let entry = slots
            .pools
            .get_mut(handle.slot as usize)
            .ok_or(PoolError::UnknownPool(handle))?;

        match entry {
            Some(pool) if pool.id() == handle.id => pool.ensure_closable()?,
            _ => return Err(PoolError::UnknownPool(handle)),
        }
        *entry = None;
        slots.open -= 1;

        if log::would_log(LogLevel::Debug) {
            LogBuilder::new(LogLevel::Debug)
                .target(TARGET)
                .message("pool closed")
                .field_str("handle", handle.to_string())
                .field_uint("open", slots.open as u64)
                .emit();
        }
        Ok(())
    }

    /// Borrow an open pool.
    pub fn pool(&self, handle: PoolHandle) -> Result<&PoolManager, PoolError> {
        let slots = self.slots.as_ref().ok_or(PoolError::NotInitialized)?;
        slots
            .pools
            .get(handle.slot as usize)
            .and_then(Option::as_ref)
            .filter(|pool| pool.id() == handle.id)
            .ok_or(PoolError::UnknownPool(handle))
    }

    /// Mutably borrow an open pool.
    pub fn pool_mut(&mut self, handle: PoolHandle) -> Result<&mut PoolManager, PoolError> {
        let slots = self.slots.as_mut().ok_or(PoolError::NotInitialized)?;
        slots
            .pools
            .get_mut(handle.slot as usize)
            .and_then(Option::as_mut)
            .filter(|pool| pool.id() == handle.id)
            .ok_or(PoolError::UnknownPool(handle))
    }

    /// Allocate from a pool. `Ok(None)` means no gap fits.
    pub fn allocate(&mut self, handle: PoolHandle, size: usize) -> Result<Option<AllocHandle>, PoolError> {
        Ok(self.pool_mut(handle)?.allocate(size))
    }

    /// Free an allocation made from a pool.
    pub fn deallocate(&mut self, handle: PoolHandle, alloc: AllocHandle) -> Result<(), PoolError> {
        self.pool_mut(handle)?.deallocate(alloc)
    }

    /// Chain-ordered snapshot of a pool.
    pub fn inspect(&self, handle: PoolHandle) -> Result<Vec<PoolSegment>, PoolError> {
        Ok(self.pool(handle)?.inspect())
    }

    /// Accounting for a pool.
    pub fn stats(&self, handle: PoolHandle) -> Result<PoolStats, PoolError> {
        Ok(self.pool(handle)?.stats())
    }

    /// Handles of every open pool, in slot order.
    pub fn handles(&self) -> Vec<PoolHandle> {
        let Some(slots) = self.slots.as_ref() else {
            return Vec::new();
        };
        slots
            .pools
            .iter()
            .enumerate()
            .filter_map(|(slot, pool)| {
                pool.as_ref().map(|pool| PoolHandle {
                    slot: slot as u32,
                    id: pool.id(),
                })
            })
            .collect()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
