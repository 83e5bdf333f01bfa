//! # Process-Wide Pools
//!
//! Free functions over one process-wide [`PoolRegistry`], for callers that
//! want a single set of pools without threading a registry through their
//! code. Every call takes one global lock for its whole duration, so calls
//! from different threads are serialized.
//!
//! The registry is created on first use with [`PoolConfig::from_env`], which
//! also applies the logging settings. It starts uninitialized: call [`init`]
//! before anything else.
//!
//! ```rust,ignore
//! use segpool::{global, FitPolicy};
//!
//! global::init()?;
//! let pool = global::open_pool(1024, FitPolicy::BestFit).expect("pool");
//! let a = global::allocate(pool, 100)?.expect("room");
//! global::deallocate(pool, a)?;
//! global::close_pool(pool)?;
//! global::teardown()?;
//! ```

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::{AllocHandle, PoolHandle};
use crate::log;
use crate::pool::{FitPolicy, PoolManager, PoolSegment, PoolStats};
use crate::registry::PoolRegistry;

/// Global registry instance.
static REGISTRY: OnceLock<Mutex<PoolRegistry>> = OnceLock::new();

/// Get the global registry.
pub fn registry() -> &'static Mutex<PoolRegistry> {
    REGISTRY.get_or_init(|| {
        let config = PoolConfig::from_env();
        log::init(&config.log);
        Mutex::new(PoolRegistry::new(config))
    })
}

/// Initialize the global registry.
pub fn init() -> Result<(), PoolError> {
    registry().lock().init()
}

/// Close every open pool and release the global registry.
pub fn teardown() -> Result<(), PoolError> {
    registry().lock().teardown()
}

/// Open a pool in the global registry.
pub fn open_pool(size: usize, policy: FitPolicy) -> Option<PoolHandle> {
    registry().lock().open_pool(size, policy)
}

/// Close a pool in the global registry.
pub fn close_pool(handle: PoolHandle) -> Result<(), PoolError> {
    registry().lock().close_pool(handle)
}

/// Allocate from a global pool.
pub fn allocate(handle: PoolHandle, size: usize) -> Result<Option<AllocHandle>, PoolError> {
    registry().lock().allocate(handle, size)
}

/// Free an allocation made from a global pool.
pub fn deallocate(handle: PoolHandle, alloc: AllocHandle) -> Result<(), PoolError> {
    registry().lock().deallocate(handle, alloc)
}

/// Chain-ordered snapshot of a global pool.
pub fn inspect(handle: PoolHandle) -> Result<Vec<PoolSegment>, PoolError> {
    registry().lock().inspect(handle)
}

/// Accounting for a global pool.
pub fn stats(handle: PoolHandle) -> Result<PoolStats, PoolError> {
    registry().lock().stats(handle)
}

/// Run `f` against a global pool while holding the registry lock.
///
/// `f` must not call back into this module; the lock is not reentrant.
pub fn with_pool<R>(
    handle: PoolHandle,
    f: impl FnOnce(&mut PoolManager) -> R,
) -> Result<R, PoolError> {
    let mut registry = registry().lock();
    let pool = registry.pool_mut(handle)?;
    Ok(f(pool))
}
