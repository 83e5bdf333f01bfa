//! # segpool
//!
//! A user-space memory pool allocator. Each pool carves one fixed-size buffer
//! into variable-size allocations and reclaims them, merging adjacent free
//! space on every free.
//!
//! - **Pool Manager**: split-on-allocate, coalesce-on-free, first-fit and
//!   best-fit search
//! - **Segment Table**: index-linked arena of segments with slot recycling
//! - **Free Index**: gaps sorted by `(size, offset)` for best-fit lookup
//! - **Registry**: explicit init/teardown lifecycle over many open pools
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     global (one locked registry)                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     PoolRegistry (registry.rs)                  │
//! │                               │                                 │
//! │        ┌──────────────────────┼──────────────────────┐          │
//! │        ▼                      ▼                      ▼          │
//! │  ┌────────────┐         ┌────────────┐         ┌────────────┐   │
//! │  │PoolManager │   ...   │PoolManager │   ...   │PoolManager │   │
//! │  │ (pool.rs)  │         │            │         │            │   │
//! │  └─────┬──────┘         └────────────┘         └────────────┘   │
//! │        │                                                        │
//! │  ┌─────┴──────────┬─────────────────┬──────────────┐            │
//! │  │  SegmentTable  │    FreeIndex    │ byte buffer  │            │
//! │  │  (segment.rs)  │ (free_index.rs) │              │            │
//! │  └────────────────┴─────────────────┴──────────────┘            │
//! │                                                                 │
//! │  growth.rs: fill-factor growth for every table                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use segpool::{FitPolicy, PoolRegistry};
//!
//! let mut registry = PoolRegistry::default();
//! registry.init().unwrap();
//!
//! let pool = registry.open_pool(1000, FitPolicy::BestFit).unwrap();
//! let a = registry.allocate(pool, 100).unwrap().unwrap();
//! let b = registry.allocate(pool, 200).unwrap().unwrap();
//! registry.deallocate(pool, a).unwrap();
//! registry.deallocate(pool, b).unwrap();
//!
//! let chain = registry.inspect(pool).unwrap();
//! assert_eq!(chain.len(), 1);
//! assert_eq!(chain[0].size, 1000);
//!
//! registry.close_pool(pool).unwrap();
//! registry.teardown().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod free_index;
pub mod global;
pub mod growth;
pub mod handle;
pub mod log;
pub mod pool;
pub mod registry;
pub mod segment;

// Re-exports
pub use config::{ConfigError, LogConfig, PoolConfig, PoolConfigBuilder};
pub use error::{ErrorKind, InvariantError, PoolError};
pub use growth::GrowthPolicy;
pub use handle::{AllocHandle, Generation, PoolHandle, PoolId};
pub use pool::{FitPolicy, PoolManager, PoolSegment, PoolStats};
pub use registry::PoolRegistry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
