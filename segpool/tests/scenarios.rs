//! End-to-end pool scenarios through the registry.

use segpool::{ErrorKind, FitPolicy, PoolConfig, PoolError, PoolRegistry, PoolSegment};

fn registry() -> PoolRegistry {
    let mut registry = PoolRegistry::new(PoolConfig::default());
    registry.init().unwrap();
    registry
}

fn seg(size: usize, allocated: bool) -> PoolSegment {
    PoolSegment { size, allocated }
}

#[test]
fn best_fit_reuses_smallest_gap() {
    let mut registry = registry();
    let pool = registry.open_pool(1000, FitPolicy::BestFit).unwrap();

    let _a = registry.allocate(pool, 100).unwrap().unwrap();
    let b = registry.allocate(pool, 200).unwrap().unwrap();
    let _c = registry.allocate(pool, 300).unwrap().unwrap();
    registry.deallocate(pool, b).unwrap();

    let d = registry.allocate(pool, 150).unwrap().unwrap();
    assert_eq!(d.offset(), b.offset());
    assert_eq!(
        registry.inspect(pool).unwrap(),
        vec![
            seg(100, true),
            seg(150, true),
            seg(50, false),
            seg(300, true),
            seg(400, false),
        ]
    );

    let stats = registry.stats(pool).unwrap();
    assert_eq!(stats.allocated_bytes, 550);
    assert_eq!(stats.allocation_count, 3);
    assert_eq!(stats.free_segment_count, 2);
    registry.pool(pool).unwrap().verify().unwrap();
}

#[test]
fn first_fit_whole_pool() {
    let mut registry = registry();
    let pool = registry.open_pool(500, FitPolicy::FirstFit).unwrap();

    let all = registry.allocate(pool, 500).unwrap().unwrap();
    assert_eq!(registry.stats(pool).unwrap().free_segment_count, 0);
    assert_eq!(registry.allocate(pool, 1).unwrap(), None);

    registry.deallocate(pool, all).unwrap();
    assert_eq!(registry.inspect(pool).unwrap(), vec![seg(500, false)]);
    assert_eq!(registry.stats(pool).unwrap().free_segment_count, 1);
}

#[test]
fn first_fit_and_best_fit_diverge() {
    let mut registry = registry();
    let first = registry.open_pool(1000, FitPolicy::FirstFit).unwrap();
    let best = registry.open_pool(1000, FitPolicy::BestFit).unwrap();

    // Both pools end up with a 500-byte gap at 100 and a 300-byte gap at 700.
    for pool in [first, best] {
        let _a = registry.allocate(pool, 100).unwrap().unwrap();
        let b = registry.allocate(pool, 500).unwrap().unwrap();
        let _c = registry.allocate(pool, 100).unwrap().unwrap();
        registry.deallocate(pool, b).unwrap();
    }

    let from_first = registry.allocate(first, 200).unwrap().unwrap();
    let from_best = registry.allocate(best, 200).unwrap().unwrap();
    assert_eq!(from_first.offset(), 100);
    assert_eq!(from_best.offset(), 700);
}

#[test]
fn adjacent_frees_merge() {
    let mut registry = registry();
    let pool = registry.open_pool(300, FitPolicy::FirstFit).unwrap();
    let a = registry.allocate(pool, 100).unwrap().unwrap();
    let b = registry.allocate(pool, 100).unwrap().unwrap();
    let _c = registry.allocate(pool, 100).unwrap().unwrap();

    registry.deallocate(pool, a).unwrap();
    assert_eq!(registry.inspect(pool).unwrap().len(), 3);

    registry.deallocate(pool, b).unwrap();
    assert_eq!(
        registry.inspect(pool).unwrap(),
        vec![seg(200, false), seg(100, true)]
    );
}

#[test]
fn allocate_then_free_restores_state() {
    let mut registry = registry();
    let pool = registry.open_pool(1000, FitPolicy::BestFit).unwrap();
    let _keep = registry.allocate(pool, 120).unwrap().unwrap();
    let hole = registry.allocate(pool, 80).unwrap().unwrap();
    let _tail = registry.allocate(pool, 300).unwrap().unwrap();
    registry.deallocate(pool, hole).unwrap();

    let before_chain = registry.inspect(pool).unwrap();
    let before_stats = registry.stats(pool).unwrap();

    let temp = registry.allocate(pool, 60).unwrap().unwrap();
    assert_ne!(registry.inspect(pool).unwrap(), before_chain);
    registry.deallocate(pool, temp).unwrap();

    assert_eq!(registry.inspect(pool).unwrap(), before_chain);
    let after_stats = registry.stats(pool).unwrap();
    assert_eq!(after_stats.allocated_bytes, before_stats.allocated_bytes);
    assert_eq!(after_stats.free_segment_count, before_stats.free_segment_count);
    assert_eq!(after_stats.live_segments, before_stats.live_segments);
}

#[test]
fn close_with_live_allocations_fails_and_pool_stays_usable() {
    let mut registry = registry();
    let pool = registry.open_pool(256, FitPolicy::FirstFit).unwrap();
    let a = registry.allocate(pool, 64).unwrap().unwrap();

    let err = registry.close_pool(pool).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFreed);
    assert_eq!(err, PoolError::NotFreed { allocations: 1 });

    let b = registry.allocate(pool, 64).unwrap().unwrap();
    registry.deallocate(pool, a).unwrap();
    registry.deallocate(pool, b).unwrap();
    registry.close_pool(pool).unwrap();
}

#[test]
fn init_twice_leaves_state_unchanged() {
    let mut registry = registry();
    let pool = registry.open_pool(128, FitPolicy::BestFit).unwrap();
    let a = registry.allocate(pool, 32).unwrap().unwrap();
    let before = registry.inspect(pool).unwrap();

    assert_eq!(
        registry.init().unwrap_err(),
        PoolError::CalledAgain { operation: "init" }
    );

    assert_eq!(registry.open_pools(), 1);
    assert_eq!(registry.inspect(pool).unwrap(), before);
    registry.deallocate(pool, a).unwrap();
}

#[test]
fn allocations_are_distinct_bytes() {
    let mut registry = registry();
    let pool = registry.open_pool(64, FitPolicy::FirstFit).unwrap();
    let a = registry.allocate(pool, 16).unwrap().unwrap();
    let b = registry.allocate(pool, 16).unwrap().unwrap();

    let manager = registry.pool_mut(pool).unwrap();
    manager.bytes_mut(&a).unwrap().fill(0xAA);
    manager.bytes_mut(&b).unwrap().fill(0x55);
    assert!(manager.bytes(&a).unwrap().iter().all(|&byte| byte == 0xAA));
    assert!(manager.bytes(&b).unwrap().iter().all(|&byte| byte == 0x55));
    assert!(a.range().end <= b.range().start);
}

#[test]
fn many_pools_are_independent() {
    let mut registry = registry();
    let pools: Vec<_> = (1..=30)
        .map(|i| registry.open_pool(i * 10, FitPolicy::BestFit).unwrap())
        .collect();

    for (i, &pool) in pools.iter().enumerate() {
        let size = (i + 1) * 10;
        let alloc = registry.allocate(pool, size).unwrap().unwrap();
        assert_eq!(alloc.size(), size);
        assert_eq!(registry.allocate(pool, 1).unwrap(), None);
        registry.deallocate(pool, alloc).unwrap();
    }

    for pool in pools {
        registry.close_pool(pool).unwrap();
    }
    assert_eq!(registry.open_pools(), 0);
    registry.teardown().unwrap();
}
