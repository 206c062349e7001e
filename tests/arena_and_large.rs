//! Arena and large-block scenarios from `spec.md` §8.

use std::sync::Mutex;

use numanode_alloc::arena::Arena;
use numanode_alloc::{allocate, cleanup, free, init, thread_stats};

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn with_init<R>(pool_bytes: usize, f: impl FnOnce() -> R) -> R {
    let _guard = TEST_LOCK.lock().unwrap();
    cleanup();
    init(pool_bytes).expect("init");
    let r = f();
    cleanup();
    r
}

#[test]
fn arena_ten_thousand_small_allocations_then_reset() {
    let _ = env_logger::try_init();
    let mut arena = Arena::create(1024 * 1024, 64 * 1024).expect("arena create");
    let start = arena.get_position();
    let mut ptrs = Vec::with_capacity(10_000);
    for _ in 0..10_000 {
        let p = arena.alloc(16).expect("arena alloc");
        ptrs.push(p as usize);
    }
    let mut sorted = ptrs.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ptrs.len(), "allocations must not overlap");

    arena.reset();
    assert_eq!(arena.get_position(), start);
    let _p = arena.alloc(512).expect("post-reset alloc");
    // The post-reset allocation must land exactly at the arena's starting
    // watermark.
    assert_eq!(arena.get_position(), start + 512);
}

#[test]
fn arena_reserve_too_small_fails_cleanly() {
    let _ = env_logger::try_init();
    let mut arena = Arena::create(64 * 1024, 64 * 1024).expect("arena create");
    let err = arena.alloc(1024 * 1024).unwrap_err();
    assert_eq!(err, numanode_alloc::AllocError::OutOfReserve);
}

#[test]
fn large_block_round_trip_across_the_huge_page_threshold() {
    let _ = env_logger::try_init();
    with_init(16 * 1024 * 1024, || {
        let p = allocate(4 * 1024 * 1024);
        assert!(!p.is_null());
        unsafe {
            std::ptr::write_bytes(p, 0x77, 4 * 1024 * 1024);
            assert_eq!(*p, 0x77);
            assert_eq!(*p.add(4 * 1024 * 1024 - 1), 0x77);
        }
        free(p);
    });
}

#[test]
fn large_alloc_and_free_keep_thread_stats_balanced() {
    let _ = env_logger::try_init();
    with_init(16 * 1024 * 1024, || {
        let before = thread_stats();
        let p = allocate(4 * 1024 * 1024);
        assert!(!p.is_null());
        assert_eq!(thread_stats(), (before.0 + 1, before.1));
        free(p);
        assert_eq!(thread_stats(), (before.0 + 1, before.1 + 1));
    });
}

#[test]
fn small_and_large_requests_coexist() {
    let _ = env_logger::try_init();
    with_init(16 * 1024 * 1024, || {
        let small = allocate(32);
        let large = allocate(1024 * 1024);
        assert!(!small.is_null());
        assert!(!large.is_null());
        free(small);
        free(large);
    });
}
