//! A NUMA-aware, thread-cached, size-class segregated general-purpose
//! allocator, plus a reserve/commit linear arena sharing its virtual-memory
//! substrate.
//!
//! The allocator has a distinct entry-point namespace ([`init`],
//! [`allocate`], [`free`], ...) rather than overriding the process's global
//! allocator: it's a library component, not a `malloc` replacement (see
//! the crate-level non-goals in `SPEC_FULL.md`).
//!
//! # Example
//!
//! ```no_run
//! numanode_alloc::init(64 * 1024 * 1024).expect("init");
//! let p = numanode_alloc::allocate(64);
//! assert!(!p.is_null());
//! numanode_alloc::free(p);
//! numanode_alloc::cleanup();
//! ```

pub mod arena;
mod error;
mod header;
mod init;
mod large;
mod node_pool;
mod os;
mod size_class;
mod thread_cache;
mod topology;

pub use error::AllocError;

/// One-shot initialisation. Discovers NUMA topology and constructs one
/// node pool of `pool_bytes_per_node` bytes per discovered node.
///
/// Fails with [`AllocError::AlreadyInitialized`] if called twice, or with a
/// propagated platform error if a node pool can't obtain its backing
/// mapping. Allocation is only permitted after this returns `Ok`.
pub fn init(pool_bytes_per_node: usize) -> Result<(), AllocError> {
    init::init(pool_bytes_per_node)
}

/// Allocate `n` bytes from the calling thread's cache.
///
/// Returns null on `n == 0` or on any failure; never panics and never
/// aborts (see `spec.md` §7).
pub fn allocate(n: usize) -> *mut u8 {
    if n == 0 {
        return std::ptr::null_mut();
    }
    thread_cache::allocate(n)
}

/// Free a pointer previously returned by [`allocate`], [`zeroed`], or
/// [`resize`].
///
/// A no-op on a null pointer. Double-free, use-after-free, and freeing a
/// foreign pointer are undefined behaviour; this core does not detect
/// them (`spec.md` §7).
pub fn free(p: *mut u8) {
    if p.is_null() {
        return;
    }
    let h = unsafe { header::header_of(p) };
    if h.is_large() {
        unsafe { thread_cache::free_large(p) };
    } else {
        let class = h.class as usize;
        thread_cache::free_small(class, p);
    }
}

/// Allocate `num * size` bytes and zero them.
///
/// Rejects (returns null) on multiplication overflow. Small-class blocks
/// may carry non-zero residue from a previous occupant, so zeroing is
/// always performed rather than assumed.
pub fn zeroed(num: usize, size: usize) -> *mut u8 {
    let total = match num.checked_mul(size) {
        Some(t) => t,
        None => return std::ptr::null_mut(),
    };
    if total == 0 {
        return std::ptr::null_mut();
    }
    let p = allocate(total);
    if !p.is_null() {
        unsafe { std::ptr::write_bytes(p, 0, total) };
    }
    p
}

/// Resize an allocation to `n` bytes.
///
/// `resize(null, n)` behaves as `allocate(n)`; `resize(p, 0)` frees `p` and
/// returns null. When `n` fits in the existing block's capacity, `p` is
/// returned unchanged; otherwise a fresh block is allocated, the
/// overlapping prefix copied, and the old block freed.
pub fn resize(p: *mut u8, n: usize) -> *mut u8 {
    if p.is_null() {
        return allocate(n);
    }
    if n == 0 {
        free(p);
        return std::ptr::null_mut();
    }

    let old_capacity = unsafe { header::header_of(p).size as usize };
    if n <= old_capacity {
        return p;
    }

    let new_p = allocate(n);
    if new_p.is_null() {
        return std::ptr::null_mut();
    }
    let copy_len = old_capacity.min(n);
    unsafe { std::ptr::copy_nonoverlapping(p, new_p, copy_len) };
    free(p);
    new_p
}

/// The current thread's `(allocs, frees)` counters, or `(0, 0)` if this
/// thread has no cache yet.
pub fn thread_stats() -> (u64, u64) {
    thread_cache::thread_stats()
}

/// Log a human-readable summary of the discovered topology.
pub fn print_topology() {
    init::print_topology()
}

/// Release all node pools and topology state. Subsequent operations revert
/// to uninitialised behaviour until [`init`] is called again.
pub fn cleanup() {
    init::cleanup()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    fn with_init<R>(f: impl FnOnce() -> R) -> R {
        let _guard = TEST_LOCK.lock().unwrap();
        cleanup();
        init(16 * 1024 * 1024).unwrap();
        let r = f();
        cleanup();
        r
    }

    #[test]
    fn scenario_single_block_roundtrip() {
        with_init(|| {
            let p = allocate(64);
            assert!(!p.is_null());
            unsafe {
                std::ptr::write_bytes(p, 0xAA, 64);
                assert_eq!(*p, 0xAA);
            }
            free(p);
            assert_eq!(thread_stats(), (1, 1));
        });
    }

    #[test]
    fn zero_sized_requests_return_null() {
        with_init(|| {
            assert!(allocate(0).is_null());
            assert!(zeroed(0, 8).is_null());
            assert!(zeroed(8, 0).is_null());
        });
    }

    #[test]
    fn zeroed_overflow_returns_null() {
        with_init(|| {
            assert!(zeroed(usize::MAX, 2).is_null());
        });
    }

    #[test]
    fn zeroed_buffer_is_all_zero() {
        with_init(|| {
            let p = zeroed(16, 4);
            assert!(!p.is_null());
            unsafe {
                for i in 0..64 {
                    assert_eq!(*p.add(i), 0);
                }
            }
            free(p);
        });
    }

    #[test]
    fn resize_null_behaves_as_allocate() {
        with_init(|| {
            let p = resize(std::ptr::null_mut(), 32);
            assert!(!p.is_null());
            free(p);
        });
    }

    #[test]
    fn resize_to_zero_frees_and_returns_null() {
        with_init(|| {
            let p = allocate(32);
            let q = resize(p, 0);
            assert!(q.is_null());
        });
    }

    #[test]
    fn resize_within_capacity_is_a_noop_move() {
        with_init(|| {
            let p = allocate(16);
            unsafe { std::ptr::write_bytes(p, 0x5A, 16) };
            let q = resize(p, 16);
            assert_eq!(p, q);
            free(q);
        });
    }

    #[test]
    fn resize_growth_preserves_prefix() {
        with_init(|| {
            let p = allocate(16);
            unsafe { std::ptr::write_bytes(p, 0x5A, 16) };
            let q = resize(p, 100);
            assert_ne!(q, std::ptr::null_mut());
            unsafe {
                for i in 0..16 {
                    assert_eq!(*q.add(i), 0x5A);
                }
            }
            free(q);
        });
    }

    #[test]
    fn each_class_size_is_reused_after_free() {
        with_init(|| {
            let sizes = [16usize, 32, 64, 128, 256, 512, 1024, 2048];
            let mut first_round = Vec::new();
            for &s in &sizes {
                first_round.push(allocate(s));
            }
            for &p in &first_round {
                free(p);
            }
            let mut reused = 0;
            for (&s, &old) in sizes.iter().zip(first_round.iter()) {
                let p = allocate(s);
                if p == old {
                    reused += 1;
                }
                free(p);
            }
            assert!(reused > 0, "at least one size class should reuse its freed block");
        });
    }

    #[test]
    fn thread_stats_without_any_cache_is_zero() {
        // Run on a fresh OS thread that never touches the allocator.
        let handle = std::thread::spawn(thread_stats);
        assert_eq!(handle.join().unwrap(), (0, 0));
    }
}
