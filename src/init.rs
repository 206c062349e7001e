//! Process-wide initialisation and teardown of the allocator's shared
//! state: topology discovery and the per-node pool table.
//!
//! Mirrors the responsibility `mimalloc-rs/src/init.rs` gives its
//! `process_init`/`process_done` pair, but as safe, working Rust: one
//! `RwLock<Option<Global>>` instead of a handful of hand-managed statics
//! and an `atexit` hook. `init`/`cleanup` are the only writers; every other
//! operation only ever reads through `with_global`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::info;

use crate::error::AllocError;
use crate::node_pool::NodePool;
use crate::topology::Topology;

pub(crate) struct Global {
    pub(crate) topology: Topology,
    pub(crate) node_pools: Vec<NodePool>,
    pub(crate) generation: u64,
}

static GLOBAL: RwLock<Option<Global>> = RwLock::new(None);

// Bumped on every successful `init`, never reset by `cleanup`. Lets a
// `ThreadCache` created under one init/cleanup cycle notice it's outlived
// that cycle (its free-list pointers reference memory a later `cleanup`
// already released) and rebuild itself instead of serving dangling blocks.
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// One-shot initialisation: discover the topology and construct `N` node
/// pools of `pool_bytes_per_node` bytes each.
///
/// Fails with `AlreadyInitialized` if called twice, or propagates the first
/// sub-step failure (a node pool failing to obtain its backing mapping).
pub fn init(pool_bytes_per_node: usize) -> Result<(), AllocError> {
    let mut guard = GLOBAL.write().unwrap();
    if guard.is_some() {
        return Err(AllocError::AlreadyInitialized);
    }

    let topology = Topology::discover();
    let mut node_pools = Vec::with_capacity(topology.num_nodes());
    for node in 0..topology.num_nodes() as u32 {
        node_pools.push(NodePool::new(node, pool_bytes_per_node)?);
    }

    info!(
        "allocator initialized: {} node(s), {} bytes/node",
        topology.num_nodes(),
        pool_bytes_per_node
    );
    let generation = GENERATION.fetch_add(1, Ordering::Relaxed) + 1;
    *guard = Some(Global {
        topology,
        node_pools,
        generation,
    });
    Ok(())
}

/// Release all node pools and topology state. Subsequent operations revert
/// to uninitialised behaviour (allocation fails, `thread_stats` reads as
/// `(0, 0)`, etc).
///
/// Existing thread caches are not notified: per `spec.md` §9, caches are
/// never reaped proactively. A cache created before `cleanup()` that is
/// still in its fast path keeps working against memory this call has
/// unmapped; this mirrors the "no promise to return physical memory"
/// non-goal and is documented, not hidden.
pub fn cleanup() {
    let mut guard = GLOBAL.write().unwrap();
    *guard = None;
}

/// True if `init` has succeeded and `cleanup` has not since been called.
pub fn is_initialized() -> bool {
    GLOBAL.read().unwrap().is_some()
}

/// Run `f` against the shared global state, or fail with `AllocFailed` if
/// the allocator has not been initialised.
pub(crate) fn with_global<R>(f: impl FnOnce(&Global) -> R) -> Result<R, AllocError> {
    let guard = GLOBAL.read().unwrap();
    match guard.as_ref() {
        Some(g) => Ok(f(g)),
        None => Err(AllocError::AllocFailed),
    }
}

/// The current global's generation stamp, or `None` if uninitialised. A
/// thread cache compares this against the generation it was created under
/// to detect that `cleanup`/`init` cycled underneath it.
pub(crate) fn current_generation() -> Option<u64> {
    GLOBAL.read().unwrap().as_ref().map(|g| g.generation)
}

pub fn print_topology() {
    let guard = GLOBAL.read().unwrap();
    match guard.as_ref() {
        Some(g) => g.topology.print(),
        None => info!("allocator not initialized"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // init/cleanup mutate process-wide state; serialize the tests that
    // touch it so they don't trample each other.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn double_init_is_rejected() {
        let _guard = TEST_LOCK.lock().unwrap();
        cleanup();
        init(1024 * 1024).unwrap();
        assert_eq!(init(1024 * 1024).unwrap_err(), AllocError::AlreadyInitialized);
        cleanup();
    }

    #[test]
    fn cleanup_reverts_to_uninitialized() {
        let _guard = TEST_LOCK.lock().unwrap();
        cleanup();
        init(1024 * 1024).unwrap();
        assert!(is_initialized());
        cleanup();
        assert!(!is_initialized());
    }

    #[test]
    fn generation_advances_across_init_cycles() {
        let _guard = TEST_LOCK.lock().unwrap();
        cleanup();
        init(1024 * 1024).unwrap();
        let g1 = current_generation().unwrap();
        cleanup();
        assert_eq!(current_generation(), None);
        init(1024 * 1024).unwrap();
        let g2 = current_generation().unwrap();
        assert!(g2 > g1, "generation must strictly advance across re-init");
        cleanup();
    }
}
