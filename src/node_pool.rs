//! Per-node pool: a contiguous region placed on one NUMA node, bump
//! allocated under a mutex to hand out batches to thread caches.
//!
//! See `spec.md` §3 ("Node pool") and §4.3.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::debug;

use crate::error::AllocError;
use crate::os;

/// A coarse, racily-read snapshot of a node pool's watermark, for
/// diagnostics only (`print_topology`, tests) — never part of the
/// correctness contract.
#[derive(Debug, Clone, Copy)]
pub struct NodeStats {
    pub used: usize,
    pub capacity: usize,
}

pub struct NodePool {
    node: u32,
    base: *mut u8,
    capacity: usize,
    used: Mutex<usize>,
    used_snapshot: AtomicUsize,
}

// The pool's region is used only through `reserve_batch`, which is
// internally synchronized; the raw pointer itself never aliases mutable
// Rust references outside that critical section.
unsafe impl Send for NodePool {}
unsafe impl Sync for NodePool {}

impl NodePool {
    /// Construct a node pool of `capacity` bytes placed on `node`.
    ///
    /// First-touches the entire region (best-effort placement, per
    /// `spec.md` §5) before returning.
    pub fn new(node: u32, capacity: usize) -> Result<Self, AllocError> {
        let capacity = os::align_up_page(capacity.max(os::page_size() as usize));
        let base = os::alloc_on_node(capacity, node)?;
        os::first_touch(base, capacity);
        debug!(
            "node pool {}: {} bytes at {:p}",
            node, capacity, base
        );
        Ok(NodePool {
            node,
            base,
            capacity,
            used: Mutex::new(0),
            used_snapshot: AtomicUsize::new(0),
        })
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    /// Reserve a contiguous batch of `n_bytes` from this pool.
    ///
    /// The only mutating operation on a node pool during steady state: a
    /// single mutex acquisition guards watermark arithmetic only, per
    /// `spec.md` §4.3 — no allocation or I/O happens inside the critical
    /// section.
    pub fn reserve_batch(&self, n_bytes: usize) -> Result<*mut u8, AllocError> {
        let mut used = self.used.lock().unwrap();
        if *used + n_bytes > self.capacity {
            return Err(AllocError::NodeExhausted);
        }
        let base = unsafe { self.base.add(*used) };
        *used += n_bytes;
        self.used_snapshot.store(*used, Ordering::Relaxed);
        Ok(base)
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            used: self.used_snapshot.load(Ordering::Relaxed),
            capacity: self.capacity,
        }
    }
}

impl Drop for NodePool {
    fn drop(&mut self) {
        os::release(self.base, self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_batch_advances_watermark_monotonically() {
        let pool = NodePool::new(0, 64 * 1024).unwrap();
        let mut last_used = 0;
        for _ in 0..10 {
            let before = pool.stats().used;
            assert!(before >= last_used);
            pool.reserve_batch(1024).unwrap();
            last_used = pool.stats().used;
        }
    }

    #[test]
    fn exhaustion_reports_node_exhausted() {
        let pool = NodePool::new(0, 8192).unwrap();
        pool.reserve_batch(4096).unwrap();
        pool.reserve_batch(4096).unwrap();
        assert_eq!(pool.reserve_batch(1).unwrap_err(), AllocError::NodeExhausted);
    }

    #[test]
    fn distinct_batches_do_not_overlap() {
        let pool = NodePool::new(0, 64 * 1024).unwrap();
        let a = pool.reserve_batch(256).unwrap();
        let b = pool.reserve_batch(256).unwrap();
        assert!((b as usize) >= (a as usize) + 256);
    }
}
