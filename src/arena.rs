//! Linear arena: a reserve-then-lazy-commit bump allocator with a
//! saveable/restorable watermark.
//!
//! A distinct, simpler allocator sharing the VM shim with the NUMA
//! allocator (`spec.md` §4.9). Unlike the thread cache, it offers scoped
//! bulk reclamation (`reset` / `set_position`) but no per-object reuse.

use crate::error::AllocError;
use crate::os;

/// Header stored in the committed prefix of the arena's own reservation.
/// Keeps the arena's own bookkeeping colocated with the memory it manages,
/// in the same spirit as the allocator's block headers.
const ARENA_HEADER_SIZE: usize = std::mem::size_of::<usize>();

pub struct Arena {
    base: *mut u8,
    reserve: usize,
    commit_unit: usize,
    position: usize,
    committed: usize,
}

// `Arena` owns its mapping exclusively; all mutation goes through `&mut
// self`, so sharing one across threads requires external synchronization
// (it implements no internal locking, matching the "scoped lifetime"
// single-owner model described in `spec.md` §9).
unsafe impl Send for Arena {}

impl Arena {
    /// Reserve `reserve` bytes of address space and commit the first
    /// `commit` bytes. Both are rounded up to the page size; `commit` is
    /// clamped to `reserve` if it would otherwise exceed it.
    pub fn create(reserve: usize, commit: usize) -> Result<Self, AllocError> {
        let reserve = os::align_up_page(reserve);
        let mut commit = os::align_up_page(commit);
        if commit > reserve {
            commit = reserve;
        }

        let base = os::reserve(reserve).map_err(|_| AllocError::ArenaCreateFailed)?;
        os::commit(base, commit).map_err(|_| AllocError::ArenaCreateFailed)?;

        Ok(Arena {
            base,
            reserve,
            commit_unit: commit.max(os::page_size() as usize),
            position: ARENA_HEADER_SIZE,
            committed: commit,
        })
    }

    fn header_size(&self) -> usize {
        ARENA_HEADER_SIZE
    }

    /// Allocate `n` bytes at the platform's natural word alignment.
    pub fn alloc(&mut self, n: usize) -> Result<*mut u8, AllocError> {
        self.alloc_aligned(n, std::mem::size_of::<usize>())
    }

    /// Allocate `n` bytes aligned to `align`, which must be a power of two.
    ///
    /// Committing additional pages happens in whole multiples of the
    /// arena's commit unit, clamped to the reserved range. The returned
    /// slot is always zero-filled (`spec.md` §9: "Arena allocations are
    /// always zero-filled").
    pub fn alloc_aligned(&mut self, n: usize, align: usize) -> Result<*mut u8, AllocError> {
        debug_assert!(align.is_power_of_two());
        let q = os::align_up(self.position, align);
        let end = q.checked_add(n).ok_or(AllocError::OutOfReserve)?;
        if end > self.reserve {
            return Err(AllocError::OutOfReserve);
        }

        if end > self.committed {
            let grow = os::align_up(end - self.committed, self.commit_unit);
            let new_committed = (self.committed + grow).min(self.reserve);
            let extra = new_committed - self.committed;
            if extra > 0 {
                os::commit(unsafe { self.base.add(self.committed) }, extra)
                    .map_err(|_| AllocError::OutOfReserve)?;
            }
            self.committed = new_committed;
            if end > self.committed {
                return Err(AllocError::OutOfReserve);
            }
        }

        let slot = unsafe { self.base.add(q) };
        unsafe { std::ptr::write_bytes(slot, 0, n) };
        self.position = end;
        Ok(slot)
    }

    /// Reset the watermark to the start of user-allocatable space. Does
    /// not decommit.
    pub fn reset(&mut self) {
        self.position = self.header_size();
    }

    pub fn get_position(&self) -> usize {
        self.position
    }

    /// Restore the watermark to a previously saved position. Values
    /// outside `[header_size, reserve]` are ignored.
    pub fn set_position(&mut self, p: usize) {
        if p >= self.header_size() && p <= self.reserve {
            self.position = p;
        }
    }

    /// Release the entire reserved range.
    pub fn destroy(self) {
        // Drop runs the release; this method exists to give callers an
        // explicit, spec-named entry point (`spec.md` §4.9).
        drop(self)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        os::release(self.base, self.reserve);
    }
}
