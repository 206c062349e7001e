//! Large-block path: direct VM allocation for requests above the largest
//! size class, with huge-page preference and node binding.
//!
//! See `spec.md` §4.6.

use crate::error::AllocError;
use crate::header::{self, HEADER_SIZE};
use crate::os;
use crate::size_class::LARGE_CLASS;

/// Allocate a standalone mapping large enough to hold `n` user bytes plus a
/// header, rounded to the huge-page size when the mapping would meet or
/// exceed it, otherwise to the system page size.
pub fn alloc_large(n: usize, home_node: u32) -> Result<*mut u8, AllocError> {
    let m = n
        .checked_add(HEADER_SIZE)
        .ok_or(AllocError::AllocFailed)?;
    let huge_preferred = m >= os::HUGE_PAGE_SIZE;
    let rounded = if huge_preferred {
        os::align_up_huge(m)
    } else {
        os::align_up_page(m)
    };

    let block = os::map_anon(rounded, huge_preferred).map_err(|_| AllocError::AllocFailed)?;
    if block.is_null() {
        return Err(AllocError::AllocFailed);
    }
    os::bind_pages(block, rounded, home_node);
    let user = unsafe { header::write_header(block, rounded as u64, LARGE_CLASS, home_node) };
    Ok(user)
}

/// Free a large block previously returned by `alloc_large`.
///
/// # Safety
/// `p` must be a live pointer returned by `alloc_large`, with an intact
/// large-sentinel header.
pub unsafe fn free_large(p: *mut u8) {
    let h = header::header_of(p);
    debug_assert!(h.is_large());
    let base = header::block_base(p);
    let size = h.size as usize;
    os::release(base, size);
}
