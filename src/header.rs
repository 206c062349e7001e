//! Block header / tagging.
//!
//! Every allocation — small or large — carries a fixed preamble immediately
//! before the user pointer. This single convention removes the need for any
//! address-range lookup at free time: classification is one header read.
//! See `spec.md` §4.7.

use crate::size_class::LARGE_CLASS;
use std::mem::size_of;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// Total block size in bytes: the mapping length for large blocks, the
    /// class size for small blocks.
    pub size: u64,
    /// Size-class index, or `LARGE_CLASS` for a block on the large path.
    pub class: u32,
    /// Home node this block was placed on.
    pub node: u32,
}

pub const HEADER_SIZE: usize = size_of::<Header>();

impl Header {
    #[inline]
    pub fn is_large(&self) -> bool {
        self.class == LARGE_CLASS
    }
}

/// Recover the header preceding a user pointer.
///
/// # Safety
/// `p` must have been returned by this allocator's `write_header` /
/// allocation path and still be live.
#[inline]
pub unsafe fn header_of<'a>(p: *mut u8) -> &'a mut Header {
    &mut *(p.sub(HEADER_SIZE) as *mut Header)
}

/// Write a header into the preamble of `block` and return the user pointer
/// immediately following it.
///
/// # Safety
/// `block` must point to at least `HEADER_SIZE + size` writable bytes.
#[inline]
pub unsafe fn write_header(block: *mut u8, size: u64, class: u32, node: u32) -> *mut u8 {
    let h = block as *mut Header;
    h.write(Header { size, class, node });
    block.add(HEADER_SIZE)
}

/// The block's base address (the header's address) given its user pointer.
///
/// # Safety
/// Same requirements as `header_of`.
#[inline]
pub unsafe fn block_base(p: *mut u8) -> *mut u8 {
    p.sub(HEADER_SIZE)
}
