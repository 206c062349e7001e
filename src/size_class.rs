//! Fixed size-class ladder.
//!
//! A pure, immutable table: the reference ladder from `spec.md` §3, spaced
//! for the common small-object sizes a thread cache services. Everything
//! above the top class (`s_{K-1}`) takes the large-block path (`large.rs`).

/// The reference size-class ladder: `K = 8` classes, 16 B .. 2 KiB.
pub const SIZE_CLASSES: [u32; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

pub const NUM_CLASSES: usize = SIZE_CLASSES.len();

/// The batch size the node pool hands out on a slow-path refill.
pub const REFILL_BATCH: usize = 64;

/// Sentinel class index meaning "this block took the large-block path".
pub const LARGE_CLASS: u32 = u32::MAX;

/// Classify a request of `n` bytes.
///
/// Returns the smallest class index `i` with `SIZE_CLASSES[i] >= n`, or
/// `None` if `n` exceeds the largest class (the large-block path should be
/// used instead). Callers must never pass `n == 0`; that's rejected
/// upstream by the facade.
#[inline]
pub fn class_of(n: usize) -> Option<usize> {
    debug_assert!(n > 0);
    SIZE_CLASSES.iter().position(|&s| s as usize >= n)
}

/// The byte size serviced by class `i`.
#[inline]
pub fn size_of_class(i: usize) -> u32 {
    SIZE_CLASSES[i]
}
