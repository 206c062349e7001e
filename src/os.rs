//! Platform virtual-memory shim.
//!
//! Abstracts the OS primitives the rest of the allocator is built on:
//! reserve / commit / release, huge-page-preferring anonymous mappings, and
//! best-effort NUMA page binding. Every other module only ever talks to the
//! OS through this file.

use std::ptr::null_mut;
use std::sync::OnceLock;

use log::warn;

use crate::error::AllocError;

/// Reference huge page size (2 MiB), matching `spec.md`'s reference value.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

static PAGE_SIZE: OnceLock<u32> = OnceLock::new();

/// The system page size, queried once and cached.
pub fn page_size() -> u32 {
    *PAGE_SIZE.get_or_init(|| {
        #[cfg(unix)]
        {
            let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if n > 0 {
                n as u32
            } else {
                4096
            }
        }
        #[cfg(windows)]
        {
            use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
            unsafe {
                let mut si: SYSTEM_INFO = std::mem::zeroed();
                GetSystemInfo(&mut si);
                if si.dwPageSize > 0 {
                    si.dwPageSize
                } else {
                    4096
                }
            }
        }
    })
}

pub fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align == 0 || align.is_power_of_two());
    if align == 0 {
        return n;
    }
    (n + align - 1) & !(align - 1)
}

pub fn align_up_page(n: usize) -> usize {
    align_up(n, page_size() as usize)
}

pub fn align_up_huge(n: usize) -> usize {
    align_up(n, HUGE_PAGE_SIZE)
}

/// Reserve `n` bytes of address space with no backing storage.
///
/// The returned range is not yet readable or writable; callers must
/// `commit` before touching it.
pub fn reserve(n: usize) -> Result<*mut u8, AllocError> {
    if n == 0 {
        return Ok(null_mut());
    }
    #[cfg(unix)]
    {
        let p = unsafe {
            libc::mmap(
                null_mut(),
                n,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            warn!("mmap reserve failed: {}", errno::errno());
            return Err(AllocError::VmReserveFailed);
        }
        Ok(p as *mut u8)
    }
    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_RESERVE, PAGE_NOACCESS};
        let p = unsafe { VirtualAlloc(null_mut(), n, MEM_RESERVE, PAGE_NOACCESS) };
        if p.is_null() {
            warn!("VirtualAlloc reserve failed: {}", unsafe {
                winapi::um::errhandlingapi::GetLastError()
            });
            return Err(AllocError::VmReserveFailed);
        }
        Ok(p as *mut u8)
    }
}

/// Make `[p, p+n)` (a subrange of a prior `reserve`) readable and writable.
pub fn commit(p: *mut u8, n: usize) -> Result<(), AllocError> {
    if n == 0 {
        return Ok(());
    }
    #[cfg(unix)]
    {
        let rc = unsafe { libc::mprotect(p as *mut _, n, libc::PROT_READ | libc::PROT_WRITE) };
        if rc != 0 {
            warn!("mprotect commit failed: {}", errno::errno());
            return Err(AllocError::VmCommitFailed);
        }
        Ok(())
    }
    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, PAGE_READWRITE};
        let q = unsafe { VirtualAlloc(p as _, n, MEM_COMMIT, PAGE_READWRITE) };
        if q.is_null() {
            warn!("VirtualAlloc commit failed: {}", unsafe {
                winapi::um::errhandlingapi::GetLastError()
            });
            return Err(AllocError::VmCommitFailed);
        }
        Ok(())
    }
}

/// Release an entire mapping starting at `p` of size `n`.
///
/// `n` must be the size passed to the `reserve`/`map_anon` call that
/// produced `p` (Windows releases by base address only; Unix needs the
/// length).
pub fn release(p: *mut u8, n: usize) {
    if p.is_null() || n == 0 {
        return;
    }
    #[cfg(unix)]
    {
        let rc = unsafe { libc::munmap(p as *mut _, n) };
        if rc != 0 {
            warn!("munmap failed: {}, addr {:p}, size {}", errno::errno(), p, n);
        }
    }
    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_RELEASE;
        let ok = unsafe { VirtualFree(p as _, 0, MEM_RELEASE) };
        if ok == 0 {
            warn!("VirtualFree failed: {}", unsafe {
                winapi::um::errhandlingapi::GetLastError()
            });
        }
    }
}

/// Create an anonymous, readable, writable private mapping of size `n`.
///
/// When `huge_preferred` is set, attempt a huge-page-backed mapping first
/// and silently fall back to a regular mapping on failure, exactly per
/// `spec.md` §4.1.
pub fn map_anon(n: usize, huge_preferred: bool) -> Result<*mut u8, AllocError> {
    if n == 0 {
        return Ok(null_mut());
    }
    #[cfg(unix)]
    {
        if huge_preferred {
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | huge_flags();
            let p = unsafe {
                libc::mmap(
                    null_mut(),
                    n,
                    libc::PROT_READ | libc::PROT_WRITE,
                    flags,
                    -1,
                    0,
                )
            };
            if p != libc::MAP_FAILED {
                return Ok(p as *mut u8);
            }
            warn!(
                "huge-page mmap failed ({}), falling back to regular pages",
                errno::errno()
            );
        }
        let p = unsafe {
            libc::mmap(
                null_mut(),
                n,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            warn!("mmap failed: {}", errno::errno());
            return Err(AllocError::VmReserveFailed);
        }
        Ok(p as *mut u8)
    }
    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, MEM_LARGE_PAGES, MEM_RESERVE, PAGE_READWRITE};
        if huge_preferred {
            let p = unsafe {
                VirtualAlloc(
                    null_mut(),
                    n,
                    MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
                    PAGE_READWRITE,
                )
            };
            if !p.is_null() {
                return Ok(p as *mut u8);
            }
            warn!("large-page VirtualAlloc failed, falling back to regular pages");
        }
        let p = unsafe { VirtualAlloc(null_mut(), n, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE) };
        if p.is_null() {
            warn!("VirtualAlloc failed: {}", unsafe {
                winapi::um::errhandlingapi::GetLastError()
            });
            return Err(AllocError::VmReserveFailed);
        }
        Ok(p as *mut u8)
    }
}

#[cfg(all(unix, target_os = "linux"))]
fn huge_flags() -> libc::c_int {
    libc::MAP_HUGETLB
}

#[cfg(all(unix, not(target_os = "linux")))]
fn huge_flags() -> libc::c_int {
    0
}

/// Request (best-effort, never fatal) that the kernel place pages of
/// `[p, p+n)` on `node`.
///
/// Platforms without NUMA-binding facilities are a documented no-op.
#[cfg(target_os = "linux")]
pub fn bind_pages(p: *mut u8, n: usize, node: u32) {
    if p.is_null() || n == 0 {
        return;
    }
    // mbind(2): MPOL_BIND with a single-bit nodemask selecting `node`.
    const MPOL_BIND: libc::c_int = 2;
    let nodemask: u64 = 1u64 << (node as u64 % 64);
    let rc = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            p as usize,
            n,
            MPOL_BIND,
            &nodemask as *const u64 as usize,
            65usize, // maxnode: nodemask bit width + 1, per mbind(2)
            0usize,
        )
    };
    if rc != 0 {
        warn!(
            "mbind to node {} failed: {} (best-effort, continuing)",
            node,
            errno::errno()
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn bind_pages(_p: *mut u8, _n: usize, _node: u32) {
    // No portable NUMA-binding facility; degrade to a node-oblivious mapping.
}

/// Reserve+commit+bind a region of `n` bytes on `node` in one step.
///
/// Falls back to `map_anon` + `bind_pages` wherever a combined
/// allocate-on-node primitive (`numa_alloc_onnode`-equivalent) isn't
/// available, which on this shim is always -- we have no libnuma
/// dependency, so the fallback path *is* the implementation.
pub fn alloc_on_node(n: usize, node: u32) -> Result<*mut u8, AllocError> {
    let size = align_up_page(n);
    let p = map_anon(size, false)?;
    bind_pages(p, size, node);
    Ok(p)
}

/// First-touch every page in `[p, p+n)` to make placement definite.
pub fn first_touch(p: *mut u8, n: usize) {
    if p.is_null() || n == 0 {
        return;
    }
    let page = page_size() as usize;
    let mut off = 0usize;
    unsafe {
        while off < n {
            p.add(off).write_volatile(0);
            off += page;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let p = page_size();
        assert!(p >= 4096);
        assert_eq!(p & (p - 1), 0, "page size must be a power of two");
    }

    #[test]
    fn align_up_rounds_correctly() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn reserve_commit_release_roundtrip() {
        let size = page_size() as usize * 4;
        let p = reserve(size).expect("reserve");
        assert!(!p.is_null());
        commit(p, size).expect("commit");
        unsafe {
            p.write_volatile(0x42);
            assert_eq!(p.read_volatile(), 0x42);
        }
        release(p, size);
    }

    #[test]
    fn map_anon_is_readable_writable() {
        let size = page_size() as usize;
        let p = map_anon(size, false).expect("map_anon");
        unsafe {
            for i in 0..size {
                assert_eq!(*p.add(i), 0);
            }
            p.write_volatile(7);
            assert_eq!(p.read_volatile(), 7);
        }
        release(p, size);
    }
}
