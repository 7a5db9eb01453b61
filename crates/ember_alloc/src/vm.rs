//! Platform virtual memory: reserve address space, commit pages, release
//!
//! The virtual arena is the only user. Reservation hands back inaccessible
//! address space; committing makes a prefix of it readable and writable.
//! Committing an already committed range is allowed on every platform.

use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::error::VmError;

/// Abstract interface for virtual memory operations.
trait VmOps {
    /// Reserve address space without committing physical pages.
    unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError>;

    /// Back `size` bytes starting at `ptr` with physical pages.
    unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// Release the whole reservation.
    unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// OS page size.
    fn query_page_size() -> usize;
}

struct PlatformVmOps;

/// OS page size, queried once
pub fn page_size() -> usize {
    static CACHED: OnceLock<usize> = OnceLock::new();
    *CACHED.get_or_init(PlatformVmOps::query_page_size)
}

/// Reserve `size` bytes of address space
///
/// # Safety
/// The returned range is not accessible until it is committed.
pub unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
    PlatformVmOps::reserve(size)
}

/// Commit `size` bytes starting at `ptr`
///
/// # Safety
/// `ptr..ptr + size` must lie inside a live reservation and `ptr` must be
/// page aligned.
pub unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    PlatformVmOps::commit(ptr, size)
}

/// Release a reservation made with [`reserve`]
///
/// # Safety
/// `ptr` and `size` must describe the whole reservation. No pointer into it
/// may be used afterwards.
pub unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    PlatformVmOps::release(ptr, size)
}

#[cfg(all(unix, not(miri)))]
mod unix {
    use super::{NonNull, PlatformVmOps, VmError, VmOps};
    use std::io;

    impl VmOps for PlatformVmOps {
        unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );

            if ptr == libc::MAP_FAILED {
                return Err(VmError::Reserve(io::Error::last_os_error()));
            }

            NonNull::new(ptr.cast::<u8>())
                .ok_or_else(|| VmError::Reserve(io::Error::other("mmap returned null")))
        }

        unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
            let result = libc::mprotect(
                ptr.as_ptr().cast::<libc::c_void>(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            );
            if result != 0 {
                return Err(VmError::Commit(io::Error::last_os_error()));
            }
            Ok(())
        }

        unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
            if libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), size) != 0 {
                return Err(VmError::Release(io::Error::last_os_error()));
            }
            Ok(())
        }

        fn query_page_size() -> usize {
            let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if raw <= 0 {
                4096
            } else {
                raw as usize
            }
        }
    }
}

#[cfg(all(windows, not(miri)))]
mod windows {
    use super::{NonNull, PlatformVmOps, VmError, VmOps};
    use std::io;
    use std::mem::MaybeUninit;

    use windows::Win32::System::{Memory, SystemInformation};

    impl VmOps for PlatformVmOps {
        unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
            let ptr = Memory::VirtualAlloc(None, size, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS);
            NonNull::new(ptr.cast::<u8>()).ok_or_else(|| VmError::Reserve(io::Error::last_os_error()))
        }

        unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
            let result = Memory::VirtualAlloc(
                Some(ptr.as_ptr().cast_const().cast()),
                size,
                Memory::MEM_COMMIT,
                Memory::PAGE_READWRITE,
            );
            if result.is_null() {
                return Err(VmError::Commit(io::Error::last_os_error()));
            }
            Ok(())
        }

        unsafe fn release(ptr: NonNull<u8>, _size: usize) -> Result<(), VmError> {
            // MEM_RELEASE requires a size of zero and the reservation base.
            if !Memory::VirtualFree(ptr.as_ptr().cast(), 0, Memory::MEM_RELEASE).as_bool() {
                return Err(VmError::Release(io::Error::last_os_error()));
            }
            Ok(())
        }

        fn query_page_size() -> usize {
            let mut info = MaybeUninit::uninit();
            unsafe {
                SystemInformation::GetSystemInfo(info.as_mut_ptr());
                info.assume_init().dwPageSize as usize
            }
        }
    }
}

// Miri has no mmap; back reservations with the global allocator instead.
// Commit is a no-op because the memory is always accessible.
#[cfg(miri)]
impl VmOps for PlatformVmOps {
    unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
        let layout = std::alloc::Layout::from_size_align(size, 4096)
            .map_err(|e| VmError::Reserve(std::io::Error::other(e)))?;
        NonNull::new(std::alloc::alloc_zeroed(layout)).ok_or_else(|| {
            VmError::Reserve(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "alloc returned null",
            ))
        })
    }

    unsafe fn commit(_ptr: NonNull<u8>, _size: usize) -> Result<(), VmError> {
        Ok(())
    }

    unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
        let layout = std::alloc::Layout::from_size_align(size, 4096)
            .map_err(|e| VmError::Release(std::io::Error::other(e)))?;
        std::alloc::dealloc(ptr.as_ptr(), layout);
        Ok(())
    }

    fn query_page_size() -> usize {
        4096
    }
}
