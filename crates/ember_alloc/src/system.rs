//! System allocator - process heap pass-through

use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::error::{check_request, AllocError, Result};

/// Alignment the platform heap guarantees for every block on 64-bit targets
pub const SYSTEM_ALIGNMENT: usize = 16;

/// Thin wrapper over the platform `malloc`/`free`
///
/// The requested alignment is not forwarded; every block carries the heap's
/// own [`SYSTEM_ALIGNMENT`] guarantee. Resize is not part of this type's
/// capability set, so [`Allocator::supports_resize`] reports `false`.
#[derive(Debug)]
pub struct SystemAllocator {
    _private: (),
}

static SYSTEM: SystemAllocator = SystemAllocator { _private: () };

impl SystemAllocator {
    /// The process-wide instance
    #[inline]
    pub fn global() -> &'static SystemAllocator {
        &SYSTEM
    }
}

impl Allocator for SystemAllocator {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_request(size, alignment)?;
        debug_assert!(
            alignment <= SYSTEM_ALIGNMENT,
            "system allocator cannot honor alignment {} (heap guarantees {})",
            alignment,
            SYSTEM_ALIGNMENT
        );

        let ptr = unsafe { libc::malloc(size) };
        NonNull::new(ptr.cast::<u8>()).ok_or(AllocError::OutOfMemory { size, alignment })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _size: usize) {
        libc::free(ptr.as_ptr().cast::<libc::c_void>());
    }
}
