//! Virtual arena - bump allocation inside one large address space reservation
//!
//! The whole capacity is reserved at creation and pages are committed on
//! demand as the bump pointer advances. Memory never moves and commit never
//! shrinks.

use core::cell::Cell;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::bits::{align_up, checked_align_up, next_power_of_two};
use crate::error::{check_request, AllocError, Result};
use crate::vm;

/// Smallest reservation a virtual arena makes
pub const MIN_VIRTUAL_CAPACITY: usize = 4096;

/// Bump allocator over reserved virtual memory
///
/// Invariant: `base <= next <= base + commit_size <= base + capacity`.
/// Only the most recent allocation can be deallocated or resized.
pub struct VirtualArena {
    base: NonNull<u8>,
    capacity: usize,
    commit_size: Cell<usize>,
    next: Cell<usize>,
}

// Safety: the arena owns its reservation exclusively.
unsafe impl Send for VirtualArena {}

impl VirtualArena {
    /// Reserve at least `capacity` bytes of address space
    ///
    /// The capacity is rounded up to a power of two and to at least one page.
    /// Nothing is committed yet.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = next_power_of_two(capacity)
            .max(MIN_VIRTUAL_CAPACITY)
            .max(vm::page_size());

        let base = unsafe { vm::reserve(capacity)? };
        log::debug!("Reserved virtual arena of {} bytes at {:p}", capacity, base);

        Ok(Self {
            base,
            capacity,
            commit_size: Cell::new(0),
            next: Cell::new(base.as_ptr() as usize),
        })
    }

    /// Create with capacity in MB
    pub fn with_capacity_mb(mb: usize) -> Result<Self> {
        Self::new(mb * 1024 * 1024)
    }

    /// Size of the address space reservation
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently backed by physical pages
    pub fn commit_size(&self) -> usize {
        self.commit_size.get()
    }

    /// Bytes between the start of the reservation and the bump pointer
    pub fn used(&self) -> usize {
        self.next.get() - self.base_addr()
    }

    /// Move the bump pointer back to the start
    ///
    /// Committed pages stay committed. Takes `&mut self`, so no child
    /// allocator borrowing the arena can survive the reset.
    pub fn reset(&mut self) {
        self.next.set(self.base_addr());
    }

    /// Release the reservation back to the OS
    pub fn destroy(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        log::debug!("Releasing virtual arena at {:p}", this.base);
        unsafe { vm::release(this.base, this.capacity)? };
        Ok(())
    }

    #[inline]
    fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    fn ptr_at(&self, addr: usize) -> NonNull<u8> {
        // Safety: callers only pass addresses inside the reservation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(addr - self.base_addr())) }
    }

    /// Make sure the first `extent` bytes are committed
    fn ensure_committed(&self, extent: usize) -> Result<()> {
        if extent > self.capacity {
            return Err(AllocError::CapacityExceeded {
                requested: extent,
                capacity: self.capacity,
            });
        }

        let committed = self.commit_size.get();
        if extent <= committed {
            return Ok(());
        }

        let target = (committed * 2).max(next_power_of_two(extent));
        let target = align_up(target, vm::page_size()).min(self.capacity);

        // Commit from the start of the reservation; recommitting is harmless.
        unsafe { vm::commit(self.base, target)? };
        log::debug!("Virtual arena commit grew {} -> {} bytes", committed, target);

        self.commit_size.set(target);
        Ok(())
    }
}

impl Allocator for VirtualArena {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_request(size, alignment)?;

        let bounds = checked_align_up(self.next.get(), alignment)
            .and_then(|start| start.checked_add(size).map(|end| (start, end)));
        let (start, end) = bounds.ok_or(AllocError::CapacityExceeded {
            requested: usize::MAX,
            capacity: self.capacity,
        })?;

        self.ensure_committed(end - self.base_addr())?;
        self.next.set(end);

        Ok(self.ptr_at(start))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        let addr = ptr.as_ptr() as usize;
        if addr + size == self.next.get() {
            self.next.set(addr);
        }
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> bool {
        let addr = ptr.as_ptr() as usize;
        if addr + old_size != self.next.get() {
            return false;
        }

        let Some(end) = addr.checked_add(new_size) else {
            return false;
        };
        if self.ensure_committed(end - self.base_addr()).is_err() {
            return false;
        }

        self.next.set(end);
        true
    }

    fn supports_resize(&self) -> bool {
        true
    }
}

impl Drop for VirtualArena {
    fn drop(&mut self) {
        if let Err(e) = unsafe { vm::release(self.base, self.capacity) } {
            log::warn!("Failed to release virtual arena at {:p}: {}", self.base, e);
        }
    }
}
