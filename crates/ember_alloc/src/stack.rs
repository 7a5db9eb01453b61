//! Stack allocator - LIFO allocation inside one parent buffer

use core::cell::Cell;
use core::mem;
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::bits::checked_align_up;
use crate::error::{check_request, AllocError, Result};

/// Allocation header for stack allocator
#[repr(C)]
struct StackHeader {
    /// Stack top before this allocation
    previous_top: usize,
}

/// Stack allocator - LIFO allocation with markers
///
/// The buffer is taken from the parent once, at creation. Every allocation is
/// preceded by a header recording the previous top, so the top allocation can
/// always be popped; bulk rollback goes through markers.
pub struct StackAllocator<P: Allocator> {
    parent: P,
    buffer: NonNull<u8>,
    capacity: usize,
    /// Offset of the current top of stack
    top: Cell<usize>,
}

// Safety: the buffer belongs to the stack alone and travels with its parent.
unsafe impl<P: Allocator + Send> Send for StackAllocator<P> {}

impl<P: Allocator> StackAllocator<P> {
    const HEADER_SIZE: usize = mem::size_of::<StackHeader>();
    const HEADER_ALIGN: usize = mem::align_of::<StackHeader>();
    const BUFFER_ALIGN: usize = 16;

    /// Create a stack allocator over `capacity` bytes from `parent`
    ///
    /// # Panics
    /// If the parent cannot provide the buffer.
    pub fn new(parent: P, capacity: usize) -> Self {
        match Self::try_new(parent, capacity) {
            Ok(stack) => stack,
            Err(e) => panic!("failed to create stack allocator: {}", e),
        }
    }

    /// Create a stack allocator, reporting parent failure
    pub fn try_new(parent: P, capacity: usize) -> Result<Self> {
        let buffer = parent.try_allocate(capacity, Self::BUFFER_ALIGN)?;
        log::debug!("Created stack allocator of {} bytes", capacity);

        Ok(Self {
            parent,
            buffer,
            capacity,
            top: Cell::new(0),
        })
    }

    /// Create with capacity in KB
    pub fn with_capacity_kb(parent: P, kb: usize) -> Self {
        Self::new(parent, kb * 1024)
    }

    /// Get a marker for the current stack position
    pub fn marker(&self) -> StackMarker {
        StackMarker(self.top.get())
    }

    /// Rollback to a previous marker
    pub fn rollback(&self, marker: StackMarker) {
        if marker.0 <= self.top.get() {
            self.top.set(marker.0);
        }
    }

    /// Bytes in use, headers and padding included
    pub fn used(&self) -> usize {
        self.top.get()
    }

    /// Size of the buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free everything
    ///
    /// Needs `&mut self`, so no [`StackScope`] can be alive across it.
    pub fn reset(&mut self) {
        self.top.set(0);
    }

    /// Tear the stack down, returning the buffer to the parent
    pub fn destroy(self) {
        drop(self);
    }

    #[inline]
    fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - self.buffer.as_ptr() as usize
    }

    #[inline]
    fn header_at(&self, user_offset: usize) -> *mut StackHeader {
        // Safety: every user offset is preceded by its header inside the buffer.
        unsafe { self.buffer.as_ptr().add(user_offset - Self::HEADER_SIZE).cast() }
    }
}

impl<P: Allocator> Allocator for StackAllocator<P> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_request(size, alignment)?;

        let current_top = self.top.get();
        let total_align = alignment.max(Self::HEADER_ALIGN);
        let exceeded = |requested| AllocError::CapacityExceeded {
            requested,
            capacity: self.capacity,
        };

        // The buffer is BUFFER_ALIGN aligned; larger alignments need the
        // absolute address.
        let base = self.buffer.as_ptr() as usize;
        let user_addr = checked_align_up(base + current_top + Self::HEADER_SIZE, total_align)
            .ok_or(exceeded(usize::MAX))?;
        let user_offset = user_addr - base;
        let new_top = user_offset.checked_add(size).ok_or(exceeded(usize::MAX))?;

        if new_top > self.capacity {
            return Err(exceeded(new_top));
        }

        unsafe {
            self.header_at(user_offset).write(StackHeader {
                previous_top: current_top,
            });
        }
        self.top.set(new_top);

        // Safety: user_offset < capacity.
        Ok(unsafe { NonNull::new_unchecked(self.buffer.as_ptr().add(user_offset)) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        let user_offset = self.offset_of(ptr);
        if user_offset + size == self.top.get() {
            self.top.set((*self.header_at(user_offset)).previous_top);
        }
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> bool {
        let user_offset = self.offset_of(ptr);
        if user_offset + old_size != self.top.get() {
            return false;
        }
        match user_offset.checked_add(new_size) {
            Some(new_top) if new_top <= self.capacity => {
                self.top.set(new_top);
                true
            }
            _ => false,
        }
    }

    fn supports_resize(&self) -> bool {
        true
    }
}

impl<P: Allocator> Drop for StackAllocator<P> {
    fn drop(&mut self) {
        log::debug!("Destroying stack allocator of {} bytes", self.capacity);
        unsafe { self.parent.deallocate(self.buffer, self.capacity) };
    }
}

/// Marker for stack position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackMarker(usize);

/// Scoped stack allocator guard
pub struct StackScope<'a, P: Allocator> {
    stack: &'a StackAllocator<P>,
    marker: StackMarker,
}

impl<'a, P: Allocator> StackScope<'a, P> {
    /// Create a new scoped stack
    pub fn new(stack: &'a StackAllocator<P>) -> Self {
        Self {
            marker: stack.marker(),
            stack,
        }
    }

    /// Access the stack for allocations
    pub fn stack(&self) -> &StackAllocator<P> {
        self.stack
    }
}

impl<P: Allocator> Drop for StackScope<'_, P> {
    fn drop(&mut self) {
        self.stack.rollback(self.marker);
    }
}
