//! Free list allocator - single size class cache over a parent
//!
//! Freed blocks are threaded into an intrusive singly linked list: the first
//! word of every cached block holds the link to the next one. The bin
//! allocator keeps one such list per size class.

use core::cell::Cell;
use core::mem;
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::error::{check_request, AllocError, Result};

/// Link stored in the first word of a cached block
#[repr(C)]
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// Smallest block an intrusive list can hold
pub(crate) const NODE_SIZE: usize = mem::size_of::<FreeNode>();

/// Head of an intrusive free list
///
/// All-zero bits are a valid empty list, so arrays of stacks can live in
/// zeroed parent memory.
#[repr(transparent)]
pub(crate) struct FreeStack {
    head: Cell<Option<NonNull<FreeNode>>>,
}

impl FreeStack {
    pub(crate) const fn new() -> Self {
        Self {
            head: Cell::new(None),
        }
    }

    /// Thread `ptr` onto the list, overwriting its first word
    ///
    /// # Safety
    /// `ptr` must be writable for [`NODE_SIZE`] bytes and owned by the list
    /// from now on.
    #[inline]
    pub(crate) unsafe fn push(&self, ptr: NonNull<u8>) {
        let node = ptr.cast::<FreeNode>();
        node.as_ptr().write_unaligned(FreeNode {
            next: self.head.get(),
        });
        self.head.set(Some(node));
    }

    /// Unlink the most recently pushed block
    #[inline]
    pub(crate) fn pop(&self) -> Option<NonNull<u8>> {
        let node = self.head.get()?;
        // Safety: every node on the list was written by `push`.
        let next = unsafe { node.as_ptr().read_unaligned().next };
        self.head.set(next);
        Some(node.cast())
    }

    /// Number of cached blocks (walks the list)
    pub(crate) fn len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.get();
        while let Some(node) = cursor {
            count += 1;
            cursor = unsafe { node.as_ptr().read_unaligned().next };
        }
        count
    }
}

/// Cache for blocks of one fixed size
///
/// Misses fall through to the parent with the caller's own size and
/// alignment, not the configured class size. A cached block is therefore only
/// as large as the request that created it; callers use one free list for one
/// object size. Requests smaller than a list link are widened to [`NODE_SIZE`]
/// on the way to the parent, since freeing the block writes a link into it.
pub struct FreeList<P: Allocator> {
    parent: P,
    allocation_size: usize,
    free: FreeStack,
}

// Safety: cached blocks belong to the list alone and travel with their parent.
unsafe impl<P: Allocator + Send> Send for FreeList<P> {}

impl<P: Allocator> FreeList<P> {
    /// Create a free list for blocks of `allocation_size` bytes
    ///
    /// # Panics
    /// If `allocation_size` cannot hold the list link.
    pub fn new(parent: P, allocation_size: usize) -> Self {
        assert!(
            allocation_size >= NODE_SIZE,
            "free list allocation size {} is smaller than a list link ({})",
            allocation_size,
            NODE_SIZE
        );

        Self {
            parent,
            allocation_size,
            free: FreeStack::new(),
        }
    }

    /// Create a free list sized for `T`
    pub fn for_type<T>(parent: P) -> Self {
        Self::new(parent, mem::size_of::<T>().max(NODE_SIZE))
    }

    /// The fixed size this list serves
    pub fn allocation_size(&self) -> usize {
        self.allocation_size
    }

    /// Number of blocks waiting for reuse
    pub fn cached_count(&self) -> usize {
        self.free.len()
    }

    /// The allocator misses fall through to
    pub fn parent(&self) -> &P {
        &self.parent
    }

    /// Tear the free list down
    ///
    /// Cached blocks stay with the parent: the list cannot tell which parent
    /// allocations are cached and which are still handed out.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<P: Allocator> Allocator for FreeList<P> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_request(size, alignment)?;
        if size > self.allocation_size {
            return Err(AllocError::TooLarge {
                size,
                max: self.allocation_size,
            });
        }

        match self.free.pop() {
            Some(ptr) => Ok(ptr),
            None => self.parent.try_allocate(size.max(NODE_SIZE), alignment),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _size: usize) {
        self.free.push(ptr);
    }
}

impl<P: Allocator> Drop for FreeList<P> {
    fn drop(&mut self) {
        log::debug!(
            "Destroying free list ({} bytes) with {} cached blocks left to the parent",
            self.allocation_size,
            self.free.len()
        );
    }
}
