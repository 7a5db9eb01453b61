//! Mutex allocator - serializes every call into a parent allocator

use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::error::Result;
use crate::sync::Semaphore;

/// Wraps a parent so it can be shared between threads
///
/// Each call takes a binary semaphore, forwards to the parent unchanged and
/// releases it again. The wrapper takes its parent by value: either an owned
/// allocator or a reference to one. It is `Sync` only when that parent is
/// `Send`, so a parent with cell state cannot be reached around the lock while
/// the wrapper is shared. Calling back into the same wrapper from inside the
/// parent deadlocks.
///
/// ```
/// use ember_alloc::{Allocator, FreeList, MutexAllocator, SystemAllocator};
///
/// let locked = MutexAllocator::new(FreeList::new(SystemAllocator::global(), 64));
/// std::thread::scope(|scope| {
///     scope.spawn(|| unsafe { locked.deallocate(locked.allocate(64, 8), 64) });
/// });
/// ```
///
/// A borrowed, single-threaded parent stays usable directly, so the wrapper
/// cannot cross threads:
///
/// ```compile_fail
/// use ember_alloc::{Allocator, FreeList, MutexAllocator, SystemAllocator};
///
/// let list = FreeList::new(SystemAllocator::global(), 64);
/// let locked = MutexAllocator::new(&list);
/// std::thread::scope(|scope| {
///     scope.spawn(|| {
///         locked.allocate(64, 8);
///     });
///     list.allocate(64, 8);
/// });
/// ```
pub struct MutexAllocator<A: Allocator> {
    parent: A,
    lock: Semaphore,
}

// Safety: `parent` is only touched while holding `lock`, and `A: Send` lets
// whichever thread holds the lock use it.
unsafe impl<A: Allocator + Send> Sync for MutexAllocator<A> {}

impl<A: Allocator> MutexAllocator<A> {
    /// Wrap `parent`
    pub fn new(parent: A) -> Self {
        Self {
            parent,
            lock: Semaphore::binary(),
        }
    }

    /// Exclusive access to the parent, no locking needed
    pub fn get_mut(&mut self) -> &mut A {
        &mut self.parent
    }

    /// Tear the wrapper down, handing the parent back untouched
    pub fn destroy(self) -> A {
        self.parent
    }
}

impl<A: Allocator> Allocator for MutexAllocator<A> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        let _guard = self.lock.acquire();
        self.parent.try_allocate(size, alignment)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        let _guard = self.lock.acquire();
        self.parent.deallocate(ptr, size)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> bool {
        let _guard = self.lock.acquire();
        self.parent.resize(ptr, old_size, new_size)
    }

    fn supports_resize(&self) -> bool {
        self.parent.supports_resize()
    }
}
