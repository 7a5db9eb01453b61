//! The allocator contract shared by every allocator in the crate

use core::mem;
use core::ptr::NonNull;

use crate::error::Result;

/// Common trait for all allocators
///
/// Methods take `&self` so a single allocator can serve as the parent of
/// several children at once. Implementations keep their bookkeeping in cells
/// and are not thread-safe unless stated otherwise.
pub trait Allocator {
    /// Allocate `size` bytes aligned to `alignment`, reporting failure
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>>;

    /// Allocate `size` bytes aligned to `alignment`
    ///
    /// # Panics
    /// Exhaustion is fatal. Use [`try_allocate`](Self::try_allocate) where
    /// running out of memory must be handled.
    #[track_caller]
    fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        match self.try_allocate(size, alignment) {
            Ok(ptr) => ptr,
            Err(e) => {
                log::error!("Fatal allocation failure ({} bytes, align {}): {}", size, alignment, e);
                panic!("allocation failed: {}", e);
            }
        }
    }

    /// Return memory to the allocator
    ///
    /// # Safety
    /// `ptr` must come from this allocator instance with this `size`, and must
    /// not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize);

    /// Grow or shrink an allocation without moving it
    ///
    /// Returns `false` when the allocator cannot do this in place. The data is
    /// never copied; callers fall back to allocate, copy, deallocate.
    ///
    /// # Safety
    /// `ptr` must come from this allocator instance with `old_size`.
    unsafe fn resize(&self, _ptr: NonNull<u8>, _old_size: usize, _new_size: usize) -> bool {
        false
    }

    /// Whether this allocator exposes [`resize`](Self::resize) at all
    fn supports_resize(&self) -> bool {
        false
    }
}

impl<A: Allocator + ?Sized> Allocator for &A {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        (**self).try_allocate(size, alignment)
    }

    fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        (**self).allocate(size, alignment)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        (**self).deallocate(ptr, size)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> bool {
        (**self).resize(ptr, old_size, new_size)
    }

    fn supports_resize(&self) -> bool {
        (**self).supports_resize()
    }
}

/// Typed conveniences layered over the raw calls
///
/// These are size and alignment arithmetic only; they never run constructors
/// or destructors beyond the `write` in [`allocate_value`](Self::allocate_value).
pub trait AllocatorExt: Allocator {
    /// Allocate space for one `T` and move `value` into it
    fn allocate_value<T>(&self, value: T) -> NonNull<T> {
        let ptr = self.allocate_array::<T>(1);
        unsafe { ptr.as_ptr().write(value) };
        ptr
    }

    /// Allocate uninitialized space for `count` values of `T`
    fn allocate_array<T>(&self, count: usize) -> NonNull<T> {
        let size = mem::size_of::<T>()
            .checked_mul(count)
            .expect("array allocation size overflows usize");
        if size == 0 {
            return NonNull::dangling();
        }
        self.allocate(size, mem::align_of::<T>()).cast()
    }

    /// Release a value obtained from [`allocate_value`](Self::allocate_value)
    ///
    /// The value is not dropped.
    ///
    /// # Safety
    /// Same contract as [`Allocator::deallocate`].
    unsafe fn deallocate_value<T>(&self, ptr: NonNull<T>) {
        self.deallocate_array(ptr, 1)
    }

    /// Release an array obtained from [`allocate_array`](Self::allocate_array)
    ///
    /// # Safety
    /// Same contract as [`Allocator::deallocate`]; `count` must match.
    unsafe fn deallocate_array<T>(&self, ptr: NonNull<T>, count: usize) {
        let size = mem::size_of::<T>() * count;
        if size != 0 {
            self.deallocate(ptr.cast(), size);
        }
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}
