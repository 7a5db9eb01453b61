//! Shared test helpers

#![allow(dead_code)]

use std::cell::Cell;
use std::ptr::NonNull;

use ember_alloc::{Allocator, Result};

/// Decorator that counts the traffic reaching a parent allocator
pub struct CountingAllocator<'p> {
    parent: &'p dyn Allocator,
    pub allocations: Cell<usize>,
    pub deallocations: Cell<usize>,
    pub resizes: Cell<usize>,
    pub live_bytes: Cell<usize>,
    pub last_request: Cell<Option<(usize, usize)>>,
}

impl<'p> CountingAllocator<'p> {
    pub fn new(parent: &'p dyn Allocator) -> Self {
        Self {
            parent,
            allocations: Cell::new(0),
            deallocations: Cell::new(0),
            resizes: Cell::new(0),
            live_bytes: Cell::new(0),
            last_request: Cell::new(None),
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations.get() - self.deallocations.get()
    }
}

impl Allocator for CountingAllocator<'_> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        let ptr = self.parent.try_allocate(size, alignment)?;
        self.allocations.set(self.allocations.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + size);
        self.last_request.set(Some((size, alignment)));
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        self.deallocations.set(self.deallocations.get() + 1);
        self.live_bytes.set(self.live_bytes.get() - size);
        self.parent.deallocate(ptr, size)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> bool {
        self.resizes.set(self.resizes.get() + 1);
        let resized = self.parent.resize(ptr, old_size, new_size);
        if resized {
            self.live_bytes.set(self.live_bytes.get() - old_size + new_size);
        }
        resized
    }

    fn supports_resize(&self) -> bool {
        self.parent.supports_resize()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
