//! Growable arena behavior against real parents

mod common;

use std::ptr::NonNull;

use common::{init_logging, CountingAllocator};
use ember_alloc::prelude::*;
use ember_alloc::{ArenaScope, GrowableArenaConfig, MIN_BLOCK_SIZE};

/// Virtual arena parent that never offers to resize in place
struct Pinned<'a>(&'a VirtualArena);

impl Allocator for Pinned<'_> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        self.0.try_allocate(size, alignment)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        self.0.deallocate(ptr, size)
    }
}

fn contains(base: usize, capacity: usize, addr: usize) -> bool {
    base <= addr && addr < base + capacity
}

#[test]
fn end_to_end_checkpoint_scenario() {
    init_logging();
    let parent = CountingAllocator::new(SystemAllocator::global());
    let arena = GrowableArena::new(&parent, 128);
    assert_eq!(arena.capacity(), 128);

    // Fits in the first block.
    let first = arena.allocate(100, 8);
    assert_eq!(arena.block_count(), 1);

    // Forces growth into a doubled block.
    let second = arena.allocate(100, 8);
    assert_eq!(arena.block_count(), 2);
    assert!(arena.capacity() >= 200);
    assert_eq!(arena.capacity(), 256);
    assert_ne!(first, second);

    let block_start = second.as_ptr() as usize;
    let block_capacity = arena.capacity();
    let checkpoint = arena.make_checkpoint();

    arena.allocate(500, 8);
    assert_eq!(arena.block_count(), 3);
    assert_eq!(parent.allocations.get(), 3);

    arena.rewind_to_checkpoint(checkpoint);
    assert_eq!(parent.deallocations.get(), 1);
    assert_eq!(arena.block_count(), 2);

    let after = arena.allocate(50, 4);
    assert_eq!(after.as_ptr() as usize, checkpoint.address());
    assert!(contains(block_start, block_capacity, after.as_ptr() as usize));

    drop(arena);
    assert_eq!(parent.live_allocations(), 0);
    assert_eq!(parent.live_bytes.get(), 0);
}

#[test]
fn bump_pointer_is_monotonic_within_a_block() {
    let arena = GrowableArena::new(SystemAllocator::global(), 1 << 16);

    let mut last = 0;
    for i in 0..200 {
        let alignment = 1 << (i % 7);
        let ptr = arena.allocate(i % 17 + 1, alignment);
        assert!(is_aligned(ptr.as_ptr(), alignment));
        assert!(ptr.as_ptr() as usize >= last);
        last = ptr.as_ptr() as usize;
    }
    assert_eq!(arena.block_count(), 1);
}

#[test]
fn alignment_holds_across_block_boundaries() {
    let arena = GrowableArena::new(SystemAllocator::global(), 128);

    for i in 0..100 {
        let alignment = 1 << (i % 9);
        let ptr = arena.allocate(37, alignment);
        assert!(is_aligned(ptr.as_ptr(), alignment));
        unsafe { ptr.as_ptr().write_bytes(i as u8, 37) };
    }
    assert!(arena.block_count() > 1);
}

#[test]
fn nested_scopes_unwind_in_order() {
    let parent = CountingAllocator::new(SystemAllocator::global());
    let arena = GrowableArena::new(&parent, 128);

    {
        let _outer = ArenaScope::new(&arena);
        arena.allocate(1000, 8);
        {
            let _inner = ArenaScope::new(&arena);
            arena.allocate(5000, 8);
            assert_eq!(arena.block_count(), 3);
        }
        assert_eq!(arena.block_count(), 2);
    }
    assert_eq!(arena.block_count(), 1);
    assert_eq!(parent.live_allocations(), 1);
}

#[test]
fn grows_in_place_on_a_virtual_arena() {
    let memory = VirtualArena::new(1 << 20).unwrap();
    let parent = CountingAllocator::new(&memory);
    let arena = GrowableArena::new(&parent, 128);

    for _ in 0..64 {
        arena.allocate(100, 8);
    }

    // Every growth was an in-place resize of the one block.
    assert_eq!(arena.block_count(), 1);
    assert_eq!(parent.allocations.get(), 1);
    assert!(parent.resizes.get() > 0);
    assert!(arena.capacity() >= 6400);
}

#[test]
fn falls_back_to_new_block_when_parent_resize_fails() {
    let memory = VirtualArena::new(1 << 20).unwrap();
    let arena = GrowableArena::new(&memory, 128);

    // Another allocation on top of the block pins it in the virtual arena.
    memory.allocate(8, 8);

    arena.allocate(100, 8);
    arena.allocate(100, 8);
    assert_eq!(arena.block_count(), 2);
}

#[test]
fn configured_minimum_block_size() {
    let config = GrowableArenaConfig {
        initial_capacity: 1,
        min_block_size: 1024,
        ..Default::default()
    };
    let arena = GrowableArena::with_config(SystemAllocator::global(), config);
    assert_eq!(arena.capacity(), 1024);
    assert!(MIN_BLOCK_SIZE < 1024);
}

#[test]
fn try_with_config_reports_parent_exhaustion() {
    let memory = VirtualArena::new(4096).unwrap();
    let config = GrowableArenaConfig {
        initial_capacity: memory.capacity() * 4,
        ..Default::default()
    };
    let result = GrowableArena::try_with_config(&memory, config);
    assert!(matches!(result, Err(AllocError::CapacityExceeded { .. })));
}

#[test]
fn checkpoint_at_block_end_followed_by_adjacent_block() {
    let memory = VirtualArena::new(1 << 16).unwrap();
    let arena = GrowableArena::new(Pinned(&memory), 128);

    arena.allocate(128, 1);
    let checkpoint = arena.make_checkpoint();

    // The next block starts exactly where the full one ends.
    let chained = arena.allocate(16, 8);
    assert_eq!(arena.block_count(), 2);
    assert_eq!(chained.as_ptr() as usize, checkpoint.address());

    // The newest block holding the address wins, so nothing is released.
    arena.rewind_to_checkpoint(checkpoint);
    assert_eq!(arena.block_count(), 2);
    assert_eq!(arena.used(), 0);
    assert_eq!(arena.allocate(16, 8), chained);

    drop(arena);
    assert_eq!(memory.used(), 0);
}
