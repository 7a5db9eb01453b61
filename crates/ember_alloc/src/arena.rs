//! Growable arena - bump allocation over a chain of parent blocks
//!
//! Blocks come from a parent allocator. When the active block runs out the
//! arena first asks the parent to extend it in place, and otherwise starts a
//! new block at least twice as large. Checkpoints let callers rewind the arena
//! and hand superseded blocks back to the parent in bulk.

use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::bits::{align_up, checked_align_up};
use crate::error::{check_request, AllocError, Result};

/// Smallest block the arena requests from its parent
pub const MIN_BLOCK_SIZE: usize = 128;

/// Growable arena configuration
#[derive(Debug, Clone)]
pub struct GrowableArenaConfig {
    /// Capacity of the first block (rounded up to a power of two)
    pub initial_capacity: usize,
    /// Lower bound for every block size
    pub min_block_size: usize,
    /// Alignment requested from the parent for each block
    pub block_alignment: usize,
}

impl Default for GrowableArenaConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 4096,
            min_block_size: MIN_BLOCK_SIZE,
            block_alignment: 16,
        }
    }
}

/// One parent allocation in the chain
#[derive(Clone, Copy, Debug)]
struct Block {
    ptr: NonNull<u8>,
    capacity: usize,
}

impl Block {
    #[inline]
    fn start(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    fn end(&self) -> usize {
        self.start() + self.capacity
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        self.start() <= addr && addr <= self.end()
    }
}

/// Bump allocator that grows by chaining blocks from a parent
///
/// Only the most recent allocation can be deallocated or resized. The block
/// list lives outside the blocks themselves; the last entry is the active
/// block and `next` always points into it.
pub struct GrowableArena<P: Allocator> {
    parent: P,
    config: GrowableArenaConfig,
    blocks: RefCell<Vec<Block>>,
    next: Cell<usize>,
}

// Safety: the blocks belong to the arena alone and travel with their parent.
unsafe impl<P: Allocator + Send> Send for GrowableArena<P> {}

impl<P: Allocator> GrowableArena<P> {
    /// Create an arena whose first block holds at least `capacity` bytes
    ///
    /// # Panics
    /// If the parent cannot provide the first block.
    pub fn new(parent: P, capacity: usize) -> Self {
        Self::with_config(
            parent,
            GrowableArenaConfig {
                initial_capacity: capacity,
                ..Default::default()
            },
        )
    }

    /// Create with a specific configuration
    ///
    /// # Panics
    /// If the parent cannot provide the first block.
    pub fn with_config(parent: P, config: GrowableArenaConfig) -> Self {
        match Self::try_with_config(parent, config) {
            Ok(arena) => arena,
            Err(e) => panic!("failed to create growable arena: {}", e),
        }
    }

    /// Create with a specific configuration, reporting parent failure
    pub fn try_with_config(parent: P, config: GrowableArenaConfig) -> Result<Self> {
        debug_assert!(config.block_alignment.is_power_of_two());

        let arena = Self {
            parent,
            config,
            blocks: RefCell::new(Vec::new()),
            next: Cell::new(0),
        };
        arena.push_block(arena.config.initial_capacity)?;

        log::debug!(
            "Created growable arena with first block of {} bytes",
            arena.capacity()
        );
        Ok(arena)
    }

    /// Capacity of the active block
    pub fn capacity(&self) -> usize {
        self.active().map_or(0, |block| block.capacity)
    }

    /// Bytes handed out from the active block so far
    pub fn used(&self) -> usize {
        self.active().map_or(0, |block| self.next.get() - block.start())
    }

    /// Number of blocks currently held from the parent
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Sum of all block capacities
    pub fn total_capacity(&self) -> usize {
        self.blocks.borrow().iter().map(|block| block.capacity).sum()
    }

    /// Save the current bump position
    pub fn make_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            next: self.next.get(),
        }
    }

    /// Rewind to a checkpoint made by this arena
    ///
    /// Every block allocated after the checkpoint's block is returned to the
    /// parent. A checkpoint is invalid once a rewind has released its block.
    ///
    /// # Panics
    /// If no held block contains the checkpoint.
    pub fn rewind_to_checkpoint(&self, checkpoint: Checkpoint) {
        let mut blocks = self.blocks.borrow_mut();

        assert!(
            blocks.iter().any(|block| block.contains(checkpoint.next)),
            "checkpoint does not belong to any block of this arena"
        );

        while let Some(active) = blocks.last().copied() {
            if active.contains(checkpoint.next) {
                break;
            }
            blocks.pop();
            log::trace!("Rewind releasing block of {} bytes at {:p}", active.capacity, active.ptr);
            unsafe { self.parent.deallocate(active.ptr, active.capacity) };
        }

        self.next.set(checkpoint.next);
    }

    /// Release every block but the first and start over
    ///
    /// Takes `&mut self`, so no [`ArenaScope`] or child allocator borrowing
    /// the arena can outlive the reset:
    ///
    /// ```compile_fail
    /// use ember_alloc::{ArenaScope, GrowableArena, SystemAllocator};
    ///
    /// let mut arena = GrowableArena::new(SystemAllocator::global(), 128);
    /// let scope = ArenaScope::new(&arena);
    /// arena.reset();
    /// drop(scope);
    /// ```
    pub fn reset(&mut self) {
        let first = self.blocks.borrow().first().copied();
        if let Some(first) = first {
            self.rewind_to_checkpoint(Checkpoint { next: first.start() });
        }
    }

    /// Tear the arena down, returning every block to the parent
    pub fn destroy(self) {
        drop(self);
    }

    #[inline]
    fn active(&self) -> Option<Block> {
        self.blocks.borrow().last().copied()
    }

    #[inline]
    fn ptr_at(block: Block, addr: usize) -> NonNull<u8> {
        // Safety: callers only pass addresses inside `block`.
        unsafe { NonNull::new_unchecked(block.ptr.as_ptr().add(addr - block.start())) }
    }

    /// Block size to request for `required` bytes, `None` past `usize`
    fn grow_target(&self, required: usize) -> Option<usize> {
        self.capacity()
            .checked_mul(2)?
            .max(required)
            .max(self.config.min_block_size)
            .checked_next_power_of_two()
    }

    /// Extend the active block in place so it spans `extent` bytes
    fn try_extend(&self, extent: usize) -> bool {
        let Some(active) = self.active() else {
            return false;
        };
        if !self.parent.supports_resize() {
            return false;
        }

        let Some(new_capacity) = self.grow_target(extent) else {
            return false;
        };
        if !unsafe { self.parent.resize(active.ptr, active.capacity, new_capacity) } {
            return false;
        }

        log::debug!(
            "Growable arena extended block in place {} -> {} bytes",
            active.capacity,
            new_capacity
        );
        if let Some(block) = self.blocks.borrow_mut().last_mut() {
            block.capacity = new_capacity;
        }
        true
    }

    /// Start a new active block holding at least `required` bytes
    fn push_block(&self, required: usize) -> Result<()> {
        let capacity = self.grow_target(required).ok_or(AllocError::OutOfMemory {
            size: required,
            alignment: self.config.block_alignment,
        })?;
        let ptr = self.parent.try_allocate(capacity, self.config.block_alignment)?;

        if !self.blocks.borrow().is_empty() {
            log::debug!("Growable arena chained new block of {} bytes", capacity);
        }
        self.blocks.borrow_mut().push(Block { ptr, capacity });
        self.next.set(ptr.as_ptr() as usize);
        Ok(())
    }
}

impl<P: Allocator> Allocator for GrowableArena<P> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_request(size, alignment)?;
        let out_of_memory = AllocError::OutOfMemory { size, alignment };

        if let Some(active) = self.active() {
            let bounds = checked_align_up(self.next.get(), alignment)
                .and_then(|start| start.checked_add(size).map(|end| (start, end)));
            let Some((start, end)) = bounds else {
                return Err(out_of_memory);
            };

            if end <= active.end() || self.try_extend(end - active.start()) {
                self.next.set(end);
                return Ok(Self::ptr_at(active, start));
            }
        }

        // A fresh block starts at `block_alignment`; leave room to realign.
        let padding = if alignment > self.config.block_alignment {
            alignment
        } else {
            0
        };
        let required = size.checked_add(padding).ok_or(out_of_memory)?;
        self.push_block(required)?;

        // push_block always leaves an active block behind.
        let active = self.active().ok_or(AllocError::OutOfMemory { size, alignment })?;
        let start = align_up(self.next.get(), alignment);
        self.next.set(start + size);
        Ok(Self::ptr_at(active, start))
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
        let Some(active) = self.active() else {
            return false;
        };

        let Some(end) = addr.checked_add(new_size) else {
            return false;
        };
        if end <= active.end() || self.try_extend(end - active.start()) {
            self.next.set(end);
            return true;
        }
        false
    }

    fn supports_resize(&self) -> bool {
        true
    }
}

impl<P: Allocator> Drop for GrowableArena<P> {
    fn drop(&mut self) {
        let blocks = self.blocks.get_mut();
        log::debug!("Destroying growable arena with {} blocks", blocks.len());

        while let Some(block) = blocks.pop() {
            unsafe { self.parent.deallocate(block.ptr, block.capacity) };
        }
    }
}

/// Saved bump position of a [`GrowableArena`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    next: usize,
}

impl Checkpoint {
    /// Address the arena will hand out next after rewinding here
    pub fn address(&self) -> usize {
        self.next
    }
}

/// Scoped arena allocation guard
///
/// Rewinds the arena to where it was when the scope was created.
pub struct ArenaScope<'a, P: Allocator> {
    arena: &'a GrowableArena<P>,
    checkpoint: Checkpoint,
}

impl<'a, P: Allocator> ArenaScope<'a, P> {
    /// Create a new scoped arena
    pub fn new(arena: &'a GrowableArena<P>) -> Self {
        Self {
            checkpoint: arena.make_checkpoint(),
            arena,
        }
    }

    /// Access the arena for allocations
    pub fn arena(&self) -> &GrowableArena<P> {
        self.arena
    }
}

impl<P: Allocator> Drop for ArenaScope<'_, P> {
    fn drop(&mut self) {
        self.arena.rewind_to_checkpoint(self.checkpoint);
    }
}
