//! # ember_alloc - Composable Engine Allocators
//!
//! A small family of allocators that share one contract and delegate to each
//! other:
//! - SystemAllocator: process heap pass-through
//! - VirtualArena: reserve address space up front, commit pages on demand
//! - GrowableArena: chained blocks from a parent, checkpoint/rewind
//! - FreeList: single size class cache
//! - BinAllocator: power-of-two size classes, one free list each
//! - MutexAllocator: serializes access to a parent
//! - StackAllocator: LIFO allocation with markers
//!
//! ## Composition
//!
//! ```text
//! MutexAllocator ──► BinAllocator ──► VirtualArena ──► OS pages
//!                                         ▲
//! GrowableArena ──► SystemAllocator       │
//!                                    FreeList
//! ```
//!
//! Every allocator takes its parent as a type parameter. Pass `&parent` to
//! borrow it, so the parent always outlives the child, or hand the parent
//! over by value. None of the allocators are thread-safe on their own; wrap
//! one in a [`MutexAllocator`] to share it between threads. The wrapper is
//! only `Sync` when the whole chain below it is `Send`.

pub mod allocator;
pub mod arena;
pub mod bin;
pub mod bits;
pub mod error;
pub mod free_list;
pub mod mutex;
pub mod stack;
pub mod sync;
pub mod system;
pub mod virtual_arena;
pub mod vm;

pub use allocator::{Allocator, AllocatorExt};
pub use arena::{ArenaScope, Checkpoint, GrowableArena, GrowableArenaConfig, MIN_BLOCK_SIZE};
pub use bin::{size_class_of, BinAllocator, BinAllocatorConfig, MAX_BIN_ALIGNMENT, MIN_BIN_SIZE};
pub use bits::{align_down, align_up, checked_align_up, is_aligned, is_power_of_two, log2, next_power_of_two};
pub use error::{AllocError, Result, VmError};
pub use free_list::FreeList;
pub use mutex::MutexAllocator;
pub use stack::{StackAllocator, StackMarker, StackScope};
pub use sync::Semaphore;
pub use system::{SystemAllocator, SYSTEM_ALIGNMENT};
pub use virtual_arena::{VirtualArena, MIN_VIRTUAL_CAPACITY};

pub mod prelude {
    pub use crate::{Allocator, AllocatorExt};
    pub use crate::{BinAllocator, FreeList, GrowableArena, MutexAllocator, StackAllocator};
    pub use crate::{SystemAllocator, VirtualArena};
    pub use crate::{align_down, align_up, is_aligned, next_power_of_two};
    pub use crate::{AllocError, Result};
}
