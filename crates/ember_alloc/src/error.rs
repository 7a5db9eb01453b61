//! Error types for the allocators

use std::io;
use thiserror::Error;

/// Failures reported by the platform virtual memory layer
#[derive(Debug, Error)]
pub enum VmError {
    #[error("VM reservation failed: {0}")]
    Reserve(io::Error),

    #[error("VM commit failed: {0}")]
    Commit(io::Error),

    #[error("VM release failed: {0}")]
    Release(io::Error),
}

/// Allocation failures
///
/// [`Allocator::allocate`](crate::Allocator::allocate) treats every one of
/// these as fatal. [`Allocator::try_allocate`](crate::Allocator::try_allocate)
/// hands them back to the caller instead.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("Zero-sized allocation request")]
    ZeroSize,

    #[error("Alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    #[error("Alignment {alignment} exceeds the supported maximum of {max}")]
    UnsupportedAlignment { alignment: usize, max: usize },

    #[error("Capacity exceeded: requested extent {requested} bytes, capacity {capacity} bytes")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("Out of memory: {size} bytes at alignment {alignment}")]
    OutOfMemory { size: usize, alignment: usize },

    #[error("Allocation of {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Virtual memory error: {0}")]
    Vm(#[from] VmError),
}

/// Result type alias
pub type Result<T> = core::result::Result<T, AllocError>;

/// Validate the arguments every `try_allocate` shares
#[inline]
pub(crate) fn check_request(size: usize, alignment: usize) -> Result<()> {
    if size == 0 {
        return Err(AllocError::ZeroSize);
    }
    if !alignment.is_power_of_two() {
        return Err(AllocError::InvalidAlignment(alignment));
    }
    Ok(())
}
