//! Bin allocator - segregated free lists by power-of-two size class
//!
//! Requests are rounded up to a size class between [`MIN_BIN_SIZE`] and the
//! configured maximum. Each class keeps its own intrusive free list; misses go
//! to the parent with the class size. Freed blocks are cached forever and
//! never handed back to the parent.

use core::mem;
use core::ptr::NonNull;
use core::slice;

use crate::allocator::{Allocator, AllocatorExt};
use crate::bits::{log2, next_power_of_two};
use crate::error::{check_request, AllocError, Result};
use crate::free_list::FreeStack;

/// Smallest size class (bin index 0)
pub const MIN_BIN_SIZE: usize = 8;

/// Alignment ceiling for blocks requested from the parent
pub const MAX_BIN_ALIGNMENT: usize = 16;

/// Size class a request of `size` bytes is served from
#[inline]
pub fn size_class_of(size: usize) -> usize {
    next_power_of_two(size).max(MIN_BIN_SIZE)
}

/// Bin allocator configuration
#[derive(Debug, Clone)]
pub struct BinAllocatorConfig {
    /// Exclusive upper bound on request sizes (rounded up to a power of two)
    pub max_allocation_size: usize,
    /// Largest alignment passed to the parent for a size class
    pub max_alignment: usize,
}

impl Default for BinAllocatorConfig {
    fn default() -> Self {
        Self {
            max_allocation_size: 4096,
            max_alignment: MAX_BIN_ALIGNMENT,
        }
    }
}

/// Power-of-two size class cache over a parent
///
/// The bin head array itself is allocated from the parent. Resize is not
/// offered, even when the new size stays inside the same class.
pub struct BinAllocator<P: Allocator> {
    parent: P,
    max_allocation_size: usize,
    max_alignment: usize,
    bins: NonNull<FreeStack>,
    bin_count: usize,
}

// Safety: the bin array and cached blocks belong to the allocator alone and
// travel with their parent.
unsafe impl<P: Allocator + Send> Send for BinAllocator<P> {}

impl<P: Allocator> BinAllocator<P> {
    /// Create bins for every request smaller than `max_allocation_size`
    ///
    /// # Panics
    /// If the parent cannot provide the bin array.
    pub fn new(parent: P, max_allocation_size: usize) -> Self {
        Self::with_config(
            parent,
            BinAllocatorConfig {
                max_allocation_size,
                ..Default::default()
            },
        )
    }

    /// Create with a specific configuration
    ///
    /// # Panics
    /// If the parent cannot provide the bin array.
    pub fn with_config(parent: P, config: BinAllocatorConfig) -> Self {
        let max_allocation_size = next_power_of_two(config.max_allocation_size).max(MIN_BIN_SIZE * 2);
        debug_assert!(config.max_alignment.is_power_of_two());

        // Classes 8, 16, ... up to and including the maximum itself, since a
        // request just below the maximum rounds up to it.
        let bin_count = log2(max_allocation_size) as usize - 2;

        let bins = parent.allocate_array::<FreeStack>(bin_count);
        // Safety: zeroed memory is a valid empty FreeStack.
        unsafe { bins.as_ptr().write_bytes(0, bin_count) };

        log::debug!(
            "Created bin allocator: {} bins, max allocation {} bytes",
            bin_count,
            max_allocation_size
        );

        Self {
            parent,
            max_allocation_size,
            max_alignment: config.max_alignment,
            bins,
            bin_count,
        }
    }

    /// Exclusive upper bound on request sizes
    pub fn max_allocation_size(&self) -> usize {
        self.max_allocation_size
    }

    /// Number of size classes
    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// The allocator misses fall through to
    pub fn parent(&self) -> &P {
        &self.parent
    }

    /// Number of cached blocks in the class serving `size`
    pub fn cached_count(&self, size: usize) -> usize {
        self.bin(size).map_or(0, FreeStack::len)
    }

    /// Tear the allocator down, returning the bin array to the parent
    ///
    /// Cached blocks are not returned; the bins cannot tell which parent
    /// allocations are cached and which are still handed out.
    pub fn destroy(self) {
        drop(self);
    }

    #[inline]
    fn bins(&self) -> &[FreeStack] {
        // Safety: `bins` holds `bin_count` initialized stacks until drop.
        unsafe { slice::from_raw_parts(self.bins.as_ptr(), self.bin_count) }
    }

    #[inline]
    fn bin(&self, size: usize) -> Option<&FreeStack> {
        let index = log2(size_class_of(size)) as usize - log2(MIN_BIN_SIZE) as usize;
        self.bins().get(index)
    }
}

impl<P: Allocator> Allocator for BinAllocator<P> {
    fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_request(size, alignment)?;
        if size >= self.max_allocation_size {
            return Err(AllocError::TooLarge {
                size,
                max: self.max_allocation_size,
            });
        }

        let class = size_class_of(size);
        let class_alignment = class.min(self.max_alignment);
        if alignment > class_alignment {
            return Err(AllocError::UnsupportedAlignment {
                alignment,
                max: class_alignment,
            });
        }

        let bin = self.bin(size).ok_or(AllocError::TooLarge {
            size,
            max: self.max_allocation_size,
        })?;

        match bin.pop() {
            Some(ptr) => Ok(ptr),
            None => self.parent.try_allocate(class, class_alignment),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        match self.bin(size) {
            Some(bin) => bin.push(ptr),
            None => debug_assert!(false, "deallocate of {} bytes outside every bin", size),
        }
    }
}

impl<P: Allocator> Drop for BinAllocator<P> {
    fn drop(&mut self) {
        log::debug!("Destroying bin allocator with {} bins", self.bin_count);
        unsafe { self.parent.deallocate_array(self.bins, self.bin_count) };
    }
}

// FreeStack must fit the intrusive link of the smallest class.
const _: () = assert!(mem::size_of::<FreeStack>() <= MIN_BIN_SIZE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::is_aligned;
    use crate::system::SystemAllocator;

    #[test]
    fn test_bin_count() {
        let bins = BinAllocator::new(SystemAllocator::global(), 256);
        assert_eq!(bins.max_allocation_size(), 256);
        assert_eq!(bins.bin_count(), 6);

        let rounded = BinAllocator::new(SystemAllocator::global(), 1000);
        assert_eq!(rounded.max_allocation_size(), 1024);
    }

    #[test]
    fn test_round_trip_reuses_block() {
        let bins = BinAllocator::new(SystemAllocator::global(), 256);

        let a = bins.allocate(50, 8);
        unsafe { bins.deallocate(a, 50) };
        let b = bins.allocate(50, 8);
        assert_eq!(a, b);

        unsafe { SystemAllocator::global().deallocate(b, 64) };
    }

    #[test]
    fn test_distinct_blocks_in_class() {
        let bins = BinAllocator::new(SystemAllocator::global(), 256);

        let a = bins.allocate(50, 8);
        let b = bins.allocate(50, 8);
        assert_ne!(a, b);

        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        assert!(lo.as_ptr() as usize + 64 <= hi.as_ptr() as usize);
        assert!(is_aligned(a.as_ptr(), 16));

        unsafe {
            SystemAllocator::global().deallocate(a, 64);
            SystemAllocator::global().deallocate(b, 64);
        }
    }

    #[test]
    fn test_size_class_boundaries() {
        assert_eq!(size_class_of(1), 8);
        assert_eq!(size_class_of(8), 8);
        assert_eq!(size_class_of(9), 16);
        assert_eq!(size_class_of(64), 64);
        assert_eq!(size_class_of(65), 128);
    }

    #[test]
    fn test_same_class_sizes_share_a_bin() {
        let bins = BinAllocator::new(SystemAllocator::global(), 256);

        let a = bins.allocate(64, 8);
        unsafe { bins.deallocate(a, 64) };
        assert_eq!(bins.cached_count(33), 1);
        assert_eq!(bins.cached_count(65), 0);

        // 64 is its own class, not the 128-byte one.
        let b = bins.allocate(33, 8);
        assert_eq!(a, b);

        unsafe { SystemAllocator::global().deallocate(b, 64) };
    }

    #[test]
    fn test_limits() {
        let bins = BinAllocator::new(SystemAllocator::global(), 256);
        assert!(matches!(bins.try_allocate(256, 8), Err(AllocError::TooLarge { .. })));
        assert!(matches!(
            bins.try_allocate(8, 32),
            Err(AllocError::UnsupportedAlignment { alignment: 32, max: 8 })
        ));
        assert!(!bins.supports_resize());

        let ptr = bins.allocate(200, 16);
        unsafe {
            assert!(!bins.resize(ptr, 200, 210));
            SystemAllocator::global().deallocate(ptr, 256);
        }
    }
}
