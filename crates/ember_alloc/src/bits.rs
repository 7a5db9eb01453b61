//! Integer and bit-twiddling helpers shared by the allocators

/// Check whether `value` is a non-zero power of two
#[inline]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Smallest power of two greater than or equal to `value`
///
/// A value that is already a power of two is returned unchanged, and zero
/// maps to one.
#[inline]
pub const fn next_power_of_two(value: usize) -> usize {
    if value <= 1 {
        return 1;
    }
    1usize << (usize::BITS - (value - 1).leading_zeros())
}

/// Floor of the base-two logarithm of a non-zero value
#[inline]
pub const fn log2(value: usize) -> u32 {
    debug_assert!(value != 0);
    usize::BITS - 1 - value.leading_zeros()
}

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(is_power_of_two(align));
    (value + align - 1) & !(align - 1)
}

/// Align a value up, or `None` if the result does not fit in a `usize`
#[inline]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(is_power_of_two(align));
    match value.checked_add(align - 1) {
        Some(bumped) => Some(bumped & !(align - 1)),
        None => None,
    }
}

/// Align a value down to the given alignment
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(is_power_of_two(align));
    value & !(align - 1)
}

/// Check if a pointer is aligned
#[inline]
pub fn is_aligned(ptr: *const u8, align: usize) -> bool {
    (ptr as usize) & (align - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_power_of_two_boundaries() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(50), 64);
        // Already a power of two: returned unchanged.
        assert_eq!(next_power_of_two(64), 64);
        assert_eq!(next_power_of_two(65), 128);
        assert_eq!(next_power_of_two(1_000_000), 1 << 20);
    }

    #[test]
    fn test_log2() {
        assert_eq!(log2(1), 0);
        assert_eq!(log2(8), 3);
        assert_eq!(log2(9), 3);
        assert_eq!(log2(256), 8);
    }

    #[test]
    fn test_align() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_down(31, 16), 16);
        assert!(is_aligned(64 as *const u8, 32));
        assert!(!is_aligned(72 as *const u8, 16));
    }

    #[test]
    fn test_checked_align_up() {
        assert_eq!(checked_align_up(17, 16), Some(32));
        assert_eq!(checked_align_up(usize::MAX - 3, 1), Some(usize::MAX - 3));
        assert_eq!(checked_align_up(usize::MAX - 3, 8), None);
    }

    #[test]
    fn test_is_power_of_two() {
        assert!(!is_power_of_two(0));
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(4096));
        assert!(!is_power_of_two(4095));
    }
}
