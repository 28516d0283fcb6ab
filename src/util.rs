use crate::config::{PAGE_SHIFT, PAGE_SIZE};

/// efficient way to calculate: ceil(x / y)
pub(crate) fn ceil_div(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

/// Rounds `size` up to the next multiple of the page size, `None` when
/// the rounded value does not fit in a `usize`.
pub(crate) fn page_align(size: usize) -> Option<usize> {
    size.checked_add(PAGE_SIZE - 1)
        .map(|s| (s / PAGE_SIZE) * PAGE_SIZE)
}

/// All page numbers touched by the virtual range `[start, end)`.
pub(crate) fn page_span(start: usize, end: usize) -> core::ops::Range<usize> {
    (start >> PAGE_SHIFT)..ceil_div(end, PAGE_SIZE)
}

/// Contiguous bit mask covering bits `l..=h`.
pub(crate) const fn genmask32(h: u32, l: u32) -> u32 {
    ((!0u32) << l) & ((!0u32) >> (31 - h))
}

/// Contiguous bit mask covering bits `l..=h`.
pub(crate) const fn genmask64(h: u32, l: u32) -> u64 {
    ((!0u64) << l) & ((!0u64) >> (63 - h))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ceil_div() {
        // just test a bunch of different values
        for y in 1..100 {
            for x in 0..y * 3 {
                let expected_value = if x % y == 0 { x / y } else { (x / y) + 1 };

                assert_eq!(ceil_div(x, y), expected_value);
            }
        }
    }

    #[test]
    fn test_page_align() {
        assert_eq!(page_align(1), Some(PAGE_SIZE));
        assert_eq!(page_align(PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(page_align(PAGE_SIZE + 1), Some(2 * PAGE_SIZE));
        assert_eq!(page_align(usize::MAX), None);
    }

    #[test]
    fn test_genmask() {
        assert_eq!(genmask32(7, 0), 0xff);
        assert_eq!(genmask32(31, 31), 0x8000_0000);
        assert_eq!(genmask64(11, 0), 0xfff);
        assert_eq!(genmask64(57, 44), 0x03ff_f000_0000_0000);
    }

    #[test]
    fn test_page_span() {
        assert_eq!(page_span(0, PAGE_SIZE), 0..1);
        assert_eq!(page_span(0, PAGE_SIZE + 1), 0..2);
        assert_eq!(page_span(30, 50), 0..1);
        assert_eq!(page_span(PAGE_SIZE, 3 * PAGE_SIZE), 1..3);
    }
}
