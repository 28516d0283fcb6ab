use static_assertions::const_assert;

use crate::config::{MAX_PAGES, PAGE_NUMBER_BITS};
use crate::util::genmask32;

// Bit layout of a page table entry. This is a stable wire format, other
// tooling decodes raw dumps against these offsets.
pub const PTE_PRESENT_BIT: u32 = 31;
pub const PTE_SWAPPED_BIT: u32 = 30;
pub const PTE_SWPTYP_HIBIT: u32 = 29;
pub const PTE_SWPTYP_LOBIT: u32 = 25;
// location: frame number while present, swap slot while swapped;
// the two meanings share the low-order bits and never coexist
pub const PTE_LOCATION_HIBIT: u32 = 20;
pub const PTE_LOCATION_LOBIT: u32 = 0;

const PTE_PRESENT_MASK: u32 = 1 << PTE_PRESENT_BIT;
const PTE_SWAPPED_MASK: u32 = 1 << PTE_SWAPPED_BIT;
const PTE_SWPTYP_MASK: u32 = genmask32(PTE_SWPTYP_HIBIT, PTE_SWPTYP_LOBIT);
const PTE_LOCATION_MASK: u32 = genmask32(PTE_LOCATION_HIBIT, PTE_LOCATION_LOBIT);

// the fields may not overlap and the location must hold any page number
const_assert!(PTE_SWPTYP_HIBIT < PTE_SWAPPED_BIT);
const_assert!(PTE_LOCATION_HIBIT < PTE_SWPTYP_LOBIT);
const_assert!((MAX_PAGES - 1) as u32 <= PTE_LOCATION_MASK);
const_assert!(PAGE_NUMBER_BITS <= PTE_LOCATION_HIBIT as usize + 1);

/// One page table entry, bit-packed into a fixed-width integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pte(u32);

/// Decoded residency state of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteState {
    /// The page was never backed by anything.
    Unmapped,
    /// The page occupies a RAM frame.
    Present { frame: usize },
    /// The page lives in a slot of one of the swap devices.
    Swapped { swap_type: usize, slot: usize },
}

impl Pte {
    pub const EMPTY: Pte = Pte(0);

    pub fn present(frame: usize) -> Pte {
        Pte(PTE_PRESENT_MASK | (frame as u32 & PTE_LOCATION_MASK))
    }

    pub fn swapped(swap_type: usize, slot: usize) -> Pte {
        Pte(PTE_SWAPPED_MASK
            | (((swap_type as u32) << PTE_SWPTYP_LOBIT) & PTE_SWPTYP_MASK)
            | (slot as u32 & PTE_LOCATION_MASK))
    }

    pub fn from_raw(raw: u32) -> Pte {
        Pte(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_present(self) -> bool {
        self.0 & PTE_PRESENT_MASK != 0
    }

    pub fn is_swapped(self) -> bool {
        self.0 & PTE_SWAPPED_MASK != 0
    }

    /// Has this page ever been mapped?
    pub fn is_mapped(self) -> bool {
        self.0 & (PTE_PRESENT_MASK | PTE_SWAPPED_MASK) != 0
    }

    fn location(self) -> usize {
        (self.0 & PTE_LOCATION_MASK) as usize
    }

    fn swap_type(self) -> usize {
        ((self.0 & PTE_SWPTYP_MASK) >> PTE_SWPTYP_LOBIT) as usize
    }

    pub fn state(self) -> PteState {
        if self.is_present() {
            PteState::Present {
                frame: self.location(),
            }
        } else if self.is_swapped() {
            PteState::Swapped {
                swap_type: self.swap_type(),
                slot: self.location(),
            }
        } else {
            PteState::Unmapped
        }
    }
}
