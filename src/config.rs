/// Width of the in-page offset in bits, pages are 256 bytes.
pub const PAGE_SHIFT: usize = 8;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Page numbers are 14 bits wide, matching the TLB tag field.
pub const PAGE_NUMBER_BITS: usize = 14;
pub const MAX_PAGES: usize = 1 << PAGE_NUMBER_BITS;

/// Number of region handles (symbol table slots) per address space.
pub const MAX_SYMBOLS: usize = 30;

/// Per-process settings, handed to [`crate::Process::new`].
#[derive(Debug, Clone, Copy)]
pub struct ProcessConfig {
    /// Raw TLB storage size in bytes; the cache holds one
    /// 64 bit entry per 8 bytes.
    pub tlb_bytes: usize,

    /// Seed for the TLB's random replacement, fixed so runs are
    /// reproducible.
    pub tlb_seed: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            tlb_bytes: 64 * 8,
            tlb_seed: 0x746c_6263,
        }
    }
}
