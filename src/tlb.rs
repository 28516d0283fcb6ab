use core::fmt;
use core::mem::size_of;

use log::trace;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use static_assertions::{const_assert, const_assert_eq};

use crate::config::PAGE_NUMBER_BITS;
use crate::util::genmask64;

// Bit layout of one TLB line, a stable wire format for dumps:
// [63:59] unused, [58] valid, [57:44] tag (page number),
// [43:12] pid, [11:0] frame number.
pub const TLB_FREE_HIBIT: u32 = 63;
pub const TLB_FREE_LOBIT: u32 = 59;
pub const TLB_VALID_BIT: u32 = 58;
pub const TLB_TAG_HIBIT: u32 = 57;
pub const TLB_TAG_LOBIT: u32 = 44;
pub const TLB_PID_HIBIT: u32 = 43;
pub const TLB_PID_LOBIT: u32 = 12;
pub const TLB_FRM_HIBIT: u32 = 11;
pub const TLB_FRM_LOBIT: u32 = 0;

const TLB_VALID_MASK: u64 = 1 << TLB_VALID_BIT;
const TLB_TAG_MASK: u64 = genmask64(TLB_TAG_HIBIT, TLB_TAG_LOBIT);
const TLB_PID_MASK: u64 = genmask64(TLB_PID_HIBIT, TLB_PID_LOBIT);
const TLB_FRM_MASK: u64 = genmask64(TLB_FRM_HIBIT, TLB_FRM_LOBIT);

const_assert_eq!(TLB_TAG_HIBIT - TLB_TAG_LOBIT + 1, PAGE_NUMBER_BITS as u32);
const_assert_eq!(TLB_PID_HIBIT - TLB_PID_LOBIT + 1, 32);
const_assert!(TLB_FREE_LOBIT == TLB_VALID_BIT + 1);

/// One fully-associative cache line, bit-packed into 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlbEntry(u64);

const_assert_eq!(size_of::<TlbEntry>(), 8);

impl TlbEntry {
    pub const INVALID: TlbEntry = TlbEntry(0);

    pub fn new(pid: u32, tag: usize, frame: usize) -> TlbEntry {
        TlbEntry(
            TLB_VALID_MASK
                | (((tag as u64) << TLB_TAG_LOBIT) & TLB_TAG_MASK)
                | (((pid as u64) << TLB_PID_LOBIT) & TLB_PID_MASK)
                | (frame as u64 & TLB_FRM_MASK),
        )
    }

    pub fn from_raw(raw: u64) -> TlbEntry {
        TlbEntry(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 & TLB_VALID_MASK != 0
    }

    pub fn tag(self) -> usize {
        ((self.0 & TLB_TAG_MASK) >> TLB_TAG_LOBIT) as usize
    }

    pub fn pid(self) -> u32 {
        ((self.0 & TLB_PID_MASK) >> TLB_PID_LOBIT) as u32
    }

    pub fn frame(self) -> usize {
        (self.0 & TLB_FRM_MASK) as usize
    }

    fn matches(self, pid: u32, tag: usize) -> bool {
        self.is_valid() && self.pid() == pid && self.tag() == tag
    }

    fn invalidate(&mut self) {
        self.0 &= !TLB_VALID_MASK;
    }
}

impl fmt::Display for TlbEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:01} {:05} {:05} {:05}",
            self.is_valid() as u64,
            self.pid(),
            self.tag(),
            self.frame()
        )
    }
}

/// Fully-associative translation cache mapping `(pid, page)` to a frame
/// number. Replacement is uniform random, lookup scans every line the
/// way the hardware would compare all tags in parallel.
pub struct TlbCache {
    lines: Vec<TlbEntry>,
    rng: SmallRng,
}

impl TlbCache {
    /// Builds a cache backed by `total_bytes` of line storage; capacity
    /// is fixed at `total_bytes / 8` entries.
    pub fn new(total_bytes: usize, seed: u64) -> Self {
        Self {
            lines: vec![TlbEntry::INVALID; total_bytes / size_of::<TlbEntry>()],
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lines.len()
    }

    pub fn entries(&self) -> &[TlbEntry] {
        &self.lines
    }

    /// Looks up the frame cached for `(pid, page)`. A miss is an
    /// ordinary `None`, not an error.
    pub fn probe(&self, pid: u32, page: usize) -> Option<usize> {
        self.lines
            .iter()
            .find(|entry| entry.matches(pid, page))
            .map(|entry| entry.frame())
    }

    /// Installs or refreshes the mapping `(pid, page) -> frame`.
    ///
    /// An existing line for the pair is overwritten in place, otherwise
    /// the first invalid line is used; with every line valid a uniformly
    /// random one is replaced.
    pub fn fill(&mut self, pid: u32, page: usize, frame: usize) {
        // a zero-line cache caches nothing
        if self.lines.is_empty() {
            return;
        }

        let filled = TlbEntry::new(pid, page, frame);

        if let Some(entry) = self.lines.iter_mut().find(|e| e.matches(pid, page)) {
            *entry = filled;
            return;
        }

        if let Some(entry) = self.lines.iter_mut().find(|e| !e.is_valid()) {
            *entry = filled;
            return;
        }

        let victim = self.rng.gen_range(0..self.lines.len());
        trace!(
            "tlb full, replacing line {} with pid={} page={}",
            victim,
            pid,
            page
        );
        self.lines[victim] = filled;
    }

    /// Drops cached translations of `pid`. `page = None` is the
    /// wildcard clearing every line of the process; a concrete page
    /// clears at most one line. Returns whether anything matched.
    pub fn invalidate(&mut self, pid: u32, page: Option<usize>) -> bool {
        let mut found = false;

        for entry in self.lines.iter_mut() {
            if !entry.is_valid() || entry.pid() != pid {
                continue;
            }

            match page {
                Some(page) if entry.tag() == page => {
                    entry.invalidate();
                    // (pid, tag) is unique among valid lines
                    return true;
                }
                None => {
                    entry.invalidate();
                    found = true;
                }
                _ => {}
            }
        }

        found
    }

    /// One line per valid entry: `valid pid tag frame`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for entry in self.lines.iter().filter(|e| e.is_valid()) {
            out.push_str(&format!("{}\n", entry));
        }
        out
    }
}
