use std::collections::VecDeque;

use log::{trace, warn};

use crate::config::{MAX_PAGES, MAX_SYMBOLS};
use crate::error::{MemError, Result};
use crate::fault::PagingContext;
use crate::modules::memory_device::MemoryDeviceModule;
use crate::pte::{Pte, PteState};
use crate::tlb::TlbCache;
use crate::util::{page_align, page_span};

/// An allocated or free virtual-address sub-range `[start, end)`.
///
/// Any live region satisfies `start < end`; a freed symbol table slot
/// is the sentinel `start == end == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub const SENTINEL: Region = Region { start: 0, end: 0 };

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_live(&self) -> bool {
        self.start < self.end
    }
}

/// One contiguous virtual memory area with its own growth boundary and
/// free-region list. Growth is monotonic, `start <= sbrk <= end`.
#[derive(Debug)]
pub struct Vma {
    pub id: usize,
    pub start: usize,
    pub end: usize,
    pub sbrk: usize,
    free_regions: VecDeque<Region>,
}

impl Vma {
    fn new(id: usize, base: usize) -> Self {
        Self {
            id,
            start: base,
            end: base,
            sbrk: base,
            free_regions: VecDeque::new(),
        }
    }

    pub fn free_regions(&self) -> &VecDeque<Region> {
        &self.free_regions
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

/// One process's virtual address space: page table, VMAs, the symbol
/// table of active regions and the FIFO page-residency list.
pub struct AddressSpace {
    page_table: Vec<Pte>,
    vmas: Vec<Vma>,
    symbols: [Region; MAX_SYMBOLS],
    /// Resident page numbers, front = most recently mapped. Every
    /// resident page is enqueued exactly once when it becomes resident
    /// and dequeued when it is evicted or freed.
    fifo: VecDeque<usize>,
    /// Index of the swap device eviction currently targets.
    active_swap: usize,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// Fresh address space with a single empty area with id 0 based at
    /// address 0.
    pub fn new() -> Self {
        Self {
            page_table: vec![Pte::EMPTY; MAX_PAGES],
            vmas: vec![Vma::new(0, 0)],
            symbols: [Region::SENTINEL; MAX_SYMBOLS],
            fifo: VecDeque::new(),
            active_swap: 0,
        }
    }

    /// Adds another empty area based at `base` (rounded up to a page
    /// boundary) and returns its id.
    pub fn add_vma(&mut self, base: usize) -> Result<usize> {
        let base = page_align(base).ok_or(MemError::InvalidSize)?;
        let id = self.vmas.len();
        self.vmas.push(Vma::new(id, base));
        Ok(id)
    }

    pub fn vma(&self, vma_id: usize) -> Result<&Vma> {
        self.vmas.get(vma_id).ok_or(MemError::InvalidVma)
    }

    fn vma_mut(&mut self, vma_id: usize) -> Result<&mut Vma> {
        self.vmas.get_mut(vma_id).ok_or(MemError::InvalidVma)
    }

    /// Looks up the live region bound to a symbol table slot.
    pub fn symbol(&self, region_id: usize) -> Result<Region> {
        let region = *self
            .symbols
            .get(region_id)
            .ok_or(MemError::InvalidRegion)?;

        if region.is_live() {
            Ok(region)
        } else {
            Err(MemError::InvalidRegion)
        }
    }

    pub fn pte(&self, pgn: usize) -> Result<Pte> {
        self.page_table
            .get(pgn)
            .copied()
            .ok_or(MemError::OutOfRange)
    }

    pub(crate) fn set_pte(&mut self, pgn: usize, pte: Pte) {
        self.page_table[pgn] = pte;
    }

    pub(crate) fn fifo(&self) -> &VecDeque<usize> {
        &self.fifo
    }

    pub(crate) fn fifo_push_resident(&mut self, pgn: usize) {
        self.fifo.push_front(pgn);
    }

    pub(crate) fn fifo_pop_oldest(&mut self) -> Option<usize> {
        self.fifo.pop_back()
    }

    fn fifo_remove(&mut self, pgn: usize) {
        self.fifo.retain(|&p| p != pgn);
    }

    pub fn active_swap(&self) -> usize {
        self.active_swap
    }

    pub(crate) fn set_active_swap(&mut self, swap_type: usize) {
        self.active_swap = swap_type;
    }

    /// Prepends a reclaimed range to the area's free-region list.
    /// Adjacent free regions are deliberately not merged.
    pub(crate) fn enlist_free_region(&mut self, vma_id: usize, region: Region) -> Result<()> {
        if !region.is_live() {
            return Err(MemError::InvalidSize);
        }

        self.vma_mut(vma_id)?.free_regions.push_front(region);
        Ok(())
    }

    /// First-fit scan of the area's free-region list. A region larger
    /// than the request is shrunk in place, an exact fit is removed.
    pub fn find_free_region(&mut self, vma_id: usize, size: usize) -> Result<Option<Region>> {
        let vma = self.vma_mut(vma_id)?;

        for i in 0..vma.free_regions.len() {
            let candidate = vma.free_regions[i];
            let fit_end = match candidate.start.checked_add(size) {
                Some(end) if end <= candidate.end => end,
                _ => continue,
            };

            let found = Region {
                start: candidate.start,
                end: fit_end,
            };

            if found.end < candidate.end {
                vma.free_regions[i].start = found.end;
            } else {
                let _ = vma.free_regions.remove(i);
            }

            return Ok(Some(found));
        }

        Ok(None)
    }

    /// Allocates `size` bytes inside `vma_id` and binds the range to
    /// symbol slot `region_id`, reusing a free region when one fits and
    /// growing the area at its `sbrk` boundary otherwise. Returns the
    /// start address.
    pub fn alloc<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        vma_id: usize,
        region_id: usize,
        size: usize,
    ) -> Result<usize> {
        if region_id >= MAX_SYMBOLS {
            return Err(MemError::InvalidRegion);
        }
        if size == 0 {
            return Err(MemError::InvalidSize);
        }
        if self.symbols[region_id].is_live() {
            return Err(MemError::RegionInUse);
        }
        self.vma(vma_id)?;

        if let Some(region) = self.find_free_region(vma_id, size)? {
            // pages of the reclaimed range were unmapped on free
            if let Err(e) =
                self.map_unmapped_pages(ctx, tlb, pid, page_span(region.start, region.end))
            {
                let _ = self.enlist_free_region(vma_id, region);
                return Err(e);
            }

            trace!(
                "alloc pid={} region={} reuses [{}, {})",
                pid,
                region_id,
                region.start,
                region.end
            );
            self.symbols[region_id] = region;
            return Ok(region.start);
        }

        // no free region fits, grow the area
        let aligned = page_align(size).ok_or(MemError::InvalidSize)?;
        let vma = self.vma(vma_id)?;
        let grow_start = vma.sbrk;
        let grow_end = grow_start
            .checked_add(aligned)
            .ok_or(MemError::InvalidSize)?;

        for other in &self.vmas {
            if other.id != vma_id && other.overlaps(grow_start, grow_end) {
                return Err(MemError::VmaOverlap);
            }
        }

        {
            let vma = self.vma_mut(vma_id)?;
            vma.end += aligned;
            vma.sbrk += aligned;
        }

        if let Err(e) = self.map_unmapped_pages(ctx, tlb, pid, page_span(grow_start, grow_end)) {
            let vma = self.vma_mut(vma_id)?;
            vma.end -= aligned;
            vma.sbrk -= aligned;
            return Err(e);
        }

        trace!(
            "alloc pid={} region={} grows vma {} to [{}, {})",
            pid,
            region_id,
            vma_id,
            grow_start,
            grow_end
        );

        // the symbol keeps the unrounded end
        self.symbols[region_id] = Region {
            start: grow_start,
            end: grow_start + size,
        };
        Ok(grow_start)
    }

    /// Unbinds the region behind `region_id`, returns every covered
    /// page's frame to the RAM pool and prepends the range to its
    /// area's free-region list. The freed bounds are returned so the
    /// caller can drop stale TLB lines.
    pub fn release<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        region_id: usize,
    ) -> Result<Region> {
        if region_id >= MAX_SYMBOLS {
            return Err(MemError::InvalidRegion);
        }
        let region = self.symbols[region_id];
        if !region.is_live() {
            // freed slot, a second release is a double free
            return Err(MemError::InvalidRegion);
        }

        for pgn in page_span(region.start, region.end) {
            // a page carved into several sub-page regions stays mapped
            // until its last live region goes
            if self.page_shared_with_live_region(region_id, pgn) {
                continue;
            }

            // a swapped page is pulled back in first so its frame can
            // be reclaimed
            let frame = self.resolve(ctx, tlb, pid, pgn)?;
            ctx.ram.put_free_frame(frame);
            self.page_table[pgn] = Pte::EMPTY;
            self.fifo_remove(pgn);
        }

        trace!(
            "free pid={} region={} releases [{}, {})",
            pid,
            region_id,
            region.start,
            region.end
        );

        let vma_id = self.owning_vma(region.start);
        self.symbols[region_id] = Region::SENTINEL;
        self.enlist_free_region(vma_id, region)?;
        Ok(region)
    }

    /// Maps every not-yet-mapped page of `pages` to a fresh frame,
    /// evicting if the RAM pool is dry. Already unwound on error: no
    /// page of the range stays mapped.
    fn map_unmapped_pages<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        pages: core::ops::Range<usize>,
    ) -> Result<()> {
        let mut mapped = Vec::new();

        for pgn in pages {
            if pgn >= MAX_PAGES {
                self.unmap_pages(ctx, &mapped);
                return Err(MemError::OutOfRange);
            }
            if self.page_table[pgn].is_mapped() {
                continue;
            }

            match self.take_frame(ctx, tlb, pid) {
                Ok(frame) => {
                    self.page_table[pgn] = Pte::present(frame);
                    self.fifo_push_resident(pgn);
                    mapped.push(pgn);
                }
                Err(e) => {
                    self.unmap_pages(ctx, &mapped);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn unmap_pages<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        pgns: &[usize],
    ) {
        for &pgn in pgns {
            match self.page_table[pgn].state() {
                PteState::Present { frame } => ctx.ram.put_free_frame(frame),
                // a page evicted while the range was being mapped holds
                // a swap slot instead of a frame
                PteState::Swapped { swap_type, slot } => {
                    if let Some(dev) = ctx.swaps.get_mut(swap_type) {
                        dev.put_free_frame(slot);
                    }
                }
                PteState::Unmapped => {}
            }
            self.page_table[pgn] = Pte::EMPTY;
            self.fifo_remove(pgn);
        }
    }

    fn page_shared_with_live_region(&self, region_id: usize, pgn: usize) -> bool {
        self.symbols.iter().enumerate().any(|(id, region)| {
            id != region_id
                && region.is_live()
                && page_span(region.start, region.end).contains(&pgn)
        })
    }

    fn owning_vma(&self, addr: usize) -> usize {
        match self
            .vmas
            .iter()
            .find(|vma| vma.start <= addr && addr < vma.end)
        {
            Some(vma) => vma.id,
            None => {
                warn!("no area covers released address {}, filing under area 0", addr);
                0
            }
        }
    }

    /// One line per mapped page: `pgn raw-pte`, the raw value follows
    /// the documented bit layout.
    pub fn dump_page_table(&self) -> String {
        let mut out = String::new();
        for (pgn, pte) in self.page_table.iter().enumerate() {
            if pte.is_mapped() {
                out.push_str(&format!("{:05} {:08x}\n", pgn, pte.raw()));
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PAGE_SIZE;

    fn space_with_free_list(regions: &[(usize, usize)]) -> AddressSpace {
        let mut space = AddressSpace::new();
        // enlist prepends, so feed the list in reverse
        for &(start, end) in regions.iter().rev() {
            space.enlist_free_region(0, Region { start, end }).unwrap();
        }
        space
    }

    #[test]
    fn test_first_fit_determinism() {
        let mut space = space_with_free_list(&[(0, 50), (100, 200)]);

        let found = space.find_free_region(0, 30).unwrap().unwrap();
        assert_eq!(found, Region { start: 0, end: 30 });

        let left: Vec<Region> = space.vma(0).unwrap().free_regions().iter().copied().collect();
        assert_eq!(
            left,
            vec![
                Region { start: 30, end: 50 },
                Region {
                    start: 100,
                    end: 200
                }
            ]
        );
    }

    #[test]
    fn test_exact_fit_removes_node() {
        let mut space = space_with_free_list(&[(0, 50), (100, 200)]);

        let found = space.find_free_region(0, 50).unwrap().unwrap();
        assert_eq!(found, Region { start: 0, end: 50 });

        let left: Vec<Region> = space.vma(0).unwrap().free_regions().iter().copied().collect();
        assert_eq!(
            left,
            vec![Region {
                start: 100,
                end: 200
            }]
        );
    }

    #[test]
    fn test_first_fit_not_found() {
        let mut space = space_with_free_list(&[(0, 50), (100, 150)]);

        // no single free region is large enough
        assert_eq!(space.find_free_region(0, 60).unwrap(), None);
    }

    #[test]
    fn test_no_coalescing() {
        let mut space = AddressSpace::new();
        space
            .enlist_free_region(0, Region { start: 0, end: 10 })
            .unwrap();
        space
            .enlist_free_region(0, Region { start: 10, end: 20 })
            .unwrap();

        // two adjacent nodes stay two nodes, fragmentation persists
        assert_eq!(space.vma(0).unwrap().free_regions().len(), 2);
        assert_eq!(space.find_free_region(0, 15).unwrap(), None);
    }

    #[test]
    fn test_sentinel_is_not_a_free_region() {
        let mut space = AddressSpace::new();
        assert_eq!(
            space.enlist_free_region(0, Region::SENTINEL),
            Err(MemError::InvalidSize)
        );
    }

    #[test]
    fn test_symbol_lookup() {
        let space = AddressSpace::new();
        assert_eq!(space.symbol(0), Err(MemError::InvalidRegion));
        assert_eq!(space.symbol(MAX_SYMBOLS), Err(MemError::InvalidRegion));
    }

    #[test]
    fn test_add_vma_aligns_base() {
        let mut space = AddressSpace::new();
        let id = space.add_vma(PAGE_SIZE + 1).unwrap();
        assert_eq!(space.vma(id).unwrap().start, 2 * PAGE_SIZE);
        assert_eq!(space.add_vma(usize::MAX), Err(MemError::InvalidSize));
    }

    #[test]
    fn test_first_fit_rejects_overflowing_request() {
        let mut space = space_with_free_list(&[(8, 50)]);

        // start + size wraps, the candidate must be skipped, not matched
        assert_eq!(space.find_free_region(0, usize::MAX).unwrap(), None);
    }
}
