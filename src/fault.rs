use log::{debug, warn};

use crate::address_space::AddressSpace;
use crate::config::{PAGE_SHIFT, PAGE_SIZE};
use crate::error::{MemError, Result};
use crate::modules::memory_device::{copy_page, MemoryDeviceModule};
use crate::pte::{Pte, PteState};
use crate::tlb::TlbCache;

/// The physical devices a paging operation runs against: the RAM
/// device and the process's swap devices, indexed by the PTE's
/// swap-type field.
pub struct PagingContext<'a, R: MemoryDeviceModule, S: MemoryDeviceModule> {
    pub ram: &'a mut R,
    pub swaps: &'a mut [S],
}

pub(crate) fn split_addr(addr: usize) -> (usize, usize) {
    (addr >> PAGE_SHIFT, addr & (PAGE_SIZE - 1))
}

impl AddressSpace {
    /// Resolves a page number to the RAM frame holding it, swapping the
    /// page in when it currently lives on a swap device.
    ///
    /// The swap-in trades places with a FIFO victim: the victim's frame
    /// content moves to a fresh slot on the faulting page's swap device
    /// (which becomes the active one), the faulting page's content
    /// moves into the vacated frame and its old slot returns to the
    /// device's pool. The victim's stale TLB line is dropped here, the
    /// faulting page's own line is the caller's business.
    pub fn resolve<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        pgn: usize,
    ) -> Result<usize> {
        let (swap_type, slot) = match self.pte(pgn)?.state() {
            PteState::Unmapped => return Err(MemError::PageNotMapped),
            PteState::Present { frame } => return Ok(frame),
            PteState::Swapped { swap_type, slot } => (swap_type, slot),
        };

        // page fault
        if swap_type >= ctx.swaps.len() {
            return Err(MemError::InvalidSwapDevice);
        }
        self.set_active_swap(swap_type);

        let victim_pgn = self.select_victim()?;
        let victim_frame = match self.pte(victim_pgn)?.state() {
            PteState::Present { frame } => frame,
            _ => return Err(MemError::NoVictim),
        };

        let swap_dev = &mut ctx.swaps[swap_type];
        let new_slot = match swap_dev.get_free_frame() {
            Ok(s) => s,
            Err(_) => {
                // victim stays resident, put it back
                self.fifo_push_resident(victim_pgn);
                return Err(MemError::SwapExhausted);
            }
        };

        let copied = copy_page(ctx.ram, victim_frame, swap_dev, new_slot)
            .and_then(|_| copy_page(swap_dev, slot, ctx.ram, victim_frame));
        if let Err(e) = copied {
            swap_dev.put_free_frame(new_slot);
            self.fifo_push_resident(victim_pgn);
            return Err(e);
        }
        swap_dev.put_free_frame(slot);

        self.set_pte(victim_pgn, Pte::swapped(swap_type, new_slot));
        self.set_pte(pgn, Pte::present(victim_frame));
        self.fifo_push_resident(pgn);
        tlb.invalidate(pid, Some(victim_pgn));

        debug!(
            "page fault pid={}: page {} in from swap {} slot {}, victim {} out to slot {}",
            pid, pgn, swap_type, slot, victim_pgn, new_slot
        );

        Ok(victim_frame)
    }

    /// Takes the oldest page off the FIFO residency list.
    ///
    /// A correctly maintained list only holds resident pages; a swapped
    /// entry means the bookkeeping diverged from the page table, so it
    /// is re-enqueued and selection retries, bounded by the list
    /// length.
    pub(crate) fn select_victim(&mut self) -> Result<usize> {
        let mut attempts = self.fifo().len();

        while attempts > 0 {
            let pgn = match self.fifo_pop_oldest() {
                Some(pgn) => pgn,
                None => break,
            };

            match self.pte(pgn)?.state() {
                PteState::Present { .. } => return Ok(pgn),
                state => {
                    warn!(
                        "fifo list diverged from page table: page {} is {:?}, retrying",
                        pgn, state
                    );
                    self.fifo_push_resident(pgn);
                    attempts -= 1;
                }
            }
        }

        warn!("no resident victim page left");
        Err(MemError::NoVictim)
    }

    /// Obtains a RAM frame for a new mapping: from the free pool when
    /// possible, otherwise by pushing the oldest resident page out to
    /// the active swap device.
    pub(crate) fn take_frame<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
    ) -> Result<usize> {
        if let Ok(frame) = ctx.ram.get_free_frame() {
            return Ok(frame);
        }

        let victim_pgn = self.select_victim()?;
        let victim_frame = match self.pte(victim_pgn)?.state() {
            PteState::Present { frame } => frame,
            _ => return Err(MemError::NoVictim),
        };

        let swap_type = self.active_swap();
        let swap_dev = match ctx.swaps.get_mut(swap_type) {
            Some(dev) => dev,
            None => {
                self.fifo_push_resident(victim_pgn);
                return Err(MemError::InvalidSwapDevice);
            }
        };

        let slot = match swap_dev.get_free_frame() {
            Ok(s) => s,
            Err(_) => {
                self.fifo_push_resident(victim_pgn);
                return Err(MemError::SwapExhausted);
            }
        };

        if let Err(e) = copy_page(ctx.ram, victim_frame, swap_dev, slot) {
            swap_dev.put_free_frame(slot);
            self.fifo_push_resident(victim_pgn);
            return Err(e);
        }

        self.set_pte(victim_pgn, Pte::swapped(swap_type, slot));
        tlb.invalidate(pid, Some(victim_pgn));

        debug!(
            "evicted pid={} page {} to swap {} slot {}",
            pid, victim_pgn, swap_type, slot
        );

        Ok(victim_frame)
    }

    /// Reads one byte at a virtual address, faulting the page in if
    /// needed. This is the page-table-only path, the TLB is neither
    /// probed nor filled.
    pub fn read_byte<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        addr: usize,
    ) -> Result<u8> {
        let (pgn, offset) = split_addr(addr);
        let frame = self.resolve(ctx, tlb, pid, pgn)?;

        ctx.ram.read((frame << PAGE_SHIFT) | offset)
    }

    /// Writes one byte at a virtual address, faulting the page in if
    /// needed.
    pub fn write_byte<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        addr: usize,
        value: u8,
    ) -> Result<()> {
        let (pgn, offset) = split_addr(addr);
        let frame = self.resolve(ctx, tlb, pid, pgn)?;

        ctx.ram.write((frame << PAGE_SHIFT) | offset, value)
    }
    /// Bounds-checked read relative to a region handle, through the
    /// page table only. The offset must land inside
    /// `[region.start, region.end)` before any device is touched.
    pub fn read_region<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        region_id: usize,
        offset: usize,
    ) -> Result<u8> {
        let addr = self.region_addr(region_id, offset)?;
        self.read_byte(ctx, tlb, pid, addr)
    }

    /// Bounds-checked write relative to a region handle, through the
    /// page table only.
    pub fn write_region<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &mut self,
        ctx: &mut PagingContext<'_, R, S>,
        tlb: &mut TlbCache,
        pid: u32,
        region_id: usize,
        offset: usize,
        value: u8,
    ) -> Result<()> {
        let addr = self.region_addr(region_id, offset)?;
        self.write_byte(ctx, tlb, pid, addr, value)
    }

    fn region_addr(&self, region_id: usize, offset: usize) -> Result<usize> {
        let region = self.symbol(region_id)?;

        match region.start.checked_add(offset) {
            Some(addr) if addr < region.end => Ok(addr),
            _ => Err(MemError::OutOfRange),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_addr() {
        assert_eq!(split_addr(0), (0, 0));
        assert_eq!(split_addr(PAGE_SIZE - 1), (0, PAGE_SIZE - 1));
        assert_eq!(split_addr(PAGE_SIZE), (1, 0));
        assert_eq!(split_addr(5 * PAGE_SIZE + 17), (5, 17));
    }

    #[test]
    fn test_select_victim_takes_oldest() {
        let mut space = AddressSpace::new();
        space.set_pte(3, Pte::present(0));
        space.set_pte(4, Pte::present(1));
        space.fifo_push_resident(3);
        space.fifo_push_resident(4);

        assert_eq!(space.select_victim().unwrap(), 3);
        assert_eq!(space.select_victim().unwrap(), 4);
        assert_eq!(space.select_victim(), Err(MemError::NoVictim));
    }

    #[test]
    fn test_select_victim_skips_swapped_entry() {
        let mut space = AddressSpace::new();
        space.set_pte(3, Pte::swapped(0, 7));
        space.set_pte(4, Pte::present(1));
        space.fifo_push_resident(3);
        space.fifo_push_resident(4);

        // the diverged entry is re-enqueued, the next-oldest wins
        assert_eq!(space.select_victim().unwrap(), 4);
        assert_eq!(space.fifo().len(), 1);
        assert_eq!(space.select_victim(), Err(MemError::NoVictim));
    }
}
