use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};

use crate::address_space::AddressSpace;
use crate::config::{ProcessConfig, PAGE_SHIFT};
use crate::error::{MemError, Result};
use crate::fault::{split_addr, PagingContext};
use crate::modules::memory_device::MemoryDeviceModule;
use crate::tlb::TlbCache;
use crate::util::page_span;

/// Process control block: one address space and one private TLB,
/// each behind its own lock. Allocation, free and the access protocol
/// hold both locks for their full duration so a probe-then-fill can
/// never race an invalidation on the same process.
pub struct Process {
    pid: u32,
    mm: Mutex<AddressSpace>,
    tlb: Mutex<TlbCache>,
}

impl Process {
    pub fn new(pid: u32, config: ProcessConfig) -> Self {
        Self {
            pid,
            mm: Mutex::new(AddressSpace::new()),
            tlb: Mutex::new(TlbCache::new(config.tlb_bytes, config.tlb_seed)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Direct access to the address space, for callers that manage
    /// VMAs or inspect the page table.
    pub fn mm(&self) -> MutexGuard<'_, AddressSpace> {
        lock_or_recover(&self.mm)
    }

    pub fn tlb(&self) -> MutexGuard<'_, TlbCache> {
        lock_or_recover(&self.tlb)
    }

    // lock order is always mm before tlb
    fn lock_both(&self) -> (MutexGuard<'_, AddressSpace>, MutexGuard<'_, TlbCache>) {
        let mm = lock_or_recover(&self.mm);
        let tlb = lock_or_recover(&self.tlb);
        (mm, tlb)
    }

    /// Allocates `size` bytes in the default area, binds them to
    /// region handle `region_id` and primes the TLB with every page of
    /// the new region. Returns the region's start address.
    pub fn alloc<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &self,
        ram: &mut R,
        swaps: &mut [S],
        region_id: usize,
        size: usize,
    ) -> Result<usize> {
        let (mut mm, mut tlb) = self.lock_both();
        let mut ctx = PagingContext { ram, swaps };

        let start = mm.alloc(&mut ctx, &mut tlb, self.pid, 0, region_id, size)?;

        // priming is best effort, the allocation is already committed;
        // a page that cannot be pulled in right now faults in on first
        // access instead
        for pgn in page_span(start, start + size) {
            match mm.resolve(&mut ctx, &mut tlb, self.pid, pgn) {
                Ok(frame) => tlb.fill(self.pid, pgn, frame),
                Err(e) => debug!(
                    "pid={} skipping tlb prime of page {}: {:?}",
                    self.pid, pgn, e
                ),
            }
        }

        Ok(start)
    }

    /// Releases the region behind `region_id`. Stale TLB lines of the
    /// covered pages are dropped before the page table is touched.
    pub fn free<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &self,
        ram: &mut R,
        swaps: &mut [S],
        region_id: usize,
    ) -> Result<()> {
        let (mut mm, mut tlb) = self.lock_both();

        let region = mm.symbol(region_id)?;
        for pgn in page_span(region.start, region.end) {
            tlb.invalidate(self.pid, Some(pgn));
        }

        let mut ctx = PagingContext { ram, swaps };
        mm.release(&mut ctx, &mut tlb, self.pid, region_id)?;
        Ok(())
    }

    /// Reads the byte at `offset` inside the region, TLB first.
    pub fn read<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &self,
        ram: &mut R,
        swaps: &mut [S],
        region_id: usize,
        offset: usize,
    ) -> Result<u8> {
        let (mut mm, mut tlb) = self.lock_both();
        let mut ctx = PagingContext { ram, swaps };

        let phys_addr = self.translate(&mut mm, &mut tlb, &mut ctx, region_id, offset)?;
        ctx.ram.read(phys_addr)
    }

    /// Writes the byte at `offset` inside the region, TLB first.
    pub fn write<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &self,
        ram: &mut R,
        swaps: &mut [S],
        region_id: usize,
        offset: usize,
        value: u8,
    ) -> Result<()> {
        let (mut mm, mut tlb) = self.lock_both();
        let mut ctx = PagingContext { ram, swaps };

        let phys_addr = self.translate(&mut mm, &mut tlb, &mut ctx, region_id, offset)?;
        ctx.ram.write(phys_addr, value)
    }

    /// The access protocol up to the physical address: region bounds
    /// from the symbol table, TLB probe, page table resolve on a miss
    /// (filling the cache with the fresh mapping).
    fn translate<R: MemoryDeviceModule, S: MemoryDeviceModule>(
        &self,
        mm: &mut AddressSpace,
        tlb: &mut TlbCache,
        ctx: &mut PagingContext<'_, R, S>,
        region_id: usize,
        offset: usize,
    ) -> Result<usize> {
        let region = mm.symbol(region_id)?;
        // out of range is an error, not a fault
        let addr = match region.start.checked_add(offset) {
            Some(addr) if addr < region.end => addr,
            _ => return Err(MemError::OutOfRange),
        };

        let (pgn, in_page) = split_addr(addr);

        let frame = match tlb.probe(self.pid, pgn) {
            Some(frame) => {
                trace!("tlb hit pid={} page={} frame={}", self.pid, pgn, frame);
                frame
            }
            None => {
                trace!("tlb miss pid={} page={}", self.pid, pgn);
                let frame = mm.resolve(ctx, tlb, self.pid, pgn)?;
                tlb.fill(self.pid, pgn, frame);
                frame
            }
        };

        Ok((frame << PAGE_SHIFT) | in_page)
    }

    /// Drops every TLB line of this process; reports whether any line
    /// was valid.
    pub fn flush_tlb(&self) -> bool {
        lock_or_recover(&self.tlb).invalidate(self.pid, None)
    }

    pub fn dump_tlb(&self) -> String {
        lock_or_recover(&self.tlb).dump()
    }

    pub fn dump_page_table(&self) -> String {
        lock_or_recover(&self.mm).dump_page_table()
    }
}

// the guarded state stays consistent even if a holder panicked,
// every operation unwinds its partial updates before returning
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
