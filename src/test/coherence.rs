use std::thread;

use super::{get_test_process, get_test_ram, get_test_swaps, init_logger};
use crate::modules::memory_device::{ArrayMemoryDevice, SharedMemoryDevice};
use crate::{Process, ProcessConfig, PAGE_SIZE};

#[test]
fn test_alloc_primes_tlb() {
    let proc = get_test_process(1);
    let mut ram = get_test_ram(4);
    let mut swaps = get_test_swaps(4);

    proc.alloc(&mut ram, &mut swaps, 0, 3 * PAGE_SIZE).unwrap();

    let tlb = proc.tlb();
    for pgn in 0..3 {
        assert!(tlb.probe(1, pgn).is_some(), "page {} not cached", pgn);
    }
}

#[test]
fn test_eviction_drops_cached_translation() {
    let proc = get_test_process(1);
    let mut ram = get_test_ram(1);
    let mut swaps = get_test_swaps(4);

    proc.alloc(&mut ram, &mut swaps, 0, PAGE_SIZE).unwrap();
    proc.write(&mut ram, &mut swaps, 0, 0, 11).unwrap();
    assert_eq!(proc.tlb().probe(1, 0), Some(0));

    // the second region steals page 0's only frame
    proc.alloc(&mut ram, &mut swaps, 1, PAGE_SIZE).unwrap();
    assert_eq!(proc.tlb().probe(1, 0), None);

    // faulting back in still yields the written byte
    assert_eq!(proc.read(&mut ram, &mut swaps, 0, 0).unwrap(), 11);
}

#[test]
fn test_free_then_realloc_does_not_serve_stale_data() {
    let proc = get_test_process(1);
    let mut ram = get_test_ram(4);
    let mut swaps = get_test_swaps(4);

    let start = proc.alloc(&mut ram, &mut swaps, 0, PAGE_SIZE).unwrap();
    proc.write(&mut ram, &mut swaps, 0, 0, 0xaa).unwrap();
    assert_eq!(proc.read(&mut ram, &mut swaps, 0, 0).unwrap(), 0xaa);

    proc.free(&mut ram, &mut swaps, 0).unwrap();
    assert_eq!(proc.tlb().probe(1, 0), None);

    // the new region covers the same page number for the same pid but
    // is backed by a different frame
    let start2 = proc.alloc(&mut ram, &mut swaps, 1, PAGE_SIZE).unwrap();
    assert_eq!(start2, start);

    // a stale cached frame would still hold 0xaa
    assert_eq!(proc.read(&mut ram, &mut swaps, 1, 0).unwrap(), 0);
}

#[test]
fn test_flush_tlb() {
    let proc = get_test_process(1);
    let mut ram = get_test_ram(4);
    let mut swaps = get_test_swaps(4);

    proc.alloc(&mut ram, &mut swaps, 0, 2 * PAGE_SIZE).unwrap();
    assert!(proc.flush_tlb());
    assert!(!proc.flush_tlb());
    assert_eq!(proc.tlb().probe(1, 0), None);

    // accesses repopulate the cache through the page table
    proc.write(&mut ram, &mut swaps, 0, 0, 7).unwrap();
    assert_eq!(proc.read(&mut ram, &mut swaps, 0, 0).unwrap(), 7);
    assert!(proc.flush_tlb());
}

#[test]
fn test_dump_tlb_lists_valid_entries() {
    let proc = get_test_process(9);
    let mut ram = get_test_ram(4);
    let mut swaps = get_test_swaps(4);

    proc.alloc(&mut ram, &mut swaps, 0, PAGE_SIZE).unwrap();

    let dump = proc.dump_tlb();
    assert_eq!(dump.lines().count(), 1);
    assert_eq!(dump.trim_end(), "1 00009 00000 00000");
}

#[test]
fn test_workers_on_shared_ram_device() {
    init_logger();

    let ram = SharedMemoryDevice::new(ArrayMemoryDevice::new(8 * PAGE_SIZE));

    thread::scope(|scope| {
        for pid in 1..=2u32 {
            let mut ram = ram.clone();
            scope.spawn(move || {
                let proc = Process::new(
                    pid,
                    ProcessConfig {
                        tlb_bytes: 8 * 8,
                        tlb_seed: pid as u64,
                    },
                );
                let mut swaps = get_test_swaps(8);

                // 2 processes * 6 pages on 8 shared frames, so both
                // processes end up evicting their own oldest pages
                for region in 0..2 {
                    proc.alloc(&mut ram, &mut swaps, region, 2 * PAGE_SIZE)
                        .unwrap();
                    for offset in 0..2 * PAGE_SIZE {
                        let value = (offset as u8) ^ (region as u8) ^ pid as u8;
                        proc.write(&mut ram, &mut swaps, region, offset, value)
                            .unwrap();
                    }
                }
                proc.alloc(&mut ram, &mut swaps, 2, 2 * PAGE_SIZE).unwrap();

                for region in 0..2 {
                    for offset in 0..2 * PAGE_SIZE {
                        let value = (offset as u8) ^ (region as u8) ^ pid as u8;
                        assert_eq!(
                            proc.read(&mut ram, &mut swaps, region, offset).unwrap(),
                            value
                        );
                    }
                }
            });
        }
    });
}
