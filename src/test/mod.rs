use crate::modules::memory_device::ArrayMemoryDevice;
use crate::{Process, ProcessConfig, PAGE_SIZE};

mod coherence;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn get_test_ram(frames: usize) -> ArrayMemoryDevice {
    ArrayMemoryDevice::new(frames * PAGE_SIZE)
}

pub(crate) fn get_test_swaps(frames: usize) -> Vec<ArrayMemoryDevice> {
    vec![ArrayMemoryDevice::new(frames * PAGE_SIZE)]
}

pub(crate) fn get_test_process(pid: u32) -> Process {
    init_logger();

    Process::new(
        pid,
        ProcessConfig {
            tlb_bytes: 8 * 8,
            tlb_seed: 0x5eed,
        },
    )
}
