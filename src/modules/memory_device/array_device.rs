use std::collections::VecDeque;

use crate::config::PAGE_SIZE;
use crate::error::{MemError, Result};

use super::MemoryDeviceModule;

/// In-memory device backed by a byte vector. Frames are handed out in
/// ascending order initially and recycled in FIFO order afterwards.
pub struct ArrayMemoryDevice {
    storage: Vec<u8>,
    free_frames: VecDeque<usize>,
}

impl ArrayMemoryDevice {
    /// `total_bytes` is rounded down to whole frames.
    pub fn new(total_bytes: usize) -> Self {
        let frames = total_bytes / PAGE_SIZE;

        Self {
            storage: vec![0; frames * PAGE_SIZE],
            free_frames: (0..frames).collect(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.storage.len() / PAGE_SIZE
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames.len()
    }
}

impl MemoryDeviceModule for ArrayMemoryDevice {
    fn read(&mut self, addr: usize) -> Result<u8> {
        self.storage
            .get(addr)
            .copied()
            .ok_or(MemError::OutOfRange)
    }

    fn write(&mut self, addr: usize, value: u8) -> Result<()> {
        match self.storage.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(MemError::OutOfRange),
        }
    }

    fn get_free_frame(&mut self) -> Result<usize> {
        self.free_frames
            .pop_front()
            .ok_or(MemError::FramesExhausted)
    }

    fn put_free_frame(&mut self, frame: usize) {
        self.free_frames.push_back(frame);
    }

    fn max_size(&self) -> usize {
        self.storage.len()
    }
}
