use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

use super::MemoryDeviceModule;

/// Clonable handle that lets several worker threads drive one physical
/// device. Each trait call locks only for its own duration, so no
/// address-space lock is ever held across more than one device
/// operation.
pub struct SharedMemoryDevice<D: MemoryDeviceModule> {
    inner: Arc<Mutex<D>>,
}

impl<D: MemoryDeviceModule> SharedMemoryDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, D> {
        // a panicked writer leaves byte storage intact, keep going
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<D: MemoryDeviceModule> Clone for SharedMemoryDevice<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: MemoryDeviceModule> MemoryDeviceModule for SharedMemoryDevice<D> {
    fn read(&mut self, addr: usize) -> Result<u8> {
        self.lock().read(addr)
    }

    fn write(&mut self, addr: usize, value: u8) -> Result<()> {
        self.lock().write(addr, value)
    }

    fn get_free_frame(&mut self) -> Result<usize> {
        self.lock().get_free_frame()
    }

    fn put_free_frame(&mut self, frame: usize) {
        self.lock().put_free_frame(frame)
    }

    fn max_size(&self) -> usize {
        self.lock().max_size()
    }
}
