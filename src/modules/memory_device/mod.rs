mod array_device;
mod shared;

pub use array_device::ArrayMemoryDevice;
pub use shared::SharedMemoryDevice;

use crate::config::{PAGE_SHIFT, PAGE_SIZE};
use crate::error::Result;

/// Byte-addressable physical memory with a free-frame pool, the
/// interface both RAM and the swap devices are driven through.
///
/// Addressing is purely by integer and the capacity is fixed at
/// construction; frame `f` covers the bytes
/// `[f * PAGE_SIZE, (f + 1) * PAGE_SIZE)`.
pub trait MemoryDeviceModule {
    fn read(&mut self, addr: usize) -> Result<u8>;

    fn write(&mut self, addr: usize, value: u8) -> Result<()>;

    /// Takes one frame out of the free pool.
    fn get_free_frame(&mut self) -> Result<usize>;

    /// Hands a frame back to the free pool.
    fn put_free_frame(&mut self, frame: usize);

    /// Total capacity in bytes.
    fn max_size(&self) -> usize;
}

/// Copies one page worth of bytes from `src_frame` on `src` to
/// `dst_frame` on `dst`; both ends of every swap transfer go through
/// this.
pub fn copy_page<S: MemoryDeviceModule, D: MemoryDeviceModule>(
    src: &mut S,
    src_frame: usize,
    dst: &mut D,
    dst_frame: usize,
) -> Result<()> {
    let src_base = src_frame << PAGE_SHIFT;
    let dst_base = dst_frame << PAGE_SHIFT;

    for offset in 0..PAGE_SIZE {
        let value = src.read(src_base + offset)?;
        dst.write(dst_base + offset, value)?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn get_test_device(frames: usize) -> ArrayMemoryDevice {
        ArrayMemoryDevice::new(frames * PAGE_SIZE)
    }

    #[test]
    fn test_copy_page() {
        let mut src = get_test_device(2);
        let mut dst = get_test_device(2);

        for offset in 0..PAGE_SIZE {
            src.write(PAGE_SIZE + offset, (offset * 7) as u8).unwrap();
        }

        copy_page(&mut src, 1, &mut dst, 0).unwrap();

        for offset in 0..PAGE_SIZE {
            assert_eq!(dst.read(offset).unwrap(), (offset * 7) as u8);
        }
    }
}
