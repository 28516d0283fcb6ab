/// Failure categories surfaced by the memory core. A TLB miss is never
/// one of these, it is an ordinary `None` on the probe path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// Region id out of range, or the slot is the freed sentinel.
    InvalidRegion,
    /// No virtual memory area with that id.
    InvalidVma,
    /// The region id already holds a live allocation.
    RegionInUse,
    /// Zero-size allocation request.
    InvalidSize,
    /// Address or offset outside the addressed range.
    OutOfRange,
    /// Access to a page that was never mapped.
    PageNotMapped,
    /// Growing the area would overlap a sibling area.
    VmaOverlap,
    /// The device's free frame pool is empty.
    FramesExhausted,
    /// No free slot left on the swap device.
    SwapExhausted,
    /// The FIFO list yielded no resident victim page.
    NoVictim,
    /// A PTE names a swap device that does not exist.
    InvalidSwapDevice,
}

pub type Result<T> = core::result::Result<T, MemError>;
