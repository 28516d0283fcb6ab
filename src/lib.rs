mod address_space;
mod config;
mod error;
mod fault;
mod process;
mod pte;
mod tlb;
mod util;

#[cfg(test)]
mod test;

pub mod modules;

pub use address_space::{AddressSpace, Region, Vma};
pub use config::{ProcessConfig, MAX_PAGES, MAX_SYMBOLS, PAGE_NUMBER_BITS, PAGE_SHIFT, PAGE_SIZE};
pub use error::{MemError, Result};
pub use fault::PagingContext;
pub use process::Process;
pub use pte::{Pte, PteState};
pub use tlb::{TlbCache, TlbEntry};
