pub mod memory_device;
