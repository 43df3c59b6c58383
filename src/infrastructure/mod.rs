pub mod clock;
pub mod console;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
