//! Storage backends.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub use memory::MemoryBackend;

#[cfg(feature = "file")]
pub use file::FileBackend;
