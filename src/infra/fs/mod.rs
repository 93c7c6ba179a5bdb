//! Filesystem backends for the directory monitor.

pub mod local;
pub mod memory;

pub use local::LocalFileSystem;
pub use memory::InMemoryFileSystem;
