//! Store backends.

pub mod file;
pub mod memory;

pub use file::JsonlStore;
pub use memory::InMemoryStore;
