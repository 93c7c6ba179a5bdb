//! Infrastructure adapters for record storage and filesystem access.

pub mod fs;
pub mod store;

pub use fs::{InMemoryFileSystem, LocalFileSystem};
pub use store::{InMemoryStore, JsonlStore};
