//! Asynchronous access to the resources of a book (timing documents, audio).

mod loader;

pub use loader::{DirectoryLoader, MemoryLoader, ResourceLoader};
