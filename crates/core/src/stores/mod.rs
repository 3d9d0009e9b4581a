pub mod memory;
pub mod opensearch;

pub use memory::MemoryIndex;
pub use opensearch::OpenSearchStore;
