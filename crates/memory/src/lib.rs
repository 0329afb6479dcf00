//! Resol Memory - semantic memory over a vector index
//!
//! Responsibilities:
//! - `VectorIndex`: the contract a backing similarity store must implement
//! - `SemanticMemory`: distance→relevance conversion, filtered retrieval,
//!   chunked ingestion and controlled depuration
//! - `InMemoryIndex`: reference backend for tests and single-node demos
//!
//! Design principles:
//! - Retrieval failure degrades to "no prior knowledge found", never a crash
//! - Every backend error kind is mapped to an explicit degraded result

mod in_memory;
mod index;
mod semantic;

pub use in_memory::*;
pub use index::*;
pub use semantic::*;
