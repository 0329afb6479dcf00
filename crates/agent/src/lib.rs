//! Resol Agent - orchestration of the resolution cycle
//!
//! Responsibilities:
//! - Route an incoming problem to the known-case or new-case flow based on a
//!   relevance gate over semantic memory
//! - Drive resolution to closure: mint a version, write the knowledge
//!   document to memory, close the checkpoint
//! - Answer free-form queries with or without retrieved context
//!
//! Design principles:
//! - Retrieval casts a wide net (floor 0.4); the routing decision applies a
//!   stricter bar (gate 0.6)
//! - Text generation is opaque: failures surface as error-flavored text, not
//!   typed errors
//! - Every entry point returns a plain structured result with no framework
//!   types

mod incidents;
mod orchestrator;
pub mod prompts;

pub use incidents::*;
pub use orchestrator::*;
