//! Resol Core - shared domain model
//!
//! Contains:
//! - Checkpoint/Attempt: cycle state machine data model
//! - Version: area-scoped knowledge version records
//! - Document: memory entry metadata and relevance results
//! - TextGenerator: opaque prompt-to-text contract
//! - Text helpers: keywords, titles, numbered lists

mod checkpoint;
mod config;
mod document;
mod generate;
mod text;
mod version;

pub use checkpoint::*;
pub use config::*;
pub use document::*;
pub use generate::*;
pub use text::*;
pub use version::*;
