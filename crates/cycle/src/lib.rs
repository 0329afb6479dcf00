//! Resol Cycle - checkpoint state machine
//!
//! Responsibilities:
//! - Per-session checkpoints with declared attempts and outcomes
//! - Additive failure records and the terminal closure
//! - Rollback/abandon bookkeeping
//!
//! Design principles:
//! - Error = data: structurally valid but odd requests are recorded, not blocked
//! - Process-lifetime state; only closure outcomes that reach the version
//!   registry survive a restart

mod store;

pub use store::*;
