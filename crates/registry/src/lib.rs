//! Resol Registry - durable per-area version numbering
//!
//! Responsibilities:
//! - Assign monotonically increasing `{AREA}_v{major}.{minor}` identifiers,
//!   one counter per canonical area
//! - Persist version records in SQLite behind a `UNIQUE(area, major, minor)`
//!   constraint
//! - Read operations: lookup, filtered listing, area history, keyword search,
//!   statistics, comparison
//!
//! Design principles:
//! - The read-increment-write sequence is the one correctness-critical path
//!   in the system; it is serialized behind an async lock and retried on
//!   constraint violation
//! - Versions are immutable once written; deletion exists only as an
//!   administrative escape hatch

mod store;

pub use store::*;
