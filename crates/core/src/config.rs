//! Tunable parameters for retrieval and ingestion
//!
//! The retrieval floor and routing gate are deliberate configuration, not
//! structural invariants: retrieval casts a wide net, the routing decision
//! applies a stricter bar.

use serde::{Deserialize, Serialize};

/// Parameters for a similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Candidates requested from the backing index
    pub max_results: usize,

    /// Minimum normalized relevance kept in results (0.0 - 1.0)
    pub relevance_floor: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_results: 5,
            relevance_floor: 0.4,
        }
    }
}

/// Fixed-size character chunking for long document ingestion
///
/// No semantic-boundary awareness; each chunk is independently addressable and
/// carries chunk/total metadata so callers can re-group results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Characters per chunk
    pub chunk_size: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self { chunk_size: 1500 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let p = SearchParams::default();
        assert_eq!(p.max_results, 5);
        assert!((p.relevance_floor - 0.4).abs() < f64::EPSILON);
    }
}
