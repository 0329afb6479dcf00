//! Vector index contract
//!
//! The production backend is an external vector store; this trait is the
//! boundary. Distances are the store's native metric (normalized L2 assumed
//! by the relevance conversion in `SemanticMemory`).

use async_trait::async_trait;
use resol_core::DocMetadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index errors, mapped by `SemanticMemory` to degraded results
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// A stored entry: document text plus typed metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub document: String,
    pub metadata: DocMetadata,
}

/// One ranked candidate returned by a similarity query
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub document: String,
    pub metadata: DocMetadata,
    /// Raw distance in the store's native metric; lower is closer
    pub distance: f64,
}

/// Equality filter over metadata fields, AND-combined
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub kind: Option<String>,
    pub area: Option<String>,
    pub version: Option<String>,
    pub incident_id: Option<String>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.area.is_none()
            && self.version.is_none()
            && self.incident_id.is_none()
    }

    pub fn matches(&self, meta: &DocMetadata) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            match want {
                None => true,
                Some(w) => have.as_deref() == Some(w.as_str()),
            }
        }
        eq(&self.kind, &meta.kind)
            && eq(&self.area, &meta.area)
            && eq(&self.version, &meta.version)
            && eq(&self.incident_id, &meta.incident_id)
    }
}

/// Contract a backing similarity store must implement
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Similarity query: up to `k` candidates ranked by ascending distance
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<IndexHit>>;

    /// Add entries; ids must be fresh
    async fn add(&self, entries: Vec<IndexEntry>) -> IndexResult<()>;

    /// Replace document text and/or metadata of an existing entry
    async fn update(
        &self,
        id: &str,
        document: Option<String>,
        metadata: Option<DocMetadata>,
    ) -> IndexResult<()>;

    /// Delete entries by id; unknown ids are skipped
    async fn delete(&self, ids: &[String]) -> IndexResult<usize>;

    /// Fetch entries by id, in input order, skipping unknown ids
    async fn get(&self, ids: &[String]) -> IndexResult<Vec<IndexEntry>>;

    /// Metadata-filtered scan, up to `limit` entries
    async fn scan(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> IndexResult<Vec<IndexEntry>>;

    /// Total number of stored entries
    async fn count(&self) -> IndexResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_and_combination() {
        let meta = DocMetadata {
            kind: Some("caso_resuelto_pr".into()),
            area: Some("SOLDADURA".into()),
            ..Default::default()
        };

        let both = MetadataFilter {
            kind: Some("caso_resuelto_pr".into()),
            area: Some("SOLDADURA".into()),
            ..Default::default()
        };
        assert!(both.matches(&meta));

        let wrong_area = MetadataFilter {
            kind: Some("caso_resuelto_pr".into()),
            area: Some("PINTURA".into()),
            ..Default::default()
        };
        assert!(!wrong_area.matches(&meta));

        assert!(MetadataFilter::default().matches(&meta));
        assert!(MetadataFilter::default().is_empty());
    }
}
