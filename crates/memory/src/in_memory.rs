//! In-memory vector index
//!
//! Reference backend for tests and single-node demos. Scores by token overlap
//! rather than a learned embedding, with distances kept in [0, 2] so the
//! relevance conversion behaves like the production store's normalized L2.

use crate::index::{IndexEntry, IndexError, IndexHit, IndexResult, MetadataFilter, VectorIndex};
use async_trait::async_trait;
use resol_core::DocMetadata;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-memory index implementation
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: Mutex<HashMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokenize(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3)
            .map(str::to_string)
            .collect()
    }

    /// Jaccard-style distance in [0, 2]: identical token sets score 0.0,
    /// disjoint sets score 2.0
    fn distance(query: &HashSet<String>, document: &str) -> f64 {
        let doc_tokens = Self::tokenize(document);
        if query.is_empty() || doc_tokens.is_empty() {
            return 2.0;
        }
        let shared = query.intersection(&doc_tokens).count() as f64;
        let union = query.union(&doc_tokens).count() as f64;
        2.0 * (1.0 - shared / union)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IndexEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<Vec<IndexHit>> {
        let query_tokens = Self::tokenize(text);
        let entries = self.lock();

        let mut hits: Vec<IndexHit> = entries
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| IndexHit {
                id: e.id.clone(),
                document: e.document.clone(),
                metadata: e.metadata.clone(),
                distance: Self::distance(&query_tokens, &e.document),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn add(&self, new_entries: Vec<IndexEntry>) -> IndexResult<()> {
        let mut entries = self.lock();
        for entry in &new_entries {
            if entries.contains_key(&entry.id) {
                return Err(IndexError::AlreadyExists(entry.id.clone()));
            }
        }
        for entry in new_entries {
            entries.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        document: Option<String>,
        metadata: Option<DocMetadata>,
    ) -> IndexResult<()> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;
        if let Some(doc) = document {
            entry.document = doc;
        }
        if let Some(meta) = metadata {
            entry.metadata = meta;
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> IndexResult<usize> {
        let mut entries = self.lock();
        Ok(ids.iter().filter(|id| entries.remove(*id).is_some()).count())
    }

    async fn get(&self, ids: &[String]) -> IndexResult<Vec<IndexEntry>> {
        let entries = self.lock();
        Ok(ids.iter().filter_map(|id| entries.get(id).cloned()).collect())
    }

    async fn scan(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> IndexResult<Vec<IndexEntry>> {
        let entries = self.lock();
        Ok(entries
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> IndexResult<u64> {
        Ok(self.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, document: &str, area: &str) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            document: document.to_string(),
            metadata: DocMetadata {
                area: Some(area.to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_overlap() {
        let index = InMemoryIndex::new();
        index
            .add(vec![
                entry("a", "porosidad en cordón de soldadura por gas", "SOLDADURA"),
                entry("b", "fuga de aceite en prensa hidráulica", "PRENSAS"),
            ])
            .await
            .unwrap();

        let hits = index
            .query("porosidad en soldadura", 5, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_respects_filter_and_k() {
        let index = InMemoryIndex::new();
        index
            .add(vec![
                entry("a", "porosidad en soldadura", "SOLDADURA"),
                entry("b", "grietas en soldadura", "SOLDADURA"),
                entry("c", "porosidad en pintura", "PINTURA"),
            ])
            .await
            .unwrap();

        let filter = MetadataFilter {
            area: Some("SOLDADURA".into()),
            ..Default::default()
        };
        let hits = index.query("porosidad", 1, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_id() {
        let index = InMemoryIndex::new();
        index.add(vec![entry("a", "x", "A")]).await.unwrap();
        let err = index.add(vec![entry("a", "y", "A")]).await.unwrap_err();
        assert!(matches!(err, IndexError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_and_get() {
        let index = InMemoryIndex::new();
        index.add(vec![entry("a", "antes", "A")]).await.unwrap();
        index
            .update("a", Some("después".into()), None)
            .await
            .unwrap();

        let got = index.get(&["a".to_string()]).await.unwrap();
        assert_eq!(got[0].document, "después");

        let err = index.update("missing", None, None).await.unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_counts_only_existing() {
        let index = InMemoryIndex::new();
        index.add(vec![entry("a", "x", "A"), entry("b", "y", "A")]).await.unwrap();
        let deleted = index
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distance_bounds() {
        let q = InMemoryIndex::tokenize("soldadura porosidad");
        assert!((InMemoryIndex::distance(&q, "soldadura porosidad") - 0.0).abs() < 1e-9);
        assert!((InMemoryIndex::distance(&q, "algo completamente distinto") - 2.0).abs() < 1e-9);
    }
}
