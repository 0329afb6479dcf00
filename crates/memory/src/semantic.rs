//! Semantic memory wrapper
//!
//! Sits between the orchestrator and the vector index. Converts raw distances
//! to normalized relevance, applies metadata filters, and maps every backend
//! error to a degraded-but-non-fatal result: search degrades to an empty
//! sequence, store to `stored: false`, count to 0.

use crate::index::{IndexEntry, IndexError, MetadataFilter, VectorIndex};
use chrono::Utc;
use resol_core::{ChunkParams, DocMetadata, RelevanceHit, SearchParams};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Memory operation errors that are surfaced to the caller
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Guard against accidental full-collection deletes
    #[error("no ids given for depuration")]
    EmptyDepurationList,

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result of a store operation; backend failure shows as `stored: false`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub id: String,
    pub stored: bool,
    pub total_in_memory: u64,
    pub error: Option<String>,
}

/// Result of a chunked ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub base_id: String,
    pub chunks_stored: u32,
    pub total_chunks: u32,
    pub errors: Vec<String>,
}

/// Result of an update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReceipt {
    pub id: String,
    pub updated: bool,
    pub error: Option<String>,
}

/// Result of a depuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepurationReceipt {
    pub deleted_count: usize,
    pub deleted_ids: Vec<String>,
    pub total_in_memory: u64,
}

/// Memory corpus statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total_documents: u64,
    /// "vacia" when empty, "activo" otherwise
    pub status: String,
    pub per_kind: HashMap<String, u64>,
    pub per_area: HashMap<String, u64>,
}

/// Semantic memory over a backing vector index
pub struct SemanticMemory {
    index: Arc<dyn VectorIndex>,
    chunking: ChunkParams,
}

impl SemanticMemory {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            chunking: ChunkParams::default(),
        }
    }

    pub fn with_chunking(index: Arc<dyn VectorIndex>, chunking: ChunkParams) -> Self {
        Self { index, chunking }
    }

    /// Convert a raw store distance to normalized relevance in [0, 1]
    ///
    /// Consistent with a normalized L2 metric where 0 is identical and 2 is
    /// maximally distant.
    fn relevance_of(distance: f64) -> f64 {
        (1.0 - distance / 2.0).max(0.0)
    }

    /// Prefix an area tag to improve embedding-space locality
    fn enrich_query(query: &str, area: Option<&str>) -> String {
        match area {
            Some(area) => format!("[Área: {area}] {query}"),
            None => query.to_string(),
        }
    }

    fn build_filter(area: Option<&str>, kind: Option<&str>) -> Option<MetadataFilter> {
        if area.is_none() && kind.is_none() {
            return None;
        }
        Some(MetadataFilter {
            area: area.map(str::to_string),
            kind: kind.map(str::to_string),
            ..Default::default()
        })
    }

    /// Search for similar cases
    ///
    /// Returns hits at or above the relevance floor, ranked by descending
    /// relevance with 1-based positions from the candidate list. An empty or
    /// erroring backend yields an empty sequence, never an error.
    pub async fn search(
        &self,
        query: &str,
        area: Option<&str>,
        kind: Option<&str>,
        params: &SearchParams,
    ) -> Vec<RelevanceHit> {
        match self.index.count().await {
            Ok(0) => return Vec::new(),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "memory unavailable, degrading to empty search");
                return Vec::new();
            }
        }

        let enriched = Self::enrich_query(query, area);
        let filter = Self::build_filter(area, kind);

        let candidates = match self
            .index
            .query(&enriched, params.max_results, filter.as_ref())
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "search failed, degrading to empty result");
                return Vec::new();
            }
        };

        candidates
            .into_iter()
            .enumerate()
            .filter_map(|(i, hit)| {
                let relevance = Self::relevance_of(hit.distance);
                if relevance < params.relevance_floor {
                    return None;
                }
                Some(RelevanceHit {
                    id: Some(hit.id),
                    content: hit.document,
                    metadata: hit.metadata,
                    relevance,
                    rank: i + 1,
                })
            })
            .collect()
    }

    /// Store one document
    ///
    /// Stamps the metadata timestamp when absent and generates a
    /// timestamp-based id unless one is supplied.
    pub async fn store(
        &self,
        document: &str,
        mut metadata: DocMetadata,
        id_override: Option<String>,
    ) -> StoreReceipt {
        let id = id_override
            .unwrap_or_else(|| format!("pr_{}", Utc::now().format("%Y%m%d_%H%M%S_%f")));

        if metadata.timestamp.is_none() {
            metadata.timestamp = Some(Utc::now());
        }

        let entry = IndexEntry {
            id: id.clone(),
            document: document.to_string(),
            metadata,
        };

        match self.index.add(vec![entry]).await {
            Ok(()) => {
                debug!(%id, "knowledge inherited to memory");
                StoreReceipt {
                    id,
                    stored: true,
                    total_in_memory: self.count().await,
                    error: None,
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "store failed");
                StoreReceipt {
                    id,
                    stored: false,
                    total_in_memory: self.count().await,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Ingest a long document as fixed-size character chunks
    ///
    /// Chunks share the base id as prefix and carry 1-based chunk/total
    /// metadata so results can be re-grouped by the caller.
    pub async fn store_chunked(
        &self,
        document: &str,
        metadata: DocMetadata,
        base_id: Option<String>,
    ) -> IngestReceipt {
        let base_id = base_id
            .unwrap_or_else(|| format!("doc_{}", Utc::now().format("%Y%m%d_%H%M%S_%f")));

        let chars: Vec<char> = document.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(self.chunking.chunk_size.max(1))
            .map(|c| c.iter().collect())
            .collect();
        // An empty document yields no chunks; the receipt reports zero of zero
        // rather than claiming a chunk that was never written.
        let total = chunks.len() as u32;

        let mut stored = 0u32;
        let mut errors = Vec::new();

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut meta = metadata.clone();
            meta.chunk = Some(i as u32 + 1);
            meta.total_chunks = Some(total);

            let receipt = self
                .store(&chunk, meta, Some(format!("{base_id}_chunk_{}", i + 1)))
                .await;
            if receipt.stored {
                stored += 1;
            } else if let Some(err) = receipt.error {
                errors.push(err);
            }
        }

        IngestReceipt {
            base_id,
            chunks_stored: stored,
            total_chunks: total,
            errors,
        }
    }

    /// Replace text and/or metadata of an existing entry
    ///
    /// The update timestamp is stamped on the new metadata so corrections stay
    /// distinguishable from the original write.
    pub async fn update(
        &self,
        id: &str,
        document: Option<&str>,
        metadata: Option<DocMetadata>,
    ) -> UpdateReceipt {
        let metadata = metadata.map(|mut m| {
            m.updated_at = Some(Utc::now());
            m
        });

        match self
            .index
            .update(id, document.map(str::to_string), metadata)
            .await
        {
            Ok(()) => UpdateReceipt {
                id: id.to_string(),
                updated: true,
                error: None,
            },
            Err(e) => {
                warn!(%id, error = %e, "update failed");
                UpdateReceipt {
                    id: id.to_string(),
                    updated: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Delete obsolete entries by id
    ///
    /// Depuration is deliberate: an empty id list is rejected instead of being
    /// treated as "delete everything".
    pub async fn depurate(&self, ids: Vec<String>) -> Result<DepurationReceipt, MemoryError> {
        if ids.is_empty() {
            return Err(MemoryError::EmptyDepurationList);
        }

        let deleted_count = self.index.delete(&ids).await?;
        debug!(deleted = deleted_count, "depurated obsolete entries");

        Ok(DepurationReceipt {
            deleted_count,
            deleted_ids: ids,
            total_in_memory: self.count().await,
        })
    }

    /// Fetch one entry by id; `None` on missing or backend error
    pub async fn get(&self, id: &str) -> Option<IndexEntry> {
        match self.index.get(std::slice::from_ref(&id.to_string())).await {
            Ok(mut entries) => entries.pop(),
            Err(e) => {
                warn!(%id, error = %e, "get failed");
                None
            }
        }
    }

    /// Total documents in memory; 0 on any backend error
    pub async fn count(&self) -> u64 {
        self.index.count().await.unwrap_or(0)
    }

    /// Corpus statistics, computed by scanning all stored metadata
    ///
    /// Full scan is acceptable while the corpus stays small (thousands of
    /// cases); a large deployment should move this aggregation backend-side.
    pub async fn statistics(&self) -> MemoryStatistics {
        let total = self.count().await;
        if total == 0 {
            return MemoryStatistics {
                total_documents: 0,
                status: "vacia".to_string(),
                per_kind: HashMap::new(),
                per_area: HashMap::new(),
            };
        }

        let entries = match self.index.scan(None, usize::MAX).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "statistics scan failed");
                Vec::new()
            }
        };

        let mut per_kind = HashMap::new();
        let mut per_area = HashMap::new();
        for entry in &entries {
            let kind = entry
                .metadata
                .kind
                .clone()
                .unwrap_or_else(|| "desconocido".to_string());
            let area = entry
                .metadata
                .area
                .clone()
                .unwrap_or_else(|| "sin_area".to_string());
            *per_kind.entry(kind).or_insert(0) += 1;
            *per_area.entry(area).or_insert(0) += 1;
        }

        MemoryStatistics {
            total_documents: total,
            status: "activo".to_string(),
            per_kind,
            per_area,
        }
    }

    /// Metadata-filtered lookup; empty filter yields nothing
    pub async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Vec<IndexEntry> {
        if filter.is_empty() {
            return Vec::new();
        }
        match self.index.scan(Some(filter), limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "metadata search failed");
                Vec::new()
            }
        }
    }

    /// Format the top similar cases as a context block for text generation
    pub async fn context_for_prompt(&self, query: &str, max_cases: usize) -> String {
        let params = SearchParams {
            max_results: max_cases,
            ..SearchParams::default()
        };
        let cases = self.search(query, None, None, &params).await;

        if cases.is_empty() {
            return "No se encontraron casos similares en la base de conocimiento.".to_string();
        }

        let rule = "=".repeat(50);
        let mut context = format!("CASOS SIMILARES EN BASE DE CONOCIMIENTO:\n{rule}\n\n");

        for (i, case) in cases.iter().enumerate() {
            context.push_str(&format!(
                "--- Caso {} (Relevancia: {}) ---\n",
                i + 1,
                case.relevance_pct()
            ));
            if let Some(version) = &case.metadata.version {
                context.push_str(&format!("Versión: {version}\n"));
            }
            if let Some(area) = &case.metadata.area {
                context.push_str(&format!("Área: {area}\n"));
            }
            if let Some(fecha) = &case.metadata.timestamp {
                context.push_str(&format!("Fecha: {}\n", fecha.to_rfc3339()));
            }
            context.push_str(&format!("\n{}\n\n", case.content));
        }

        context.push_str(&format!("{rule}\n"));
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryIndex;
    use crate::index::{IndexHit, IndexResult};
    use async_trait::async_trait;

    /// Backend that fails every operation, for degraded-path tests
    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        async fn query(
            &self,
            _text: &str,
            _k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> IndexResult<Vec<IndexHit>> {
            Err(IndexError::Unavailable("down".into()))
        }
        async fn add(&self, _entries: Vec<IndexEntry>) -> IndexResult<()> {
            Err(IndexError::Unavailable("down".into()))
        }
        async fn update(
            &self,
            _id: &str,
            _document: Option<String>,
            _metadata: Option<DocMetadata>,
        ) -> IndexResult<()> {
            Err(IndexError::Unavailable("down".into()))
        }
        async fn delete(&self, _ids: &[String]) -> IndexResult<usize> {
            Err(IndexError::Unavailable("down".into()))
        }
        async fn get(&self, _ids: &[String]) -> IndexResult<Vec<IndexEntry>> {
            Err(IndexError::Unavailable("down".into()))
        }
        async fn scan(
            &self,
            _filter: Option<&MetadataFilter>,
            _limit: usize,
        ) -> IndexResult<Vec<IndexEntry>> {
            Err(IndexError::Unavailable("down".into()))
        }
        async fn count(&self) -> IndexResult<u64> {
            Err(IndexError::Unavailable("down".into()))
        }
    }

    fn seeded_memory() -> SemanticMemory {
        SemanticMemory::new(Arc::new(InMemoryIndex::new()))
    }

    async fn seed_case(memory: &SemanticMemory, id: &str, text: &str, area: &str) {
        let receipt = memory
            .store(
                text,
                DocMetadata {
                    kind: Some("caso_resuelto_pr".into()),
                    area: Some(area.into()),
                    version: Some(format!("{area}_v1.0")),
                    ..Default::default()
                },
                Some(id.to_string()),
            )
            .await;
        assert!(receipt.stored);
    }

    #[tokio::test]
    async fn test_search_empty_store_returns_empty() {
        let memory = seeded_memory();
        let hits = memory
            .search("porosidad", None, None, &SearchParams::default())
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_broken_backend_degrades_to_empty() {
        let memory = SemanticMemory::new(Arc::new(BrokenIndex));
        let hits = memory
            .search("porosidad", None, None, &SearchParams::default())
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_applies_floor_and_descending_order() {
        let memory = seeded_memory();
        seed_case(&memory, "a", "porosidad cordón soldadura gas protección", "SOLDADURA").await;
        seed_case(&memory, "b", "porosidad soldadura", "SOLDADURA").await;
        seed_case(&memory, "c", "fuga aceite prensa hidráulica bomba", "PRENSAS").await;

        let params = SearchParams {
            max_results: 10,
            relevance_floor: 0.3,
        };
        let hits = memory.search("porosidad soldadura", None, None, &params).await;

        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.relevance >= params.relevance_floor));
        for pair in hits.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
        assert_eq!(hits[0].id.as_deref(), Some("b"));
        assert_eq!(hits[0].rank, 1);
    }

    #[tokio::test]
    async fn test_search_area_filter() {
        let memory = seeded_memory();
        seed_case(&memory, "a", "porosidad soldadura", "SOLDADURA").await;
        seed_case(&memory, "b", "porosidad pintura", "PINTURA").await;

        let params = SearchParams {
            max_results: 10,
            relevance_floor: 0.0,
        };
        let hits = memory
            .search("porosidad", Some("PINTURA"), None, &params)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.area.as_deref(), Some("PINTURA"));
    }

    #[tokio::test]
    async fn test_store_stamps_timestamp_and_counts() {
        let memory = seeded_memory();
        let receipt = memory
            .store("caso de prueba", DocMetadata::default(), None)
            .await;
        assert!(receipt.stored);
        assert!(receipt.id.starts_with("pr_"));
        assert_eq!(receipt.total_in_memory, 1);

        let entry = memory.get(&receipt.id).await.unwrap();
        assert!(entry.metadata.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_fatal() {
        let memory = SemanticMemory::new(Arc::new(BrokenIndex));
        let receipt = memory
            .store("caso", DocMetadata::default(), Some("x".into()))
            .await;
        assert!(!receipt.stored);
        assert!(receipt.error.is_some());
    }

    #[tokio::test]
    async fn test_store_chunked_shares_prefix() {
        let index = Arc::new(InMemoryIndex::new());
        let memory = SemanticMemory::with_chunking(index, ChunkParams { chunk_size: 10 });

        let receipt = memory
            .store_chunked(
                "abcdefghijklmnopqrstuvwxy",
                DocMetadata::default(),
                Some("doc_1".into()),
            )
            .await;
        assert_eq!(receipt.total_chunks, 3);
        assert_eq!(receipt.chunks_stored, 3);

        let second = memory.get("doc_1_chunk_2").await.unwrap();
        assert_eq!(second.document, "klmnopqrst");
        assert_eq!(second.metadata.chunk, Some(2));
        assert_eq!(second.metadata.total_chunks, Some(3));
    }

    #[tokio::test]
    async fn test_store_chunked_empty_document_reports_zero_chunks() {
        let index = Arc::new(InMemoryIndex::new());
        let memory = SemanticMemory::with_chunking(index, ChunkParams { chunk_size: 10 });

        let receipt = memory
            .store_chunked("", DocMetadata::default(), Some("doc_vacio".into()))
            .await;
        assert_eq!(receipt.total_chunks, 0);
        assert_eq!(receipt.chunks_stored, 0);
        assert!(receipt.errors.is_empty());
        assert_eq!(memory.count().await, 0);
    }

    #[tokio::test]
    async fn test_depurate_rejects_empty_list() {
        let memory = seeded_memory();
        let err = memory.depurate(Vec::new()).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyDepurationList));
    }

    #[tokio::test]
    async fn test_depurate_deletes_and_reports() {
        let memory = seeded_memory();
        seed_case(&memory, "a", "uno", "A").await;
        seed_case(&memory, "b", "dos", "A").await;

        let receipt = memory
            .depurate(vec!["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(receipt.deleted_count, 1);
        assert_eq!(receipt.total_in_memory, 1);
    }

    #[tokio::test]
    async fn test_count_zero_on_error() {
        let memory = SemanticMemory::new(Arc::new(BrokenIndex));
        assert_eq!(memory.count().await, 0);
    }

    #[tokio::test]
    async fn test_statistics_empty_and_active() {
        let memory = seeded_memory();
        let empty = memory.statistics().await;
        assert_eq!(empty.status, "vacia");
        assert_eq!(empty.total_documents, 0);

        seed_case(&memory, "a", "uno", "SOLDADURA").await;
        seed_case(&memory, "b", "dos", "SOLDADURA").await;
        seed_case(&memory, "c", "tres", "PINTURA").await;

        let stats = memory.statistics().await;
        assert_eq!(stats.status, "activo");
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.per_area.get("SOLDADURA"), Some(&2));
        assert_eq!(stats.per_kind.get("caso_resuelto_pr"), Some(&3));
    }

    #[tokio::test]
    async fn test_search_by_metadata_requires_filter() {
        let memory = seeded_memory();
        seed_case(&memory, "a", "uno", "SOLDADURA").await;

        assert!(memory
            .search_by_metadata(&MetadataFilter::default(), 10)
            .await
            .is_empty());

        let filter = MetadataFilter {
            area: Some("SOLDADURA".into()),
            ..Default::default()
        };
        assert_eq!(memory.search_by_metadata(&filter, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_context_for_prompt_sentinel_and_headers() {
        let memory = seeded_memory();
        let sentinel = memory.context_for_prompt("porosidad", 3).await;
        assert_eq!(
            sentinel,
            "No se encontraron casos similares en la base de conocimiento."
        );

        seed_case(&memory, "a", "porosidad cordón soldadura", "SOLDADURA").await;
        let context = memory.context_for_prompt("porosidad soldadura cordón", 3).await;
        assert!(context.contains("CASOS SIMILARES"));
        assert!(context.contains("--- Caso 1"));
        assert!(context.contains("Versión: SOLDADURA_v1.0"));
    }
}
