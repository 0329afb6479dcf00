//! Memory entry metadata and relevance results
//!
//! Metadata is a small set of explicit optional fields instead of an open
//! string-keyed map; wire names keep the deployed Spanish keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a stored knowledge document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Document type, e.g. `caso_resuelto_pr` or `documento`
    #[serde(rename = "tipo", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(rename = "titulo", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Version string this document was inherited as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "fecha", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "fecha_actualizacion", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "incidencia_id", skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(rename = "resuelto_por", skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// 1-based chunk index when the document was split for ingestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
}

/// One similar case returned by a relevance search (ephemeral, not persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceHit {
    pub id: Option<String>,
    /// Document text
    pub content: String,
    pub metadata: DocMetadata,
    /// Normalized relevance in [0, 1], derived from the store distance
    pub relevance: f64,
    /// 1-based rank in the result sequence
    pub rank: usize,
}

impl RelevanceHit {
    /// Relevance as a display percentage, e.g. "87.5%"
    pub fn relevance_pct(&self) -> String {
        format!("{:.1}%", self.relevance * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_spanish_wire_names() {
        let meta = DocMetadata {
            kind: Some("caso_resuelto_pr".into()),
            title: Some("Porosidad en soldadura".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"tipo\""));
        assert!(json.contains("\"titulo\""));
        assert!(!json.contains("\"area\":null"));
    }

    #[test]
    fn test_relevance_pct() {
        let hit = RelevanceHit {
            id: None,
            content: String::new(),
            metadata: DocMetadata::default(),
            relevance: 0.875,
            rank: 1,
        };
        assert_eq!(hit.relevance_pct(), "87.5%");
    }
}
