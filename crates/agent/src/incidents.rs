//! Tracked incident records and their reports
//!
//! Incidents are the durable tracking side of a cycle: they survive restarts
//! while checkpoints do not. The storage contract is a trait so the REST-layer
//! collaborator can back it with its own database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resol_core::CheckpointId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("incident not found: {0}")]
    NotFound(String),

    #[error("incident storage error: {0}")]
    Backend(String),
}

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    #[serde(rename = "abierta")]
    Open,
    #[serde(rename = "resuelto")]
    Resolved,
}

/// A tracked problem record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub area: Option<String>,
    pub priority: String,
    pub status: IncidentStatus,
    pub reported_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the incident was opened through a cycle checkpoint
    pub checkpoint_id: Option<CheckpointId>,
    pub solution: Option<String>,
    /// Version minted at resolution
    pub version: Option<String>,
    pub stored_in_memory: bool,
}

impl Incident {
    pub fn new(
        title: &str,
        description: &str,
        area: Option<&str>,
        priority: &str,
        reported_by: &str,
        checkpoint_id: Option<CheckpointId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            area: area.map(str::to_string),
            priority: priority.to_string(),
            status: IncidentStatus::Open,
            reported_by: reported_by.to_string(),
            created_at: now,
            updated_at: now,
            checkpoint_id,
            solution: None,
            version: None,
            stored_in_memory: false,
        }
    }
}

/// A follow-up report attached to an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub incident_id: String,
    pub author: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Durable incident storage contract
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create(&self, incident: Incident) -> Result<(), IncidentError>;

    async fn get(&self, id: &str) -> Result<Option<Incident>, IncidentError>;

    /// Mark resolved and record solution/version; errors when unknown
    async fn mark_resolved(
        &self,
        id: &str,
        solution: &str,
        version: &str,
        stored_in_memory: bool,
    ) -> Result<(), IncidentError>;

    /// Attach a report and bump the incident's update timestamp
    async fn add_report(&self, report: Report) -> Result<(), IncidentError>;

    /// Reports for an incident, oldest first
    async fn reports_for(&self, incident_id: &str) -> Result<Vec<Report>, IncidentError>;
}

#[derive(Debug, Default)]
struct IncidentState {
    incidents: HashMap<String, Incident>,
    reports: Vec<Report>,
}

/// In-memory incident store for tests and single-node demos
#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    state: Mutex<IncidentState>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IncidentState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn create(&self, incident: Incident) -> Result<(), IncidentError> {
        self.lock().incidents.insert(incident.id.clone(), incident);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Incident>, IncidentError> {
        Ok(self.lock().incidents.get(id).cloned())
    }

    async fn mark_resolved(
        &self,
        id: &str,
        solution: &str,
        version: &str,
        stored_in_memory: bool,
    ) -> Result<(), IncidentError> {
        let mut state = self.lock();
        let incident = state
            .incidents
            .get_mut(id)
            .ok_or_else(|| IncidentError::NotFound(id.to_string()))?;

        incident.status = IncidentStatus::Resolved;
        incident.solution = Some(solution.to_string());
        incident.version = Some(version.to_string());
        incident.stored_in_memory = stored_in_memory;
        incident.updated_at = Utc::now();
        Ok(())
    }

    async fn add_report(&self, report: Report) -> Result<(), IncidentError> {
        let mut state = self.lock();
        let incident = state
            .incidents
            .get_mut(&report.incident_id)
            .ok_or_else(|| IncidentError::NotFound(report.incident_id.clone()))?;
        incident.updated_at = Utc::now();
        state.reports.push(report);
        Ok(())
    }

    async fn reports_for(&self, incident_id: &str) -> Result<Vec<Report>, IncidentError> {
        let state = self.lock();
        let mut reports: Vec<Report> = state
            .reports
            .iter()
            .filter(|r| r.incident_id == incident_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.at.cmp(&b.at));
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_and_resolve() {
        let store = InMemoryIncidentStore::new();
        let incident = Incident::new(
            "Porosidad en soldadura...",
            "La soldadura tiene porosidad",
            Some("Soldadura"),
            "media",
            "Juan Pérez",
            None,
        );
        let id = incident.id.clone();
        store.create(incident).await.unwrap();

        let got = store.get(&id).await.unwrap().unwrap();
        assert_eq!(got.status, IncidentStatus::Open);
        assert!(got.version.is_none());

        store
            .mark_resolved(&id, "Ajustar flujo de gas", "SOLDADURA_v1.0", true)
            .await
            .unwrap();
        let resolved = store.get(&id).await.unwrap().unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert_eq!(resolved.version.as_deref(), Some("SOLDADURA_v1.0"));
        assert!(resolved.stored_in_memory);
    }

    #[tokio::test]
    async fn test_resolve_unknown_incident() {
        let store = InMemoryIncidentStore::new();
        let err = store
            .mark_resolved("missing", "x", "Y_v1.0", false)
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reports_ordered_oldest_first() {
        let store = InMemoryIncidentStore::new();
        let incident = Incident::new("t", "d", None, "media", "u", None);
        let id = incident.id.clone();
        store.create(incident).await.unwrap();

        for content in ["primero", "segundo"] {
            store
                .add_report(Report {
                    id: Uuid::new_v4().to_string(),
                    incident_id: id.clone(),
                    author: "Ana".into(),
                    content: content.into(),
                    at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let reports = store.reports_for(&id).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].content, "primero");

        let err = store
            .add_report(Report {
                id: Uuid::new_v4().to_string(),
                incident_id: "missing".into(),
                author: "Ana".into(),
                content: "x".into(),
                at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::NotFound(_)));
    }
}
