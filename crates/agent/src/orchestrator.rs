//! Resolution agent
//!
//! Entry points for the REST-layer collaborator:
//! - `receive_problem`: checkpoint + memory search + routing decision
//! - `resolve_incident`: version mint + knowledge write + cycle closure
//! - `query`: retrieval-augmented answer generation
//! - pass-throughs for version history, listings and statistics

use crate::incidents::{Incident, IncidentError, IncidentStatus, IncidentStore, Report};
use crate::prompts;
use chrono::{DateTime, Utc};
use resol_core::{
    extract_keywords, parse_numbered_list, short_title, Checkpoint, CheckpointId, CheckpointState,
    CyclePhase, DocMetadata, RelevanceHit, SearchParams, TextGenerator, VersionRecord,
};
use resol_cycle::{CheckpointHistory, CycleError, CycleStore};
use resol_memory::{MemoryStatistics, SemanticMemory};
use resol_registry::{
    AreaHistory, NewVersion, RegistryError, RegistryStatistics, VersionRegistry, GENERAL_AREA,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Document type tag for resolved cases written to memory
pub const RESOLVED_CASE_KIND: &str = "caso_resuelto_pr";

/// Version category for resolved cases
pub const RESOLVED_CASE_VERSION_KIND: &str = "caso_resuelto";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("incident not found: {0}")]
    IncidentNotFound(String),

    #[error("incident is not resolved yet: {0}")]
    IncidentNotResolved(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Incidents(#[from] IncidentError),
}

/// Routing and retrieval thresholds
///
/// The retrieval floor casts a wide net; the routing gate applies a stricter
/// bar before committing to the known-case flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub relevance_floor: f64,
    pub routing_gate: f64,
    /// Cases shown to the user in the known-case flow
    pub display_cases: usize,
    /// Cases handed to the similarity-analysis generation step
    pub analysis_cases: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            relevance_floor: 0.4,
            routing_gate: 0.6,
            display_cases: 5,
            analysis_cases: 3,
        }
    }
}

/// Action the user can take after seeing similar cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseAction {
    #[serde(rename = "aplicar_solucion")]
    ApplyPreviousSolution,
    #[serde(rename = "caso_diferente")]
    DifferentCase,
    #[serde(rename = "ver_mas")]
    ViewMore,
}

impl CaseAction {
    pub fn all() -> Vec<CaseAction> {
        vec![
            CaseAction::ApplyPreviousSolution,
            CaseAction::DifferentCase,
            CaseAction::ViewMore,
        ]
    }

    pub fn description(&self) -> &'static str {
        match self {
            CaseAction::ApplyPreviousSolution => "La solución anterior aplica",
            CaseAction::DifferentCase => "Mi caso es diferente",
            CaseAction::ViewMore => "Ver más detalles",
        }
    }
}

/// A similar case formatted for user display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub version: Option<String>,
    pub title: Option<String>,
    pub area: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub relevance: String,
    /// Truncated document text
    pub summary: String,
}

/// Known-case routing result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownCase {
    pub phase: CyclePhase,
    pub state: String,
    pub checkpoint_id: CheckpointId,
    pub incident_id: String,
    pub similar_cases: Vec<CaseSummary>,
    pub total_cases: usize,
    pub analysis: String,
    pub message: String,
    pub options: Vec<CaseAction>,
}

/// New-case routing result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    pub phase: CyclePhase,
    pub state: String,
    pub checkpoint_id: CheckpointId,
    pub incident_id: String,
    pub guiding_questions: Vec<String>,
    pub message: String,
    pub instructions: String,
}

/// Outcome of `receive_problem`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProblemDecision {
    KnownCase(KnownCase),
    NewCase(NewCase),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub problem: String,
    pub root_cause: String,
    pub solution: String,
    pub preventive_actions: String,
}

/// Outcome of `resolve_incident`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub phase: CyclePhase,
    pub state: String,
    pub incident_id: String,
    pub version: String,
    pub stored_in_memory: bool,
    pub total_in_memory: u64,
    pub message: String,
    pub summary: ResolutionSummary,
}

/// Answer to a free-form query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub similar_cases: Vec<RelevanceHit>,
    pub total_in_memory: u64,
    pub has_context: bool,
}

/// Generated 8D case report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub incident_id: String,
    pub document: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAdded {
    pub report_id: String,
    pub incident_id: String,
    pub message: String,
}

/// System-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatistics {
    pub memory: MemoryStatistics,
    pub versions: RegistryStatistics,
    pub active_checkpoints: usize,
}

/// Orchestrates cycle, memory, registry and incident tracking
pub struct ResolutionAgent {
    config: AgentConfig,
    cycle: Arc<CycleStore>,
    memory: Arc<SemanticMemory>,
    registry: Arc<VersionRegistry>,
    generator: Arc<dyn TextGenerator>,
    incidents: Arc<dyn IncidentStore>,
}

impl ResolutionAgent {
    pub fn new(
        cycle: Arc<CycleStore>,
        memory: Arc<SemanticMemory>,
        registry: Arc<VersionRegistry>,
        generator: Arc<dyn TextGenerator>,
        incidents: Arc<dyn IncidentStore>,
    ) -> Self {
        Self {
            config: AgentConfig::default(),
            cycle,
            memory,
            registry,
            generator,
            incidents,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cycle(&self) -> &CycleStore {
        &self.cycle
    }

    pub fn memory(&self) -> &SemanticMemory {
        &self.memory
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Entry point: a user reports a problem
    ///
    /// Creates a checkpoint, searches memory, and routes into the known-case
    /// flow iff any retrieved case clears the routing gate.
    pub async fn receive_problem(
        &self,
        description: &str,
        area: &str,
        user: &str,
        priority: &str,
        annotations: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ProblemDecision, AgentError> {
        let checkpoint = self
            .cycle
            .create_checkpoint(description, area, user, None, annotations);

        let params = SearchParams {
            max_results: self.config.display_cases,
            relevance_floor: self.config.relevance_floor,
        };
        let area_filter = (!area.is_empty()).then_some(area);
        let cases = self
            .memory
            .search(description, area_filter, None, &params)
            .await;

        let relevant = cases.iter().any(|c| c.relevance >= self.config.routing_gate);
        info!(
            checkpoint = %checkpoint.id,
            candidates = cases.len(),
            relevant,
            "routing decision"
        );

        if relevant {
            self.known_case_flow(checkpoint.id, cases, description, area, user, priority)
                .await
        } else {
            self.new_case_flow(checkpoint.id, description, area, user, priority)
                .await
        }
    }

    async fn known_case_flow(
        &self,
        checkpoint_id: CheckpointId,
        cases: Vec<RelevanceHit>,
        description: &str,
        area: &str,
        user: &str,
        priority: &str,
    ) -> Result<ProblemDecision, AgentError> {
        let similar_cases: Vec<CaseSummary> = cases
            .iter()
            .take(self.config.display_cases)
            .map(case_summary)
            .collect();

        let analysis_slice = &cases[..cases.len().min(self.config.analysis_cases)];
        let cases_block = prompts::format_cases_for_prompt(analysis_slice);
        let analysis = self
            .generate_text(
                prompts::SIMILARITY_ANALYSIS,
                &[
                    ("problema_nuevo", description),
                    ("casos_historicos", &cases_block),
                ],
            )
            .await
            .unwrap_or_else(|e| format!("No se pudo generar el análisis: {e}"));

        let incident_id = self
            .track_incident(description, area, user, priority, checkpoint_id)
            .await?;

        Ok(ProblemDecision::KnownCase(KnownCase {
            phase: CyclePhase::Before,
            state: "casos_encontrados".to_string(),
            checkpoint_id,
            incident_id,
            total_cases: cases.len(),
            similar_cases,
            analysis,
            message: prompts::msg_cases_found(cases.len()),
            options: CaseAction::all(),
        }))
    }

    async fn new_case_flow(
        &self,
        checkpoint_id: CheckpointId,
        description: &str,
        area: &str,
        user: &str,
        priority: &str,
    ) -> Result<ProblemDecision, AgentError> {
        let incident_id = self
            .track_incident(description, area, user, priority, checkpoint_id)
            .await?;

        let area_display = if area.is_empty() { "No especificada" } else { area };
        let guiding_questions = match self
            .generate_text(
                prompts::DOCUMENTATION_QUESTIONS,
                &[("descripcion", description), ("area", area_display)],
            )
            .await
        {
            Ok(text) => parse_numbered_list(&text),
            Err(e) => vec![format!("No se pudieron generar preguntas guía: {e}")],
        };

        Ok(ProblemDecision::NewCase(NewCase {
            phase: CyclePhase::During,
            state: "documentando_nuevo".to_string(),
            checkpoint_id,
            incident_id,
            guiding_questions,
            message: prompts::msg_no_cases(),
            instructions: prompts::msg_document_new(),
        }))
    }

    async fn track_incident(
        &self,
        description: &str,
        area: &str,
        user: &str,
        priority: &str,
        checkpoint_id: CheckpointId,
    ) -> Result<String, AgentError> {
        let incident = Incident::new(
            &short_title(description),
            description,
            (!area.is_empty()).then_some(area),
            priority,
            user,
            Some(checkpoint_id),
        );
        let id = incident.id.clone();
        self.incidents.create(incident).await?;
        Ok(id)
    }

    /// Close the loop: mint a version, inherit the knowledge, resolve the
    /// tracked incident
    pub async fn resolve_incident(
        &self,
        incident_id: &str,
        solution: &str,
        root_cause: &str,
        preventive_actions: &str,
        user: &str,
        store_in_memory: bool,
    ) -> Result<ResolutionOutcome, AgentError> {
        let incident = self
            .incidents
            .get(incident_id)
            .await?
            .ok_or_else(|| AgentError::IncidentNotFound(incident_id.to_string()))?;
        let reports = self.incidents.reports_for(incident_id).await?;

        let area = incident
            .area
            .clone()
            .unwrap_or_else(|| GENERAL_AREA.to_string());
        let keywords = extract_keywords(&format!(
            "{} {} {}",
            incident.description, solution, root_cause
        ));

        let mut request = NewVersion::new(&area, RESOLVED_CASE_VERSION_KIND);
        request.incident_id = Some(incident_id.to_string());
        request.description = Some(incident.title.clone());
        request.lesson_learned = Some(root_cause.to_string());
        request.keywords = keywords;
        let version = self.registry.create_version(request).await?;

        let document = build_knowledge_document(
            &incident,
            &reports,
            solution,
            root_cause,
            preventive_actions,
            &version.version_str,
            user,
        );

        let mut stored = false;
        if store_in_memory {
            let receipt = self
                .memory
                .store(
                    &document,
                    DocMetadata {
                        kind: Some(RESOLVED_CASE_KIND.to_string()),
                        version: Some(version.version_str.clone()),
                        area: Some(area.clone()),
                        title: Some(incident.title.clone()),
                        incident_id: Some(incident_id.to_string()),
                        resolved_by: Some(user.to_string()),
                        ..Default::default()
                    },
                    Some(format!("pr_{incident_id}")),
                )
                .await;
            stored = receipt.stored;
        }

        self.incidents
            .mark_resolved(incident_id, solution, &version.version_str, stored)
            .await?;

        if let Some(checkpoint_id) = incident.checkpoint_id {
            // In-flight cycles do not survive a restart; the resolution still
            // stands when the checkpoint is gone.
            if let Err(e) = self.cycle.close(
                checkpoint_id,
                "resuelto",
                root_cause,
                Vec::new(),
                vec![version.version_str.clone()],
            ) {
                warn!(incident = incident_id, error = %e, "checkpoint closure skipped");
            }
        }

        Ok(ResolutionOutcome {
            phase: CyclePhase::After,
            state: "conocimiento_heredado".to_string(),
            incident_id: incident_id.to_string(),
            stored_in_memory: stored,
            total_in_memory: self.memory.count().await,
            message: prompts::msg_cycle_closed(&version.version_str),
            summary: ResolutionSummary {
                problem: incident.title,
                root_cause: root_cause.to_string(),
                solution: solution.to_string(),
                preventive_actions: preventive_actions.to_string(),
            },
            version: version.version_str,
        })
    }

    /// Retrieval-augmented answer to a free-form question
    pub async fn query(
        &self,
        question: &str,
        area: Option<&str>,
        max_results: usize,
    ) -> QueryAnswer {
        let params = SearchParams {
            max_results,
            relevance_floor: self.config.relevance_floor,
        };
        let cases = self.memory.search(question, area, None, &params).await;

        let generated = if cases.is_empty() {
            self.generate_text(prompts::QUERY_WITHOUT_CONTEXT, &[("consulta", question)])
                .await
        } else {
            let context = self
                .memory
                .context_for_prompt(question, self.config.analysis_cases.min(cases.len()))
                .await;
            self.generate_text(
                prompts::QUERY_WITH_CONTEXT,
                &[("contexto", &context), ("consulta", question)],
            )
            .await
        };
        let answer = generated.unwrap_or_else(|e| format!("Error al generar la respuesta: {e}"));

        QueryAnswer {
            answer,
            has_context: !cases.is_empty(),
            total_in_memory: self.memory.count().await,
            similar_cases: cases,
        }
    }

    /// Attach a follow-up report to a tracked incident
    pub async fn add_report(
        &self,
        incident_id: &str,
        content: &str,
        author: &str,
    ) -> Result<ReportAdded, AgentError> {
        let report = Report {
            id: Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            at: Utc::now(),
        };
        let report_id = report.id.clone();
        self.incidents.add_report(report).await?;

        Ok(ReportAdded {
            report_id,
            incident_id: incident_id.to_string(),
            message: "Reporte agregado".to_string(),
        })
    }

    /// Generate an 8D document for a resolved incident
    pub async fn case_report(&self, incident_id: &str) -> Result<CaseReport, AgentError> {
        let incident = self
            .incidents
            .get(incident_id)
            .await?
            .ok_or_else(|| AgentError::IncidentNotFound(incident_id.to_string()))?;

        if incident.status != IncidentStatus::Resolved {
            return Err(AgentError::IncidentNotResolved(incident_id.to_string()));
        }

        let reports = self.incidents.reports_for(incident_id).await?;
        let reports_text = format_reports(&reports);
        let reports_text = if reports_text.is_empty() {
            "Sin reportes adicionales".to_string()
        } else {
            reports_text
        };

        let area = incident.area.as_deref().unwrap_or("No especificada");
        let solution = incident.solution.as_deref().unwrap_or("No documentada");
        let created = incident.created_at.to_rfc3339();
        let generated_at = Utc::now();
        let generated_stamp = generated_at.format("%Y-%m-%d %H:%M").to_string();

        let document = self
            .generate_text(
                prompts::CASE_REPORT_8D,
                &[
                    ("titulo", incident.title.as_str()),
                    ("area", area),
                    ("prioridad", incident.priority.as_str()),
                    ("fecha_creacion", created.as_str()),
                    ("descripcion", incident.description.as_str()),
                    ("reportes", reports_text.as_str()),
                    ("solucion", solution),
                    ("causa_raiz", "Por determinar en análisis"),
                    ("acciones_preventivas", "Por determinar"),
                    ("fecha_generacion", generated_stamp.as_str()),
                ],
            )
            .await
            .unwrap_or_else(|e| format!("No se pudo generar el documento 8D: {e}"));

        Ok(CaseReport {
            incident_id: incident_id.to_string(),
            document,
            generated_at,
        })
    }

    /// Combined statistics over memory, versions and live checkpoints
    pub async fn statistics(&self) -> Result<SystemStatistics, AgentError> {
        Ok(SystemStatistics {
            memory: self.memory.statistics().await,
            versions: self.registry.statistics().await?,
            active_checkpoints: self.cycle.count_in_state(CheckpointState::Active),
        })
    }

    pub async fn version_history(&self, area: &str) -> Result<AreaHistory, AgentError> {
        Ok(self.registry.history_for_area(area).await?)
    }

    pub async fn list_versions(
        &self,
        area: Option<&str>,
        kind: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VersionRecord>, AgentError> {
        Ok(self.registry.list_versions(area, kind, limit).await?)
    }

    pub fn list_checkpoints(
        &self,
        state: Option<CheckpointState>,
        area: Option<&str>,
    ) -> Vec<Checkpoint> {
        self.cycle.list(state, area)
    }

    pub fn checkpoint_history(
        &self,
        checkpoint_id: CheckpointId,
    ) -> Result<CheckpointHistory, AgentError> {
        Ok(self.cycle.history(checkpoint_id)?)
    }

    async fn generate_text(
        &self,
        template: &str,
        vars: &[(&str, &str)],
    ) -> Result<String, String> {
        let prompt = prompts::render(template, vars).map_err(|e| e.to_string())?;
        self.generator
            .generate(&prompt, Some(prompts::SYSTEM_PROMPT))
            .await
            .map_err(|e| e.to_string())
    }
}

fn case_summary(case: &RelevanceHit) -> CaseSummary {
    let chars: Vec<char> = case.content.chars().collect();
    let summary = if chars.len() > 500 {
        format!("{}...", chars[..500].iter().collect::<String>())
    } else {
        case.content.clone()
    };

    CaseSummary {
        version: case.metadata.version.clone(),
        title: case.metadata.title.clone(),
        area: case.metadata.area.clone(),
        date: case.metadata.timestamp,
        relevance: case.relevance_pct(),
        summary,
    }
}

fn format_reports(reports: &[Report]) -> String {
    reports
        .iter()
        .map(|r| format!("- {} ({}): {}", r.author, r.at.to_rfc3339(), r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structured knowledge document written to memory at resolution
fn build_knowledge_document(
    incident: &Incident,
    reports: &[Report],
    solution: &str,
    root_cause: &str,
    preventive_actions: &str,
    version: &str,
    resolved_by: &str,
) -> String {
    let rule_heavy = "═".repeat(58);
    let rule_light = "─".repeat(57);
    let reports_text = format_reports(reports);
    let reports_text = if reports_text.is_empty() {
        "Sin reportes adicionales"
    } else {
        &reports_text
    };
    let keywords = extract_keywords(&incident.description).join(", ");

    format!(
        "\n{rule_heavy}\nCASO RESUELTO: {version}\n{rule_heavy}\n\n\
         IDENTIFICACIÓN\n{rule_light}\n\
         Título: {title}\n\
         Área: {area}\n\
         Prioridad: {priority}\n\
         Fecha reporte: {created}\n\
         Fecha resolución: {resolved_at}\n\
         Resuelto por: {resolved_by}\n\n\
         DESCRIPCIÓN DEL PROBLEMA\n{rule_light}\n{description}\n\n\
         REPORTES DE INVOLUCRADOS\n{rule_light}\n{reports_text}\n\n\
         ANÁLISIS DE CAUSA RAÍZ\n{rule_light}\n{root_cause}\n\n\
         SOLUCIÓN APLICADA\n{rule_light}\n{solution}\n\n\
         ACCIONES PREVENTIVAS\n{rule_light}\n{preventive_actions}\n\n\
         APRENDIZAJE\n{rule_light}\n\
         - Este caso incrementó el conocimiento del sistema\n\
         - Versión: {version}\n\
         - Keywords: {keywords}\n\n\
         {rule_heavy}\n",
        title = incident.title,
        area = incident.area.as_deref().unwrap_or("No especificada"),
        priority = incident.priority,
        created = incident.created_at.to_rfc3339(),
        resolved_at = Utc::now().to_rfc3339(),
        description = incident.description,
    )
}
