//! Full resolution cycle: problem intake, attempts, resolution, inheritance

use async_trait::async_trait;
use resol_agent::{
    InMemoryIncidentStore, ProblemDecision, ResolutionAgent, RESOLVED_CASE_KIND,
};
use resol_core::{
    CheckpointState, CyclePhase, DocMetadata, GenerationError, TextGenerator,
};
use resol_cycle::CycleStore;
use resol_memory::{InMemoryIndex, SemanticMemory};
use resol_registry::VersionRegistry;
use std::sync::Arc;

struct ScriptedGenerator;

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _system: Option<&str>,
    ) -> Result<String, GenerationError> {
        if prompt.contains("genera preguntas clave") {
            Ok("1. ¿Cuándo empezó?\n2. ¿Qué se ha intentado?\n3. ¿Quién está involucrado?".into())
        } else {
            Ok("respuesta generada".into())
        }
    }
}

async fn build_agent() -> (tempfile::TempDir, ResolutionAgent) {
    let dir = tempfile::tempdir().unwrap();
    let registry = VersionRegistry::new(dir.path().join("versions.db"))
        .await
        .unwrap();
    let agent = ResolutionAgent::new(
        Arc::new(CycleStore::new()),
        Arc::new(SemanticMemory::new(Arc::new(InMemoryIndex::new()))),
        Arc::new(registry),
        Arc::new(ScriptedGenerator),
        Arc::new(InMemoryIncidentStore::new()),
    );
    (dir, agent)
}

#[tokio::test]
async fn test_full_cycle_from_problem_to_inherited_knowledge() {
    let (_dir, agent) = build_agent().await;

    // Intake: empty memory, so this is a new case
    let decision = agent
        .receive_problem(
            "La soldadura de la línea 3 presenta porosidad en el cordón",
            "Soldadura",
            "Juan Pérez",
            "alta",
            None,
        )
        .await
        .unwrap();

    let (checkpoint_id, incident_id) = match decision {
        ProblemDecision::NewCase(new_case) => {
            assert_eq!(new_case.phase, CyclePhase::During);
            assert_eq!(new_case.guiding_questions.len(), 3);
            (new_case.checkpoint_id, new_case.incident_id)
        }
        ProblemDecision::KnownCase(_) => panic!("memory is empty, expected new case"),
    };

    // During: attempts and a follow-up report
    let attempt = agent
        .cycle()
        .declare_attempt(checkpoint_id, "Revisar electrodos", None)
        .unwrap();
    agent
        .cycle()
        .record_outcome(checkpoint_id, attempt.attempt_id, "Sin cambios", false)
        .unwrap();
    let attempt = agent
        .cycle()
        .declare_attempt(
            checkpoint_id,
            "Ajustar flujo de gas de protección",
            Some("Eliminar la porosidad"),
        )
        .unwrap();
    agent
        .cycle()
        .record_outcome(checkpoint_id, attempt.attempt_id, "Porosidad eliminada", true)
        .unwrap();
    agent
        .add_report(&incident_id, "El lote de gas estaba contaminado", "Ana")
        .await
        .unwrap();

    // After: resolve and inherit
    let outcome = agent
        .resolve_incident(
            &incident_id,
            "Se ajustó el flujo de gas y se cambió el lote",
            "Gas de protección insuficiente",
            "Verificar flujo de gas cada turno",
            "Juan Pérez",
            true,
        )
        .await
        .unwrap();

    assert_eq!(outcome.phase, CyclePhase::After);
    assert_eq!(outcome.state, "conocimiento_heredado");
    assert_eq!(outcome.version, "SOLDADURA_v1.0");
    assert!(outcome.stored_in_memory);
    assert_eq!(outcome.total_in_memory, 1);

    // The knowledge document landed in memory under the incident-derived id
    let entry = agent.memory().get(&format!("pr_{incident_id}")).await.unwrap();
    assert!(entry.document.contains("CASO RESUELTO: SOLDADURA_v1.0"));
    assert_eq!(entry.metadata.kind.as_deref(), Some(RESOLVED_CASE_KIND));
    assert_eq!(entry.metadata.resolved_by.as_deref(), Some("Juan Pérez"));

    // The checkpoint closed with the version inherited and attempts counted
    let history = agent.checkpoint_history(checkpoint_id).unwrap();
    assert_eq!(history.current_state, CheckpointState::Resolved);
    let closure = history.checkpoint.closure.unwrap();
    assert_eq!(closure.inherited, vec!["SOLDADURA_v1.0".to_string()]);
    assert_eq!(closure.stats.total_attempts, 2);
    assert_eq!(closure.stats.succeeded, 1);

    // The registry recorded the lesson under the canonical area
    let version = agent
        .registry()
        .get_version("SOLDADURA_v1.0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        version.lesson_learned.as_deref(),
        Some("Gas de protección insuficiente")
    );
    assert!(version.keywords.contains(&"porosidad".to_string()));

    // Statistics see all three stores
    let stats = agent.statistics().await.unwrap();
    assert_eq!(stats.versions.total_versions, 1);
    assert_eq!(stats.memory.total_documents, 1);
    assert_eq!(stats.active_checkpoints, 0);

    // A second resolution in the same area bumps the minor
    let decision = agent
        .receive_problem("Grietas en el cordón", "Soldadura", "Ana", "media", None)
        .await
        .unwrap();
    let incident_id = match decision {
        ProblemDecision::NewCase(c) => c.incident_id,
        ProblemDecision::KnownCase(c) => c.incident_id,
    };
    let outcome = agent
        .resolve_incident(&incident_id, "s", "c", "p", "Ana", false)
        .await
        .unwrap();
    assert_eq!(outcome.version, "SOLDADURA_v1.1");
    assert!(!outcome.stored_in_memory);
}

#[tokio::test]
async fn test_known_case_routing_after_seeding_memory() {
    let (_dir, agent) = build_agent().await;

    let receipt = agent
        .memory()
        .store(
            "porosidad cordón soldadura gas protección insuficiente",
            DocMetadata {
                kind: Some(RESOLVED_CASE_KIND.into()),
                area: Some("Soldadura".into()),
                version: Some("SOLDADURA_v1.0".into()),
                title: Some("Porosidad en cordón".into()),
                ..Default::default()
            },
            Some("pr_base".into()),
        )
        .await;
    assert!(receipt.stored);

    let decision = agent
        .receive_problem(
            "porosidad cordón soldadura gas protección",
            "Soldadura",
            "Luis",
            "media",
            None,
        )
        .await
        .unwrap();

    match decision {
        ProblemDecision::KnownCase(known) => {
            assert_eq!(known.state, "casos_encontrados");
            assert_eq!(known.analysis, "respuesta generada");
            assert_eq!(
                known.similar_cases[0].version.as_deref(),
                Some("SOLDADURA_v1.0")
            );
        }
        ProblemDecision::NewCase(_) => panic!("expected known-case routing"),
    }

    // The same memory now provides context for queries
    let answer = agent
        .query("porosidad cordón soldadura gas protección", Some("Soldadura"), 5)
        .await;
    assert!(answer.has_context);
    assert_eq!(answer.answer, "respuesta generada");
}
