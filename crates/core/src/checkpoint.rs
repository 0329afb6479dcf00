//! Checkpoint and attempt types for the resolution cycle
//!
//! A checkpoint is a saved point in a problem-solving session. Attempts are
//! declared before execution and stamped with an outcome afterwards. Failures,
//! the final closure and an abandonment record live as explicit fields rather
//! than an open metadata map, so their shape is checked at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub Uuid);

impl CheckpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an attempt within a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checkpoint lifecycle state
///
/// `Active` is the only initial state; the other three are terminal for the
/// checkpoint itself (continuation happens through a child checkpoint linked
/// via `parent_id`). Wire names match the deployed Spanish values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointState {
    #[serde(rename = "activo")]
    Active,
    #[serde(rename = "resuelto")]
    Resolved,
    #[serde(rename = "rollback")]
    RolledBack,
    #[serde(rename = "abandonado")]
    Abandoned,
}

impl CheckpointState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckpointState::Active)
    }
}

impl std::fmt::Display for CheckpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckpointState::Active => "activo",
            CheckpointState::Resolved => "resuelto",
            CheckpointState::RolledBack => "rollback",
            CheckpointState::Abandoned => "abandonado",
        };
        write!(f, "{s}")
    }
}

/// Phase of the resolution cycle a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    #[serde(rename = "BEFORE")]
    Before,
    #[serde(rename = "DURING")]
    During,
    #[serde(rename = "AFTER")]
    After,
}

impl CyclePhase {
    /// The guiding question each phase answers, as deployed
    pub fn question(&self) -> &'static str {
        match self {
            CyclePhase::Before => "¿Dónde estoy?",
            CyclePhase::During => "¿Cómo falla?",
            CyclePhase::After => "¿Qué aprendí?",
        }
    }
}

/// The four working axioms of the resolution method
///
/// Every cycle result is stamped with the axiom it applies, so operators see
/// the method alongside the data. Wire values are the deployed Spanish texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axiom {
    #[serde(rename = "Asume fracaso - Diseña desde el error")]
    AssumeFailure,
    #[serde(rename = "No hay meta final - Solo siguiente iteración")]
    NoFinalGoal,
    #[serde(rename = "Todo colapsa - Prepárate para ello")]
    EverythingCollapses,
    #[serde(rename = "Error = dato - Los fallos son información")]
    ErrorIsData,
}

impl Axiom {
    /// Catalog position, 0-based
    pub fn number(&self) -> u8 {
        match self {
            Axiom::AssumeFailure => 0,
            Axiom::NoFinalGoal => 1,
            Axiom::EverythingCollapses => 2,
            Axiom::ErrorIsData => 3,
        }
    }

    /// Look up an axiom by catalog number
    pub fn from_number(n: u8) -> Option<Axiom> {
        match n {
            0 => Some(Axiom::AssumeFailure),
            1 => Some(Axiom::NoFinalGoal),
            2 => Some(Axiom::EverythingCollapses),
            3 => Some(Axiom::ErrorIsData),
            _ => None,
        }
    }

    /// Operator-facing text, as deployed
    pub fn text(&self) -> &'static str {
        match self {
            Axiom::AssumeFailure => "Asume fracaso - Diseña desde el error",
            Axiom::NoFinalGoal => "No hay meta final - Solo siguiente iteración",
            Axiom::EverythingCollapses => "Todo colapsa - Prepárate para ello",
            Axiom::ErrorIsData => "Error = dato - Los fallos son información",
        }
    }
}

impl std::fmt::Display for Axiom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Outcome recorded for an attempt, set at most once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub text: String,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// One declared action within a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub declared_at: DateTime<Utc>,
    /// What will be tried, declared before execution
    pub action: String,
    pub expectation: Option<String>,
    /// `None` until the outcome is registered
    pub outcome: Option<AttemptOutcome>,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.outcome.as_ref().map(|o| o.success).unwrap_or(false)
    }
}

/// A recorded failure; failures are additive and never overwritten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
    pub recoverable: bool,
}

/// Attempt statistics computed at closure time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureStats {
    pub total_attempts: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Terminal record of a checkpoint: what happened and what was learned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Closure {
    pub at: DateTime<Utc>,
    pub final_result: String,
    pub lesson_learned: String,
    /// Memory entry ids purged as part of this closure
    pub depurated: Vec<String>,
    /// Version strings this closure produced or carried forward
    pub inherited: Vec<String>,
    pub stats: ClosureStats,
}

/// Reason a checkpoint was abandoned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Abandonment {
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// A saved point in a problem-solving session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub area: String,
    pub reported_by: String,
    pub state: CheckpointState,
    /// Rollback is only meaningful when there is a parent to return to
    pub parent_id: Option<CheckpointId>,
    pub attempts: Vec<Attempt>,
    pub failures: Vec<FailureRecord>,
    pub closure: Option<Closure>,
    pub abandonment: Option<Abandonment>,
    /// Caller-supplied context, kept opaque
    #[serde(default)]
    pub annotations: serde_json::Map<String, serde_json::Value>,
}

impl Checkpoint {
    pub fn can_rollback(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn attempt(&self, id: AttemptId) -> Option<&Attempt> {
        self.attempts.iter().find(|a| a.id == id)
    }

    /// Duration from creation to closure, if the checkpoint was closed
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.closure.as_ref().map(|c| c.at - self.created_at)
    }

    pub fn stats(&self) -> ClosureStats {
        let succeeded = self.attempts.iter().filter(|a| a.succeeded()).count();
        ClosureStats {
            total_attempts: self.attempts.len(),
            succeeded,
            failed: self.attempts.len() - succeeded,
        }
    }
}

/// Next-step option offered after a failed attempt or recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Reduce scope and keep going
    Degrade,
    /// New attempt with an adjustment
    Iterate,
    /// Return to the parent checkpoint
    Rollback,
    /// Hand off to a supervisor
    Escalate,
    /// Record as a special case and stop
    DocumentSpecialCase,
}

impl NextStep {
    /// Options after `record_outcome(success = false)` or a recoverable failure
    pub fn recoverable_options() -> Vec<NextStep> {
        vec![NextStep::Degrade, NextStep::Iterate, NextStep::Rollback]
    }

    /// Options after an unrecoverable failure
    pub fn unrecoverable_options() -> Vec<NextStep> {
        vec![NextStep::Escalate, NextStep::DocumentSpecialCase]
    }

    /// Operator-facing description, as deployed
    pub fn description(&self) -> &'static str {
        match self {
            NextStep::Degrade => "Reducir alcance y continuar",
            NextStep::Iterate => "Nuevo intento con ajuste",
            NextStep::Rollback => "Volver al checkpoint anterior",
            NextStep::Escalate => "Escalar a supervisor",
            NextStep::DocumentSpecialCase => "Documentar como caso especial",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminal() {
        assert!(!CheckpointState::Active.is_terminal());
        assert!(CheckpointState::Resolved.is_terminal());
        assert!(CheckpointState::RolledBack.is_terminal());
        assert!(CheckpointState::Abandoned.is_terminal());
    }

    #[test]
    fn test_state_wire_names() {
        let json = serde_json::to_string(&CheckpointState::RolledBack).unwrap();
        assert_eq!(json, "\"rollback\"");
        let parsed: CheckpointState = serde_json::from_str("\"activo\"").unwrap();
        assert_eq!(parsed, CheckpointState::Active);
    }

    #[test]
    fn test_phase_questions() {
        assert_eq!(CyclePhase::Before.question(), "¿Dónde estoy?");
        assert_eq!(CyclePhase::During.question(), "¿Cómo falla?");
        assert_eq!(CyclePhase::After.question(), "¿Qué aprendí?");
    }

    #[test]
    fn test_axiom_catalog_lookup() {
        assert_eq!(Axiom::from_number(0), Some(Axiom::AssumeFailure));
        assert_eq!(Axiom::from_number(3), Some(Axiom::ErrorIsData));
        assert_eq!(Axiom::from_number(4), None);
        assert_eq!(Axiom::ErrorIsData.number(), 3);
    }

    #[test]
    fn test_axiom_wire_values_are_the_texts() {
        let json = serde_json::to_string(&Axiom::EverythingCollapses).unwrap();
        assert_eq!(json, "\"Todo colapsa - Prepárate para ello\"");
        assert_eq!(
            Axiom::NoFinalGoal.to_string(),
            "No hay meta final - Solo siguiente iteración"
        );
    }

    #[test]
    fn test_next_step_option_sets() {
        assert_eq!(NextStep::recoverable_options().len(), 3);
        assert_eq!(
            NextStep::unrecoverable_options(),
            vec![NextStep::Escalate, NextStep::DocumentSpecialCase]
        );
    }

    #[test]
    fn test_next_step_wire_names() {
        let json = serde_json::to_string(&NextStep::DocumentSpecialCase).unwrap();
        assert_eq!(json, "\"document_special_case\"");
    }
}
