//! Checkpoint store and cycle operations
//!
//! All state lives in a single id-keyed map behind one mutex; read-modify-write
//! updates of attempts and outcomes are atomic with respect to that map. The
//! store is an explicit object with injectable construction, created once at
//! service start and torn down at shutdown with no durability guarantee.

use chrono::{DateTime, Utc};
use resol_core::{
    Abandonment, Attempt, AttemptId, AttemptOutcome, Axiom, Checkpoint, CheckpointId,
    CheckpointState, Closure, ClosureStats, CyclePhase, FailureRecord, NextStep,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cycle operation errors
///
/// Unknown ids are the only structural failures; everything else is recorded
/// as data so the operator is never blocked.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(CheckpointId),

    #[error("attempt not found: {0}")]
    AttemptNotFound(AttemptId),
}

/// Result of creating a checkpoint
///
/// Every cycle result carries the phase, the phase's guiding question, the
/// axiom being applied and an operator-facing message, as deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointCreated {
    pub id: CheckpointId,
    pub created_at: DateTime<Utc>,
    pub phase: CyclePhase,
    pub question: String,
    pub can_rollback: bool,
    pub axiom: Axiom,
    pub message: String,
}

/// Result of declaring an attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptDeclared {
    pub checkpoint_id: CheckpointId,
    pub attempt_id: AttemptId,
    pub phase: CyclePhase,
    pub question: String,
    pub action: String,
    /// 1-based position of the attempt within the checkpoint
    pub ordinal: usize,
    pub axiom: Axiom,
    pub message: String,
}

/// Result of registering an attempt outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecorded {
    pub checkpoint_id: CheckpointId,
    pub attempt_id: AttemptId,
    pub phase: CyclePhase,
    pub question: String,
    pub success: bool,
    pub outcome: String,
    pub axiom: Axiom,
    pub message: String,
    /// Empty on success, exactly the three recovery options on failure
    pub options: Vec<NextStep>,
}

/// Result of recording a failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecorded {
    pub checkpoint_id: CheckpointId,
    pub phase: CyclePhase,
    pub question: String,
    pub kind: String,
    pub detail: String,
    pub recoverable: bool,
    pub total_attempts: usize,
    pub axiom: Axiom,
    pub message: String,
    pub options: Vec<NextStep>,
}

/// Result of a rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub checkpoint_id: CheckpointId,
    pub phase: CyclePhase,
    pub question: String,
    pub previous_state: CheckpointState,
    pub new_state: CheckpointState,
    pub original_timestamp: DateTime<Utc>,
    pub axiom: Axiom,
    pub message: String,
}

/// Result of closing a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleClosed {
    pub checkpoint_id: CheckpointId,
    pub phase: CyclePhase,
    pub question: String,
    pub state: CheckpointState,
    pub final_result: String,
    pub lesson_learned: String,
    pub depurated: Vec<String>,
    pub inherited: Vec<String>,
    pub stats: ClosureStats,
    pub axiom: Axiom,
    pub message: String,
}

/// Result of abandoning a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonRecord {
    pub checkpoint_id: CheckpointId,
    pub state: CheckpointState,
    pub reason: String,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Full history of a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointHistory {
    pub checkpoint: Checkpoint,
    pub attempt_count: usize,
    pub current_state: CheckpointState,
    /// Present only when a closure record exists
    pub duration: Option<String>,
}

/// In-memory checkpoint store
///
/// Checkpoints are never physically deleted; abandoned and rolled-back entries
/// remain for audit.
#[derive(Debug, Default)]
pub struct CycleStore {
    checkpoints: Mutex<HashMap<CheckpointId, Checkpoint>>,
}

impl CycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CheckpointId, Checkpoint>> {
        // A poisoned map is still structurally consistent: every operation
        // completes its mutation before releasing the guard.
        match self.checkpoints.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create a checkpoint; always succeeds
    pub fn create_checkpoint(
        &self,
        description: &str,
        area: &str,
        reported_by: &str,
        parent_id: Option<CheckpointId>,
        annotations: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> CheckpointCreated {
        let checkpoint = Checkpoint {
            id: CheckpointId::new(),
            created_at: Utc::now(),
            description: description.to_string(),
            area: area.to_string(),
            reported_by: reported_by.to_string(),
            state: CheckpointState::Active,
            parent_id,
            attempts: Vec::new(),
            failures: Vec::new(),
            closure: None,
            abandonment: None,
            annotations: annotations.unwrap_or_default(),
        };

        let created = CheckpointCreated {
            id: checkpoint.id,
            created_at: checkpoint.created_at,
            phase: CyclePhase::Before,
            question: CyclePhase::Before.question().to_string(),
            can_rollback: checkpoint.can_rollback(),
            axiom: Axiom::AssumeFailure,
            message: "Checkpoint creado. Podemos volver a este punto si algo falla."
                .to_string(),
        };

        debug!(checkpoint = %checkpoint.id, area, "created checkpoint");
        self.lock().insert(checkpoint.id, checkpoint);
        created
    }

    /// Fetch a checkpoint by id
    pub fn get(&self, id: CheckpointId) -> Option<Checkpoint> {
        self.lock().get(&id).cloned()
    }

    /// Declare what will be tried next
    pub fn declare_attempt(
        &self,
        checkpoint_id: CheckpointId,
        action: &str,
        expectation: Option<&str>,
    ) -> Result<AttemptDeclared, CycleError> {
        let mut map = self.lock();
        let checkpoint = map
            .get_mut(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        let attempt = Attempt {
            id: AttemptId::new(),
            declared_at: Utc::now(),
            action: action.to_string(),
            expectation: expectation.map(str::to_string),
            outcome: None,
        };
        let attempt_id = attempt.id;
        checkpoint.attempts.push(attempt);

        let ordinal = checkpoint.attempts.len();
        Ok(AttemptDeclared {
            checkpoint_id,
            attempt_id,
            phase: CyclePhase::Before,
            question: CyclePhase::Before.question().to_string(),
            action: action.to_string(),
            ordinal,
            axiom: Axiom::AssumeFailure,
            message: format!("Intento #{ordinal} registrado: {action}"),
        })
    }

    /// Register the outcome of a declared attempt
    ///
    /// Outcome fields are set at most once; the first registration wins and
    /// later calls report the stored outcome instead of overwriting it.
    pub fn record_outcome(
        &self,
        checkpoint_id: CheckpointId,
        attempt_id: AttemptId,
        outcome: &str,
        success: bool,
    ) -> Result<OutcomeRecorded, CycleError> {
        let mut map = self.lock();
        let checkpoint = map
            .get_mut(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        let attempt = checkpoint
            .attempts
            .iter_mut()
            .find(|a| a.id == attempt_id)
            .ok_or(CycleError::AttemptNotFound(attempt_id))?;

        let recorded = match &attempt.outcome {
            Some(existing) => {
                warn!(attempt = %attempt_id, "outcome already registered, keeping first");
                existing.clone()
            }
            None => {
                let fresh = AttemptOutcome {
                    text: outcome.to_string(),
                    success,
                    recorded_at: Utc::now(),
                };
                attempt.outcome = Some(fresh.clone());
                fresh
            }
        };

        let (options, message) = if recorded.success {
            (Vec::new(), "Éxito registrado")
        } else {
            (
                NextStep::recoverable_options(),
                "Fallo registrado como dato útil",
            )
        };

        Ok(OutcomeRecorded {
            checkpoint_id,
            attempt_id,
            phase: CyclePhase::During,
            question: CyclePhase::During.question().to_string(),
            success: recorded.success,
            outcome: recorded.text,
            axiom: Axiom::ErrorIsData,
            message: message.to_string(),
            options,
        })
    }

    /// Record a failure; failures are additive and never overwrite
    pub fn record_failure(
        &self,
        checkpoint_id: CheckpointId,
        kind: &str,
        detail: &str,
        recoverable: bool,
    ) -> Result<FailureRecorded, CycleError> {
        let mut map = self.lock();
        let checkpoint = map
            .get_mut(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        checkpoint.failures.push(FailureRecord {
            at: Utc::now(),
            kind: kind.to_string(),
            detail: detail.to_string(),
            recoverable,
        });

        let options = if recoverable {
            NextStep::recoverable_options()
        } else {
            NextStep::unrecoverable_options()
        };

        Ok(FailureRecorded {
            checkpoint_id,
            phase: CyclePhase::During,
            question: CyclePhase::During.question().to_string(),
            kind: kind.to_string(),
            detail: detail.to_string(),
            recoverable,
            total_attempts: checkpoint.attempts.len(),
            axiom: Axiom::ErrorIsData,
            message: "Fallo registrado. Cada error es un dato valioso.".to_string(),
            options,
        })
    }

    /// Mark a checkpoint as rolled back
    ///
    /// Intentionally permitted from any state: a rollback is itself a recorded
    /// action and is not required to originate from `Active`.
    pub fn rollback(&self, checkpoint_id: CheckpointId) -> Result<RollbackRecord, CycleError> {
        let mut map = self.lock();
        let checkpoint = map
            .get_mut(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        let previous_state = checkpoint.state;
        checkpoint.state = CheckpointState::RolledBack;

        info!(checkpoint = %checkpoint_id, from = %previous_state, "rollback recorded");

        let short_id: String = checkpoint_id.to_string().chars().take(8).collect();
        Ok(RollbackRecord {
            checkpoint_id,
            phase: CyclePhase::Before,
            question: CyclePhase::Before.question().to_string(),
            previous_state,
            new_state: CheckpointState::RolledBack,
            original_timestamp: checkpoint.created_at,
            axiom: Axiom::EverythingCollapses,
            message: format!("Rollback ejecutado a checkpoint {short_id}..."),
        })
    }

    /// Close the cycle: record the final result and what was learned
    ///
    /// Callable regardless of prior closures; the latest call overwrites the
    /// closure record (last write wins, not additive).
    pub fn close(
        &self,
        checkpoint_id: CheckpointId,
        final_result: &str,
        lesson_learned: &str,
        depurate: Vec<String>,
        inherit: Vec<String>,
    ) -> Result<CycleClosed, CycleError> {
        let mut map = self.lock();
        let checkpoint = map
            .get_mut(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        let stats = checkpoint.stats();
        checkpoint.state = CheckpointState::Resolved;
        checkpoint.closure = Some(Closure {
            at: Utc::now(),
            final_result: final_result.to_string(),
            lesson_learned: lesson_learned.to_string(),
            depurated: depurate.clone(),
            inherited: inherit.clone(),
            stats,
        });

        info!(checkpoint = %checkpoint_id, inherited = inherit.len(), "cycle closed");

        Ok(CycleClosed {
            checkpoint_id,
            phase: CyclePhase::After,
            question: CyclePhase::After.question().to_string(),
            state: CheckpointState::Resolved,
            final_result: final_result.to_string(),
            lesson_learned: lesson_learned.to_string(),
            depurated: depurate,
            inherited: inherit,
            stats,
            axiom: Axiom::NoFinalGoal,
            message: "Ciclo cerrado. Conocimiento listo para heredar a siguiente versión."
                .to_string(),
        })
    }

    /// Abandon a checkpoint, documenting the reason for later analysis
    pub fn abandon(
        &self,
        checkpoint_id: CheckpointId,
        reason: &str,
    ) -> Result<AbandonRecord, CycleError> {
        let mut map = self.lock();
        let checkpoint = map
            .get_mut(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        let at = Utc::now();
        checkpoint.state = CheckpointState::Abandoned;
        checkpoint.abandonment = Some(Abandonment {
            at,
            reason: reason.to_string(),
        });

        Ok(AbandonRecord {
            checkpoint_id,
            state: CheckpointState::Abandoned,
            reason: reason.to_string(),
            at,
            message: "Checkpoint abandonado. Razón documentada para futuro análisis."
                .to_string(),
        })
    }

    /// Full history of one checkpoint
    pub fn history(&self, checkpoint_id: CheckpointId) -> Result<CheckpointHistory, CycleError> {
        let map = self.lock();
        let checkpoint = map
            .get(&checkpoint_id)
            .ok_or(CycleError::CheckpointNotFound(checkpoint_id))?;

        Ok(CheckpointHistory {
            attempt_count: checkpoint.attempts.len(),
            current_state: checkpoint.state,
            duration: checkpoint.duration().map(|d| format!("{d}")),
            checkpoint: checkpoint.clone(),
        })
    }

    /// List checkpoints, newest first
    ///
    /// Area matching is case-insensitive exact match.
    pub fn list(
        &self,
        state: Option<CheckpointState>,
        area: Option<&str>,
    ) -> Vec<Checkpoint> {
        let map = self.lock();
        let mut result: Vec<Checkpoint> = map
            .values()
            .filter(|cp| state.map_or(true, |s| cp.state == s))
            .filter(|cp| {
                area.map_or(true, |a| cp.area.eq_ignore_ascii_case(a))
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Number of checkpoints currently in the given state
    pub fn count_in_state(&self, state: CheckpointState) -> usize {
        self.lock().values().filter(|cp| cp.state == state).count()
    }
}
