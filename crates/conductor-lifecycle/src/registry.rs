//! ---
//! cnd_section: "03-lifecycle-management"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Subsystem contract and lifecycle driving."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::LifecycleError;
use crate::state::LifecycleState;
use crate::subsystem::BoxedSubsystem;

/// Outcome of the most recent reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileOutcome {
    /// Reconciliation returned the subsystem to service.
    Recovered,
    /// Reconciliation ran but the subsystem remains degraded.
    StillDegraded,
    /// The failure threshold was exceeded; reconciliation is no longer attempted.
    Abandoned,
}

impl ReconcileOutcome {
    /// Static label for logs and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Recovered => "recovered",
            ReconcileOutcome::StillDegraded => "still-degraded",
            ReconcileOutcome::Abandoned => "abandoned",
        }
    }
}

/// Ephemeral per-subsystem health bookkeeping.
///
/// Rebuilt on restart and never included in checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Lifecycle state at the last observation.
    pub last_observed: LifecycleState,
    /// Consecutive recoverable failures since the last successful reconcile.
    pub consecutive_failures: u32,
    /// Outcome of the most recent reconciliation attempt, if any.
    pub last_reconcile: Option<ReconcileOutcome>,
}

impl HealthRecord {
    fn new() -> Self {
        Self {
            last_observed: LifecycleState::Created,
            consecutive_failures: 0,
            last_reconcile: None,
        }
    }
}

/// Snapshot of a cell's bookkeeping, cheap to clone for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct CellStatus {
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Ephemeral health record.
    pub health: HealthRecord,
    /// Number of checkpoints taken from this subsystem.
    pub checkpoints_taken: u64,
}

/// Registration record for one managed subsystem.
///
/// The instance is exclusively owned by the orchestrator for its lifetime;
/// the `tokio` mutex doubles as the per-subsystem advisory lock required
/// before any lifecycle method is invoked. Status bookkeeping sits behind a
/// separate short-lived lock so observers never wait on a blocking call.
pub struct SubsystemCell {
    name: String,
    depends_on: Vec<String>,
    status: Mutex<CellStatus>,
    instance: Arc<tokio::sync::Mutex<BoxedSubsystem>>,
}

impl std::fmt::Debug for SubsystemCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemCell")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl SubsystemCell {
    /// Create the registration record; the subsystem starts in `Created`.
    pub fn new(name: impl Into<String>, depends_on: Vec<String>, instance: BoxedSubsystem) -> Self {
        Self {
            name: name.into(),
            depends_on,
            status: Mutex::new(CellStatus {
                state: LifecycleState::Created,
                health: HealthRecord::new(),
                checkpoints_taken: 0,
            }),
            instance: Arc::new(tokio::sync::Mutex::new(instance)),
        }
    }

    /// Unique subsystem name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared dependency names.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.status.lock().state
    }

    /// Clone the full bookkeeping snapshot.
    pub fn status(&self) -> CellStatus {
        self.status.lock().clone()
    }

    /// Handle to the per-subsystem advisory lock guarding the instance.
    pub fn instance(&self) -> Arc<tokio::sync::Mutex<BoxedSubsystem>> {
        self.instance.clone()
    }

    /// Move the subsystem to `next`, enforcing machine legality.
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        let mut status = self.status.lock();
        let previous = status.state;
        if !previous.can_transition(next) {
            return Err(LifecycleError::IllegalTransition {
                subsystem: self.name.clone(),
                from: previous,
                to: next,
            });
        }
        status.state = next;
        status.health.last_observed = next;
        debug!(subsystem = %self.name, from = %previous, to = %next, "lifecycle transition");
        Ok(previous)
    }

    /// Force the absorbing end state, bypassing legality checks.
    ///
    /// Returns `false` when the subsystem was already terminated.
    pub fn force_terminate(&self) -> bool {
        let mut status = self.status.lock();
        if status.state.is_terminal() {
            return false;
        }
        let previous = status.state;
        status.state = LifecycleState::Terminated;
        status.health.last_observed = LifecycleState::Terminated;
        warn!(subsystem = %self.name, from = %previous, "subsystem force-terminated");
        true
    }

    /// Return a subsystem whose restore payload was rejected to `Created`.
    pub fn reset_to_created(&self) {
        let mut status = self.status.lock();
        if status.state.is_terminal() {
            return;
        }
        status.state = LifecycleState::Created;
        status.health.last_observed = LifecycleState::Created;
    }

    /// Record one more consecutive recoverable failure; returns the new count.
    pub fn note_failure(&self) -> u32 {
        let mut status = self.status.lock();
        status.health.consecutive_failures += 1;
        status.health.consecutive_failures
    }

    /// Clear the consecutive failure counter after a successful reconcile.
    pub fn reset_failures(&self) {
        self.status.lock().health.consecutive_failures = 0;
    }

    /// Record the outcome of the latest reconciliation attempt.
    pub fn set_reconcile_outcome(&self, outcome: ReconcileOutcome) {
        self.status.lock().health.last_reconcile = Some(outcome);
    }

    /// Count a checkpoint taken from this subsystem.
    pub fn note_checkpoint(&self) {
        self.status.lock().checkpoints_taken += 1;
    }
}
