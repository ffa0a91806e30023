//! ---
//! cnd_section: "04-health-resilience"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Health probing and reconciliation."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use conductor_lifecycle::{
    call_with_deadline, LifecycleState, ReconcileOutcome, SubsystemCell, SubsystemFailure,
};

use crate::degradation::DegradationLevel;

/// Bounds on how persistently a degraded subsystem is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Reconciliation stops once consecutive recoverable failures exceed
    /// this count.
    pub failure_threshold: u32,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
        }
    }
}

/// What one monitoring sweep concluded about one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthOutcome {
    /// The probe succeeded and the subsystem is operational.
    Healthy,
    /// Reconciliation returned the subsystem to service this sweep.
    Recovered,
    /// Reconciliation ran but the subsystem remains degraded.
    StillDegraded,
    /// The failure threshold is exceeded; the subsystem stays degraded
    /// without further reconciliation attempts.
    Abandoned,
    /// A fatal fault or deadline overrun terminated the subsystem.
    TerminatedFatal,
}

/// Per-subsystem line of a [`HealthReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemHealth {
    /// Subsystem name.
    pub name: String,
    /// Lifecycle state after the sweep.
    pub state: LifecycleState,
    /// What the sweep concluded.
    pub outcome: HealthOutcome,
    /// Consecutive recoverable failures after the sweep.
    pub consecutive_failures: u32,
    /// Failure detail, when the probe or reconcile failed.
    pub detail: Option<String>,
}

/// Outcome of one full monitoring sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    /// One line per probed subsystem, in dependency order.
    pub observed: Vec<SubsystemHealth>,
}

impl HealthReport {
    /// Aggregate severity across the sweep.
    pub fn degradation(&self) -> DegradationLevel {
        self.observed
            .iter()
            .map(|entry| match entry.outcome {
                HealthOutcome::Healthy => DegradationLevel::Healthy,
                HealthOutcome::Recovered | HealthOutcome::StillDegraded => {
                    DegradationLevel::Degraded
                }
                HealthOutcome::Abandoned | HealthOutcome::TerminatedFatal => {
                    DegradationLevel::Critical
                }
            })
            .fold(DegradationLevel::Healthy, DegradationLevel::max)
    }

    /// Number of subsystems observed healthy.
    pub fn healthy_count(&self) -> usize {
        self.observed
            .iter()
            .filter(|entry| entry.outcome == HealthOutcome::Healthy)
            .count()
    }
}

/// Sweeps live subsystems, demoting, reconciling, and terminating as the
/// trichotomy of probe outcomes dictates.
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    policy: ReconcilePolicy,
    call_deadline: Option<Duration>,
}

impl HealthMonitor {
    /// Create a monitor with the given policy and optional per-call deadline.
    pub fn new(policy: ReconcilePolicy, call_deadline: Option<Duration>) -> Self {
        Self {
            policy,
            call_deadline,
        }
    }

    /// Probe every `Operational` and `Degraded` subsystem once.
    ///
    /// A recoverable probe failure demotes to `Degraded` and, while the
    /// consecutive failure count stays at or below the threshold, attempts
    /// a reconcile in the same sweep. A fatal failure or deadline overrun
    /// terminates the subsystem.
    pub async fn monitor_health(&self, cells: &[Arc<SubsystemCell>]) -> HealthReport {
        let mut report = HealthReport::default();
        for cell in cells {
            let state = cell.state();
            match state {
                LifecycleState::Operational | LifecycleState::Degraded => {}
                _ => continue,
            }
            let name = cell.name().to_owned();

            // Abandonment is checked before spending a probe on the cell.
            if state == LifecycleState::Degraded && self.is_abandoned(cell) {
                cell.set_reconcile_outcome(ReconcileOutcome::Abandoned);
                report.observed.push(self.entry(cell, HealthOutcome::Abandoned, None));
                continue;
            }

            debug!(subsystem = %name, state = %state, "probing subsystem");
            let probe = {
                let instance = cell.instance();
                let mut guard = instance.lock().await;
                call_with_deadline(self.call_deadline, guard.operate()).await
            };

            match probe {
                Ok(_) if state == LifecycleState::Operational => {
                    cell.reset_failures();
                    report.observed.push(self.entry(cell, HealthOutcome::Healthy, None));
                }
                Ok(_) => {
                    // Degraded but probing clean; let reconcile formalize the recovery.
                    let outcome = self.reconcile(cell).await;
                    report.observed.push(outcome);
                }
                Err(failure) if failure.is_fatal() => {
                    error!(subsystem = %name, error = %failure, "fatal fault; terminating subsystem");
                    self.terminate_quietly(cell).await;
                    report.observed.push(self.entry(
                        cell,
                        HealthOutcome::TerminatedFatal,
                        Some(failure.to_string()),
                    ));
                }
                Err(failure) => {
                    let count = cell.note_failure();
                    warn!(
                        subsystem = %name,
                        error = %failure,
                        consecutive = count,
                        "recoverable fault observed"
                    );
                    if state == LifecycleState::Operational {
                        if let Err(err) = cell.transition(LifecycleState::Degraded) {
                            error!(subsystem = %name, error = %err, "demotion rejected");
                        }
                    }
                    if count > self.policy.failure_threshold {
                        cell.set_reconcile_outcome(ReconcileOutcome::Abandoned);
                        report.observed.push(self.entry(
                            cell,
                            HealthOutcome::Abandoned,
                            Some(failure.to_string()),
                        ));
                    } else {
                        let outcome = self.reconcile(cell).await;
                        report.observed.push(outcome);
                    }
                }
            }
        }
        report
    }

    fn is_abandoned(&self, cell: &SubsystemCell) -> bool {
        cell.status().health.consecutive_failures > self.policy.failure_threshold
    }

    /// Drive one `Degraded -> Reconciling -> {Operational, Degraded}` pass.
    async fn reconcile(&self, cell: &SubsystemCell) -> SubsystemHealth {
        let name = cell.name().to_owned();
        if let Err(err) = cell.transition(LifecycleState::Reconciling) {
            error!(subsystem = %name, error = %err, "cannot enter reconciling");
            return self.entry(cell, HealthOutcome::StillDegraded, Some(err.to_string()));
        }
        let result = {
            let instance = cell.instance();
            let mut guard = instance.lock().await;
            call_with_deadline(self.call_deadline, guard.reconcile()).await
        };
        match result {
            Ok(()) => {
                if let Err(err) = cell.transition(LifecycleState::Operational) {
                    error!(subsystem = %name, error = %err, "recovery transition rejected");
                    return self.entry(cell, HealthOutcome::StillDegraded, Some(err.to_string()));
                }
                cell.reset_failures();
                cell.set_reconcile_outcome(ReconcileOutcome::Recovered);
                info!(subsystem = %name, "subsystem recovered");
                self.entry(cell, HealthOutcome::Recovered, None)
            }
            Err(failure) if failure.is_fatal() => {
                error!(subsystem = %name, error = %failure, "reconcile failed fatally; terminating");
                self.terminate_quietly(cell).await;
                self.entry(cell, HealthOutcome::TerminatedFatal, Some(failure.to_string()))
            }
            Err(failure) => {
                warn!(subsystem = %name, error = %failure, "reconcile left subsystem degraded");
                if let Err(err) = cell.transition(LifecycleState::Degraded) {
                    error!(subsystem = %name, error = %err, "demotion rejected");
                }
                cell.set_reconcile_outcome(ReconcileOutcome::StillDegraded);
                self.entry(
                    cell,
                    HealthOutcome::StillDegraded,
                    Some(failure.to_string()),
                )
            }
        }
    }

    async fn terminate_quietly(&self, cell: &SubsystemCell) {
        let result: Result<(), SubsystemFailure> = {
            let instance = cell.instance();
            let mut guard = instance.lock().await;
            call_with_deadline(self.call_deadline, guard.terminate()).await
        };
        if let Err(err) = result {
            warn!(subsystem = %cell.name(), error = %err, "terminate failed after fatal fault");
        }
        cell.force_terminate();
    }

    fn entry(
        &self,
        cell: &SubsystemCell,
        outcome: HealthOutcome,
        detail: Option<String>,
    ) -> SubsystemHealth {
        let status = cell.status();
        SubsystemHealth {
            name: cell.name().to_owned(),
            state: status.state,
            outcome,
            consecutive_failures: status.health.consecutive_failures,
            detail,
        }
    }
}
