//! ---
//! cnd_section: "01-core-functionality"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Primary orchestration and lifecycle management."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use conductor_checkpoint::{
    CheckpointStore, CheckpointSweep, RestoreError, RestoreReport, SystemSnapshot,
};
use conductor_common::config::OrchestratorConfig;
use conductor_graph::{DependencyGraph, RegistrationError};
use conductor_health::{DegradationLevel, HealthMonitor, HealthReport, ReconcilePolicy};
use conductor_lifecycle::{
    call_with_deadline, BootReport, BoxedSubsystem, LifecycleDriver, LifecycleError,
    LifecycleState, StatusMap, SubsystemCell, SubsystemFailure, TeardownReport,
};
use conductor_metrics::{OrchestratorMetrics, SharedRegistry};

use crate::state::{BootStatus, SubsystemState, SystemState};

/// Errors surfaced by the orchestrator facade.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Registration or dependency resolution failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// A lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// A snapshot was rejected before touching any subsystem.
    #[error(transparent)]
    Restore(#[from] RestoreError),
    /// Metrics registration failed during construction.
    #[error("metrics setup failed: {0}")]
    Metrics(String),
}

/// Aggregate `operate()` results across the assembly.
#[derive(Debug, Clone, Default)]
pub struct OperateReport {
    /// Status snapshots from subsystems that answered, in dependency order.
    pub statuses: IndexMap<String, StatusMap>,
    /// Subsystems whose `operate` call failed.
    pub failures: Vec<(String, SubsystemFailure)>,
}

/// Explicit orchestration value composing graph, driver, monitor, and store.
///
/// Lifecycle transitions are serialized through an internal driver gate;
/// health monitoring and checkpointing may run concurrently with each other
/// and with `operate`, each taking the per-subsystem advisory lock before
/// touching an instance.
pub struct Orchestrator {
    config: OrchestratorConfig,
    graph: RwLock<DependencyGraph>,
    cells: RwLock<IndexMap<String, Arc<SubsystemCell>>>,
    driver: LifecycleDriver,
    monitor: HealthMonitor,
    store: CheckpointStore,
    driver_gate: tokio::sync::Mutex<()>,
    shutdown: broadcast::Sender<()>,
    metrics: Option<OrchestratorMetrics>,
}

impl Orchestrator {
    /// Build an orchestrator from configuration, optionally instrumented.
    pub fn new(
        config: OrchestratorConfig,
        registry: Option<SharedRegistry>,
    ) -> Result<Self, OrchestratorError> {
        let metrics = match registry {
            Some(registry) => Some(
                OrchestratorMetrics::new(registry)
                    .map_err(|err| OrchestratorError::Metrics(err.to_string()))?,
            ),
            None => None,
        };
        let (shutdown, _) = broadcast::channel(16);
        let policy = ReconcilePolicy {
            failure_threshold: config.failure_threshold,
        };
        Ok(Self {
            driver: LifecycleDriver::new(config.call_deadline),
            monitor: HealthMonitor::new(policy, config.call_deadline),
            store: CheckpointStore::new(config.call_deadline, config.snapshot_retain),
            config,
            graph: RwLock::new(DependencyGraph::new()),
            cells: RwLock::new(IndexMap::new()),
            driver_gate: tokio::sync::Mutex::new(()),
            shutdown,
            metrics,
        })
    }

    /// The configuration this orchestrator was built from.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Register a subsystem under a unique name with its dependencies.
    ///
    /// Dependencies may name subsystems registered later; a registration
    /// that would close a cycle is rejected without side effects.
    pub fn register(
        &self,
        name: impl Into<String>,
        depends_on: Vec<String>,
        subsystem: BoxedSubsystem,
    ) -> Result<(), OrchestratorError> {
        let name = name.into();
        self.graph
            .write()
            .register(name.clone(), depends_on.iter().cloned())?;
        let cell = Arc::new(SubsystemCell::new(name.clone(), depends_on, subsystem));
        self.cells.write().insert(name.clone(), cell);
        if let Some(metrics) = &self.metrics {
            metrics.set_subsystem_count(self.cells.read().len());
        }
        info!(subsystem = %name, "subsystem registered");
        Ok(())
    }

    /// Subscribe to the shutdown broadcast.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Signal every in-flight lifecycle drive to cancel.
    pub fn trigger_shutdown(&self) {
        // Send fails only when nothing is listening, which is fine.
        let _ = self.shutdown.send(());
    }

    /// Drive every registered subsystem to `Operational` in dependency order.
    pub async fn initialize_all(&self) -> Result<BootReport, OrchestratorError> {
        let _gate = self.driver_gate.lock().await;
        let ordered = self.ordered_cells()?;
        let mut shutdown = self.shutdown.subscribe();
        let report = self.driver.initialize_all(&ordered, &mut shutdown).await;
        self.record_boot(&report);
        self.refresh_gauges();
        Ok(report)
    }

    /// Re-run validation over every operable subsystem.
    pub async fn validate_all(
        &self,
    ) -> Result<Vec<(String, Option<SubsystemFailure>)>, OrchestratorError> {
        let _gate = self.driver_gate.lock().await;
        let ordered = self.ordered_cells()?;
        let outcomes = self.driver.validate_all(&ordered).await;
        self.refresh_gauges();
        Ok(outcomes)
    }

    /// Boot then audit: `initialize_all` followed by a `validate_all` pass
    /// over whatever came up.
    pub async fn boot_all(&self) -> Result<BootReport, OrchestratorError> {
        let report = self.initialize_all().await?;
        if report.aborted.is_none() && !report.cancelled {
            let audit = self.validate_all().await?;
            for (name, failure) in &audit {
                if let Some(failure) = failure {
                    warn!(subsystem = %name, error = %failure, "post-boot audit demoted subsystem");
                }
            }
        }
        Ok(report)
    }

    /// Collect a status snapshot from every operable subsystem.
    pub async fn operate(&self) -> Result<OperateReport, OrchestratorError> {
        let ordered = self.ordered_cells()?;
        let mut report = OperateReport::default();
        for cell in &ordered {
            if !cell.state().can_operate() {
                continue;
            }
            let name = cell.name().to_owned();
            let result = {
                let instance = cell.instance();
                let mut guard = instance.lock().await;
                call_with_deadline(self.config.call_deadline, guard.operate()).await
            };
            match result {
                Ok(status) => {
                    report.statuses.insert(name, status);
                }
                Err(failure) => {
                    warn!(subsystem = %name, error = %failure, "operate failed");
                    report.failures.push((name, failure));
                }
            }
        }
        Ok(report)
    }

    /// Collect a status snapshot from one named subsystem.
    ///
    /// Rejected with [`LifecycleError::NotOperable`] outside
    /// `Validated`/`Operational`.
    pub async fn operate_subsystem(&self, name: &str) -> Result<StatusMap, OrchestratorError> {
        let cell = self.subsystem(name)?;
        let state = cell.state();
        if !state.can_operate() {
            return Err(LifecycleError::NotOperable {
                subsystem: name.to_owned(),
                state,
            }
            .into());
        }
        let result = {
            let instance = cell.instance();
            let mut guard = instance.lock().await;
            call_with_deadline(self.config.call_deadline, guard.operate()).await
        };
        result.map_err(|cause| {
            LifecycleError::StepFailed {
                subsystem: name.to_owned(),
                step: conductor_lifecycle::LifecycleStep::Operate,
                cause,
            }
            .into()
        })
    }

    /// Run one health monitoring sweep over the assembly.
    pub async fn monitor_health(&self) -> Result<HealthReport, OrchestratorError> {
        let ordered = self.ordered_cells()?;
        let report = self.monitor.monitor_health(&ordered).await;
        if let Some(metrics) = &self.metrics {
            for entry in &report.observed {
                metrics.record_health_outcome(
                    &entry.name,
                    match entry.outcome {
                        conductor_health::HealthOutcome::Healthy => "healthy",
                        conductor_health::HealthOutcome::Recovered => "recovered",
                        conductor_health::HealthOutcome::StillDegraded => "still-degraded",
                        conductor_health::HealthOutcome::Abandoned => "abandoned",
                        conductor_health::HealthOutcome::TerminatedFatal => "terminated-fatal",
                    },
                );
            }
        }
        self.refresh_gauges();
        Ok(report)
    }

    /// Take a snapshot of every checkpointable subsystem.
    pub async fn checkpoint_all(&self) -> Result<CheckpointSweep, OrchestratorError> {
        let ordered = self.ordered_cells()?;
        let sweep = self.store.checkpoint_all(&ordered).await;
        if let Some(metrics) = &self.metrics {
            metrics.set_snapshot_sequence(sweep.snapshot.sequence);
            for (name, _) in &sweep.failures {
                metrics.record_checkpoint_failure(name);
            }
        }
        Ok(sweep)
    }

    /// Replay a snapshot into the registered assembly.
    pub async fn restore(
        &self,
        snapshot: &SystemSnapshot,
    ) -> Result<RestoreReport, OrchestratorError> {
        let _gate = self.driver_gate.lock().await;
        let ordered = self.ordered_cells()?;
        let report = self.store.restore_all(&ordered, snapshot).await?;
        self.refresh_gauges();
        Ok(report)
    }

    /// The snapshot history retained in memory, oldest first.
    pub fn snapshot_history(&self) -> Vec<SystemSnapshot> {
        self.store.history()
    }

    /// The most recent snapshot, if any.
    pub fn latest_snapshot(&self) -> Option<SystemSnapshot> {
        self.store.latest()
    }

    /// Tear the whole assembly down in reverse dependency order.
    ///
    /// Always completes; per-subsystem failures are collected in the report.
    pub async fn terminate_all(&self) -> Result<TeardownReport, OrchestratorError> {
        let _gate = self.driver_gate.lock().await;
        let ordered = self.ordered_cells()?;
        let report = self.driver.terminate_all(&ordered).await;
        self.refresh_gauges();
        Ok(report)
    }

    /// Cancel any in-flight boot and tear everything down.
    pub async fn shutdown(&self) -> Result<TeardownReport, OrchestratorError> {
        self.trigger_shutdown();
        self.terminate_all().await
    }

    /// Named accessor for the registered cell, including its advisory lock.
    pub fn subsystem(&self, name: &str) -> Result<Arc<SubsystemCell>, OrchestratorError> {
        self.cells
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LifecycleError::UnknownSubsystem(name.to_owned()).into())
    }

    /// Read-only composite state of the assembly.
    pub fn system_state(&self) -> SystemState {
        let cells = self.ordered_cells().unwrap_or_else(|_| {
            // Unresolvable graphs still have registered cells to report.
            self.cells.read().values().cloned().collect()
        });
        let mut subsystems = Vec::with_capacity(cells.len());
        for cell in &cells {
            let status = cell.status();
            subsystems.push(SubsystemState {
                name: cell.name().to_owned(),
                state: status.state,
                depends_on: cell.depends_on().to_vec(),
                health: status.health,
                checkpoints_taken: status.checkpoints_taken,
            });
        }

        let total = subsystems.len();
        let terminated = subsystems
            .iter()
            .filter(|entry| entry.state.is_terminal())
            .count();
        let operational = subsystems
            .iter()
            .filter(|entry| entry.state == LifecycleState::Operational)
            .count();
        let degraded = subsystems
            .iter()
            .filter(|entry| {
                matches!(
                    entry.state,
                    LifecycleState::Degraded | LifecycleState::Reconciling
                )
            })
            .count();

        let boot = if total == 0 || operational + degraded + terminated == 0 {
            BootStatus::Idle
        } else if terminated == total {
            BootStatus::Terminated
        } else if operational == total {
            BootStatus::Operational
        } else {
            BootStatus::PartiallyOperational
        };

        let abandoned = subsystems.iter().any(|entry| {
            entry.state == LifecycleState::Degraded
                && entry.health.consecutive_failures > self.config.failure_threshold
        });
        let degradation = if abandoned || (terminated > 0 && terminated < total) {
            DegradationLevel::Critical
        } else if degraded > 0 {
            DegradationLevel::Degraded
        } else {
            DegradationLevel::Healthy
        };

        SystemState {
            boot,
            degradation,
            snapshot_sequence: self.store.latest().map(|snapshot| snapshot.sequence),
            subsystems,
        }
    }

    /// Registered cells in resolved dependency order.
    fn ordered_cells(&self) -> Result<Vec<Arc<SubsystemCell>>, RegistrationError> {
        let order = self.graph.read().resolve_order()?;
        let cells = self.cells.read();
        let mut ordered = Vec::with_capacity(order.len());
        for name in order {
            if let Some(cell) = cells.get(&name) {
                ordered.push(cell.clone());
            } else {
                // Graph and cell table are updated together under register.
                debug!(subsystem = %name, "graph node without cell; skipping");
            }
        }
        Ok(ordered)
    }

    fn record_boot(&self, report: &BootReport) {
        if let Some(metrics) = &self.metrics {
            for name in &report.started {
                metrics.record_transition(name, LifecycleState::Operational.as_str());
            }
            for name in &report.rolled_back {
                metrics.record_transition(name, LifecycleState::Terminated.as_str());
            }
        }
    }

    fn refresh_gauges(&self) {
        if let Some(metrics) = &self.metrics {
            let cells = self.cells.read();
            metrics.set_subsystem_count(cells.len());
            metrics.set_operational(
                cells
                    .values()
                    .filter(|cell| cell.state() == LifecycleState::Operational)
                    .count(),
            );
            metrics.set_degraded(
                cells
                    .values()
                    .filter(|cell| cell.state() == LifecycleState::Degraded)
                    .count(),
            );
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("subsystems", &self.cells.read().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_testkit::ScriptedSubsystem;

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            failure_threshold: 3,
            call_deadline: None,
            monitor_interval: std::time::Duration::from_secs(5),
            checkpoint_interval: None,
            snapshot_retain: 10,
            snapshot_directory: std::path::PathBuf::from("target/snapshots"),
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(test_config(), None).unwrap()
    }

    #[tokio::test]
    async fn register_boot_status_teardown_round() {
        let orch = orchestrator();
        let (store, store_handle) = ScriptedSubsystem::pair("store");
        let (api, api_handle) = ScriptedSubsystem::pair("api");
        orch.register("store", vec![], Box::new(store)).unwrap();
        orch.register("api", vec!["store".into()], Box::new(api))
            .unwrap();

        let report = orch.initialize_all().await.unwrap();
        assert!(report.fully_operational());
        assert_eq!(report.started, vec!["store", "api"]);

        let state = orch.system_state();
        assert_eq!(state.boot, BootStatus::Operational);
        assert_eq!(state.degradation, DegradationLevel::Healthy);

        let statuses = orch.operate().await.unwrap();
        assert!(statuses.failures.is_empty());
        assert_eq!(statuses.statuses.len(), 2);

        let teardown = orch.terminate_all().await.unwrap();
        assert!(teardown.is_clean());
        assert_eq!(teardown.terminated, vec!["api", "store"]);
        assert_eq!(orch.system_state().boot, BootStatus::Terminated);

        assert_eq!(
            store_handle.calls(),
            vec!["initialize", "validate", "operate", "terminate"]
        );
        assert_eq!(api_handle.call_count("terminate"), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let orch = orchestrator();
        let (a, _) = ScriptedSubsystem::pair("dup");
        let (b, _) = ScriptedSubsystem::pair("dup");
        orch.register("dup", vec![], Box::new(a)).unwrap();
        let err = orch.register("dup", vec![], Box::new(b)).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Registration(RegistrationError::DuplicateName { .. })
        ));
    }

    #[tokio::test]
    async fn cycle_registration_is_rejected_whole() {
        let orch = orchestrator();
        let (a, _) = ScriptedSubsystem::pair("a");
        let (b, _) = ScriptedSubsystem::pair("b");
        orch.register("a", vec!["b".into()], Box::new(a)).unwrap();
        let err = orch
            .register("b", vec!["a".into()], Box::new(b))
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Registration(RegistrationError::DependencyCycle { .. })
        ));
        // The failed registration left nothing behind.
        assert!(orch.subsystem("b").is_err());
    }

    #[tokio::test]
    async fn operate_outside_validated_or_operational_is_rejected() {
        let orch = orchestrator();
        let (sub, _) = ScriptedSubsystem::pair("idle");
        orch.register("idle", vec![], Box::new(sub)).unwrap();
        let err = orch.operate_subsystem("idle").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Lifecycle(LifecycleError::NotOperable { .. })
        ));
    }

    #[tokio::test]
    async fn checkpoint_then_restore_round_trip() {
        let orch = orchestrator();
        let (sub, handle) = ScriptedSubsystem::pair("ledger");
        orch.register("ledger", vec![], Box::new(sub)).unwrap();
        orch.initialize_all().await.unwrap();

        let sweep = orch.checkpoint_all().await.unwrap();
        assert!(sweep.is_complete());
        assert_eq!(sweep.snapshot.sequence, 1);

        let report = orch.restore(&sweep.snapshot).await.unwrap();
        assert_eq!(report.restored, vec!["ledger"]);
        assert_eq!(handle.restored_payloads().len(), 1);
        assert_eq!(orch.system_state().snapshot_sequence, Some(1));
    }

    #[tokio::test]
    async fn degraded_subsystem_yields_partial_state() {
        let orch = orchestrator();
        let (flaky, flaky_handle) = ScriptedSubsystem::pair("flaky");
        let (solid, _) = ScriptedSubsystem::pair("solid");
        orch.register("flaky", vec![], Box::new(flaky)).unwrap();
        orch.register("solid", vec![], Box::new(solid)).unwrap();
        orch.initialize_all().await.unwrap();

        flaky_handle.push_operate_failures(1, "sporadic");
        flaky_handle.push_reconcile(Err(SubsystemFailure::recoverable("not yet")));
        let report = orch.monitor_health().await.unwrap();
        assert_eq!(report.observed.len(), 2);

        let state = orch.system_state();
        assert_eq!(state.boot, BootStatus::PartiallyOperational);
        assert_eq!(state.degradation, DegradationLevel::Degraded);
        assert_eq!(state.count_in(LifecycleState::Degraded), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_then_terminates() {
        let orch = orchestrator();
        let (sub, _) = ScriptedSubsystem::pair("unit");
        orch.register("unit", vec![], Box::new(sub)).unwrap();
        orch.initialize_all().await.unwrap();
        let report = orch.shutdown().await.unwrap();
        assert_eq!(report.terminated, vec!["unit"]);
        assert_eq!(orch.system_state().boot, BootStatus::Terminated);
    }
}
