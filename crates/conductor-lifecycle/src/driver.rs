//! ---
//! cnd_section: "03-lifecycle-management"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Subsystem contract and lifecycle driving."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::registry::SubsystemCell;
use crate::state::LifecycleState;
use crate::subsystem::{call_with_deadline, SubsystemFailure, SubsystemResult};

/// Lifecycle operation names used in errors and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    /// `initialize` call.
    Initialize,
    /// `validate` call.
    Validate,
    /// `operate` call.
    Operate,
    /// `reconcile` call.
    Reconcile,
    /// `checkpoint` call.
    Checkpoint,
    /// `restore` call.
    Restore,
    /// `terminate` call.
    Terminate,
}

impl LifecycleStep {
    /// Static label for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStep::Initialize => "initialize",
            LifecycleStep::Validate => "validate",
            LifecycleStep::Operate => "operate",
            LifecycleStep::Reconcile => "reconcile",
            LifecycleStep::Checkpoint => "checkpoint",
            LifecycleStep::Restore => "restore",
            LifecycleStep::Terminate => "terminate",
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while driving subsystem lifecycles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// A named step failed for a named subsystem.
    #[error("subsystem '{subsystem}' failed during {step}: {cause}")]
    StepFailed {
        /// Subsystem that failed.
        subsystem: String,
        /// The lifecycle step that failed.
        step: LifecycleStep,
        /// Underlying failure reported by the subsystem.
        cause: SubsystemFailure,
    },
    /// A transition was requested that the state machine forbids.
    #[error("illegal transition for '{subsystem}': {from} -> {to}")]
    IllegalTransition {
        /// Subsystem concerned.
        subsystem: String,
        /// State before the request.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },
    /// `operate` was requested outside `Validated`/`Operational`.
    #[error("subsystem '{subsystem}' is {state}; operate requires validated or operational")]
    NotOperable {
        /// Subsystem concerned.
        subsystem: String,
        /// Its current state.
        state: LifecycleState,
    },
    /// No subsystem is registered under this name.
    #[error("unknown subsystem '{0}'")]
    UnknownSubsystem(String),
}

/// One subsystem held back from booting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedSubsystem {
    /// The subsystem that did not proceed.
    pub name: String,
    /// The subsystem at the root of the blockage. Equal to `name` when the
    /// subsystem's own validation failed.
    pub blocked_on: String,
    /// The validation failure, present only on the blocking root itself.
    pub cause: Option<SubsystemFailure>,
}

/// Fatal boot abort details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootAbort {
    /// Subsystem whose step failed.
    pub subsystem: String,
    /// The failing step.
    pub step: LifecycleStep,
    /// Underlying failure.
    pub cause: SubsystemFailure,
}

/// Outcome of one `initialize_all` drive.
#[derive(Debug, Clone, Default)]
pub struct BootReport {
    /// Subsystems that reached `Operational`, in boot order.
    pub started: Vec<String>,
    /// Subsystems held in `Created` by validation failures or blocked dependencies.
    pub blocked: Vec<BlockedSubsystem>,
    /// Present when an `initialize` failure aborted the whole boot.
    pub aborted: Option<BootAbort>,
    /// Subsystems torn down by the abort or cancellation rollback, in reverse order.
    pub rolled_back: Vec<String>,
    /// Whether the boot was cancelled by a shutdown signal mid-flight.
    pub cancelled: bool,
}

impl BootReport {
    /// Whether every registered subsystem reached `Operational`.
    pub fn fully_operational(&self) -> bool {
        self.aborted.is_none() && !self.cancelled && self.blocked.is_empty()
    }
}

/// One subsystem whose `terminate` call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    /// Subsystem that failed to terminate cleanly.
    pub subsystem: String,
    /// Underlying failure.
    pub cause: SubsystemFailure,
}

/// Outcome of one `terminate_all` walk. Teardown always completes.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Subsystems terminated cleanly, in teardown order.
    pub terminated: Vec<String>,
    /// Subsystems that were already terminated and were skipped.
    pub skipped: Vec<String>,
    /// Subsystems whose `terminate` call failed. They still end `Terminated`.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Whether every live subsystem released its resources cleanly.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum DriveCall {
    Initialize,
    Validate,
    Terminate,
}

impl DriveCall {
    fn step(self) -> LifecycleStep {
        match self {
            DriveCall::Initialize => LifecycleStep::Initialize,
            DriveCall::Validate => LifecycleStep::Validate,
            DriveCall::Terminate => LifecycleStep::Terminate,
        }
    }
}

enum StepOutcome {
    Done,
    Failed(SubsystemFailure),
    Cancelled,
}

/// Resolve once a shutdown signal is observed; never resolve when the
/// channel closes without one.
async fn cancel_requested(shutdown: &mut broadcast::Receiver<()>) {
    loop {
        match shutdown.recv().await {
            Ok(()) => return,
            // A lagged receiver still observed at least one signal.
            Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// Serializes every lifecycle transition for the registered assembly.
///
/// Grounded on the orchestration kernel pattern: the driver owns no
/// subsystems, it walks ordered cell slices handed to it by the facade.
#[derive(Debug, Clone, Default)]
pub struct LifecycleDriver {
    call_deadline: Option<Duration>,
}

impl LifecycleDriver {
    /// Create a driver with an optional per-call deadline.
    pub fn new(call_deadline: Option<Duration>) -> Self {
        Self { call_deadline }
    }

    /// The configured per-call deadline.
    pub fn call_deadline(&self) -> Option<Duration> {
        self.call_deadline
    }

    /// Drive each subsystem, in resolved order, through
    /// `initialize -> validate -> Operational`.
    ///
    /// An `initialize` failure aborts the boot and rolls back everything at
    /// or past `Initialized` in reverse order. A `validate` failure blocks
    /// only the failing subsystem and its dependents; independent branches
    /// proceed. A shutdown signal observed mid-boot also triggers the
    /// rollback before returning.
    pub async fn initialize_all(
        &self,
        ordered: &[Arc<SubsystemCell>],
        shutdown: &mut broadcast::Receiver<()>,
    ) -> BootReport {
        let mut report = BootReport::default();
        // name -> root blocker, for transitive dependency gating
        let mut blocked_roots: IndexMap<String, String> = IndexMap::new();
        let cells_by_name: IndexMap<&str, &Arc<SubsystemCell>> =
            ordered.iter().map(|cell| (cell.name(), cell)).collect();

        for cell in ordered {
            let name = cell.name().to_owned();
            match cell.state() {
                LifecycleState::Created => {}
                LifecycleState::Operational => {
                    debug!(subsystem = %name, "already operational; skipping boot steps");
                    report.started.push(name);
                    continue;
                }
                other => {
                    debug!(subsystem = %name, state = %other, "not bootable; skipping");
                    continue;
                }
            }

            if let Some((dependency, root)) = self.first_unmet_dependency(
                cell,
                &cells_by_name,
                &blocked_roots,
            ) {
                warn!(
                    subsystem = %name,
                    dependency = %dependency,
                    root = %root,
                    "dependency not operational; subsystem blocked"
                );
                blocked_roots.insert(name.clone(), root.clone());
                report.blocked.push(BlockedSubsystem {
                    name,
                    blocked_on: root,
                    cause: None,
                });
                continue;
            }

            match self.cancellable_call(cell, DriveCall::Initialize, shutdown).await {
                StepOutcome::Cancelled => {
                    warn!(subsystem = %name, "boot cancelled before initialize completed");
                    report.cancelled = true;
                    report.rolled_back = self.rollback(ordered).await;
                    return report;
                }
                StepOutcome::Failed(cause) => {
                    error!(subsystem = %name, error = %cause, "initialize failed; aborting boot");
                    report.rolled_back = self.rollback(ordered).await;
                    report.aborted = Some(BootAbort {
                        subsystem: name,
                        step: LifecycleStep::Initialize,
                        cause,
                    });
                    return report;
                }
                StepOutcome::Done => {
                    if let Err(err) = cell.transition(LifecycleState::Initialized) {
                        error!(subsystem = %name, error = %err, "post-initialize transition rejected; aborting boot");
                        report.rolled_back = self.rollback(ordered).await;
                        report.aborted = Some(BootAbort {
                            subsystem: name,
                            step: LifecycleStep::Initialize,
                            cause: SubsystemFailure::fatal(err.to_string()),
                        });
                        return report;
                    }
                }
            }

            match self.cancellable_call(cell, DriveCall::Validate, shutdown).await {
                StepOutcome::Cancelled => {
                    warn!(subsystem = %name, "boot cancelled before validate completed");
                    report.cancelled = true;
                    report.rolled_back = self.rollback(ordered).await;
                    return report;
                }
                StepOutcome::Failed(cause) if cause.is_fatal() => {
                    // Deadline overruns and self-reported fatal faults fail closed.
                    error!(subsystem = %name, error = %cause, "validate failed fatally; subsystem terminated");
                    self.terminate_quietly(cell).await;
                    blocked_roots.insert(name.clone(), name.clone());
                    report.blocked.push(BlockedSubsystem {
                        name: name.clone(),
                        blocked_on: name,
                        cause: Some(cause),
                    });
                    continue;
                }
                StepOutcome::Failed(cause) => {
                    warn!(subsystem = %name, error = %cause, "validate failed; subsystem and dependents blocked");
                    if let Err(err) = cell.transition(LifecycleState::Created) {
                        error!(subsystem = %name, error = %err, "could not return subsystem to created");
                    }
                    blocked_roots.insert(name.clone(), name.clone());
                    report.blocked.push(BlockedSubsystem {
                        name: name.clone(),
                        blocked_on: name,
                        cause: Some(cause),
                    });
                    continue;
                }
                StepOutcome::Done => {
                    let promoted = cell
                        .transition(LifecycleState::Validated)
                        .and_then(|_| cell.transition(LifecycleState::Operational));
                    match promoted {
                        Ok(_) => {
                            info!(subsystem = %name, "subsystem operational");
                            report.started.push(name);
                        }
                        Err(err) => {
                            error!(subsystem = %name, error = %err, "promotion rejected; aborting boot");
                            report.rolled_back = self.rollback(ordered).await;
                            report.aborted = Some(BootAbort {
                                subsystem: name,
                                step: LifecycleStep::Validate,
                                cause: SubsystemFailure::fatal(err.to_string()),
                            });
                            return report;
                        }
                    }
                }
            }
        }
        report
    }

    /// Re-run `validate()` over every operable subsystem as a consistency
    /// audit. Recoverable failures demote to `Degraded`; fatal failures
    /// terminate the subsystem.
    pub async fn validate_all(
        &self,
        ordered: &[Arc<SubsystemCell>],
    ) -> Vec<(String, Option<SubsystemFailure>)> {
        let mut outcomes = Vec::with_capacity(ordered.len());
        for cell in ordered {
            let name = cell.name().to_owned();
            let state = cell.state();
            if !state.can_operate() {
                continue;
            }
            match self.guarded_call(cell, DriveCall::Validate).await {
                Ok(()) => outcomes.push((name, None)),
                Err(cause) if cause.is_fatal() => {
                    error!(subsystem = %name, error = %cause, "revalidation failed fatally");
                    self.terminate_quietly(cell).await;
                    outcomes.push((name, Some(cause)));
                }
                Err(cause) => {
                    warn!(subsystem = %name, error = %cause, "revalidation failed");
                    match state {
                        LifecycleState::Operational => {
                            if let Err(err) = cell.transition(LifecycleState::Degraded) {
                                error!(subsystem = %name, error = %err, "demotion rejected");
                            }
                            cell.note_failure();
                        }
                        _ => {
                            if let Err(err) = cell.transition(LifecycleState::Created) {
                                error!(subsystem = %name, error = %err, "demotion rejected");
                            }
                        }
                    }
                    outcomes.push((name, Some(cause)));
                }
            }
        }
        outcomes
    }

    /// Walk the reverse order and terminate every subsystem not already
    /// `Terminated`, collecting failures instead of stopping on them.
    ///
    /// A subsystem whose `terminate` call fails is still moved to
    /// `Terminated`; the absorbing state reflects that it is out of the
    /// rotation, and the report names it.
    pub async fn terminate_all(&self, ordered: &[Arc<SubsystemCell>]) -> TeardownReport {
        let mut report = TeardownReport::default();
        for cell in ordered.iter().rev() {
            let name = cell.name().to_owned();
            if cell.state().is_terminal() {
                report.skipped.push(name);
                continue;
            }
            match self.guarded_call(cell, DriveCall::Terminate).await {
                Ok(()) => {
                    if let Err(err) = cell.transition(LifecycleState::Terminated) {
                        error!(subsystem = %name, error = %err, "terminal transition rejected");
                        cell.force_terminate();
                    }
                    info!(subsystem = %name, "subsystem terminated");
                    report.terminated.push(name);
                }
                Err(cause) => {
                    error!(subsystem = %name, error = %cause, "terminate failed; resources may be leaked");
                    cell.force_terminate();
                    report.failures.push(TeardownFailure {
                        subsystem: name,
                        cause,
                    });
                }
            }
        }
        report
    }

    fn first_unmet_dependency(
        &self,
        cell: &SubsystemCell,
        cells_by_name: &IndexMap<&str, &Arc<SubsystemCell>>,
        blocked_roots: &IndexMap<String, String>,
    ) -> Option<(String, String)> {
        for dep in cell.depends_on() {
            if let Some(root) = blocked_roots.get(dep) {
                return Some((dep.clone(), root.clone()));
            }
            let satisfied = cells_by_name
                .get(dep.as_str())
                .map(|dep_cell| dep_cell.state() == LifecycleState::Operational)
                .unwrap_or(false);
            if !satisfied {
                return Some((dep.clone(), dep.clone()));
            }
        }
        None
    }

    /// Tear down, in reverse order, everything the aborted boot already
    /// touched (state at or past `Initialized`).
    async fn rollback(&self, ordered: &[Arc<SubsystemCell>]) -> Vec<String> {
        let mut rolled_back = Vec::new();
        for cell in ordered.iter().rev() {
            let state = cell.state();
            let touched = matches!(
                state,
                LifecycleState::Initialized | LifecycleState::Validated | LifecycleState::Operational
            );
            if !touched {
                continue;
            }
            let name = cell.name().to_owned();
            if let Err(cause) = self.guarded_call(cell, DriveCall::Terminate).await {
                warn!(subsystem = %name, error = %cause, "terminate failed during rollback");
            }
            if cell.transition(LifecycleState::Terminated).is_err() {
                cell.force_terminate();
            }
            rolled_back.push(name);
        }
        rolled_back
    }

    async fn terminate_quietly(&self, cell: &SubsystemCell) {
        if let Err(cause) = self.guarded_call(cell, DriveCall::Terminate).await {
            warn!(subsystem = %cell.name(), error = %cause, "terminate failed after fatal fault");
        }
        cell.force_terminate();
    }

    async fn cancellable_call(
        &self,
        cell: &SubsystemCell,
        call: DriveCall,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> StepOutcome {
        tokio::select! {
            biased;
            _ = cancel_requested(shutdown) => StepOutcome::Cancelled,
            result = self.guarded_call(cell, call) => match result {
                Ok(()) => StepOutcome::Done,
                Err(cause) => StepOutcome::Failed(cause),
            },
        }
    }

    async fn guarded_call(&self, cell: &SubsystemCell, call: DriveCall) -> SubsystemResult<()> {
        let instance = cell.instance();
        let mut guard = instance.lock().await;
        debug!(subsystem = %cell.name(), step = %call.step(), "invoking lifecycle call");
        let fut = async {
            match call {
                DriveCall::Initialize => guard.initialize().await,
                DriveCall::Validate => guard.validate().await,
                DriveCall::Terminate => guard.terminate().await,
            }
        };
        call_with_deadline(self.call_deadline, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::{CheckpointPayload, StatusMap, Subsystem};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct Probe {
        fail_initialize: bool,
        fail_validate: bool,
        fail_terminate: bool,
        terminate_calls: Arc<AtomicU32>,
        initialized: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Subsystem for Probe {
        async fn initialize(&mut self) -> SubsystemResult<()> {
            if self.fail_initialize {
                return Err(SubsystemFailure::fatal("allocation refused"));
            }
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn validate(&mut self) -> SubsystemResult<()> {
            if self.fail_validate {
                return Err(SubsystemFailure::recoverable("configuration drift"));
            }
            Ok(())
        }
        async fn operate(&mut self) -> SubsystemResult<StatusMap> {
            Ok(StatusMap::new())
        }
        async fn reconcile(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
            Ok(CheckpointPayload::new("probe", 1, serde_json::json!({})))
        }
        async fn restore(&mut self, _payload: CheckpointPayload) -> SubsystemResult<()> {
            Ok(())
        }
        async fn terminate(&mut self) -> SubsystemResult<()> {
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_terminate {
                return Err(SubsystemFailure::recoverable("file handle stuck"));
            }
            Ok(())
        }
    }

    fn cell_with(name: &str, deps: &[&str], probe: Probe) -> Arc<SubsystemCell> {
        Arc::new(SubsystemCell::new(
            name,
            deps.iter().map(|d| (*d).to_owned()).collect(),
            Box::new(probe),
        ))
    }

    fn shutdown_pair() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
        broadcast::channel(4)
    }

    #[tokio::test]
    async fn boot_drives_everything_operational() {
        let driver = LifecycleDriver::new(None);
        let cells = vec![
            cell_with("a", &[], Probe::default()),
            cell_with("b", &["a"], Probe::default()),
        ];
        let (_tx, mut rx) = shutdown_pair();
        let report = driver.initialize_all(&cells, &mut rx).await;
        assert!(report.fully_operational());
        assert_eq!(report.started, vec!["a", "b"]);
        assert!(cells
            .iter()
            .all(|cell| cell.state() == LifecycleState::Operational));
    }

    #[tokio::test]
    async fn initialize_failure_aborts_and_rolls_back() {
        let driver = LifecycleDriver::new(None);
        let a_terms = Arc::new(AtomicU32::new(0));
        let cells = vec![
            cell_with(
                "a",
                &[],
                Probe {
                    terminate_calls: a_terms.clone(),
                    ..Probe::default()
                },
            ),
            cell_with(
                "b",
                &["a"],
                Probe {
                    fail_initialize: true,
                    ..Probe::default()
                },
            ),
            cell_with("c", &[], Probe::default()),
        ];
        let (_tx, mut rx) = shutdown_pair();
        let report = driver.initialize_all(&cells, &mut rx).await;

        let abort = report.aborted.expect("boot aborted");
        assert_eq!(abort.subsystem, "b");
        assert_eq!(abort.step, LifecycleStep::Initialize);
        assert_eq!(report.rolled_back, vec!["a"]);
        assert_eq!(a_terms.load(Ordering::SeqCst), 1);
        assert_eq!(cells[0].state(), LifecycleState::Terminated);
        // b's initialize never completed; it stays Created.
        assert_eq!(cells[1].state(), LifecycleState::Created);
        // c never got its turn.
        assert_eq!(cells[2].state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn validate_failure_blocks_dependents_only() {
        let driver = LifecycleDriver::new(None);
        let cells = vec![
            cell_with(
                "a",
                &[],
                Probe {
                    fail_validate: true,
                    ..Probe::default()
                },
            ),
            cell_with("b", &["a"], Probe::default()),
            cell_with("c", &["a"], Probe::default()),
            cell_with("d", &[], Probe::default()),
        ];
        let (_tx, mut rx) = shutdown_pair();
        let report = driver.initialize_all(&cells, &mut rx).await;

        assert!(report.aborted.is_none());
        assert_eq!(report.started, vec!["d"]);
        let blocked: Vec<&str> = report.blocked.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(blocked, vec!["a", "b", "c"]);
        assert!(report
            .blocked
            .iter()
            .all(|entry| entry.blocked_on == "a"));
        assert!(report.blocked[0].cause.is_some());
        for name in ["a", "b", "c"] {
            let cell = cells.iter().find(|c| c.name() == name).unwrap();
            assert_eq!(cell.state(), LifecycleState::Created);
        }
    }

    #[tokio::test]
    async fn teardown_collects_failures_and_completes() {
        let driver = LifecycleDriver::new(None);
        let cells = vec![
            cell_with("a", &[], Probe::default()),
            cell_with(
                "b",
                &[],
                Probe {
                    fail_terminate: true,
                    ..Probe::default()
                },
            ),
            cell_with("c", &[], Probe::default()),
        ];
        let (_tx, mut rx) = shutdown_pair();
        driver.initialize_all(&cells, &mut rx).await;

        let report = driver.terminate_all(&cells).await;
        assert_eq!(report.terminated, vec!["c", "a"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subsystem, "b");
        assert!(cells
            .iter()
            .all(|cell| cell.state() == LifecycleState::Terminated));

        // A second teardown only skips.
        let again = driver.terminate_all(&cells).await;
        assert!(again.terminated.is_empty());
        assert_eq!(again.skipped.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_boot_still_rolls_back() {
        let driver = LifecycleDriver::new(None);
        let cells = vec![
            cell_with("a", &[], Probe::default()),
            cell_with("b", &["a"], Probe::default()),
        ];
        let (tx, mut rx) = shutdown_pair();
        // Signal before the drive starts; the biased select observes it on
        // the first step.
        tx.send(()).unwrap();
        let report = driver.initialize_all(&cells, &mut rx).await;
        assert!(report.cancelled);
        assert!(report.started.is_empty());
        assert_eq!(cells[0].state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn deadline_overrun_on_validate_terminates_subsystem() {
        struct Stuck;
        #[async_trait]
        impl Subsystem for Stuck {
            async fn initialize(&mut self) -> SubsystemResult<()> {
                Ok(())
            }
            async fn validate(&mut self) -> SubsystemResult<()> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
            async fn operate(&mut self) -> SubsystemResult<StatusMap> {
                Ok(StatusMap::new())
            }
            async fn reconcile(&mut self) -> SubsystemResult<()> {
                Ok(())
            }
            async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
                Ok(CheckpointPayload::new("stuck", 1, serde_json::json!({})))
            }
            async fn restore(&mut self, _payload: CheckpointPayload) -> SubsystemResult<()> {
                Ok(())
            }
            async fn terminate(&mut self) -> SubsystemResult<()> {
                Ok(())
            }
        }

        let driver = LifecycleDriver::new(Some(Duration::from_millis(20)));
        let cells = vec![Arc::new(SubsystemCell::new(
            "stuck",
            Vec::new(),
            Box::new(Stuck) as crate::subsystem::BoxedSubsystem,
        ))];
        let (_tx, mut rx) = shutdown_pair();
        let report = driver.initialize_all(&cells, &mut rx).await;
        assert!(report.aborted.is_none());
        assert_eq!(cells[0].state(), LifecycleState::Terminated);
        assert!(report.blocked[0]
            .cause
            .as_ref()
            .is_some_and(|cause| cause.is_fatal()));
    }
}
