//! ---
//! cnd_section: "05-checkpoint-restore"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Versioned snapshots and completeness-validated restore."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use conductor_lifecycle::{
    call_with_deadline, CheckpointPayload, LifecycleState, SubsystemCell, SubsystemFailure,
};

/// Current snapshot schema version. Bump on incompatible layout changes.
pub const SNAPSHOT_VERSION: u16 = 1;

/// A consistent capture of every checkpointable subsystem.
///
/// Ordered by sequence number, never by wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Snapshot schema version.
    pub version: u16,
    /// Monotonically increasing capture sequence.
    pub sequence: u64,
    /// Per-subsystem payloads, in dependency order.
    pub entries: IndexMap<String, CheckpointPayload>,
}

impl SystemSnapshot {
    /// Whether the snapshot carries a payload for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Outcome of one checkpoint sweep.
#[derive(Debug, Clone)]
pub struct CheckpointSweep {
    /// The captured snapshot. Present even when some subsystems failed;
    /// their entries are simply absent.
    pub snapshot: SystemSnapshot,
    /// Subsystems whose `checkpoint` call failed this sweep.
    pub failures: Vec<(String, SubsystemFailure)>,
    /// Subsystems skipped because their state is not checkpointable.
    pub skipped: Vec<String>,
}

impl CheckpointSweep {
    /// Whether every eligible subsystem contributed an entry.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Structural problems that reject a snapshot before any subsystem is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RestoreError {
    /// The snapshot was written by an incompatible schema.
    #[error("snapshot version {found} unsupported; this build reads version {expected}")]
    VersionMismatch {
        /// Version this build understands.
        expected: u16,
        /// Version found in the snapshot.
        found: u16,
    },
    /// The snapshot lacks entries for live registered subsystems.
    #[error("snapshot {sequence} is incomplete; missing entries for {missing:?}")]
    Incomplete {
        /// Sequence of the rejected snapshot.
        sequence: u64,
        /// Live subsystems with no payload in the snapshot.
        missing: Vec<String>,
    },
}

/// Per-subsystem results of a restore pass.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Subsystems restored to service, in dependency order.
    pub restored: Vec<String>,
    /// Subsystems that rejected their payload or could not accept one.
    pub failures: Vec<(String, SubsystemFailure)>,
}

impl RestoreReport {
    /// Whether every subsystem accepted its payload.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Captures snapshots and replays them into registered subsystems.
///
/// Retains a bounded history of recent snapshots in memory, newest last.
#[derive(Debug)]
pub struct CheckpointStore {
    sequence: AtomicU64,
    call_deadline: Option<Duration>,
    retain: usize,
    history: Mutex<VecDeque<SystemSnapshot>>,
}

impl CheckpointStore {
    /// Create a store retaining at most `retain` snapshots.
    pub fn new(call_deadline: Option<Duration>, retain: usize) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            call_deadline,
            retain: retain.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Sequence number the next sweep will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst) + 1
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Option<SystemSnapshot> {
        self.history.lock().back().cloned()
    }

    /// All retained snapshots, oldest first.
    pub fn history(&self) -> Vec<SystemSnapshot> {
        self.history.lock().iter().cloned().collect()
    }

    /// Resume sequence numbering after loading a snapshot from disk, so new
    /// captures sort after it.
    pub fn resume_from(&self, snapshot: &SystemSnapshot) {
        self.sequence.fetch_max(snapshot.sequence, Ordering::SeqCst);
        let mut history = self.history.lock();
        if history.back().map(|last| last.sequence) != Some(snapshot.sequence) {
            history.push_back(snapshot.clone());
            while history.len() > self.retain {
                history.pop_front();
            }
        }
    }

    /// Capture one payload from every `Operational` or `Degraded` subsystem.
    ///
    /// A failing `checkpoint` call excludes that subsystem from the snapshot
    /// and is reported; it never changes the subsystem's lifecycle state.
    pub async fn checkpoint_all(&self, cells: &[Arc<SubsystemCell>]) -> CheckpointSweep {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut entries = IndexMap::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for cell in cells {
            let name = cell.name().to_owned();
            match cell.state() {
                LifecycleState::Operational | LifecycleState::Degraded => {}
                state => {
                    debug!(subsystem = %name, state = %state, "not checkpointable; skipping");
                    skipped.push(name);
                    continue;
                }
            }
            let result = {
                let instance = cell.instance();
                let mut guard = instance.lock().await;
                call_with_deadline(self.call_deadline, guard.checkpoint()).await
            };
            match result {
                Ok(payload) => {
                    cell.note_checkpoint();
                    entries.insert(name, payload);
                }
                Err(cause) => {
                    warn!(subsystem = %name, error = %cause, "checkpoint failed");
                    failures.push((name, cause));
                }
            }
        }

        let snapshot = SystemSnapshot {
            version: SNAPSHOT_VERSION,
            sequence,
            entries,
        };
        info!(
            sequence,
            entries = snapshot.entries.len(),
            failures = failures.len(),
            "checkpoint sweep complete"
        );
        let mut history = self.history.lock();
        history.push_back(snapshot.clone());
        while history.len() > self.retain {
            history.pop_front();
        }
        drop(history);

        CheckpointSweep {
            snapshot,
            failures,
            skipped,
        }
    }

    /// Replay `snapshot` into the registered assembly.
    ///
    /// The snapshot is rejected wholesale when its version is unknown or it
    /// lacks an entry for any live subsystem. Entries naming unknown
    /// subsystems are warned about and skipped. A subsystem that
    /// rejects its payload is returned to `Created`.
    pub async fn restore_all(
        &self,
        cells: &[Arc<SubsystemCell>],
        snapshot: &SystemSnapshot,
    ) -> Result<RestoreReport, RestoreError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RestoreError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        let missing: Vec<String> = cells
            .iter()
            .filter(|cell| !cell.state().is_terminal())
            .filter(|cell| !snapshot.contains(cell.name()))
            .map(|cell| cell.name().to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(RestoreError::Incomplete {
                sequence: snapshot.sequence,
                missing,
            });
        }

        for name in snapshot.entries.keys() {
            if !cells.iter().any(|cell| cell.name() == name) {
                warn!(subsystem = %name, "snapshot entry has no registered subsystem; skipping");
            }
        }

        let mut report = RestoreReport::default();
        for cell in cells {
            let name = cell.name().to_owned();
            if cell.state().is_terminal() {
                report.failures.push((
                    name,
                    SubsystemFailure::fatal("subsystem is terminated and cannot be restored"),
                ));
                continue;
            }
            let payload = match snapshot.entries.get(&name) {
                Some(payload) => payload.clone(),
                // Completeness was validated above; unreachable for live cells.
                None => continue,
            };
            let result = {
                let instance = cell.instance();
                let mut guard = instance.lock().await;
                call_with_deadline(self.call_deadline, guard.restore(payload)).await
            };
            match result {
                Ok(()) => {
                    if cell.state() != LifecycleState::Operational {
                        if let Err(err) = cell.transition(LifecycleState::Operational) {
                            warn!(subsystem = %name, error = %err, "restored subsystem could not be promoted");
                            report
                                .failures
                                .push((name, SubsystemFailure::fatal(err.to_string())));
                            continue;
                        }
                    }
                    info!(subsystem = %name, sequence = snapshot.sequence, "subsystem restored");
                    report.restored.push(name);
                }
                Err(cause) => {
                    warn!(subsystem = %name, error = %cause, "restore payload rejected");
                    cell.reset_to_created();
                    report.failures.push((name, cause));
                }
            }
        }
        self.resume_from(snapshot);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_lifecycle::{BoxedSubsystem, StatusMap, Subsystem, SubsystemResult};
    use std::sync::Mutex as StdMutex;

    struct Counter {
        value: u64,
        reject_restore: bool,
        restored_with: Arc<StdMutex<Option<CheckpointPayload>>>,
    }

    impl Counter {
        fn new(value: u64) -> Self {
            Self {
                value,
                reject_restore: false,
                restored_with: Arc::new(StdMutex::new(None)),
            }
        }
    }

    #[async_trait]
    impl Subsystem for Counter {
        async fn initialize(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn validate(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn operate(&mut self) -> SubsystemResult<StatusMap> {
            Ok(StatusMap::new())
        }
        async fn reconcile(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
            Ok(CheckpointPayload::new(
                "counter",
                1,
                serde_json::json!({ "value": self.value }),
            ))
        }
        async fn restore(&mut self, payload: CheckpointPayload) -> SubsystemResult<()> {
            if self.reject_restore {
                return Err(SubsystemFailure::recoverable("schema drift"));
            }
            *self.restored_with.lock().unwrap() = Some(payload);
            Ok(())
        }
        async fn terminate(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
    }

    fn cell_in(name: &str, state: LifecycleState, counter: Counter) -> Arc<SubsystemCell> {
        let cell = Arc::new(SubsystemCell::new(
            name,
            Vec::new(),
            Box::new(counter) as BoxedSubsystem,
        ));
        match state {
            LifecycleState::Created => {}
            LifecycleState::Operational => {
                cell.transition(LifecycleState::Initialized).unwrap();
                cell.transition(LifecycleState::Validated).unwrap();
                cell.transition(LifecycleState::Operational).unwrap();
            }
            LifecycleState::Terminated => {
                cell.force_terminate();
            }
            other => panic!("unsupported fixture state {other}"),
        }
        cell
    }

    #[tokio::test]
    async fn sweep_assigns_increasing_sequences() {
        let store = CheckpointStore::new(None, 10);
        let cells = vec![cell_in("a", LifecycleState::Operational, Counter::new(1))];
        let first = store.checkpoint_all(&cells).await;
        let second = store.checkpoint_all(&cells).await;
        assert_eq!(first.snapshot.sequence, 1);
        assert_eq!(second.snapshot.sequence, 2);
        assert!(first.is_complete());
        assert_eq!(store.latest().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn sweep_skips_non_checkpointable_states() {
        let store = CheckpointStore::new(None, 10);
        let cells = vec![
            cell_in("live", LifecycleState::Operational, Counter::new(7)),
            cell_in("idle", LifecycleState::Created, Counter::new(0)),
            cell_in("gone", LifecycleState::Terminated, Counter::new(0)),
        ];
        let sweep = store.checkpoint_all(&cells).await;
        assert!(sweep.snapshot.contains("live"));
        assert!(!sweep.snapshot.contains("idle"));
        assert_eq!(sweep.skipped, vec!["idle", "gone"]);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let store = CheckpointStore::new(None, 3);
        let cells = vec![cell_in("a", LifecycleState::Operational, Counter::new(1))];
        for _ in 0..5 {
            store.checkpoint_all(&cells).await;
        }
        let history = store.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].sequence, 3);
        assert_eq!(history[2].sequence, 5);
    }

    #[tokio::test]
    async fn restore_replays_payloads_and_promotes() {
        let store = CheckpointStore::new(None, 10);
        let restored_with = Arc::new(StdMutex::new(None));
        let live = cell_in("a", LifecycleState::Operational, Counter::new(42));
        let sweep = store.checkpoint_all(&[live]).await;

        let counter = Counter {
            value: 0,
            reject_restore: false,
            restored_with: restored_with.clone(),
        };
        let fresh = cell_in("a", LifecycleState::Created, counter);
        let report = store
            .restore_all(&[fresh.clone()], &sweep.snapshot)
            .await
            .unwrap();
        assert_eq!(report.restored, vec!["a"]);
        assert_eq!(fresh.state(), LifecycleState::Operational);
        let payload = restored_with.lock().unwrap().clone().unwrap();
        assert_eq!(payload.data["value"], 42);
    }

    #[tokio::test]
    async fn incomplete_snapshot_is_rejected_wholesale() {
        let store = CheckpointStore::new(None, 10);
        let snapshot = SystemSnapshot {
            version: SNAPSHOT_VERSION,
            sequence: 9,
            entries: IndexMap::new(),
        };
        let cells = vec![cell_in("a", LifecycleState::Created, Counter::new(0))];
        let err = store.restore_all(&cells, &snapshot).await.unwrap_err();
        assert_eq!(
            err,
            RestoreError::Incomplete {
                sequence: 9,
                missing: vec!["a".to_owned()],
            }
        );
        assert_eq!(cells[0].state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let store = CheckpointStore::new(None, 10);
        let snapshot = SystemSnapshot {
            version: SNAPSHOT_VERSION + 1,
            sequence: 1,
            entries: IndexMap::new(),
        };
        let err = store.restore_all(&[], &snapshot).await.unwrap_err();
        assert!(matches!(err, RestoreError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn rejected_payload_returns_subsystem_to_created() {
        let store = CheckpointStore::new(None, 10);
        let live = cell_in("a", LifecycleState::Operational, Counter::new(1));
        let sweep = store.checkpoint_all(&[live]).await;

        let counter = Counter {
            reject_restore: true,
            ..Counter::new(0)
        };
        let fresh = cell_in("a", LifecycleState::Created, counter);
        let report = store
            .restore_all(&[fresh.clone()], &sweep.snapshot)
            .await
            .unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(fresh.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn sequence_resumes_past_loaded_snapshot() {
        let store = CheckpointStore::new(None, 10);
        let snapshot = SystemSnapshot {
            version: SNAPSHOT_VERSION,
            sequence: 17,
            entries: IndexMap::new(),
        };
        store.resume_from(&snapshot);
        let cells = vec![cell_in("a", LifecycleState::Operational, Counter::new(1))];
        let sweep = store.checkpoint_all(&cells).await;
        assert_eq!(sweep.snapshot.sequence, 18);
    }
}
