//! ---
//! cnd_section: "01-core-functionality"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Primary orchestration and lifecycle management."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use serde::Serialize;

use conductor_health::DegradationLevel;
use conductor_lifecycle::{HealthRecord, LifecycleState};

/// Coarse position of the whole assembly in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootStatus {
    /// Nothing registered, or nothing driven past `Created` yet.
    Idle,
    /// Every live subsystem is operational.
    Operational,
    /// Some subsystems are in service, others are blocked, degraded, or gone.
    PartiallyOperational,
    /// Every registered subsystem has reached the absorbing end state.
    Terminated,
}

/// Read-only view of one registered subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemState {
    /// Subsystem name.
    pub name: String,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Declared dependency names.
    pub depends_on: Vec<String>,
    /// Ephemeral health bookkeeping.
    pub health: HealthRecord,
    /// Number of checkpoints taken from this subsystem.
    pub checkpoints_taken: u64,
}

/// Serializable composite state of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct SystemState {
    /// Coarse assembly status.
    pub boot: BootStatus,
    /// Aggregate degradation severity.
    pub degradation: DegradationLevel,
    /// Sequence of the most recent snapshot, if any was taken.
    pub snapshot_sequence: Option<u64>,
    /// Per-subsystem detail, in dependency order.
    pub subsystems: Vec<SubsystemState>,
}

impl SystemState {
    /// Number of subsystems currently in the given state.
    pub fn count_in(&self, state: LifecycleState) -> usize {
        self.subsystems
            .iter()
            .filter(|entry| entry.state == state)
            .count()
    }
}
