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

use serde::{Deserialize, Serialize};

/// One stage in a subsystem's lifecycle progression.
///
/// `Terminated` is absorbing; `Reconciling` is transient and reachable only
/// from `Degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// Known by name only; no instance registered yet.
    Unregistered,
    /// Registered with the orchestrator but not yet initialized.
    Created,
    /// Resources allocated, preconditions verified.
    Initialized,
    /// Configuration confirmed consistent.
    Validated,
    /// Operating normally.
    Operational,
    /// Unhealthy but recoverable; reconciliation may return it to service.
    Degraded,
    /// Reconciliation in progress.
    Reconciling,
    /// All resources released. No further transitions.
    Terminated,
}

impl LifecycleState {
    /// Static label used for logs, metrics, and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unregistered => "unregistered",
            LifecycleState::Created => "created",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Validated => "validated",
            LifecycleState::Operational => "operational",
            LifecycleState::Degraded => "degraded",
            LifecycleState::Reconciling => "reconciling",
            LifecycleState::Terminated => "terminated",
        }
    }

    /// Whether `operate` may be invoked in this state.
    pub fn can_operate(&self) -> bool {
        matches!(self, LifecycleState::Validated | LifecycleState::Operational)
    }

    /// Whether this is the absorbing end state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Terminated)
    }

    /// Whether the machine permits moving from `self` to `next`.
    pub fn can_transition(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Unregistered, Created) => true,
            (Created, Initialized) => true,
            // Restore drives a freshly registered subsystem straight to service.
            (Created, Operational) => true,
            (Initialized, Validated) => true,
            // Validation failure returns the subsystem to Created.
            (Initialized, Created) => true,
            (Validated, Operational) => true,
            (Operational, Degraded) => true,
            (Degraded, Reconciling) => true,
            (Reconciling, Operational) => true,
            (Reconciling, Degraded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
