//! ---
//! cnd_section: "04-health-resilience"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Health probing and reconciliation."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Health probing and self-healing for managed subsystems.
//!
//! The [`HealthMonitor`] sweeps the registered assembly, probes every
//! live subsystem with `operate()`, and drives degraded units through the
//! `Degraded -> Reconciling -> Operational` loop until the configured
//! failure threshold abandons them.

pub mod degradation;
pub mod monitor;

pub use degradation::DegradationLevel;
pub use monitor::{HealthMonitor, HealthOutcome, HealthReport, ReconcilePolicy, SubsystemHealth};
