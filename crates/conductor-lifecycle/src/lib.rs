//! ---
//! cnd_section: "03-lifecycle-management"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Subsystem contract and lifecycle driving."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Subsystem capability contract and the lifecycle driver.
//!
//! A managed unit implements [`Subsystem`]; the orchestrator registers it
//! into a [`SubsystemCell`] and the [`LifecycleDriver`] pushes each cell
//! through `initialize -> validate -> Operational` in dependency order,
//! and through reverse-order teardown on shutdown.

pub mod driver;
pub mod registry;
pub mod state;
pub mod subsystem;

pub use driver::{
    BlockedSubsystem, BootAbort, BootReport, LifecycleDriver, LifecycleError, LifecycleStep,
    TeardownFailure, TeardownReport,
};
pub use registry::{CellStatus, HealthRecord, ReconcileOutcome, SubsystemCell};
pub use state::LifecycleState;
pub use subsystem::{
    call_with_deadline, BoxedSubsystem, CheckpointPayload, StatusMap, Subsystem, SubsystemFailure,
    SubsystemResult,
};
