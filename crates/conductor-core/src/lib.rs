//! ---
//! cnd_section: "01-core-functionality"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Primary orchestration and lifecycle management."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! The orchestrator facade.
//!
//! [`Orchestrator`] composes the dependency graph, the lifecycle driver,
//! the health monitor, and the checkpoint store behind one explicit value.
//! There is no process-wide singleton; callers construct as many
//! orchestrators as they need.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{OperateReport, Orchestrator, OrchestratorError};
pub use state::{BootStatus, SubsystemState, SystemState};
