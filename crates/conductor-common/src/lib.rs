//! ---
//! cnd_section: "01-core-functionality"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Shared primitives and utilities for the Conductor runtime."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
//! Core shared primitives for the Conductor orchestrator workspace.
//! This crate exposes configuration loading, logging, and version
//! metadata utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    AppConfig, AssemblyUnitConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, Mode,
    OrchestratorConfig, WorkloadKind,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
