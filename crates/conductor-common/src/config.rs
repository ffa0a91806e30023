//! ---
//! cnd_section: "01-core-functionality"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Shared primitives and utilities for the Conductor runtime."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_snapshot_retain() -> usize {
    10
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("target/snapshots")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9797"
        .parse()
        .expect("valid default metrics address")
}

/// Primary configuration object for the Conductor runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub assembly: IndexMap<String, AssemblyUnitConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "CONDUCTOR_CONFIG";

    /// Load configuration from disk, respecting the `CONDUCTOR_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve an assembly unit configuration by name.
    pub fn unit(&self, name: &str) -> Option<&AssemblyUnitConfig> {
        self.assembly.get(name)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        for (name, unit) in &self.assembly {
            unit.validate(name)?;
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            orchestrator: OrchestratorConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            assembly: IndexMap::new(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the orchestrator.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Rehearsal,
}

impl Mode {
    pub fn is_rehearsal(&self) -> bool {
        matches!(self, Mode::Rehearsal)
    }
}

/// Tunables governing lifecycle driving, health monitoring, and checkpointing.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Consecutive recoverable failures tolerated before reconciliation is abandoned.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Optional deadline applied to every subsystem lifecycle call.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub call_deadline: Option<Duration>,
    /// Cadence of the daemon health monitoring pass.
    #[serde(default = "default_monitor_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub monitor_interval: Duration,
    /// Optional cadence for periodic checkpoint sweeps. Disabled when absent.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub checkpoint_interval: Option<Duration>,
    /// Number of assembled snapshots retained in memory for inspection.
    #[serde(default = "default_snapshot_retain")]
    pub snapshot_retain: usize,
    /// Directory where the daemon writes snapshot files.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_directory: PathBuf,
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.monitor_interval.is_zero() {
            return Err(anyhow!("orchestrator.monitor_interval must be non-zero"));
        }
        if let Some(deadline) = self.call_deadline {
            if deadline.is_zero() {
                return Err(anyhow!("orchestrator.call_deadline must be non-zero"));
            }
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            call_deadline: None,
            monitor_interval: default_monitor_interval(),
            checkpoint_interval: None,
            snapshot_retain: default_snapshot_retain(),
            snapshot_directory: default_snapshot_path(),
        }
    }
}

/// Declaration of a single managed unit in the daemon assembly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssemblyUnitConfig {
    #[serde(default)]
    pub kind: WorkloadKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub params: IndexMap<String, String>,
}

impl AssemblyUnitConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.depends_on.iter().any(|dep| dep == name) {
            return Err(anyhow!("assembly unit '{}' depends on itself", name));
        }
        Ok(())
    }
}

/// Built-in demo workloads the daemon can instantiate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    /// In-memory scratch key/value store.
    ScratchStore,
    /// String template renderer.
    TemplateRenderer,
    /// Tick counter reporting uptime status.
    #[default]
    StatusEcho,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
