//! ---
//! cnd_section: "07-interfaces"
//! cnd_subsection: "binary"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Binary entrypoint for the Conductor daemon."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use conductor_checkpoint::{prune_snapshots, save_snapshot};
use conductor_common::config::{AppConfig, Mode};
use conductor_common::logging::init_tracing;
use conductor_common::version::VersionInfo;
use conductor_core::Orchestrator;
use conductor_metrics::{new_registry, spawn_http_server, DaemonMetrics, SharedRegistry};
use tokio::signal;
use tracing::{error, info, warn};

mod workloads;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("Conductor ", env!("CARGO_PKG_VERSION")),
    about = "Conductor daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Rehearsal,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Rehearsal => Mode::Rehearsal,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Boot the assembly and keep it healthy until interrupted")]
    Run,
    #[command(about = "Boot the assembly, print its state as JSON, and tear down")]
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    let load_duration = load_started.elapsed();

    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    init_tracing("conductord", &config.logging)?;
    info!(source = %loaded.source.display(), mode = ?config.mode, "configuration loaded");

    let metrics_registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(version.version(), version.profile());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, metrics_registry).await,
        Commands::Status => status(config).await,
    }
}

fn build_assembly(orchestrator: &Orchestrator, config: &AppConfig) -> Result<()> {
    for (name, unit) in &config.assembly {
        let subsystem = workloads::instantiate(name, unit);
        orchestrator
            .register(name.clone(), unit.depends_on.clone(), subsystem)
            .with_context(|| format!("failed to register assembly unit '{}'", name))?;
    }
    Ok(())
}

async fn run_daemon(config: AppConfig, registry: SharedRegistry) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let metrics_server = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), metrics_settings.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let orchestrator_registry = metrics_settings.enabled.then(|| registry.clone());
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), orchestrator_registry)?;
    build_assembly(&orchestrator, &config)?;

    let report = orchestrator.boot_all().await?;
    if let Some(abort) = &report.aborted {
        bail!(
            "boot aborted: subsystem '{}' failed during {}: {}",
            abort.subsystem,
            abort.step,
            abort.cause
        );
    }
    for blocked in &report.blocked {
        warn!(
            subsystem = %blocked.name,
            blocked_on = %blocked.blocked_on,
            "subsystem held back from boot"
        );
    }
    info!(
        started = report.started.len(),
        blocked = report.blocked.len(),
        "assembly booted; waiting for termination signal"
    );

    let cfg = &config.orchestrator;
    let mut monitor_tick = tokio::time::interval(cfg.monitor_interval);
    monitor_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick of a tokio interval fires immediately.
    monitor_tick.tick().await;

    let checkpoint_enabled = cfg.checkpoint_interval.is_some();
    let mut checkpoint_tick = tokio::time::interval(
        cfg.checkpoint_interval
            .unwrap_or(std::time::Duration::from_secs(3600)),
    );
    checkpoint_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    checkpoint_tick.tick().await;

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for the interrupt signal")?;
                info!("interrupt received; shutting down");
                break;
            }
            _ = monitor_tick.tick() => {
                match orchestrator.monitor_health().await {
                    Ok(health) => {
                        info!(
                            observed = health.observed.len(),
                            healthy = health.healthy_count(),
                            degradation = %health.degradation(),
                            "health sweep complete"
                        );
                    }
                    Err(err) => error!(error = %err, "health sweep failed"),
                }
            }
            _ = checkpoint_tick.tick(), if checkpoint_enabled => {
                match orchestrator.checkpoint_all().await {
                    Ok(sweep) => {
                        for (name, cause) in &sweep.failures {
                            warn!(subsystem = %name, error = %cause, "checkpoint failed");
                        }
                        match save_snapshot(&cfg.snapshot_directory, &sweep.snapshot) {
                            Ok(path) => info!(
                                sequence = sweep.snapshot.sequence,
                                path = %path.display(),
                                "snapshot archived"
                            ),
                            Err(err) => error!(error = %err, "snapshot archive failed"),
                        }
                        if let Err(err) = prune_snapshots(&cfg.snapshot_directory, cfg.snapshot_retain) {
                            warn!(error = %err, "snapshot pruning failed");
                        }
                    }
                    Err(err) => error!(error = %err, "checkpoint sweep failed"),
                }
            }
        }
    }

    let teardown = orchestrator.shutdown().await?;
    for failure in &teardown.failures {
        warn!(
            subsystem = %failure.subsystem,
            error = %failure.cause,
            "subsystem did not terminate cleanly"
        );
    }
    info!(
        terminated = teardown.terminated.len(),
        failures = teardown.failures.len(),
        "assembly torn down"
    );

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

async fn status(config: AppConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), None)?;
    build_assembly(&orchestrator, &config)?;
    let report = orchestrator.boot_all().await?;
    if let Some(abort) = &report.aborted {
        warn!(
            subsystem = %abort.subsystem,
            step = %abort.step,
            error = %abort.cause,
            "boot aborted"
        );
    }
    let state = orchestrator.system_state();
    println!("{}", serde_json::to_string_pretty(&state)?);
    orchestrator.terminate_all().await?;
    Ok(())
}
