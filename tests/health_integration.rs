//! ---
//! cnd_section: "08-testing-qa"
//! cnd_subsection: "integration-tests"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Integration tests for Conductor health monitoring."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use conductor_common::config::OrchestratorConfig;
use conductor_core::{BootStatus, Orchestrator};
use conductor_health::{DegradationLevel, HealthOutcome};
use conductor_lifecycle::{LifecycleState, SubsystemFailure};
use conductor_testkit::ScriptedSubsystem;

fn config(failure_threshold: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        failure_threshold,
        call_deadline: Some(Duration::from_secs(5)),
        monitor_interval: Duration::from_secs(5),
        checkpoint_interval: None,
        snapshot_retain: 10,
        snapshot_directory: PathBuf::from("target/snapshots"),
    }
}

#[tokio::test]
async fn healthy_subsystems_are_never_reconciled() {
    let orch = Orchestrator::new(config(3), None).unwrap();
    let (sub, handle) = ScriptedSubsystem::pair("steady");
    orch.register("steady", vec![], Box::new(sub)).unwrap();
    orch.initialize_all().await.unwrap();

    for _ in 0..3 {
        let report = orch.monitor_health().await.unwrap();
        assert_eq!(report.observed[0].outcome, HealthOutcome::Healthy);
    }
    assert_eq!(handle.call_count("reconcile"), 0);
    assert_eq!(
        orch.subsystem("steady").unwrap().state(),
        LifecycleState::Operational
    );
}

#[tokio::test]
async fn reconcile_is_idempotent_after_recovery() {
    let orch = Orchestrator::new(config(3), None).unwrap();
    let (sub, handle) = ScriptedSubsystem::pair("wobbly");
    handle.push_operate(Err(SubsystemFailure::recoverable("blip")));
    orch.register("wobbly", vec![], Box::new(sub)).unwrap();
    orch.initialize_all().await.unwrap();

    let report = orch.monitor_health().await.unwrap();
    assert_eq!(report.observed[0].outcome, HealthOutcome::Recovered);
    assert_eq!(handle.call_count("reconcile"), 1);

    // Once healthy again, further sweeps leave the subsystem alone.
    let report = orch.monitor_health().await.unwrap();
    assert_eq!(report.observed[0].outcome, HealthOutcome::Healthy);
    assert_eq!(handle.call_count("reconcile"), 1);
    let cell = orch.subsystem("wobbly").unwrap();
    assert_eq!(cell.status().health.consecutive_failures, 0);
}

#[tokio::test]
async fn threshold_two_with_three_failures_abandons_but_spares_siblings() {
    let orch = Orchestrator::new(config(2), None).unwrap();
    let (a, _) = ScriptedSubsystem::pair("a");
    let (b, b_handle) = ScriptedSubsystem::pair("b");
    let (c, _) = ScriptedSubsystem::pair("c");
    b_handle.push_operate_failures(3, "intermittent");
    for _ in 0..3 {
        b_handle.push_reconcile(Err(SubsystemFailure::recoverable("still down")));
    }

    orch.register("a", vec![], Box::new(a)).unwrap();
    orch.register("b", vec!["a".into()], Box::new(b)).unwrap();
    orch.register("c", vec!["a".into()], Box::new(c)).unwrap();
    orch.initialize_all().await.unwrap();

    let outcomes: Vec<HealthOutcome> = {
        let mut collected = Vec::new();
        for _ in 0..3 {
            let report = orch.monitor_health().await.unwrap();
            let entry = report
                .observed
                .iter()
                .find(|entry| entry.name == "b")
                .unwrap();
            collected.push(entry.outcome);
        }
        collected
    };
    assert_eq!(
        outcomes,
        vec![
            HealthOutcome::StillDegraded,
            HealthOutcome::StillDegraded,
            HealthOutcome::Abandoned,
        ]
    );

    let state = orch.system_state();
    assert_eq!(state.boot, BootStatus::PartiallyOperational);
    assert_eq!(state.degradation, DegradationLevel::Critical);
    let b_state = state
        .subsystems
        .iter()
        .find(|entry| entry.name == "b")
        .unwrap();
    assert_eq!(b_state.state, LifecycleState::Degraded);
    assert_eq!(b_state.health.consecutive_failures, 3);
    for name in ["a", "c"] {
        let entry = state
            .subsystems
            .iter()
            .find(|entry| entry.name == name)
            .unwrap();
        assert_eq!(entry.state, LifecycleState::Operational);
    }
}

#[tokio::test]
async fn fatal_probe_removes_subsystem_from_rotation() {
    let orch = Orchestrator::new(config(3), None).unwrap();
    let (sub, handle) = ScriptedSubsystem::pair("doomed");
    handle.push_operate(Err(SubsystemFailure::fatal("hardware gone")));
    orch.register("doomed", vec![], Box::new(sub)).unwrap();
    orch.initialize_all().await.unwrap();

    let report = orch.monitor_health().await.unwrap();
    assert_eq!(report.observed[0].outcome, HealthOutcome::TerminatedFatal);
    assert_eq!(handle.call_count("terminate"), 1);

    // Terminated subsystems are no longer probed.
    let report = orch.monitor_health().await.unwrap();
    assert!(report.observed.is_empty());
    assert_eq!(handle.call_count("operate"), 1);
}

#[tokio::test]
async fn deadline_overrun_is_fatal_for_the_probe() {
    use async_trait::async_trait;
    use conductor_lifecycle::{CheckpointPayload, StatusMap, Subsystem, SubsystemResult};

    struct Hung;
    #[async_trait]
    impl Subsystem for Hung {
        async fn initialize(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn validate(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn operate(&mut self) -> SubsystemResult<StatusMap> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(StatusMap::new())
        }
        async fn reconcile(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
        async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
            Ok(CheckpointPayload::new("hung", 1, serde_json::json!({})))
        }
        async fn restore(&mut self, _payload: CheckpointPayload) -> SubsystemResult<()> {
            Ok(())
        }
        async fn terminate(&mut self) -> SubsystemResult<()> {
            Ok(())
        }
    }

    let mut cfg = config(3);
    cfg.call_deadline = Some(Duration::from_millis(50));
    let orch = Orchestrator::new(cfg, None).unwrap();
    orch.register("hung", vec![], Box::new(Hung)).unwrap();
    orch.initialize_all().await.unwrap();

    let report = orch.monitor_health().await.unwrap();
    assert_eq!(report.observed[0].outcome, HealthOutcome::TerminatedFatal);
    assert_eq!(
        orch.subsystem("hung").unwrap().state(),
        LifecycleState::Terminated
    );
}
