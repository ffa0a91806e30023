//! ---
//! cnd_section: "08-testing-qa"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Scripted subsystem fixtures for test suites."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Scripted [`Subsystem`] implementations for exercising the orchestrator.
//!
//! Every lifecycle call defaults to success; tests push failure results per
//! step through the [`ScriptHandle`] and inspect the recorded call log
//! afterwards.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use conductor_lifecycle::{
    CheckpointPayload, StatusMap, Subsystem, SubsystemFailure, SubsystemResult,
};

#[derive(Default)]
struct Script {
    initialize: VecDeque<SubsystemResult<()>>,
    validate: VecDeque<SubsystemResult<()>>,
    operate: VecDeque<SubsystemResult<StatusMap>>,
    reconcile: VecDeque<SubsystemResult<()>>,
    checkpoint: VecDeque<SubsystemResult<CheckpointPayload>>,
    restore: VecDeque<SubsystemResult<()>>,
    terminate: VecDeque<SubsystemResult<()>>,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<String>,
    restored_payloads: Vec<CheckpointPayload>,
}

/// Remote control for one [`ScriptedSubsystem`].
///
/// Remains usable after the subsystem itself has been boxed and handed to
/// the orchestrator.
#[derive(Clone)]
pub struct ScriptHandle {
    name: String,
    script: Arc<Mutex<Script>>,
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptHandle {
    /// Queue a result for the next `initialize` call.
    pub fn push_initialize(&self, result: SubsystemResult<()>) {
        self.script.lock().initialize.push_back(result);
    }

    /// Queue a result for the next `validate` call.
    pub fn push_validate(&self, result: SubsystemResult<()>) {
        self.script.lock().validate.push_back(result);
    }

    /// Queue a result for the next `operate` call.
    pub fn push_operate(&self, result: SubsystemResult<StatusMap>) {
        self.script.lock().operate.push_back(result);
    }

    /// Queue `count` recoverable `operate` failures in a row.
    pub fn push_operate_failures(&self, count: usize, reason: &str) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script
                .operate
                .push_back(Err(SubsystemFailure::recoverable(reason)));
        }
    }

    /// Queue a result for the next `reconcile` call.
    pub fn push_reconcile(&self, result: SubsystemResult<()>) {
        self.script.lock().reconcile.push_back(result);
    }

    /// Queue a result for the next `checkpoint` call.
    pub fn push_checkpoint(&self, result: SubsystemResult<CheckpointPayload>) {
        self.script.lock().checkpoint.push_back(result);
    }

    /// Queue a result for the next `restore` call.
    pub fn push_restore(&self, result: SubsystemResult<()>) {
        self.script.lock().restore.push_back(result);
    }

    /// Queue a result for the next `terminate` call.
    pub fn push_terminate(&self, result: SubsystemResult<()>) {
        self.script.lock().terminate.push_back(result);
    }

    /// Names of lifecycle calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.recorded.lock().calls.clone()
    }

    /// Number of times the named call was received.
    pub fn call_count(&self, call: &str) -> usize {
        self.recorded
            .lock()
            .calls
            .iter()
            .filter(|recorded| recorded.as_str() == call)
            .count()
    }

    /// Payloads handed to `restore` so far.
    pub fn restored_payloads(&self) -> Vec<CheckpointPayload> {
        self.recorded.lock().restored_payloads.clone()
    }

    /// Fixture name, also used as the checkpoint schema.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A [`Subsystem`] whose per-call outcomes are queued by the test.
///
/// Unscripted calls succeed; an unscripted `checkpoint` produces a payload
/// carrying the running call count.
pub struct ScriptedSubsystem {
    name: String,
    script: Arc<Mutex<Script>>,
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptedSubsystem {
    /// Create a fixture and its control handle.
    pub fn pair(name: impl Into<String>) -> (Self, ScriptHandle) {
        let name = name.into();
        let script = Arc::new(Mutex::new(Script::default()));
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let handle = ScriptHandle {
            name: name.clone(),
            script: script.clone(),
            recorded: recorded.clone(),
        };
        (
            Self {
                name,
                script,
                recorded,
            },
            handle,
        )
    }

    fn record(&self, call: &str) {
        self.recorded.lock().calls.push(call.to_owned());
    }
}

#[async_trait]
impl Subsystem for ScriptedSubsystem {
    async fn initialize(&mut self) -> SubsystemResult<()> {
        self.record("initialize");
        self.script.lock().initialize.pop_front().unwrap_or(Ok(()))
    }

    async fn validate(&mut self) -> SubsystemResult<()> {
        self.record("validate");
        self.script.lock().validate.pop_front().unwrap_or(Ok(()))
    }

    async fn operate(&mut self) -> SubsystemResult<StatusMap> {
        self.record("operate");
        self.script
            .lock()
            .operate
            .pop_front()
            .unwrap_or_else(|| Ok(StatusMap::new()))
    }

    async fn reconcile(&mut self) -> SubsystemResult<()> {
        self.record("reconcile");
        self.script.lock().reconcile.pop_front().unwrap_or(Ok(()))
    }

    async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
        self.record("checkpoint");
        let scripted = self.script.lock().checkpoint.pop_front();
        scripted.unwrap_or_else(|| {
            let calls = self.recorded.lock().calls.len();
            Ok(CheckpointPayload::new(
                self.name.clone(),
                1,
                serde_json::json!({ "calls": calls }),
            ))
        })
    }

    async fn restore(&mut self, payload: CheckpointPayload) -> SubsystemResult<()> {
        self.record("restore");
        let scripted = self.script.lock().restore.pop_front();
        self.recorded.lock().restored_payloads.push(payload);
        scripted.unwrap_or(Ok(()))
    }

    async fn terminate(&mut self) -> SubsystemResult<()> {
        self.record("terminate");
        self.script.lock().terminate.pop_front().unwrap_or(Ok(()))
    }
}
