//! ---
//! cnd_section: "07-interfaces"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Demo workload subsystems shipped with the daemon."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---

//! Built-in demo subsystems the daemon instantiates from `[assembly.<name>]`
//! config tables. Deliberately small; they exist to exercise the lifecycle,
//! not to be useful on their own.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;
use tracing::debug;

use conductor_common::config::{AssemblyUnitConfig, WorkloadKind};
use conductor_lifecycle::{
    BoxedSubsystem, CheckpointPayload, StatusMap, Subsystem, SubsystemFailure, SubsystemResult,
};

/// Build the configured workload for one assembly unit.
pub fn instantiate(name: &str, unit: &AssemblyUnitConfig) -> BoxedSubsystem {
    match unit.kind {
        WorkloadKind::ScratchStore => Box::new(ScratchStore::new(name, &unit.params)),
        WorkloadKind::TemplateRenderer => Box::new(TemplateRenderer::new(name, &unit.params)),
        WorkloadKind::StatusEcho => Box::new(StatusEcho::new(name)),
    }
}

/// In-memory key/value store seeded from config params.
struct ScratchStore {
    name: String,
    seed: IndexMap<String, String>,
    entries: Option<IndexMap<String, String>>,
}

impl ScratchStore {
    fn new(name: &str, params: &IndexMap<String, String>) -> Self {
        Self {
            name: name.to_owned(),
            seed: params.clone(),
            entries: None,
        }
    }
}

#[async_trait]
impl Subsystem for ScratchStore {
    async fn initialize(&mut self) -> SubsystemResult<()> {
        self.entries = Some(self.seed.clone());
        Ok(())
    }

    async fn validate(&mut self) -> SubsystemResult<()> {
        match &self.entries {
            Some(_) => Ok(()),
            None => Err(SubsystemFailure::recoverable("store not initialized")),
        }
    }

    async fn operate(&mut self) -> SubsystemResult<StatusMap> {
        let entries = self
            .entries
            .as_ref()
            .ok_or_else(|| SubsystemFailure::recoverable("store not initialized"))?;
        let mut status = StatusMap::new();
        status.insert("entries".into(), json!(entries.len()));
        Ok(status)
    }

    async fn reconcile(&mut self) -> SubsystemResult<()> {
        if self.entries.is_none() {
            self.entries = Some(self.seed.clone());
        }
        Ok(())
    }

    async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
        let entries = self
            .entries
            .as_ref()
            .ok_or_else(|| SubsystemFailure::recoverable("store not initialized"))?;
        Ok(CheckpointPayload::new(
            "scratch-store",
            1,
            json!({ "entries": entries }),
        ))
    }

    async fn restore(&mut self, payload: CheckpointPayload) -> SubsystemResult<()> {
        if payload.schema != "scratch-store" || payload.version != 1 {
            return Err(SubsystemFailure::recoverable(format!(
                "unsupported payload {}@{}",
                payload.schema, payload.version
            )));
        }
        let entries: IndexMap<String, String> =
            serde_json::from_value(payload.data["entries"].clone())
                .map_err(|err| SubsystemFailure::recoverable(err.to_string()))?;
        debug!(subsystem = %self.name, entries = entries.len(), "scratch store restored");
        self.entries = Some(entries);
        Ok(())
    }

    async fn terminate(&mut self) -> SubsystemResult<()> {
        self.entries = None;
        Ok(())
    }
}

/// Renders a `{name}` template on every probe.
struct TemplateRenderer {
    name: String,
    template: String,
    rendered: u64,
}

impl TemplateRenderer {
    fn new(name: &str, params: &IndexMap<String, String>) -> Self {
        let template = params
            .get("template")
            .cloned()
            .unwrap_or_else(|| String::from("{name} reporting"));
        Self {
            name: name.to_owned(),
            template,
            rendered: 0,
        }
    }
}

#[async_trait]
impl Subsystem for TemplateRenderer {
    async fn initialize(&mut self) -> SubsystemResult<()> {
        Ok(())
    }

    async fn validate(&mut self) -> SubsystemResult<()> {
        if self.template.is_empty() {
            return Err(SubsystemFailure::recoverable("template is empty"));
        }
        Ok(())
    }

    async fn operate(&mut self) -> SubsystemResult<StatusMap> {
        self.rendered += 1;
        let mut status = StatusMap::new();
        status.insert(
            "rendered".into(),
            json!(self.template.replace("{name}", &self.name)),
        );
        status.insert("render_count".into(), json!(self.rendered));
        Ok(status)
    }

    async fn reconcile(&mut self) -> SubsystemResult<()> {
        Ok(())
    }

    async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
        Ok(CheckpointPayload::new(
            "template-renderer",
            1,
            json!({ "rendered": self.rendered }),
        ))
    }

    async fn restore(&mut self, payload: CheckpointPayload) -> SubsystemResult<()> {
        if payload.schema != "template-renderer" || payload.version != 1 {
            return Err(SubsystemFailure::recoverable(format!(
                "unsupported payload {}@{}",
                payload.schema, payload.version
            )));
        }
        self.rendered = payload.data["rendered"].as_u64().unwrap_or(0);
        Ok(())
    }

    async fn terminate(&mut self) -> SubsystemResult<()> {
        Ok(())
    }
}

/// Minimal tick counter, useful as a dependency-free canary.
struct StatusEcho {
    name: String,
    ticks: u64,
}

impl StatusEcho {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ticks: 0,
        }
    }
}

#[async_trait]
impl Subsystem for StatusEcho {
    async fn initialize(&mut self) -> SubsystemResult<()> {
        Ok(())
    }

    async fn validate(&mut self) -> SubsystemResult<()> {
        Ok(())
    }

    async fn operate(&mut self) -> SubsystemResult<StatusMap> {
        self.ticks += 1;
        let mut status = StatusMap::new();
        status.insert("name".into(), json!(self.name));
        status.insert("ticks".into(), json!(self.ticks));
        Ok(status)
    }

    async fn reconcile(&mut self) -> SubsystemResult<()> {
        Ok(())
    }

    async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload> {
        Ok(CheckpointPayload::new(
            "status-echo",
            1,
            json!({ "ticks": self.ticks }),
        ))
    }

    async fn restore(&mut self, payload: CheckpointPayload) -> SubsystemResult<()> {
        if payload.schema != "status-echo" || payload.version != 1 {
            return Err(SubsystemFailure::recoverable(format!(
                "unsupported payload {}@{}",
                payload.schema, payload.version
            )));
        }
        self.ticks = payload.data["ticks"].as_u64().unwrap_or(0);
        Ok(())
    }

    async fn terminate(&mut self) -> SubsystemResult<()> {
        Ok(())
    }
}
