//! ---
//! cnd_section: "03-lifecycle-management"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Subsystem contract and lifecycle driving."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serializable key/value status snapshot returned by `operate`.
pub type StatusMap = IndexMap<String, serde_json::Value>;

/// Failure reported by a subsystem lifecycle call.
///
/// The two variants carry the failure-handling trichotomy: recoverable
/// faults are routed through reconciliation, fatal faults fail closed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubsystemFailure {
    /// Transient fault; the health monitor will attempt reconciliation.
    #[error("recoverable fault: {0}")]
    Recoverable(String),
    /// The subsystem reports it cannot recover; it is never retried.
    #[error("fatal fault: {0}")]
    Fatal(String),
}

impl SubsystemFailure {
    /// Construct a recoverable failure.
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable(reason.into())
    }

    /// Construct a fatal failure.
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    /// Whether this failure ends the subsystem for good.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Result alias for subsystem lifecycle calls.
pub type SubsystemResult<T> = Result<T, SubsystemFailure>;

/// Self-describing, versioned payload produced by `checkpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    /// Identifier of the payload schema, chosen by the subsystem.
    pub schema: String,
    /// Schema version; restore rejects payloads it cannot interpret.
    pub version: u32,
    /// Opaque serialized state.
    pub data: serde_json::Value,
}

impl CheckpointPayload {
    /// Assemble a payload from its parts.
    pub fn new(schema: impl Into<String>, version: u32, data: serde_json::Value) -> Self {
        Self {
            schema: schema.into(),
            version,
            data,
        }
    }
}

/// Capability contract every orchestrated unit must implement.
///
/// Calls are treated as potentially blocking; the orchestrator wraps each in
/// [`call_with_deadline`] when a per-call deadline is configured.
#[async_trait]
pub trait Subsystem: Send {
    /// Allocate resources and verify preconditions. No side effects visible
    /// to other subsystems before returning success.
    async fn initialize(&mut self) -> SubsystemResult<()>;

    /// Confirm configuration and dependencies are consistent. Idempotent and
    /// side-effect free.
    async fn validate(&mut self) -> SubsystemResult<()>;

    /// Return a status snapshot. Doubles as the health probe.
    async fn operate(&mut self) -> SubsystemResult<StatusMap>;

    /// Attempt to repair detected inconsistency. Safe to call repeatedly.
    async fn reconcile(&mut self) -> SubsystemResult<()>;

    /// Produce a payload sufficient to reconstruct current state.
    async fn checkpoint(&mut self) -> SubsystemResult<CheckpointPayload>;

    /// Reconstruct state from a checkpoint payload. A schema mismatch is a
    /// rejection, reported per subsystem.
    async fn restore(&mut self, payload: CheckpointPayload) -> SubsystemResult<()>;

    /// Release all resources. Must be an idempotent no-op when already
    /// terminated.
    async fn terminate(&mut self) -> SubsystemResult<()>;
}

/// Owned trait object handle held by the orchestrator for a subsystem's lifetime.
pub type BoxedSubsystem = Box<dyn Subsystem>;

/// Run a lifecycle call under the configured deadline.
///
/// An elapsed deadline is treated as an unrecoverable outcome for the
/// subsystem, matching the health trichotomy.
pub async fn call_with_deadline<T, F>(deadline: Option<Duration>, call: F) -> SubsystemResult<T>
where
    F: Future<Output = SubsystemResult<T>> + Send,
{
    match deadline {
        None => call.await,
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(SubsystemFailure::Fatal(format!(
                "call deadline of {}ms elapsed",
                limit.as_millis()
            ))),
        },
    }
}
