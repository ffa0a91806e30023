//! ---
//! cnd_section: "05-checkpoint-restore"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Versioned snapshots and completeness-validated restore."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Snapshot capture and restore for the managed assembly.
//!
//! A [`SystemSnapshot`] is versioned and carries a monotonically increasing
//! sequence number instead of a timestamp, so two snapshots taken in the
//! same instant remain ordered. [`archive`] persists snapshots to disk
//! inside an integrity-hashed envelope.

pub mod archive;
pub mod store;

pub use archive::{
    latest_snapshot_path, load_snapshot, prune_snapshots, save_snapshot, ArchiveError,
};
pub use store::{
    CheckpointStore, CheckpointSweep, RestoreError, RestoreReport, SystemSnapshot,
    SNAPSHOT_VERSION,
};
