//! ---
//! cnd_section: "05-checkpoint-restore"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Versioned snapshots and completeness-validated restore."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::store::SystemSnapshot;

/// Errors raised while archiving snapshots to disk.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem failure.
    #[error("snapshot archive I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// Envelope encode/decode failure.
    #[error("snapshot serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
    /// The stored hash does not match the snapshot content.
    #[error("snapshot integrity hash mismatch at {path}")]
    HashMismatch {
        /// Archive file that failed verification.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format: u16,
    hash: String,
    snapshot: SystemSnapshot,
}

const ENVELOPE_FORMAT: u16 = 1;

fn compute_hash(snapshot: &SystemSnapshot) -> Result<String, ArchiveError> {
    let bytes = serde_json::to_vec(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// File name for a snapshot with the given sequence number.
///
/// Zero-padded so lexical order matches sequence order.
pub fn snapshot_file_name(sequence: u64) -> String {
    format!("snapshot-{sequence:010}.json")
}

/// Persist a snapshot under `dir`, creating the directory as needed.
///
/// The write goes through a sibling temp file and an atomic rename, so a
/// crash mid-write never leaves a truncated archive behind.
pub fn save_snapshot(dir: &Path, snapshot: &SystemSnapshot) -> Result<PathBuf, ArchiveError> {
    fs::create_dir_all(dir)?;

    let envelope = SnapshotEnvelope {
        format: ENVELOPE_FORMAT,
        hash: compute_hash(snapshot)?,
        snapshot: snapshot.clone(),
    };

    let path = dir.join(snapshot_file_name(snapshot.sequence));
    let staging = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        let json = serde_json::to_vec_pretty(&envelope)?;
        writer.write_all(&json)?;
        writer.flush()?;
    }
    fs::rename(&staging, &path)?;
    debug!(path = %path.display(), sequence = snapshot.sequence, "snapshot archived");
    Ok(path)
}

/// Load a snapshot from disk, verifying its integrity hash.
pub fn load_snapshot(path: &Path) -> Result<SystemSnapshot, ArchiveError> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let envelope: SnapshotEnvelope = serde_json::from_slice(&bytes)?;
    let expected = compute_hash(&envelope.snapshot)?;
    if envelope.hash != expected {
        return Err(ArchiveError::HashMismatch {
            path: path.to_path_buf(),
        });
    }
    Ok(envelope.snapshot)
}

/// Path of the highest-sequence archive under `dir`, if any exist.
pub fn latest_snapshot_path(dir: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("snapshot-") && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    Ok(candidates.pop())
}

/// Delete all but the newest `retain` archives under `dir`.
pub fn prune_snapshots(dir: &Path, retain: usize) -> Result<usize, ArchiveError> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("snapshot-") && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    let mut removed = 0;
    while candidates.len() > retain {
        let victim = candidates.remove(0);
        fs::remove_file(&victim)?;
        debug!(path = %victim.display(), "stale snapshot pruned");
        removed += 1;
    }
    Ok(removed)
}
