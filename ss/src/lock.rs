//! Per-task lock markers
//!
//! A marker file under `locks/` is the authoritative signal that a task is
//! claimed, independent of the record's `status` field (which can lag if a
//! worker dies mid-update). Creation uses `create_new` so exactly one of
//! several racing claimants wins; the losers fail cleanly without touching
//! the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Contents of a lock marker file (`locks/<task_id>.lock`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMarker {
    pub task_id: String,
    /// Worker identity that created the claim
    pub owner: String,
    pub claimed_at: DateTime<Utc>,
}

impl LockMarker {
    /// Age of this claim relative to now
    pub fn age(&self) -> Duration {
        (Utc::now() - self.claimed_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// A marker older than the threshold is presumed abandoned
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }
}

/// Manages claim markers for tasks
#[derive(Debug, Clone)]
pub struct LockManager {
    lock_dir: PathBuf,
}

impl LockManager {
    pub fn new(lock_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let lock_dir = lock_dir.as_ref().to_path_buf();
        fs::create_dir_all(&lock_dir)?;
        Ok(Self { lock_dir })
    }

    fn marker_path(&self, task_id: &str) -> PathBuf {
        self.lock_dir.join(format!("{task_id}.lock"))
    }

    /// Atomically claim a task: create the marker if and only if it does
    /// not exist. Returns `AlreadyClaimed` if another claimant holds it.
    pub fn claim(&self, task_id: &str, owner: &str) -> StoreResult<LockMarker> {
        let path = self.marker_path(task_id);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = self
                    .read_marker(task_id)?
                    .map(|m| m.owner)
                    .unwrap_or_else(|| "unknown".to_string());
                debug!(task_id, holder, "Claim lost: marker exists");
                return Err(StoreError::AlreadyClaimed {
                    task: task_id.to_string(),
                    owner: holder,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let marker = LockMarker {
            task_id: task_id.to_string(),
            owner: owner.to_string(),
            claimed_at: Utc::now(),
        };
        file.write_all(serde_json::to_string_pretty(&marker).map_err(io_from_json)?.as_bytes())?;
        file.sync_all()?;

        debug!(task_id, owner, "Claimed task");
        Ok(marker)
    }

    /// Remove the marker for a task. Releasing an unclaimed task is a no-op.
    pub fn release(&self, task_id: &str) -> StoreResult<()> {
        let path = self.marker_path(task_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(task_id, "Released claim");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a task currently has a marker
    pub fn is_claimed(&self, task_id: &str) -> bool {
        self.marker_path(task_id).exists()
    }

    /// Read a task's marker, if present. An unreadable marker (a claimant
    /// died between creating the file and writing its body) still counts
    /// as a claim: it is reported with owner "unknown" and a claim time
    /// taken from the file's mtime, so the stale sweep can recover it.
    pub fn read_marker(&self, task_id: &str) -> StoreResult<Option<LockMarker>> {
        let path = self.marker_path(task_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!(task_id, error = %e, "Unreadable lock marker; treating as an unknown claimant");
                let claimed_at = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Ok(Some(LockMarker {
                    task_id: task_id.to_string(),
                    owner: "unknown".to_string(),
                    claimed_at,
                }))
            }
        }
    }

    /// List all current markers
    pub fn markers(&self) -> StoreResult<Vec<LockMarker>> {
        let mut markers = Vec::new();
        for entry in fs::read_dir(&self.lock_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "lock").unwrap_or(false)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Some(marker) = self.read_marker(stem)?
            {
                markers.push(marker);
            }
        }
        Ok(markers)
    }

    /// Markers whose claim age exceeds the threshold
    pub fn stale_markers(&self, threshold: Duration) -> StoreResult<Vec<LockMarker>> {
        Ok(self.markers()?.into_iter().filter(|m| m.is_stale(threshold)).collect())
    }
}

fn io_from_json(e: serde_json::Error) -> StoreError {
    StoreError::Io(std::io::Error::other(e))
}
