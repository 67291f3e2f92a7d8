//! File-backed state store
//!
//! All run state lives under a single directory:
//!
//! ```text
//! <state_dir>/
//!   plan.md            current plan document
//!   tasks.json         task index (summaries + id counter)
//!   status.json        run status snapshot
//!   tasks/<id>.json    one record per task
//!   locks/<id>.lock    claim markers
//!   results/<id>.md    worker reports
//! ```
//!
//! Every versioned write goes through read-modify-write with a version
//! check, serialized by an exclusive `fs2` lock on a stable guard file.
//! Records themselves are replaced atomically (temp file + rename), so
//! readers never observe a half-written document.

use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::lock::{LockManager, LockMarker};
use crate::status::RunStatus;
use crate::task::{NewTask, TaskIndex, TaskRecord, TaskStatus, TaskSummary};

/// Attempts before a versioned update gives up with `Conflict`
pub const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Base backoff between update attempts; scaled linearly by attempt number
pub const UPDATE_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of a stale-claim sweep
#[derive(Debug, Clone, Default)]
pub struct ReclaimReport {
    /// Tasks returned to the pending pool
    pub reset: Vec<String>,
    /// Tasks finalized as failed because their attempt budget ran out
    pub exhausted: Vec<String>,
    /// Markers dropped without touching the record (already terminal or
    /// already pending)
    pub released: Vec<String>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.reset.is_empty() && self.exhausted.is_empty() && self.released.is_empty()
    }
}

enum ReclaimOutcome {
    Reset,
    Exhausted,
    Released,
}

/// Handle to a state directory. Cheap to clone; all methods are safe to
/// call concurrently from multiple actors or processes.
#[derive(Debug, Clone)]
pub struct StateStore {
    base_path: PathBuf,
    locks: LockManager,
}

impl StateStore {
    /// Open or create a state directory, initializing the index and status
    /// documents if they do not exist yet
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join("tasks"))?;
        fs::create_dir_all(base_path.join("results"))?;
        let locks = LockManager::new(base_path.join("locks"))?;

        let store = Self { base_path, locks };
        if !store.index_path().exists() {
            store.atomic_write_json(&store.index_path(), &TaskIndex::default())?;
        }
        if !store.status_path().exists() {
            store.atomic_write_json(&store.status_path(), &RunStatus::default())?;
        }
        debug!(path = %store.base_path.display(), "Opened state store");
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join("tasks.json")
    }

    fn status_path(&self) -> PathBuf {
        self.base_path.join("status.json")
    }

    fn plan_path(&self) -> PathBuf {
        self.base_path.join("plan.md")
    }

    fn record_path(&self, task_id: &str) -> PathBuf {
        self.base_path.join("tasks").join(format!("{task_id}.json"))
    }

    fn result_path(&self, task_id: &str) -> PathBuf {
        self.base_path.join("results").join(format!("{task_id}.md"))
    }

    /// Stable guard file for serializing writes to one record. Lives next
    /// to the record but is never renamed, so an flock on it stays valid
    /// across atomic replacements of the record itself.
    fn guard_path(&self, name: &str) -> PathBuf {
        self.base_path.join("tasks").join(format!(".{name}.guard"))
    }

    // ---- plan ----

    pub fn read_plan(&self) -> StoreResult<String> {
        match fs::read_to_string(self.plan_path()) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_plan(&self, content: &str) -> StoreResult<()> {
        self.atomic_write_bytes(&self.plan_path(), content.as_bytes())
    }

    // ---- task index ----

    pub fn read_task_index(&self) -> StoreResult<TaskIndex> {
        self.read_json(&self.index_path())
    }

    /// Create a new pending task: allocates the next id, writes the record
    /// file, and appends a summary to the index. The whole step runs under
    /// the index guard so concurrent appends never hand out the same id.
    pub fn append_task(&self, new: NewTask) -> StoreResult<TaskRecord> {
        let guard = self.acquire_guard("index")?;

        let mut index: TaskIndex = self.read_json(&self.index_path())?;
        let id = TaskIndex::format_id(index.next_task_id);
        let record = TaskRecord::new(&id, &new);

        self.atomic_write_json(&self.record_path(&id), &record)?;

        index.tasks.push(TaskSummary {
            id: id.clone(),
            title: record.title.clone(),
            priority: record.priority,
            created_at: record.created_at,
        });
        index.next_task_id += 1;
        index.version += 1;
        self.atomic_write_json(&self.index_path(), &index)?;

        drop(guard);
        info!(task_id = %id, title = %record.title, "Appended task");
        Ok(record)
    }

    // ---- task records ----

    pub fn read_task_record(&self, task_id: &str) -> StoreResult<TaskRecord> {
        let path = self.record_path(task_id);
        if !path.exists() {
            return Err(StoreError::NotFound(task_id.to_string()));
        }
        self.read_json(&path)
    }

    /// The single mutation primitive for task records.
    ///
    /// Reads the record, applies `mutate`, and writes it back only if the
    /// on-disk version is still the one that was read. On a version race
    /// the whole step is retried with backoff; after `MAX_UPDATE_ATTEMPTS`
    /// it fails with `Conflict`. An error from `mutate` itself (e.g. an
    /// invalid transition) aborts immediately without retrying, since the
    /// record it saw was consistent.
    pub fn update_task_record<F>(&self, task_id: &str, mut mutate: F) -> StoreResult<TaskRecord>
    where
        F: FnMut(&mut TaskRecord) -> StoreResult<()>,
    {
        let path = self.record_path(task_id);
        if !path.exists() {
            return Err(StoreError::NotFound(task_id.to_string()));
        }

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let snapshot: TaskRecord = self.read_json(&path)?;
            let expected_version = snapshot.version;

            let mut updated = snapshot;
            mutate(&mut updated)?;

            let guard = self.acquire_guard(task_id)?;
            let current: TaskRecord = self.read_json(&path)?;
            if current.version != expected_version {
                drop(guard);
                debug!(
                    task_id,
                    attempt,
                    expected = expected_version,
                    found = current.version,
                    "Version race on task record, retrying"
                );
                std::thread::sleep(UPDATE_BACKOFF * attempt);
                continue;
            }

            updated.version = expected_version + 1;
            self.atomic_write_json(&path, &updated)?;
            drop(guard);
            return Ok(updated);
        }

        warn!(task_id, "Task record update exhausted its retries");
        Err(StoreError::Conflict {
            record: task_id.to_string(),
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }

    /// All task records, ordered by id
    pub fn task_records(&self) -> StoreResult<Vec<TaskRecord>> {
        let index = self.read_task_index()?;
        let mut records = Vec::with_capacity(index.tasks.len());
        for summary in &index.tasks {
            records.push(self.read_task_record(&summary.id)?);
        }
        Ok(records)
    }

    /// Ids of tasks currently in the pending pool, highest priority first
    pub fn pending_task_ids(&self) -> StoreResult<Vec<String>> {
        let mut pending: Vec<TaskRecord> = self
            .task_records()?
            .into_iter()
            .filter(|r| r.status == TaskStatus::Pending)
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(pending.into_iter().map(|r| r.id).collect())
    }

    // ---- run status ----

    pub fn read_status(&self) -> StoreResult<RunStatus> {
        self.read_json(&self.status_path())
    }

    /// Update the run status document under its guard, bumping its version
    pub fn update_status<F>(&self, mut mutate: F) -> StoreResult<RunStatus>
    where
        F: FnMut(&mut RunStatus),
    {
        let guard = self.acquire_guard("status")?;
        let mut status: RunStatus = self.read_json(&self.status_path())?;
        mutate(&mut status);
        status.version += 1;
        status.last_updated = Some(chrono::Utc::now());
        self.atomic_write_json(&self.status_path(), &status)?;
        drop(guard);
        Ok(status)
    }

    /// Recompute task counters from the records and store them
    pub fn refresh_status_counts(&self) -> StoreResult<RunStatus> {
        let records = self.task_records()?;
        let total = records.len() as u32;
        let completed = records.iter().filter(|r| r.status == TaskStatus::Completed).count() as u32;
        let failed = records.iter().filter(|r| r.status == TaskStatus::Failed).count() as u32;
        self.update_status(|s| {
            s.total_tasks = total;
            s.completed_tasks = completed;
            s.failed_tasks = failed;
        })
    }

    // ---- results ----

    /// Store a worker report, returning the path relative to the state dir
    pub fn write_result(&self, task_id: &str, content: &str) -> StoreResult<String> {
        self.atomic_write_bytes(&self.result_path(task_id), content.as_bytes())?;
        Ok(format!("results/{task_id}.md"))
    }

    pub fn read_result(&self, task_id: &str) -> StoreResult<String> {
        let path = self.result_path(task_id);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("result for {task_id}")));
        }
        Ok(fs::read_to_string(&path)?)
    }

    // ---- claims ----

    /// Claim a pending task for a worker: marker first, record second.
    /// If the record transition fails after the marker was created, the
    /// marker is released so the task is not wedged.
    pub fn claim_task(&self, task_id: &str, worker: &str) -> StoreResult<TaskRecord> {
        self.locks.claim(task_id, worker)?;
        match self.update_task_record(task_id, |r| r.assign(worker)) {
            Ok(record) => Ok(record),
            Err(e) => {
                if let Err(release_err) = self.locks.release(task_id) {
                    warn!(task_id, error = %release_err, "Failed to release claim after assign error");
                }
                Err(e)
            }
        }
    }

    /// Finalize a claimed task and release its marker
    pub fn finalize_task<F>(&self, task_id: &str, mutate: F) -> StoreResult<TaskRecord>
    where
        F: FnMut(&mut TaskRecord) -> StoreResult<()>,
    {
        let record = self.update_task_record(task_id, mutate)?;
        self.locks.release(task_id)?;
        Ok(record)
    }

    /// Sweep claims older than `threshold`. Each stale task is either
    /// returned to the pending pool or, once its attempt budget is spent,
    /// finalized as failed. Intended to run from a single arbiter; racing
    /// sweeps are harmless because the record update is versioned.
    pub fn reclaim_stale(&self, threshold: Duration, max_attempts: u32) -> StoreResult<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for marker in self.locks.stale_markers(threshold)? {
            match self.reclaim_one(&marker, max_attempts) {
                Ok(ReclaimOutcome::Reset) => report.reset.push(marker.task_id.clone()),
                Ok(ReclaimOutcome::Exhausted) => report.exhausted.push(marker.task_id.clone()),
                Ok(ReclaimOutcome::Released) => report.released.push(marker.task_id.clone()),
                Err(e) => {
                    warn!(task_id = %marker.task_id, error = %e, "Failed to reclaim stale task");
                    continue;
                }
            }
            self.locks.release(&marker.task_id)?;
        }

        if !report.is_empty() {
            info!(
                reset = report.reset.len(),
                exhausted = report.exhausted.len(),
                released = report.released.len(),
                "Reclaimed stale claims"
            );
        }
        Ok(report)
    }

    fn reclaim_one(&self, marker: &LockMarker, max_attempts: u32) -> StoreResult<ReclaimOutcome> {
        let record = self.read_task_record(&marker.task_id)?;

        // Marker outlived the record's lifecycle; drop it without a reset
        if record.status.is_terminal() || record.status == TaskStatus::Pending {
            return Ok(ReclaimOutcome::Released);
        }

        if record.attempt_count + 1 >= max_attempts {
            let owner = marker.owner.clone();
            self.update_task_record(&marker.task_id, |r| {
                r.fail(&format!("abandoned by {owner} with no attempts remaining"))
            })?;
            Ok(ReclaimOutcome::Exhausted)
        } else {
            self.update_task_record(&marker.task_id, |r| r.reset_to_pending())?;
            Ok(ReclaimOutcome::Reset)
        }
    }

    // ---- low-level I/O ----

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> StoreResult<T> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            source: e,
        })
    }

    fn atomic_write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        self.atomic_write_bytes(path, content.as_bytes())
    }

    /// Write via a temp file in the same directory, then rename over the
    /// destination. Readers see either the old document or the new one.
    fn atomic_write_bytes(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let dir = path.parent().unwrap_or(&self.base_path);
        let tmp = dir.join(format!(
            ".{}.tmp.{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("write"),
            std::process::id()
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Take the exclusive flock guarding a named document. The lock is
    /// dropped when the returned file handle is dropped.
    fn acquire_guard(&self, name: &str) -> StoreResult<GuardFile> {
        let path = self.guard_path(name);
        let file = fs::OpenOptions::new().create(true).write(true).open(&path)?;
        file.lock_exclusive()?;
        Ok(GuardFile { file })
    }
}

/// RAII wrapper that releases the flock on drop
struct GuardFile {
    file: fs::File,
}

impl Drop for GuardFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
