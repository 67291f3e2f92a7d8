//! StateStore - file-backed run state for the troika loop
//!
//! Persists everything the orchestrator and its actors share: the plan
//! document, the task index and per-task records, claim markers, worker
//! reports, and the run status snapshot.
//!
//! # Layout
//!
//! ```text
//! .troika/
//! ├── plan.md              # current plan
//! ├── tasks.json           # task index (summaries + id counter)
//! ├── status.json          # run status snapshot
//! ├── tasks/
//! │   ├── task_001.json
//! │   └── task_002.json
//! ├── locks/
//! │   └── task_002.lock    # claim marker
//! └── results/
//!     └── task_001.md      # worker report
//! ```
//!
//! # Example
//!
//! ```ignore
//! use statestore::{NewTask, StateStore};
//!
//! let store = StateStore::open(".troika")?;
//! let task = store.append_task(NewTask::new("write docs", "document the CLI"))?;
//! store.claim_task(&task.id, "worker-1")?;
//! store.update_task_record(&task.id, |r| r.start())?;
//! store.finalize_task(&task.id, |r| r.complete(None))?;
//! ```

pub mod cli;
mod error;
mod lock;
mod status;
mod store;
mod task;

pub use error::{StoreError, StoreResult};
pub use lock::{LockManager, LockMarker};
pub use status::RunStatus;
pub use store::{ReclaimReport, StateStore, MAX_UPDATE_ATTEMPTS, UPDATE_BACKOFF};
pub use task::{NewTask, Priority, TaskIndex, TaskRecord, TaskStatus, TaskSummary};

/// Default age after which a claim marker is considered abandoned
pub const DEFAULT_LOCK_STALE_SECS: u64 = 300;

/// Default attempt budget per task before it is finalized as failed
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
