//! Store error types

use thiserror::Error;

/// Errors from state store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {record} after {attempts} attempts")]
    Conflict { record: String, attempts: u32 },

    #[error("Invalid transition for {task}: {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    #[error("Task already claimed: {task} (owner: {owner})")]
    AlreadyClaimed { task: String, owner: String },

    #[error("Corrupt state file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Check if this error is transient and worth retrying at the next
    /// loop iteration (as opposed to a caller bug or a fatal storage error)
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::AlreadyClaimed { .. })
    }

    /// Fatal errors halt the loop: continuing without durable storage
    /// risks silent data loss
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_transient() {
        let err = StoreError::Conflict {
            record: "task_001".to_string(),
            attempts: 5,
        };
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_is_fatal() {
        let err = StoreError::Io(std::io::Error::other("disk gone"));
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_invalid_transition_is_neither() {
        let err = StoreError::InvalidTransition {
            task: "task_001".to_string(),
            from: "completed".to_string(),
            to: "assigned".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_fatal());
    }
}
