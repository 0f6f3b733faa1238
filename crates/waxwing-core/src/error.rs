use thiserror::Error;

use crate::TaskId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("malformed version {version:?}: segment {segment:?} is not a non-negative integer")]
    InvalidSegment { version: String, segment: String },
    #[error("malformed version {version:?}: segment {segment:?} is too large")]
    SegmentOverflow { version: String, segment: String },
}

/// Everything a migrate call can report back to its caller.
///
/// Skips (already applied, ahead of the app, empty graph) are outcomes,
/// not errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("migration task {task:?} failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("migration task {task:?} panicked: {message}")]
    TaskPanicked { task: String, message: String },

    /// Tasks left unreleased once the pool drained; only a dependency cycle does this.
    #[error("tasks never became runnable (dependency cycle?): {}", tasks.join(", "))]
    Unscheduled { tasks: Vec<String> },

    #[error("task {0} does not belong to this graph")]
    UnknownTask(TaskId),

    #[error("completion store: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("packaging info: {0:#}")]
    Packaging(#[source] anyhow::Error),

    #[error("could not build worker pool: {0}")]
    WorkerPool(String),
}

impl MigrationError {
    /// Failures of the migration work itself, as opposed to setup or collaborator errors.
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailed { .. } | Self::TaskPanicked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_errors_convert() {
        let err: MigrationError = VersionError::Empty.into();
        assert!(matches!(err, MigrationError::Version(VersionError::Empty)));
        assert!(!err.is_task_failure());
    }

    #[test]
    fn messages_name_the_task() {
        let err = MigrationError::TaskFailed {
            task: "copy-prefs".into(),
            source: anyhow::anyhow!("disk full"),
        };
        assert!(err.is_task_failure());
        assert_eq!(err.to_string(), "migration task \"copy-prefs\" failed: disk full");

        let err = MigrationError::Unscheduled { tasks: vec!["a".into(), "b".into()] };
        assert_eq!(err.to_string(), "tasks never became runnable (dependency cycle?): a, b");
    }
}
