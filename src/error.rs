//! Error types for the nautilus data store and scheduler.

/// Failure reported by the git command-line driver.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// The git binary could not be started.
    #[error("cannot run git: {0}")]
    Spawn(#[source] std::io::Error),

    /// The directory for a clone could not be created.
    #[error("cannot create clone directory {}: {source}", path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A git command exited unsuccessfully.
    #[error("git {args} failed (exit {code:?}): {stderr}")]
    CommandFailed {
        /// Space-joined arguments (credentials redacted).
        args: String,
        /// Process exit code, if any.
        code: Option<i32>,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// The remote refused the push because it advanced since our last pull.
    #[error("push to {branch} rejected: {detail}")]
    PushRejected {
        /// Branch that was pushed.
        branch: String,
        /// Reason reported by the remote.
        detail: String,
    },

    /// The tracked branch does not exist on the remote yet.
    #[error("remote branch {0} does not exist")]
    MissingRemoteBranch(String),
}

/// Top-level error type for nautilus.
#[derive(Debug, thiserror::Error)]
pub enum NautilusError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Version-control failure.
    #[error("git error: {0}")]
    Git(#[from] GitError),

    /// An update referenced a task id that is not in the backlog.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A project mutation ran before `project.json` existed.
    #[error("project.json not found")]
    ProjectMissing,

    /// A project plan could not be turned into a backlog.
    #[error("invalid project plan: {0}")]
    InvalidPlan(String),

    /// The operation queue worker is gone.
    #[error("operation queue closed")]
    QueueClosed,
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NautilusError>;
