//! Git-backed data repository.
//!
//! [`DataRepo`] owns the local clone of the data repository and exposes
//! document reads/writes plus the clone/pull/commit/push lifecycle. Every
//! call is funnelled through one [`OperationQueue`], so reads, writes and
//! git commands against the clone never interleave.

use crate::config::DataRepoConfig;
use crate::error::{GitError, Result};
use crate::sync::git::{Git, redact_url};
use crate::sync::queue::OperationQueue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of [`DataRepo::commit_and_push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Working tree was clean; nothing committed or pushed.
    NoChanges,
    /// A commit was created and pushed.
    Pushed {
        /// Number of changed paths in the commit.
        files: usize,
    },
}

struct RepoInner {
    git: Git,
    remote_url: String,
    branch: String,
    author_name: String,
    author_email: String,
    queue: OperationQueue,
}

/// Handle to the local clone. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct DataRepo {
    inner: Arc<RepoInner>,
}

impl DataRepo {
    /// Build a handle from config without touching the filesystem.
    ///
    /// Must be called inside a tokio runtime (spawns the queue worker).
    pub fn new(config: &DataRepoConfig) -> Self {
        Self {
            inner: Arc::new(RepoInner {
                git: Git::new(config.resolved_local_path()),
                remote_url: remote_url(&config.remote, config.token.as_deref()),
                branch: config.branch.clone(),
                author_name: config.author_name.clone(),
                author_email: config.author_email.clone(),
                queue: OperationQueue::spawn(),
            }),
        }
    }

    /// Build a handle and run [`DataRepo::ensure_repo`].
    pub async fn open(config: &DataRepoConfig) -> Result<Self> {
        let repo = Self::new(config);
        repo.ensure_repo().await?;
        Ok(repo)
    }

    /// Local clone directory.
    pub fn local_path(&self) -> &Path {
        self.inner.git.workdir()
    }

    /// Tracked branch.
    pub fn branch(&self) -> &str {
        &self.inner.branch
    }

    /// Clone the remote if needed, otherwise pull; then set the commit identity.
    pub async fn ensure_repo(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(move || async move {
                let git = &inner.git;
                if git.is_repo() {
                    debug!(path = %git.workdir().display(), "pulling existing clone");
                    pull_if_remote_branch_exists(git, &inner.branch).await?;
                } else {
                    info!(
                        remote = %redact_url(&inner.remote_url),
                        path = %git.workdir().display(),
                        "cloning data repository"
                    );
                    git.clone_from(&inner.remote_url).await?;
                    if !git.has_commits().await? {
                        git.set_unborn_branch(&inner.branch).await?;
                    }
                }
                git.set_config("user.email", &inner.author_email).await?;
                git.set_config("user.name", &inner.author_name).await?;
                Ok(())
            })
            .await
    }

    /// Pull, stage everything, and commit+push if anything changed.
    pub async fn commit_and_push(&self, message: &str) -> Result<CommitOutcome> {
        let inner = Arc::clone(&self.inner);
        let message = message.to_owned();
        self.inner
            .queue
            .enqueue(move || async move {
                let git = &inner.git;
                pull_if_remote_branch_exists(git, &inner.branch).await?;
                git.add_all().await?;
                let changed = git.changed_files().await?;
                if changed.is_empty() {
                    debug!("no changes to commit");
                    return Ok(CommitOutcome::NoChanges);
                }
                git.commit(&message).await?;
                git.push(&inner.branch).await?;
                info!(files = changed.len(), %message, "committed and pushed");
                Ok(CommitOutcome::Pushed {
                    files: changed.len(),
                })
            })
            .await
    }

    /// Read a JSON document; `None` when the file does not exist.
    pub async fn read_json<T>(&self, rel_path: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let full = self.full_path(rel_path);
        self.inner
            .queue
            .enqueue(move || async move { read_json_at(&full).await })
            .await
    }

    /// Write a JSON document (pretty-printed, trailing newline).
    pub async fn write_json<T>(&self, rel_path: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let full = self.full_path(rel_path);
        let body = to_json_document(value)?;
        self.inner
            .queue
            .enqueue(move || async move { write_at(&full, body).await })
            .await
    }

    /// Read, mutate and write back a JSON document as one queued operation.
    ///
    /// A missing file starts from `T::default()`. The document is only
    /// written back when its serialized form changed.
    pub async fn update_json<T, R, F>(&self, rel_path: &str, mutate: F) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default + Send + 'static,
        R: Send + 'static,
        F: FnOnce(&mut T) -> Result<R> + Send + 'static,
    {
        let full = self.full_path(rel_path);
        self.inner
            .queue
            .enqueue(move || async move {
                let mut doc: T = read_json_at(&full).await?.unwrap_or_default();
                let before = to_json_document(&doc)?;
                let out = mutate(&mut doc)?;
                let after = to_json_document(&doc)?;
                if after != before {
                    write_at(&full, after).await?;
                }
                Ok(out)
            })
            .await
    }

    /// Like [`DataRepo::update_json`] but returns `None` without writing
    /// when the file is missing.
    pub async fn update_existing_json<T, R, F>(&self, rel_path: &str, mutate: F) -> Result<Option<R>>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
        R: Send + 'static,
        F: FnOnce(&mut T) -> Result<R> + Send + 'static,
    {
        let full = self.full_path(rel_path);
        self.inner
            .queue
            .enqueue(move || async move {
                let Some(mut doc) = read_json_at::<T>(&full).await? else {
                    return Ok(None);
                };
                let out = mutate(&mut doc)?;
                write_at(&full, to_json_document(&doc)?).await?;
                Ok(Some(out))
            })
            .await
    }

    /// Read a text file; `None` when it does not exist.
    pub async fn read_file(&self, rel_path: &str) -> Result<Option<String>> {
        let full = self.full_path(rel_path);
        self.inner
            .queue
            .enqueue(move || async move {
                match tokio::fs::read_to_string(&full).await {
                    Ok(content) => Ok(Some(content)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Write a text file, creating parent directories.
    pub async fn write_file(&self, rel_path: &str, content: impl Into<String>) -> Result<()> {
        let full = self.full_path(rel_path);
        let content = content.into();
        self.inner
            .queue
            .enqueue(move || async move { write_at(&full, content).await })
            .await
    }

    fn full_path(&self, rel_path: &str) -> PathBuf {
        self.inner.git.workdir().join(rel_path)
    }
}

async fn pull_if_remote_branch_exists(git: &Git, branch: &str) -> Result<()> {
    match git.pull(branch).await {
        Ok(()) => Ok(()),
        Err(GitError::MissingRemoteBranch(_)) => {
            debug!(branch, "remote branch not pushed yet; skipping pull");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn read_json_at<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

async fn write_at(path: &Path, content: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

fn to_json_document<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    Ok(body)
}

/// Resolve the configured remote into a clone URL.
///
/// `owner/name` expands to a GitHub https URL; the token, if any, is
/// embedded as the user-info of https URLs.
pub fn remote_url(remote: &str, token: Option<&str>) -> String {
    let remote = remote.trim();
    let is_slug = !remote.contains("://")
        && !remote.starts_with('/')
        && !remote.starts_with('.')
        && !remote.contains('@')
        && remote.matches('/').count() == 1;
    let base = if is_slug {
        format!("https://github.com/{}.git", remote.trim_end_matches(".git"))
    } else {
        remote.to_owned()
    };

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return base;
    };
    match url::Url::parse(&base) {
        Ok(mut parsed) if parsed.scheme() == "https" => {
            if parsed.set_username(token).is_err() {
                return base;
            }
            parsed.to_string()
        }
        _ => base,
    }
}

impl std::fmt::Debug for DataRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataRepo")
            .field("remote", &redact_url(&self.inner.remote_url))
            .field("branch", &self.inner.branch)
            .field("local_path", &self.inner.git.workdir())
            .finish()
    }
}
