//! Thin async driver over the `git` command-line client.
//!
//! Failures are classified from exit codes and machine-readable output
//! (`ls-remote --exit-code`, `push --porcelain`) rather than from
//! human-readable error text.

use crate::error::GitError;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// `git ls-remote --exit-code` exits with this code when no ref matched.
const LS_REMOTE_NO_MATCH: i32 = 2;

/// Git runner bound to one working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    /// Create a runner for `workdir` (which need not exist yet for `clone`).
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Working directory commands run in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Returns `true` if the working directory holds a git checkout.
    pub fn is_repo(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    /// Clone `remote_url` into the working directory.
    pub async fn clone_from(&self, remote_url: &str) -> Result<(), GitError> {
        if let Some(parent) = self.workdir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| GitError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let target = self.workdir.to_string_lossy().into_owned();
        let output = raw_command(None, &["clone", remote_url, &target]).await?;
        check(&["clone", &redact_url(remote_url), &target], output).map(|_| ())
    }

    /// Set a repository-local config value.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run(&["config", key, value]).await.map(|_| ())
    }

    /// Returns `true` if HEAD points at a commit (false on a fresh empty clone).
    pub async fn has_commits(&self) -> Result<bool, GitError> {
        let output = raw_command(
            Some(&self.workdir),
            &["rev-parse", "--verify", "--quiet", "HEAD"],
        )
        .await?;
        Ok(output.status.success())
    }

    /// Point an unborn HEAD at `branch`.
    pub async fn set_unborn_branch(&self, branch: &str) -> Result<(), GitError> {
        let reference = format!("refs/heads/{branch}");
        self.run(&["symbolic-ref", "HEAD", &reference]).await.map(|_| ())
    }

    /// Returns `true` if `refs/heads/<branch>` exists on `origin`.
    ///
    /// The full ref name is passed so `x/main` does not match `main`.
    pub async fn remote_branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{branch}");
        let args = ["ls-remote", "--exit-code", "origin", reference.as_str()];
        let output = raw_command(Some(&self.workdir), &args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(LS_REMOTE_NO_MATCH) => Ok(false),
            _ => check(&args, output).map(|_| false),
        }
    }

    /// Pull `branch` from `origin`.
    ///
    /// Fails with [`GitError::MissingRemoteBranch`] when the branch has not
    /// been pushed yet.
    pub async fn pull(&self, branch: &str) -> Result<(), GitError> {
        if !self.remote_branch_exists(branch).await? {
            return Err(GitError::MissingRemoteBranch(branch.to_owned()));
        }
        self.run(&["pull", "--no-rebase", "--no-edit", "origin", branch])
            .await
            .map(|_| ())
    }

    /// Stage every change in the working tree.
    pub async fn add_all(&self) -> Result<(), GitError> {
        self.run(&["add", "-A"]).await.map(|_| ())
    }

    /// Paths with staged or unstaged changes, per `status --porcelain`.
    pub async fn changed_files(&self) -> Result<Vec<String>, GitError> {
        let stdout = self.run(&["status", "--porcelain"]).await?;
        Ok(stdout
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| line[3..].to_owned())
            .collect())
    }

    /// Record a commit with `message`.
    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "-m", message]).await.map(|_| ())
    }

    /// Push `branch` to `origin`, creating the upstream tracking ref.
    pub async fn push(&self, branch: &str) -> Result<(), GitError> {
        let args = ["push", "--porcelain", "--set-upstream", "origin", branch];
        let output = raw_command(Some(&self.workdir), &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(detail) = rejected_ref(&stdout) {
            return Err(GitError::PushRejected {
                branch: branch.to_owned(),
                detail,
            });
        }
        check(&args, output).map(|_| ())
    }

    /// Full hash of HEAD.
    pub async fn head(&self) -> Result<String, GitError> {
        Ok(self.run(&["rev-parse", "HEAD"]).await?.trim().to_owned())
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = raw_command(Some(&self.workdir), args).await?;
        check(args, output)
    }
}

async fn raw_command(workdir: Option<&Path>, args: &[&str]) -> Result<Output, GitError> {
    let mut cmd = Command::new("git");
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .kill_on_drop(true);
    debug!(args = %args.first().copied().unwrap_or_default(), "running git");
    cmd.output().await.map_err(GitError::Spawn)
}

fn check(args: &[&str], output: Output) -> Result<String, GitError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    Err(GitError::CommandFailed {
        args: args.join(" "),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    })
}

/// Find a rejected ref in `push --porcelain` output.
///
/// Porcelain lines are `<flag>\t<from>:<to>\t<summary>`; flag `!` marks a
/// rejected or failed ref.
fn rejected_ref(porcelain: &str) -> Option<String> {
    porcelain
        .lines()
        .find_map(|line| line.strip_prefix("!\t"))
        .map(|rest| rest.split('\t').nth(1).unwrap_or(rest).trim().to_owned())
}

/// Strip credentials from a remote URL for logs and error messages.
pub fn redact_url(remote_url: &str) -> String {
    match url::Url::parse(remote_url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        _ => remote_url.to_owned(),
    }
}
