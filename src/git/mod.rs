//! Git as an explicit external-process boundary.
//!
//! Every operation takes the repository directory as a parameter and runs the
//! CLI with `current_dir` set on the child process; the service's own working
//! directory is never mutated. The [`GitRunner`] trait exists so the publish
//! pipeline's rejection-phrase classification can be exercised against
//! recorded fixture output without a real repository.

pub mod publish;

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(String),

    #[error("Git error: {0}")]
    Command(String),
}

impl GitError {
    /// The raw error text, used for rejection-phrase classification.
    pub fn message(&self) -> &str {
        match self {
            GitError::Spawn(m) | GitError::Command(m) => m,
        }
    }
}

/// Interface over the git operations the publish pipeline and project
/// registry need.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// `git status --porcelain` output; empty means a clean working tree.
    async fn status_porcelain(&self, cwd: &Path) -> Result<String, GitError>;

    /// Check out an existing branch.
    async fn checkout(&self, cwd: &Path, branch: &str) -> Result<(), GitError>;

    /// Create and check out a new branch from the current one.
    async fn checkout_new(&self, cwd: &Path, branch: &str) -> Result<(), GitError>;

    /// Pull a branch from a remote.
    async fn pull(&self, cwd: &Path, remote: &str, branch: &str) -> Result<(), GitError>;

    /// Stage all working-tree changes.
    async fn add_all(&self, cwd: &Path) -> Result<(), GitError>;

    /// Commit staged changes with the given message.
    async fn commit(&self, cwd: &Path, message: &str) -> Result<(), GitError>;

    /// Push a branch to a remote, optionally forced.
    async fn push(&self, cwd: &Path, remote: &str, branch: &str, force: bool)
        -> Result<(), GitError>;

    /// Clone a repository into `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError>;

    /// Initialize a fresh repository in `cwd`.
    async fn init(&self, cwd: &Path) -> Result<(), GitError>;
}

/// [`GitRunner`] backed by the `git` CLI.
pub struct CliGit;

impl CliGit {
    async fn run(&self, args: &[&str], cwd: &Path) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GitError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            if stderr.trim().is_empty() {
                return Err(GitError::Command(stdout.trim().to_string()));
            }
            return Err(GitError::Command(stderr.trim().to_string()));
        }

        Ok(stdout.to_string())
    }
}

#[async_trait]
impl GitRunner for CliGit {
    async fn status_porcelain(&self, cwd: &Path) -> Result<String, GitError> {
        self.run(&["status", "--porcelain"], cwd).await
    }

    async fn checkout(&self, cwd: &Path, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", branch], cwd).await.map(|_| ())
    }

    async fn checkout_new(&self, cwd: &Path, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-b", branch], cwd).await.map(|_| ())
    }

    async fn pull(&self, cwd: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(&["pull", remote, branch], cwd).await.map(|_| ())
    }

    async fn add_all(&self, cwd: &Path) -> Result<(), GitError> {
        self.run(&["add", "-A"], cwd).await.map(|_| ())
    }

    async fn commit(&self, cwd: &Path, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "-m", message], cwd).await.map(|_| ())
    }

    async fn push(
        &self,
        cwd: &Path,
        remote: &str,
        branch: &str,
        force: bool,
    ) -> Result<(), GitError> {
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(remote);
        args.push(branch);
        self.run(&args, cwd).await.map(|_| ())
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        let dest_str = dest.to_string_lossy();
        // Clone resolves the destination itself, so run from its parent.
        let cwd = dest.parent().unwrap_or_else(|| Path::new("."));
        self.run(&["clone", url, &dest_str], cwd).await.map(|_| ())
    }

    async fn init(&self, cwd: &Path) -> Result<(), GitError> {
        self.run(&["init"], cwd).await.map(|_| ())
    }
}
