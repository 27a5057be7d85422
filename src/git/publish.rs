//! The staging publish pipeline.
//!
//! Commits accumulated file changes and pushes them to the fixed `staging`
//! branch. The pipeline is deliberately optimistic: the pre-push pull may
//! fail (no remote branch yet, or a divergence) and is ignored, because the
//! recovery path is the caller retrying with `force` once the push itself is
//! rejected. Rejections are recognized by matching the git CLI's known
//! phrasings; a match tells the caller a force push would succeed.

use std::path::Path;

use serde::Serialize;

use super::{GitError, GitRunner};

/// The fixed branch all sessions publish to.
pub const STAGING_BRANCH: &str = "staging";

const REMOTE: &str = "origin";

const COMMIT_PREFIX: &str = "AI change: ";

/// How much of the originating request seeds the commit message.
const COMMIT_SEED_CHARS: usize = 72;

/// Phrasings git uses when a push is rejected for divergence. Any of these in
/// an error message means a force push is a viable recovery.
const FORCE_PUSH_HINTS: &[&str] = &[
    "non-fast-forward",
    "rejected",
    "failed to push some refs",
    "behind",
    "updates were rejected because the tip",
];

/// Outcome of a publish attempt. Ephemeral; returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub success: bool,
    pub branch: String,
    /// Status or error text ("No changes detected", the git error, ...).
    pub message: String,
    /// The synthesized commit message, when a commit was created.
    pub commit_message: Option<String>,
    /// Whether this attempt used a force push.
    pub forced: bool,
    /// Set on failure when the error matches a known rejection phrasing.
    pub can_force_push: bool,
}

impl PublishResult {
    fn no_changes() -> Self {
        Self {
            success: false,
            branch: STAGING_BRANCH.to_string(),
            message: "No changes detected".to_string(),
            commit_message: None,
            forced: false,
            can_force_push: false,
        }
    }

    fn committed(commit_message: String, forced: bool) -> Self {
        Self {
            success: true,
            branch: STAGING_BRANCH.to_string(),
            message: format!("Pushed to {}", STAGING_BRANCH),
            commit_message: Some(commit_message),
            forced,
            can_force_push: false,
        }
    }

    fn failed(error: &GitError, forced: bool) -> Self {
        let message = error.message().to_string();
        let can_force_push = matches_force_push_hint(&message);
        Self {
            success: false,
            branch: STAGING_BRANCH.to_string(),
            message,
            commit_message: None,
            forced,
            can_force_push,
        }
    }
}

/// Check an error message against the known push-rejection phrasings.
pub fn matches_force_push_hint(message: &str) -> bool {
    let lower = message.to_lowercase();
    FORCE_PUSH_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Synthesize the commit message from the originating request: fixed prefix
/// plus a bounded, quote-escaped prefix of the request text.
pub fn commit_message(request: &str) -> String {
    let seed: String = request.chars().take(COMMIT_SEED_CHARS).collect();
    format!("{}{}", COMMIT_PREFIX, seed.replace('"', "\\\""))
}

/// Run the full publish pipeline against `workdir`.
///
/// Never returns an error: every failure is folded into the
/// [`PublishResult`], classified for force-pushability.
pub async fn publish(
    git: &dyn GitRunner,
    workdir: &Path,
    request: &str,
    force: bool,
) -> PublishResult {
    match run_pipeline(git, workdir, request, force).await {
        Ok(result) => result,
        Err(e) => {
            let result = PublishResult::failed(&e, force);
            tracing::warn!(
                "Publish to {} failed (force-pushable: {}): {}",
                STAGING_BRANCH,
                result.can_force_push,
                result.message
            );
            result
        }
    }
}

async fn run_pipeline(
    git: &dyn GitRunner,
    workdir: &Path,
    request: &str,
    force: bool,
) -> Result<PublishResult, GitError> {
    // Idempotent no-op on a clean tree.
    let status = git.status_porcelain(workdir).await?;
    if status.trim().is_empty() {
        return Ok(PublishResult::no_changes());
    }

    // Ensure the staging branch is checked out, creating it if needed.
    if git.checkout(workdir, STAGING_BRANCH).await.is_err() {
        git.checkout_new(workdir, STAGING_BRANCH).await?;
    }

    // Optimistic sync with the remote branch. A failure here (no remote
    // branch yet, or divergence) is logged and ignored; the push step and
    // the force-retry path handle reconciliation.
    if !force {
        if let Err(e) = git.pull(workdir, REMOTE, STAGING_BRANCH).await {
            tracing::warn!("Ignoring pull failure before publish: {}", e);
        }
    }

    git.add_all(workdir).await?;

    let message = commit_message(request);
    git.commit(workdir, &message).await?;
    git.push(workdir, REMOTE, STAGING_BRANCH, force).await?;

    tracing::info!(
        "Published to {} (forced: {}): {}",
        STAGING_BRANCH,
        force,
        message
    );

    Ok(PublishResult::committed(message, force))
}

/// Recover a previously failed publish by force-pushing whatever is already
/// committed locally, without regenerating file changes.
///
/// The loop's publish step may have committed even though its push was
/// rejected, so this deliberately skips status, staging, and commit.
pub async fn force_push_retry(git: &dyn GitRunner, workdir: &Path) -> PublishResult {
    let result: Result<(), GitError> = async {
        git.checkout(workdir, STAGING_BRANCH).await?;
        git.push(workdir, REMOTE, STAGING_BRANCH, true).await
    }
    .await;

    match result {
        Ok(()) => PublishResult {
            success: true,
            branch: STAGING_BRANCH.to_string(),
            message: format!("Force-pushed local {} to {}", STAGING_BRANCH, REMOTE),
            commit_message: None,
            forced: true,
            can_force_push: false,
        },
        Err(e) => {
            tracing::warn!("Force-push retry failed: {}", e);
            PublishResult::failed(&e, true)
        }
    }
}
