//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::git::publish::PublishResult;
use crate::session::{ChangeRecord, SessionState};

/// Request to run a session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// The natural-language change request
    pub request: String,

    /// Optional project directory name under the workspace root
    pub project: Option<String>,

    /// Apply changes but do not publish
    #[serde(default)]
    pub skip_publish: bool,

    /// Publish with a force push
    #[serde(default)]
    pub force_publish: bool,
}

/// Result of a session run.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub state: SessionState,
    pub message: String,
    pub changes: Vec<ChangeRecord>,
    pub publish: Option<PublishResult>,
    pub iterations: usize,

    /// Deployment URL, echoed from configuration on successful publish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_url: Option<String>,
}

/// Request to retry a failed publish with a force push.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPublishRequest {
    /// Optional project directory name under the workspace root
    pub project: Option<String>,
}

/// Request to create a project working copy.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    /// Directory name for the working copy
    pub name: String,

    /// Repository to clone; omitted for an empty initialized repository
    pub repo_url: Option<String>,
}

/// A project as returned by create/list.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub name: String,
    pub path: String,

    /// Whether an existing directory was reused instead of cloned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reused: Option<bool>,
}

/// Generic error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
