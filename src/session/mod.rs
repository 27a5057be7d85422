//! Session types and the action loop.
//!
//! A session is one bounded run of the action loop for a single request. Its
//! conversation history is an append-only sequence of [`Turn`]s; its change
//! set is the authoritative record of what must be committed, never
//! recomputed by diffing the working tree.

pub mod parser;
mod prompt;
mod runner;

pub use runner::{SessionRequest, SessionRunner};

use serde::{Deserialize, Serialize};

use crate::git::publish::PublishResult;

/// Who produced a turn in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Text produced by the agent.
    Agent,
    /// Tool output or corrective feedback fed back to the agent.
    Observation,
}

/// One exchange unit in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.into(),
        }
    }

    pub fn observation(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Observation,
            text: text.into(),
        }
    }
}

/// Record of one successful write, appended in order of application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub operation: String,
}

impl ChangeRecord {
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation: "modified".to_string(),
        }
    }
}

/// Terminal (and in-flight) states of the action loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Iterating,
    AwaitingParse,
    Executing,
    Completed,
    Exhausted,
    Failed,
}

/// Final result of a session, returned to the caller and never persisted.
#[derive(Debug, Serialize)]
pub struct SessionOutcome {
    pub success: bool,
    pub state: SessionState,
    pub message: String,
    pub changes: Vec<ChangeRecord>,
    pub publish: Option<PublishResult>,
    pub iterations: usize,
}
