//! The bounded action loop.
//!
//! One runner execution drives one session: send the full history to the
//! agent, decode its reply into an action, execute it against the workspace,
//! feed the observation back, repeat. The only bound on the conversation is
//! the iteration ceiling; a parse failure or unrecognized action consumes no
//! budget beyond the iteration already charged for the agent call.

use std::sync::Arc;

use anyhow::anyhow;

use crate::git::publish::{self, PublishResult};
use crate::git::GitRunner;
use crate::llm::{ChatMessage, LlmClient, Role};
use crate::session::parser::{self, Action, ParseError};
use crate::session::{prompt, ChangeRecord, SessionOutcome, SessionState, Turn, TurnRole};
use crate::workspace::{Workspace, WorkspaceError};

/// Caller-supplied inputs for one session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// The natural-language change request.
    pub request: String,
    /// Optional project directory name under the workspace root.
    pub project: Option<String>,
    /// Apply changes to disk but do not publish.
    pub skip_publish: bool,
    /// Publish with a force push, overwriting the remote staging tip.
    pub force_publish: bool,
}

/// Drives sessions against a workspace using an LLM and a git runner.
pub struct SessionRunner {
    llm: Arc<dyn LlmClient>,
    git: Arc<dyn GitRunner>,
    model: String,
    max_iterations: usize,
}

impl SessionRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        git: Arc<dyn GitRunner>,
        model: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            git,
            model: model.into(),
            max_iterations,
        }
    }

    /// Run one session to a terminal state.
    ///
    /// Returns `Err` only for fatal conditions (agent transport exhausted,
    /// file write failure); every recoverable condition is folded back into
    /// the conversation. Exhausting the iteration ceiling is a non-error
    /// outcome carrying whatever changes accumulated.
    pub async fn run(
        &self,
        workspace: &Workspace,
        request: &SessionRequest,
    ) -> anyhow::Result<SessionOutcome> {
        let tree = workspace.snapshot();
        let mut turns = vec![Turn::observation(prompt::build_framing(
            &tree,
            &request.request,
        ))];
        let mut changes: Vec<ChangeRecord> = Vec::new();

        for iteration in 1..=self.max_iterations {
            tracing::debug!(state = ?SessionState::Iterating, iteration, "invoking agent");
            let reply = self
                .llm
                .converse(&self.model, &to_messages(&turns))
                .await
                .map_err(|e| anyhow!("Agent call failed on iteration {}: {}", iteration, e))?;
            turns.push(Turn::agent(reply.clone()));

            tracing::debug!(state = ?SessionState::AwaitingParse, iteration, "decoding reply");
            let action = match parser::parse_action(&reply) {
                Ok(action) => action,
                Err(ParseError::UnrecognizedAction(tag)) => {
                    tracing::debug!("Unrecognized action {:?}, feeding back correction", tag);
                    turns.push(Turn::observation(prompt::unknown_action_feedback(&tag)));
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Unparseable reply ({}), feeding back correction", e);
                    turns.push(Turn::observation(prompt::retry_parse_feedback()));
                    continue;
                }
            };

            tracing::debug!(state = ?SessionState::Executing, iteration, ?action, "dispatching");
            match action {
                Action::ReadFile { path, .. } => {
                    let observation = match workspace.read_file(&path).await {
                        Ok(content) => format!("Contents of {}:\n{}", path, content),
                        Err(WorkspaceError::NotFound(_)) => format!("File not found: {}", path),
                        Err(WorkspaceError::PathEscape(_)) => format!(
                            "Invalid path {}: paths must stay inside the repository",
                            path
                        ),
                        // The agent is expected to adapt to read errors.
                        Err(e) => format!("Could not read {}: {}", path, e),
                    };
                    turns.push(Turn::observation(observation));
                }
                Action::WriteFile { path, content } => {
                    match workspace.write_file(&path, &content).await {
                        Ok(()) => {
                            changes.push(ChangeRecord::modified(&path));
                            turns.push(Turn::observation(format!(
                                "Wrote {} bytes to {}",
                                content.len(),
                                path
                            )));
                        }
                        // A rejected path wrote nothing, so the workspace is
                        // still consistent; correct the agent and continue.
                        Err(WorkspaceError::PathEscape(_)) => {
                            turns.push(Turn::observation(format!(
                                "Invalid path {}: paths must stay inside the repository",
                                path
                            )));
                        }
                        // A partial write with no rollback would leave the
                        // workspace undefined; surface it and end the session.
                        Err(e) => {
                            return Err(anyhow!("Write to {} failed: {}", path, e));
                        }
                    }
                }
                Action::Complete { summary } => {
                    let publish = self.maybe_publish(workspace, request, &changes).await;
                    return Ok(SessionOutcome {
                        success: true,
                        state: SessionState::Completed,
                        message: if summary.is_empty() {
                            "Session completed".to_string()
                        } else {
                            summary
                        },
                        changes,
                        publish,
                        iterations: iteration,
                    });
                }
            }
        }

        tracing::info!(
            "Session exhausted after {} iterations with {} change(s)",
            self.max_iterations,
            changes.len()
        );
        Ok(SessionOutcome {
            success: true,
            state: SessionState::Exhausted,
            message: format!(
                "Iteration limit ({}) reached before completion",
                self.max_iterations
            ),
            changes,
            publish: None,
            iterations: self.max_iterations,
        })
    }

    async fn maybe_publish(
        &self,
        workspace: &Workspace,
        request: &SessionRequest,
        changes: &[ChangeRecord],
    ) -> Option<PublishResult> {
        // Nothing to commit, or the caller opted out.
        if changes.is_empty() || request.skip_publish {
            return None;
        }
        Some(
            publish::publish(
                self.git.as_ref(),
                workspace.root(),
                &request.request,
                request.force_publish,
            )
            .await,
        )
    }
}

fn to_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let role = match (i, turn.role) {
                // The seeding framing turn is the system message.
                (0, TurnRole::Observation) => Role::System,
                (_, TurnRole::Observation) => Role::User,
                (_, TurnRole::Agent) => Role::Assistant,
            };
            ChatMessage::new(role, turn.text.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn converse(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "I'm not sure what to do next.".to_string()))
        }
    }

    /// Records which git operations ran; everything succeeds.
    #[derive(Default)]
    struct RecordingGit {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingGit {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl GitRunner for RecordingGit {
        async fn status_porcelain(&self, _cwd: &Path) -> Result<String, GitError> {
            self.record("status");
            Ok(" M file\n".to_string())
        }
        async fn checkout(&self, _cwd: &Path, branch: &str) -> Result<(), GitError> {
            self.record(format!("checkout {}", branch));
            Ok(())
        }
        async fn checkout_new(&self, _cwd: &Path, branch: &str) -> Result<(), GitError> {
            self.record(format!("checkout -b {}", branch));
            Ok(())
        }
        async fn pull(&self, _cwd: &Path, _remote: &str, _branch: &str) -> Result<(), GitError> {
            self.record("pull");
            Ok(())
        }
        async fn add_all(&self, _cwd: &Path) -> Result<(), GitError> {
            self.record("add");
            Ok(())
        }
        async fn commit(&self, _cwd: &Path, _message: &str) -> Result<(), GitError> {
            self.record("commit");
            Ok(())
        }
        async fn push(
            &self,
            _cwd: &Path,
            _remote: &str,
            _branch: &str,
            force: bool,
        ) -> Result<(), GitError> {
            self.record(if force { "push --force" } else { "push" });
            Ok(())
        }
        async fn clone_repo(&self, _url: &str, _dest: &Path) -> Result<(), GitError> {
            self.record("clone");
            Ok(())
        }
        async fn init(&self, _cwd: &Path) -> Result<(), GitError> {
            self.record("init");
            Ok(())
        }
    }

    fn request(skip_publish: bool) -> SessionRequest {
        SessionRequest {
            request: "rename the greeting".to_string(),
            project: None,
            skip_publish,
            force_publish: false,
        }
    }

    fn runner(llm: Arc<ScriptedLlm>, git: Arc<RecordingGit>, max: usize) -> SessionRunner {
        SessionRunner::new(llm, git, "test-model", max)
    }

    #[tokio::test]
    async fn unparseable_agent_exhausts_at_exactly_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let llm = ScriptedLlm::new(vec![]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(Arc::clone(&llm), Arc::clone(&git), 15)
            .run(&ws, &request(false))
            .await
            .unwrap();

        assert_eq!(llm.call_count(), 15);
        assert_eq!(outcome.state, SessionState::Exhausted);
        assert!(outcome.success);
        assert!(outcome.changes.is_empty());
        assert!(outcome.publish.is_none());
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn write_then_complete_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let llm = ScriptedLlm::new(vec![
            r#"```json
{"action": "write_file", "path": "greeting.txt", "content": "hello"}
```"#,
            r#"```json
{"action": "complete", "summary": "wrote the greeting"}
```"#,
        ]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(llm, Arc::clone(&git), 15)
            .run(&ws, &request(false))
            .await
            .unwrap();

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.message, "wrote the greeting");
        assert_eq!(outcome.changes, vec![ChangeRecord::modified("greeting.txt")]);
        assert_eq!(ws.read_file("greeting.txt").await.unwrap(), "hello");

        let publish = outcome.publish.expect("publish should run");
        assert!(publish.success);
        assert!(git.calls().contains(&"push".to_string()));
    }

    #[tokio::test]
    async fn read_only_session_does_not_publish() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write_file("src/lib.rs", "pub fn f() {}").await.unwrap();

        let llm = ScriptedLlm::new(vec![
            r#"{"action": "read_file", "path": "src/lib.rs", "reason": "look around"}"#,
            r#"{"action": "complete", "summary": "nothing to change"}"#,
        ]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(llm, Arc::clone(&git), 15)
            .run(&ws, &request(false))
            .await
            .unwrap();

        assert_eq!(outcome.state, SessionState::Completed);
        assert!(outcome.changes.is_empty());
        assert!(outcome.publish.is_none());
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_file_read_feeds_back_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let llm = ScriptedLlm::new(vec![
            r#"{"action": "read_file", "path": "nope.txt"}"#,
            r#"{"action": "complete"}"#,
        ]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(llm, git, 15).run(&ws, &request(false)).await.unwrap();

        // The miss did not abort the session.
        assert_eq!(outcome.state, SessionState::Completed);
    }

    #[tokio::test]
    async fn malformed_reply_then_valid_action_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let llm = ScriptedLlm::new(vec![
            "Certainly! Let me think about this.",
            r#"{"action": "launch_rockets", "target": "moon"}"#,
            r#"{"action": "complete", "summary": "ok"}"#,
        ]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(Arc::clone(&llm), Arc::clone(&git), 15)
            .run(&ws, &request(false))
            .await
            .unwrap();

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(llm.call_count(), 3);
        // Neither the garbage nor the unknown action touched git.
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn escaping_write_path_is_corrected_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let llm = ScriptedLlm::new(vec![
            r#"{"action": "write_file", "path": "../outside.txt", "content": "oops"}"#,
            r#"{"action": "complete"}"#,
        ]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(llm, Arc::clone(&git), 15)
            .run(&ws, &request(false))
            .await
            .unwrap();

        assert_eq!(outcome.state, SessionState::Completed);
        assert!(outcome.changes.is_empty());
        assert!(outcome.publish.is_none());
    }

    #[tokio::test]
    async fn skip_publish_suppresses_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let llm = ScriptedLlm::new(vec![
            r#"{"action": "write_file", "path": "a.txt", "content": "x"}"#,
            r#"{"action": "complete"}"#,
        ]);
        let git = Arc::new(RecordingGit::default());

        let outcome = runner(llm, Arc::clone(&git), 15)
            .run(&ws, &request(true))
            .await
            .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        assert!(outcome.publish.is_none());
        assert!(git.calls().is_empty());
    }
}
