//! System framing for the action loop.

/// Build the framing turn that seeds every session: repository tree,
/// behavioral instructions, and the user's request.
pub fn build_framing(tree: &str, request: &str) -> String {
    format!(
        r#"You are an autonomous coding agent operating on a checked-out repository.

## Repository structure
{tree}

## Rules
1. Reply with exactly ONE JSON object per turn, inside a ```json fenced block.
2. Valid actions:
   - {{"action": "read_file", "path": "<relative path>", "reason": "<why>"}}
   - {{"action": "write_file", "path": "<relative path>", "content": "<full new file content>"}}
   - {{"action": "complete", "summary": "<what you changed>"}}
3. Read files before rewriting them; write_file replaces the whole file.
4. All paths are relative to the repository root.
5. When the request is fully addressed, send the complete action.

## Request
{request}"#,
        tree = tree,
        request = request
    )
}

/// Corrective feedback for a reply that contained no decodable action.
pub fn retry_parse_feedback() -> String {
    "Your reply did not contain a valid action. Respond with exactly one JSON object \
     in a ```json fenced block, with an \"action\" field set to read_file, write_file, \
     or complete, and all required fields present."
        .to_string()
}

/// Corrective feedback for a decodable object with an unknown action tag.
pub fn unknown_action_feedback(tag: &str) -> String {
    format!(
        "Unknown action {:?}. The only valid actions are read_file, write_file, and complete.",
        tag
    )
}
