//! Decoding of free-form agent replies into typed actions.
//!
//! Models are asked for a single JSON object but routinely wrap it in prose,
//! markdown fences, or half-finished blocks. Extraction is attempted in
//! priority order:
//!
//! 1. a fenced ```json code block, decoded as-is;
//! 2. the smallest `{...}` substring (string-aware brace matching) whose
//!    top level carries the `"action"` discriminator.
//!
//! The function is total: every input yields either an [`Action`] or a
//! [`ParseError`]. A parse failure is a recoverable, in-session condition;
//! the loop feeds a corrective observation back to the agent.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// The discriminator values the loop understands.
pub const KNOWN_ACTIONS: &[&str] = &["read_file", "write_file", "complete"];

/// A structured instruction decoded from agent output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Read a file and feed its contents back as an observation.
    ReadFile {
        path: String,
        #[serde(default)]
        reason: String,
    },
    /// Write (create or overwrite) a file.
    WriteFile { path: String, content: String },
    /// End the session; triggers publish when changes accumulated.
    Complete {
        #[serde(default)]
        summary: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No decodable JSON object carrying an `"action"` field was found.
    #[error("no structured action found in reply")]
    NoCandidate,

    /// A candidate decoded, but its discriminator is not a known action.
    #[error("unrecognized action: {0:?}")]
    UnrecognizedAction(String),

    /// A known discriminator was found but required fields were missing or
    /// of the wrong type.
    #[error("malformed {action:?} action: {detail}")]
    MissingFields { action: String, detail: String },
}

fn fence_re() -> Option<&'static Regex> {
    static FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE_RE
        .get_or_init(|| Regex::new(r"(?s)```json\s*(.+?)\s*```").ok())
        .as_ref()
}

/// Extract a single [`Action`] from a raw agent reply.
pub fn parse_action(text: &str) -> Result<Action, ParseError> {
    let mut last_error = ParseError::NoCandidate;

    // Strategy 1: fenced ```json block.
    if let Some(re) = fence_re() {
        if let Some(captures) = re.captures(text) {
            if let Some(body) = captures.get(1) {
                match decode_candidate(body.as_str()) {
                    Ok(action) => return Ok(action),
                    // A fence that held a non-action object falls through to
                    // the raw scan; a recognizable failure is remembered.
                    Err(ParseError::NoCandidate) => {}
                    Err(e) => last_error = e,
                }
            }
        }
    }

    // Strategy 2: scan for balanced objects carrying the discriminator.
    let bytes = text.as_bytes();
    for start in 0..bytes.len() {
        if bytes[start] != b'{' {
            continue;
        }
        let Some(candidate) = balanced_object(text, start) else {
            continue;
        };
        if !candidate.contains("\"action\"") {
            continue;
        }
        match decode_candidate(candidate) {
            Ok(action) => return Ok(action),
            Err(ParseError::NoCandidate) => {}
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

/// Decode one candidate substring into an action.
///
/// Returns `NoCandidate` when the text is not a JSON object with a string
/// `"action"` field at its top level, so the caller keeps scanning.
fn decode_candidate(candidate: &str) -> Result<Action, ParseError> {
    let value: serde_json::Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(_) => return Err(ParseError::NoCandidate),
    };

    let Some(tag) = value.get("action").and_then(|a| a.as_str()) else {
        return Err(ParseError::NoCandidate);
    };

    if !KNOWN_ACTIONS.contains(&tag) {
        return Err(ParseError::UnrecognizedAction(tag.to_string()));
    }

    let tag = tag.to_string();
    serde_json::from_value(value).map_err(|e| ParseError::MissingFields {
        action: tag,
        detail: e.to_string(),
    })
}

/// Return the balanced `{...}` substring starting at `start`, or `None` if
/// the object never closes. Braces inside JSON strings are ignored.
fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json_block() {
        let reply = "Here is my move:\n```json\n{\"action\": \"read_file\", \"path\": \"src/main.rs\", \"reason\": \"orient\"}\n```\nthanks";
        assert_eq!(
            parse_action(reply),
            Ok(Action::ReadFile {
                path: "src/main.rs".to_string(),
                reason: "orient".to_string(),
            })
        );
    }

    #[test]
    fn parses_bare_object_in_prose() {
        let reply = "I'll finish up now. {\"action\": \"complete\", \"summary\": \"done\"} Hope that helps!";
        assert_eq!(
            parse_action(reply),
            Ok(Action::Complete {
                summary: "done".to_string(),
            })
        );
    }

    #[test]
    fn write_file_requires_content() {
        let reply = "{\"action\": \"write_file\", \"path\": \"a.txt\"}";
        assert!(matches!(
            parse_action(reply),
            Err(ParseError::MissingFields { action, .. }) if action == "write_file"
        ));
    }

    #[test]
    fn content_with_nested_braces_and_quotes() {
        let reply = r#"```json
{"action": "write_file", "path": "conf.json", "content": "{\"nested\": {\"braces\": \"}}{{\"}}"}
```"#;
        match parse_action(reply) {
            Ok(Action::WriteFile { path, content }) => {
                assert_eq!(path, "conf.json");
                assert!(content.contains("nested"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn skips_decoys_and_finds_real_action() {
        let reply = "Consider {\"not\": \"an action\"} but actually {\"action\": \"read_file\", \"path\": \"x\"} works";
        assert_eq!(
            parse_action(reply),
            Ok(Action::ReadFile {
                path: "x".to_string(),
                reason: String::new(),
            })
        );
    }

    #[test]
    fn object_nesting_an_action_still_decodes() {
        // The outer object has no top-level discriminator; the inner one does.
        let reply = "{\"response\": {\"action\": \"complete\", \"summary\": \"ok\"}}";
        assert_eq!(
            parse_action(reply),
            Ok(Action::Complete {
                summary: "ok".to_string(),
            })
        );
    }

    #[test]
    fn plain_prose_is_no_candidate() {
        assert_eq!(
            parse_action("Sure! I will update the file for you."),
            Err(ParseError::NoCandidate)
        );
    }

    #[test]
    fn unknown_discriminator_is_unrecognized() {
        let reply = "{\"action\": \"delete_everything\", \"path\": \"/\"}";
        assert_eq!(
            parse_action(reply),
            Err(ParseError::UnrecognizedAction("delete_everything".to_string()))
        );
    }

    #[test]
    fn truncated_fence_falls_back_to_raw_scan() {
        // Closing fence missing, object itself still balanced.
        let reply = "```json\n{\"action\": \"complete\", \"summary\": \"partial\"}";
        assert_eq!(
            parse_action(reply),
            Ok(Action::Complete {
                summary: "partial".to_string(),
            })
        );
    }

    #[test]
    fn unterminated_object_is_no_candidate() {
        let reply = "{\"action\": \"complete\", \"summary\": \"never closed";
        assert_eq!(parse_action(reply), Err(ParseError::NoCandidate));
    }

    #[test]
    fn optional_fields_default_when_absent() {
        assert_eq!(
            parse_action("{\"action\": \"complete\"}"),
            Ok(Action::Complete {
                summary: String::new(),
            })
        );
        assert_eq!(
            parse_action("{\"action\": \"read_file\", \"path\": \"a\"}"),
            Ok(Action::ReadFile {
                path: "a".to_string(),
                reason: String::new(),
            })
        );
    }

    #[test]
    fn fenced_block_takes_priority_over_earlier_raw_object() {
        let reply = "{\"action\": \"read_file\", \"path\": \"raw.txt\"}\n```json\n{\"action\": \"read_file\", \"path\": \"fenced.txt\"}\n```";
        assert_eq!(
            parse_action(reply),
            Ok(Action::ReadFile {
                path: "fenced.txt".to_string(),
                reason: String::new(),
            })
        );
    }
}
