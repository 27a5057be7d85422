//! Sandboxed workspace access.
//!
//! All file paths supplied by agent actions are resolved relative to a single
//! workspace root. Resolution never escapes the root: absolute paths and
//! `..` traversal past the root are rejected outright rather than merely
//! flagged. Writes create missing parent directories; reads are capped so a
//! pathologically large file cannot flood the conversation history.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Largest file content returned by [`Workspace::read_file`]. Longer files
/// are cut at this many bytes with a truncation marker appended.
pub const MAX_READ_BYTES: usize = 64 * 1024;

/// Directories skipped when rendering the repository snapshot.
const SNAPSHOT_SKIP: &[&str] = &[".git", "node_modules", "target", "dist", ".venv"];

/// Maximum directory depth rendered by [`Workspace::snapshot`].
const SNAPSHOT_MAX_DEPTH: usize = 6;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Path escapes the workspace: {0}")]
    PathEscape(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bounded view of one project's working copy.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the workspace.
    ///
    /// Rejects absolute paths and any traversal that would climb above the
    /// root. Normalization is purely lexical so paths to not-yet-existing
    /// files (the common case for writes) still resolve.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(WorkspaceError::PathEscape(path.to_string()));
        }

        let mut normalized = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(WorkspaceError::PathEscape(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::PathEscape(path.to_string()));
                }
            }
        }

        Ok(self.root.join(normalized))
    }

    /// Read a file's contents as UTF-8 text, capped at [`MAX_READ_BYTES`].
    pub async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }

        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|source| WorkspaceError::Io {
                path: path.to_string(),
                source,
            })?;

        let total = bytes.len();
        let mut content = String::from_utf8_lossy(&bytes).into_owned();
        if content.len() > MAX_READ_BYTES {
            let mut end = MAX_READ_BYTES;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            content.truncate(end);
            content.push_str(&format!(
                "\n... [truncated: file exceeds {} bytes, total {} bytes]",
                MAX_READ_BYTES, total
            ));
        }

        Ok(content)
    }

    /// Write content to a file, creating parent directories as needed.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let resolved = self.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| WorkspaceError::Io {
                    path: path.to_string(),
                    source,
                })?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|source| WorkspaceError::Io {
                path: path.to_string(),
                source,
            })
    }

    /// Render an indented textual tree of the workspace.
    ///
    /// Used to ground the agent's understanding of the codebase before the
    /// first iteration. Entries are sorted, depth-limited, and vendored or
    /// derived directories are skipped.
    pub fn snapshot(&self) -> String {
        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .max_depth(SNAPSHOT_MAX_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !SNAPSHOT_SKIP.contains(&name))
                    .unwrap_or(true)
            });

        for entry in walker.filter_map(|e| e.ok()) {
            let depth = entry.depth();
            if depth == 0 {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let prefix = "  ".repeat(depth - 1);
            let suffix = if entry.path().is_dir() { "/" } else { "" };
            entries.push(format!("{}{}{}", prefix, name, suffix));
        }

        if entries.is_empty() {
            "(empty repository)".to_string()
        } else {
            entries.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    #[test]
    fn resolve_rejects_absolute_paths() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.resolve("/etc/passwd"),
            Err(WorkspaceError::PathEscape(_))
        ));
    }

    #[test]
    fn resolve_rejects_parent_escape() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.resolve("../outside.txt"),
            Err(WorkspaceError::PathEscape(_))
        ));
        assert!(matches!(
            ws.resolve("a/../../outside.txt"),
            Err(WorkspaceError::PathEscape(_))
        ));
    }

    #[test]
    fn resolve_allows_internal_traversal() {
        let (_dir, ws) = workspace();
        let resolved = ws.resolve("src/../README.md").unwrap();
        assert_eq!(resolved, ws.root().join("README.md"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, ws) = workspace();
        ws.write_file("nested/dir/file.txt", "hello world")
            .await
            .unwrap();
        let content = ws.read_file("nested/dir/file.txt").await.unwrap();
        assert_eq!(content, "hello world");
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.read_file("missing.txt").await,
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn read_caps_large_files() {
        let (_dir, ws) = workspace();
        let big = "x".repeat(MAX_READ_BYTES + 100);
        ws.write_file("big.txt", &big).await.unwrap();
        let content = ws.read_file("big.txt").await.unwrap();
        assert!(content.contains("[truncated"));
        assert!(content.len() < big.len() + 100);
    }

    #[tokio::test]
    async fn snapshot_lists_files_and_skips_git() {
        let (_dir, ws) = workspace();
        ws.write_file("src/main.rs", "fn main() {}").await.unwrap();
        ws.write_file("README.md", "# readme").await.unwrap();
        tokio::fs::create_dir_all(ws.root().join(".git/objects"))
            .await
            .unwrap();

        let tree = ws.snapshot();
        assert!(tree.contains("src/"));
        assert!(tree.contains("main.rs"));
        assert!(tree.contains("README.md"));
        assert!(!tree.contains(".git"));
    }

    #[test]
    fn snapshot_of_empty_workspace() {
        let (_dir, ws) = workspace();
        assert_eq!(ws.snapshot(), "(empty repository)");
    }
}
