//! Project registry: named working copies under the workspace root.
//!
//! A project is nothing more than a directory; identity is the filesystem
//! path and no other metadata is persisted. Creation is clone-or-reuse,
//! enumeration is a directory scan, destruction is recursive removal.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::git::{GitError, GitRunner};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Invalid project name: {0:?}")]
    InvalidName(String),

    #[error("Project not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named, on-disk working copy.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

/// Registry over the workspace root directory.
pub struct ProjectRegistry {
    root: PathBuf,
}

impl ProjectRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a project name to its directory, validating the name first.
    ///
    /// Names are plain directory names: no separators, no traversal, no
    /// leading dot.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, ProjectError> {
        if name.is_empty()
            || name == ".."
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(ProjectError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Create a project working copy, or reuse it if the directory already
    /// exists. Returns the project and whether it was reused.
    ///
    /// With a repository URL the project is cloned; without one an empty
    /// repository is initialized so the publish pipeline still functions.
    pub async fn create(
        &self,
        git: &dyn GitRunner,
        name: &str,
        repo_url: Option<&str>,
    ) -> Result<(Project, bool), ProjectError> {
        let path = self.path_for(name)?;

        if path.is_dir() {
            tracing::debug!("Reusing existing project directory {}", path.display());
            return Ok((
                Project {
                    name: name.to_string(),
                    path,
                },
                true,
            ));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        match repo_url {
            Some(url) => {
                git.clone_repo(url, &path).await?;
            }
            None => {
                tokio::fs::create_dir_all(&path).await?;
                git.init(&path).await?;
            }
        }

        tracing::info!("Created project {} at {}", name, path.display());
        Ok((
            Project {
                name: name.to_string(),
                path,
            },
            false,
        ))
    }

    /// Enumerate projects by scanning the workspace root for directories.
    pub async fn list(&self) -> Result<Vec<Project>, ProjectError> {
        let mut projects = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            // A root that does not exist yet simply has no projects.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            projects.push(Project { name, path });
        }

        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// Destroy a project's working copy recursively.
    pub async fn delete(&self, name: &str) -> Result<(), ProjectError> {
        let path = self.path_for(name)?;

        if !path.is_dir() {
            return Err(ProjectError::NotFound(name.to_string()));
        }

        tokio::fs::remove_dir_all(&path).await?;
        tracing::info!("Deleted project {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    /// Fake runner: clone materializes the directory, everything succeeds.
    struct FakeGit;

    #[async_trait]
    impl GitRunner for FakeGit {
        async fn status_porcelain(&self, _cwd: &Path) -> Result<String, GitError> {
            Ok(String::new())
        }
        async fn checkout(&self, _cwd: &Path, _branch: &str) -> Result<(), GitError> {
            Ok(())
        }
        async fn checkout_new(&self, _cwd: &Path, _branch: &str) -> Result<(), GitError> {
            Ok(())
        }
        async fn pull(&self, _cwd: &Path, _remote: &str, _branch: &str) -> Result<(), GitError> {
            Ok(())
        }
        async fn add_all(&self, _cwd: &Path) -> Result<(), GitError> {
            Ok(())
        }
        async fn commit(&self, _cwd: &Path, _message: &str) -> Result<(), GitError> {
            Ok(())
        }
        async fn push(
            &self,
            _cwd: &Path,
            _remote: &str,
            _branch: &str,
            _force: bool,
        ) -> Result<(), GitError> {
            Ok(())
        }
        async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<(), GitError> {
            std::fs::create_dir_all(dest)
                .map_err(|e| GitError::Command(e.to_string()))?;
            Ok(())
        }
        async fn init(&self, _cwd: &Path) -> Result<(), GitError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_clone_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(dir.path());

        let (project, reused) = registry
            .create(&FakeGit, "demo", Some("https://example.com/demo.git"))
            .await
            .unwrap();
        assert!(!reused);
        assert!(project.path.is_dir());

        let (_, reused) = registry
            .create(&FakeGit, "demo", Some("https://example.com/demo.git"))
            .await
            .unwrap();
        assert!(reused);
    }

    #[tokio::test]
    async fn create_without_url_initializes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(dir.path());

        let (project, reused) = registry.create(&FakeGit, "scratch", None).await.unwrap();
        assert!(!reused);
        assert!(project.path.is_dir());
    }

    #[tokio::test]
    async fn list_scans_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(dir.path());

        registry.create(&FakeGit, "alpha", None).await.unwrap();
        registry.create(&FakeGit, "beta", None).await.unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();

        let names: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(dir.path().join("nonexistent"));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_recursively_and_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(dir.path());

        let (project, _) = registry.create(&FakeGit, "doomed", None).await.unwrap();
        std::fs::write(project.path.join("file.txt"), "data").unwrap();

        registry.delete("doomed").await.unwrap();
        assert!(!project.path.exists());

        assert!(matches!(
            registry.delete("doomed").await,
            Err(ProjectError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn names_with_separators_or_traversal_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(dir.path());

        for name in ["../up", "a/b", "a\\b", "..", ".hidden", ""] {
            assert!(matches!(
                registry.path_for(name),
                Err(ProjectError::InvalidName(_))
            ));
        }
    }
}
