//! # stagehand
//!
//! Service that turns natural-language change requests into committed,
//! published code changes on a shared `staging` branch.
//!
//! ## Flow
//!
//! ```text
//!   request ──► Action Loop ──► Workspace (read/write)
//!                  │
//!                  ▼ complete
//!            Publish Pipeline ──► origin/staging
//! ```
//!
//! 1. The workspace is snapshotted into a textual tree and framed for the
//!    agent together with the request.
//! 2. The loop feeds the history to the LLM, decodes each reply into one
//!    action (`read_file`, `write_file`, `complete`), executes it, and feeds
//!    the observation back - bounded by a fixed iteration ceiling.
//! 3. On completion with accumulated changes, the publish pipeline commits
//!    and pushes to `staging`, classifying rejections so the caller can
//!    retry with a force push.
//!
//! ## Modules
//! - `session`: the action loop, its parser, and session types
//! - `git`: git subprocess boundary and the publish pipeline
//! - `workspace`: sandboxed file access and repository snapshots
//! - `project`: clone-or-reuse registry of working copies
//! - `llm`: LLM client abstraction (OpenRouter implementation)
//! - `api`: HTTP surface

pub mod api;
pub mod config;
pub mod git;
pub mod llm;
pub mod project;
pub mod session;
pub mod workspace;

pub use config::Config;
