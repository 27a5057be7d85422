//! HTTP API for stagehand.
//!
//! ## Endpoints
//!
//! - `POST /api/sessions` - Run an action-loop session for a change request
//! - `POST /api/publish/retry` - Force-push retry of a failed publish
//! - `GET /api/projects` - List project working copies
//! - `POST /api/projects` - Create (clone-or-reuse) a project
//! - `DELETE /api/projects/{name}` - Delete a project
//! - `GET /api/health` - Health check

mod routes;
pub mod types;

pub use routes::{serve, AppState};
