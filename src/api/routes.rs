//! HTTP route handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::git::{publish, CliGit, GitRunner};
use crate::llm::{LlmClient, OpenRouterClient};
use crate::project::{ProjectError, ProjectRegistry};
use crate::session::{SessionRequest, SessionRunner};
use crate::workspace::Workspace;

use super::types::{
    CreateProjectRequest, CreateSessionRequest, ErrorResponse, ProjectResponse,
    RetryPublishRequest, SessionResponse,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub llm: Arc<dyn LlmClient>,
    pub git: Arc<dyn GitRunner>,
    pub projects: ProjectRegistry,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let llm: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::new(config.api_key.clone()));
    let git: Arc<dyn GitRunner> = Arc::new(CliGit);
    let projects = ProjectRegistry::new(config.workspace_path.clone());

    let state = Arc::new(AppState {
        config,
        llm,
        git,
        projects,
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/publish/retry", post(retry_publish))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/:name", delete(delete_project))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolve the working directory a request targets: a named project under
/// the workspace root, or the root itself.
fn resolve_workdir(state: &AppState, project: &Option<String>) -> Result<PathBuf, ApiError> {
    match project {
        Some(name) => {
            let path = state
                .projects
                .path_for(name)
                .map_err(|e| error(StatusCode::BAD_REQUEST, e.to_string()))?;
            if !path.is_dir() {
                return Err(error(
                    StatusCode::NOT_FOUND,
                    format!("Project not found: {}", name),
                ));
            }
            Ok(path)
        }
        None => Ok(state.config.workspace_path.clone()),
    }
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if payload.request.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Request text is required"));
    }

    let workdir = resolve_workdir(&state, &payload.project)?;
    let workspace = Workspace::new(workdir);

    let runner = SessionRunner::new(
        Arc::clone(&state.llm),
        Arc::clone(&state.git),
        state.config.default_model.clone(),
        state.config.max_iterations,
    );

    let request = SessionRequest {
        request: payload.request,
        project: payload.project,
        skip_publish: payload.skip_publish,
        force_publish: payload.force_publish,
    };

    let outcome = runner
        .run(&workspace, &request)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let deploy_url = match &outcome.publish {
        Some(result) if result.success => state.config.deploy_url.clone(),
        _ => None,
    };

    Ok(Json(SessionResponse {
        success: outcome.success,
        state: outcome.state,
        message: outcome.message,
        changes: outcome.changes,
        publish: outcome.publish,
        iterations: outcome.iterations,
        deploy_url,
    }))
}

async fn retry_publish(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RetryPublishRequest>,
) -> Result<Json<publish::PublishResult>, ApiError> {
    let workdir = resolve_workdir(&state, &payload.project)?;
    let result = publish::force_push_retry(state.git.as_ref(), &workdir).await;
    Ok(Json(result))
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state
        .projects
        .list()
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectResponse {
                name: p.name,
                path: p.path.display().to_string(),
                reused: None,
            })
            .collect(),
    ))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let (project, reused) = state
        .projects
        .create(
            state.git.as_ref(),
            &payload.name,
            payload.repo_url.as_deref(),
        )
        .await
        .map_err(|e| match e {
            ProjectError::InvalidName(_) => error(StatusCode::BAD_REQUEST, e.to_string()),
            _ => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    let status = if reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(ProjectResponse {
            name: project.name,
            path: project.path.display().to_string(),
            reused: Some(reused),
        }),
    ))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.projects.delete(&name).await.map_err(|e| match e {
        ProjectError::InvalidName(_) => error(StatusCode::BAD_REQUEST, e.to_string()),
        ProjectError::NotFound(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        _ => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    })?;

    Ok(StatusCode::NO_CONTENT)
}
