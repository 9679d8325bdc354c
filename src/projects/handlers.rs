use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};

use super::dto::{ProjectsResponse, SaveProjectRequest};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult, Envelope},
    state::AppState,
    store::Project,
};

#[instrument(skip(state, payload))]
pub async fn save_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<SaveProjectRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Envelope<Project>>)> {
    let Json(payload) = payload?;
    let name = payload
        .project_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("project_name is required"))?;
    let data = payload
        .project_data
        .unwrap_or_else(|| serde_json::json!({}));

    match payload.project_id {
        Some(project_id) => {
            let project = state
                .store
                .update_project(user_id, project_id, name, &data)
                .await?
                .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
            info!(%user_id, project_id = %project.id, "project updated");
            Ok((
                StatusCode::OK,
                Envelope::ok("Project updated successfully", project),
            ))
        }
        None => {
            let project = state.store.insert_project(user_id, name, &data).await?;
            info!(%user_id, project_id = %project.id, "project saved");
            Ok((
                StatusCode::CREATED,
                Envelope::ok("Project saved successfully", project),
            ))
        }
    }
}

#[instrument(skip(state))]
pub async fn get_projects(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Envelope<ProjectsResponse>>> {
    let projects = state.store.list_projects(user_id).await?;
    Ok(Envelope::ok(
        "Projects retrieved successfully",
        ProjectsResponse { projects },
    ))
}
