use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Project;

/// Body of `POST /save_project`. With `project_id` the owned project is
/// overwritten, without it a new one is created.
#[derive(Debug, Default, Deserialize)]
pub struct SaveProjectRequest {
    pub project_id: Option<Uuid>,
    pub project_name: Option<String>,
    pub project_data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
}
