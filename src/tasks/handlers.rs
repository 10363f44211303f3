use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo_types::Task;
use crate::{
    auth::extractors::AuthUser,
    errors::AccountError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(get_task))
}

#[instrument(skip_all)]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), AccountError> {
    let Json(body) = body?;
    let description = body.description.trim();
    if description.is_empty() {
        return Err(AccountError::invalid_field("description", "is required"));
    }
    let task = Task::new(user.id, description, body.completed);
    state.tasks.insert(&task).await?;
    info!(user_id = %user.id, task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, auth))]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<Task>>, AccountError> {
    let limit = p.limit.clamp(1, 100);
    let tasks = state
        .tasks
        .list_by_owner(auth.user.id, limit, p.offset.max(0))
        .await?;
    Ok(Json(tasks))
}

/// Someone else's task is reported exactly like a missing one.
#[instrument(skip(state, auth))]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AccountError> {
    match state.tasks.find_by_id(id).await? {
        Some(task) if task.owner == auth.user.id => Ok(Json(task)),
        _ => Err(AccountError::NotFound),
    }
}
