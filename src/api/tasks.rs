//! Task, client and user endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::auth::CurrentActor;
use super::routes::AppState;
use crate::access::{register_user, Role};
use crate::analysis::TaskAssessment;
use crate::document::DocumentSections;
use crate::error::TrackerResult;
use crate::task::{
    Client, ImportSummary, TaskCreated, TaskDetails, TaskDraft, TaskHistoryEntry, TaskListEntry,
    UpdateOutcome, User,
};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(q): Query<PageQuery>,
) -> TrackerResult<Json<Vec<TaskListEntry>>> {
    let entries = state.tasks.list_tasks(&actor, q.page(), q.limit()).await?;
    Ok(Json(entries))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(draft): Json<TaskDraft>,
) -> TrackerResult<(StatusCode, Json<TaskCreated>)> {
    let created = state.tasks.create_task(draft, &actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<HashMap<String, String>>,
}

pub async fn import_tasks(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<ImportRequest>,
) -> TrackerResult<Json<ImportSummary>> {
    let summary = state.tasks.import_tasks(req.rows, &actor).await?;
    Ok(Json(summary))
}

pub async fn task_details(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> TrackerResult<Json<TaskDetails>> {
    Ok(Json(state.tasks.task_details(id, &actor).await?))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(changes): Json<Map<String, Value>>,
) -> TrackerResult<Json<UpdateOutcome>> {
    Ok(Json(state.tasks.update_task(id, &changes, &actor).await?))
}

pub async fn task_history(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Query(q): Query<PageQuery>,
) -> TrackerResult<Json<Vec<TaskHistoryEntry>>> {
    let entries = state
        .tasks
        .task_history(id, &actor, q.page(), q.limit())
        .await?;
    Ok(Json(entries))
}

pub async fn task_assessment(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> TrackerResult<Json<TaskAssessment>> {
    Ok(Json(state.tasks.assessment(id, &actor).await?))
}

pub async fn task_sections(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> TrackerResult<Json<DocumentSections>> {
    Ok(Json(state.tasks.sections(id, &actor).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub since: Option<DateTime<Utc>>,
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateClientRequest>,
) -> TrackerResult<(StatusCode, Json<Client>)> {
    let client = state.tasks.create_client(&req.name, req.since, &actor).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
) -> TrackerResult<Json<Vec<Client>>> {
    Ok(Json(state.tasks.list_clients().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateUserRequest>,
) -> TrackerResult<(StatusCode, Json<User>)> {
    let user = register_user(state.store.as_ref(), &req.name, &req.email, req.role, &actor).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn current_user(CurrentActor(actor): CurrentActor) -> Json<User> {
    Json(actor.user)
}
