//! Comment endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::CurrentActor;
use super::routes::AppState;
use crate::comment::{Comment, CommentDraft};
use crate::error::TrackerResult;

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    pub task_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(q): Query<CommentQuery>,
) -> TrackerResult<Json<Vec<Comment>>> {
    let comments = state
        .comments
        .list_comments(q.task_id, q.document_id, &actor)
        .await?;
    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(draft): Json<CommentDraft>,
) -> TrackerResult<(StatusCode, Json<Comment>)> {
    let comment = state.comments.create_comment(draft, &actor).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: Option<String>,
}

pub async fn reply_to_comment(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(parent_id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> TrackerResult<(StatusCode, Json<Comment>)> {
    let reply = state
        .comments
        .reply_to_comment(parent_id, req.content.as_deref(), &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn like_comment(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> TrackerResult<Json<Comment>> {
    Ok(Json(state.comments.like_comment(id, &actor).await?))
}
