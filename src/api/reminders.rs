//! Manual triggers for the lifecycle engine.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::CurrentActor;
use super::routes::AppState;
use crate::access::{accessible_task, Right};
use crate::error::TrackerResult;
use crate::lifecycle::{PendingReminder, PromotionSummary, SweepSummary};
use crate::notify::ReminderKind;

pub async fn pending(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> TrackerResult<Json<Vec<PendingReminder>>> {
    let reminders = state.engine.pending_reminders().await?;
    Ok(Json(
        reminders
            .into_iter()
            .filter(|r| actor.can_access(&r.task))
            .collect(),
    ))
}

pub async fn reminder_sweep(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> TrackerResult<Json<SweepSummary>> {
    actor.ensure_right(Right::ManageTasks, "reminders")?;
    Ok(Json(state.engine.run_reminder_sweep().await))
}

pub async fn overdue_sweep(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> TrackerResult<Json<SweepSummary>> {
    actor.ensure_right(Right::ManageTasks, "reminders")?;
    Ok(Json(state.engine.run_overdue_sweep().await))
}

pub async fn promotion_sweep(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> TrackerResult<Json<PromotionSummary>> {
    actor.ensure_right(Right::ManageTasks, "tasks")?;
    Ok(Json(state.engine.run_promotion_sweep().await))
}

#[derive(Debug, Deserialize)]
pub struct ReminderRequest {
    pub reminder_type: ReminderKind,
}

#[derive(Debug, Serialize)]
pub struct ReminderSent {
    pub task_id: Uuid,
    pub reminder_type: ReminderKind,
}

pub async fn send_reminder(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ReminderRequest>,
) -> TrackerResult<Json<ReminderSent>> {
    accessible_task(state.store.as_ref(), task_id, &actor).await?;
    state
        .engine
        .send_single_reminder(task_id, req.reminder_type)
        .await?;
    Ok(Json(ReminderSent {
        task_id,
        reminder_type: req.reminder_type,
    }))
}
