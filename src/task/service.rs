//! Task operations: creation, bulk import, updates and reads.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::access::{accessible_task, Actor, Right};
use crate::analysis::{aggregate_documents, TaskAssessment};
use crate::document::{Document, DocumentAnalysisRecord, DocumentClassifier, DocumentSections};
use crate::error::{TrackerError, TrackerResult};
use crate::lifecycle::{days_until_due, Clock};
use crate::notify::{
    assignment_message, deliver, reassignment_message, status_change_message, update_message,
    Message, Notifier,
};
use crate::store::{entity_name, paginate, resolve_user, Store, TaskFilter};

use super::history::{diff, ChangedFields, HistoryAction, TaskHistoryEntry};
use super::types::{Client, Reference, Task, TaskField, TaskStatus, User};
use super::validation::{validate_draft, validate_update, ProposedChange, TaskDraft, ValidatedDraft};

/// Tasks due further out than this start as `upcoming`.
const ACTIVATION_LEAD_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct TaskCreated {
    pub task: Task,
    pub notification_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRow {
    pub row: usize,
    pub name: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub total_processed: usize,
    pub valid: usize,
    pub inserted: usize,
    pub emails_sent: usize,
    pub email_errors: usize,
    pub duplicates: Vec<DuplicateRow>,
    pub skipped: Vec<SkippedRow>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated {
        task: Task,
        changed_fields: ChangedFields,
        notification_sent: bool,
    },
    NoChange {
        task: Task,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListEntry {
    pub task: Task,
    pub documents_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<TaskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<DocumentSections>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskMetrics {
    pub days_until_due: i64,
    pub is_overdue: bool,
    pub documents_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysisSummary {
    pub document_id: Uuid,
    pub file_name: String,
    pub analysis: Option<DocumentAnalysisRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetails {
    pub task: Task,
    pub metrics: TaskMetrics,
    pub sections: DocumentSections,
    pub document_analyses: Vec<DocumentAnalysisSummary>,
    pub assessment: TaskAssessment,
}

pub struct TaskService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    classifier: Arc<DocumentClassifier>,
    notify_timeout: Duration,
    notify_concurrency: usize,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        classifier: Arc<DocumentClassifier>,
        notify_timeout: Duration,
        notify_concurrency: usize,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            classifier,
            notify_timeout,
            notify_concurrency: notify_concurrency.max(1),
        }
    }

    fn ensure_can_create(actor: &Actor) -> TrackerResult<()> {
        if actor.user.role.has_right(Right::ManageOwnTasks) {
            return Ok(());
        }
        actor.ensure_right(Right::ManageTasks, "tasks")
    }

    /// Id, then name or email. Falls back to the raw string.
    async fn resolve_assignee(&self, raw: &str) -> TrackerResult<(Reference, Option<User>)> {
        let user = match Uuid::parse_str(raw) {
            Ok(id) => self.store.find_user(id).await?,
            Err(_) => self.store.find_user_by_name_or_email(raw).await?,
        };
        Ok(match user {
            Some(u) => (Reference::Resolved(u.id), Some(u)),
            None => (Reference::Unresolved(raw.to_string()), None),
        })
    }

    /// Id, then name. Falls back to the raw string.
    async fn resolve_entity(&self, raw: &str) -> TrackerResult<Reference> {
        let client = match Uuid::parse_str(raw) {
            Ok(id) => self.store.find_client(id).await?,
            Err(_) => self.store.find_client_by_name(raw).await?,
        };
        Ok(match client {
            Some(c) => Reference::Resolved(c.id),
            None => Reference::Unresolved(raw.to_string()),
        })
    }

    fn build_task(
        draft: ValidatedDraft,
        assigned_to: Reference,
        entity: Option<Reference>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Task {
        let scheduled_at = (status == TaskStatus::Upcoming)
            .then(|| draft.due_date - ChronoDuration::days(ACTIVATION_LEAD_DAYS));
        Task {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            priority: draft.priority,
            category: draft.category,
            due_date: draft.due_date,
            frequency: draft.frequency,
            status,
            scheduled_at,
            activated_at: None,
            assigned_to,
            entity,
            closure_rights_email: draft.closure_rights_email,
            tags: draft.tags,
            alert_emails: draft.alert_emails,
            estimated_hours: draft.estimated_hours,
            created_at: now,
            updated_at: now,
        }
    }

    fn created_entry(task: &Task, actor: &Actor) -> TaskHistoryEntry {
        TaskHistoryEntry::new(
            task.id,
            Some(actor.user.id),
            actor.user.name.clone(),
            HistoryAction::Created,
            ChangedFields::default(),
            format!("Task created: {}", task.name),
            task.created_at,
        )
    }

    /// Send `message`, logging instead of failing.
    async fn notify(&self, address: &str, message: &Message, task_id: Uuid) -> bool {
        match deliver(self.notifier.as_ref(), self.notify_timeout, address, message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Notification for task {} to {} failed: {}", task_id, address, e);
                false
            }
        }
    }

    async fn entity_display(&self, task: &Task) -> Option<String> {
        entity_name(self.store.as_ref(), task.entity.as_ref())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Could not resolve entity of task {}: {}", task.id, e);
                None
            })
    }

    async fn notify_assignment(&self, task: &Task, assignee: &User, actor: &Actor) -> bool {
        if assignee.email.trim().is_empty() {
            return false;
        }
        let client = self.entity_display(task).await;
        let message = assignment_message(task, &assignee.name, client.as_deref(), &actor.user);
        self.notify(&assignee.email, &message, task.id).await
    }

    pub async fn create_task(&self, draft: TaskDraft, actor: &Actor) -> TrackerResult<TaskCreated> {
        Self::ensure_can_create(actor)?;
        let draft = validate_draft(draft)?;

        let (assigned_to, assignee) = self.resolve_assignee(&draft.assigned_to).await?;
        let entity = match &draft.entity {
            Some(raw) => Some(self.resolve_entity(raw).await?),
            None => None,
        };

        let now = self.clock.now();
        let status = if days_until_due(draft.due_date, now) > ACTIVATION_LEAD_DAYS {
            TaskStatus::Upcoming
        } else {
            TaskStatus::Open
        };
        let task = Self::build_task(draft, assigned_to, entity, status, now);
        let task = self.store.insert_task(task).await?;
        self.store
            .insert_history(Self::created_entry(&task, actor))
            .await?;
        tracing::info!("Task created: {} ({}, {})", task.name, task.id, task.status);

        let notification_sent = match &assignee {
            Some(user) => self.notify_assignment(&task, user, actor).await,
            None => false,
        };
        Ok(TaskCreated {
            task,
            notification_sent,
        })
    }

    /// Import spreadsheet rows. Bad rows are reported, never fatal.
    pub async fn import_tasks(
        &self,
        rows: Vec<HashMap<String, String>>,
        actor: &Actor,
    ) -> TrackerResult<ImportSummary> {
        actor.ensure_right(Right::ManageTasks, "task import")?;
        let now = self.clock.now();
        let mut summary = ImportSummary {
            total_processed: rows.len(),
            ..ImportSummary::default()
        };
        let mut batch_keys: HashSet<(String, DateTime<Utc>, Option<Reference>)> = HashSet::new();
        let mut accepted: Vec<(usize, Task, User)> = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let row_no = index + 1;
            let draft = TaskDraft::from_row(row);

            let missing = draft.missing_fields();
            if !missing.is_empty() {
                summary.skipped.push(SkippedRow {
                    row: row_no,
                    reason: "Missing required fields".to_string(),
                    fields: missing.into_iter().map(str::to_string).collect(),
                });
                continue;
            }

            let draft = match validate_draft(draft) {
                Ok(d) => d,
                Err(e) => {
                    summary.skipped.push(SkippedRow {
                        row: row_no,
                        reason: e.to_string(),
                        fields: Vec::new(),
                    });
                    continue;
                }
            };

            let lookup = async {
                let (assigned_to, assignee) = self.resolve_assignee(&draft.assigned_to).await?;
                let entity = match &draft.entity {
                    Some(raw) => Some(self.resolve_entity(raw).await?),
                    None => None,
                };
                let key = (draft.name.clone(), draft.due_date, entity.clone());
                let duplicate = batch_keys.contains(&key) || self.is_stored_duplicate(&key).await?;
                TrackerResult::Ok((assigned_to, assignee, entity, key, duplicate))
            };
            let (assigned_to, assignee, entity, key, duplicate) = match lookup.await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!("Import row {} failed: {}", row_no, e);
                    summary.skipped.push(SkippedRow {
                        row: row_no,
                        reason: e.to_string(),
                        fields: Vec::new(),
                    });
                    continue;
                }
            };
            let Some(assignee) = assignee else {
                summary.skipped.push(SkippedRow {
                    row: row_no,
                    reason: format!("User not found: {}", draft.assigned_to),
                    fields: vec!["assigned_to".to_string()],
                });
                continue;
            };
            if duplicate {
                summary.duplicates.push(DuplicateRow {
                    row: row_no,
                    name: draft.name,
                    due_date: draft.due_date,
                });
                continue;
            }
            batch_keys.insert(key);

            let days = days_until_due(draft.due_date, now);
            let status = if days > ACTIVATION_LEAD_DAYS {
                TaskStatus::Upcoming
            } else if days >= 0 {
                TaskStatus::Open
            } else {
                TaskStatus::Escalated
            };
            accepted.push((row_no, Self::build_task(draft, assigned_to, entity, status, now), assignee));
        }

        summary.valid = accepted.len();
        if accepted.is_empty() {
            return Ok(summary);
        }

        let (inserted, assignees) = self.insert_accepted(accepted, &mut summary).await;
        summary.inserted = inserted.len();
        for task in &inserted {
            if let Err(e) = self.store.insert_history(Self::created_entry(task, actor)).await {
                tracing::warn!("Failed to record creation of task {}: {}", task.id, e);
            }
        }

        let notifications: Vec<_> = inserted
            .iter()
            .zip(assignees.iter())
            .map(|(task, user)| self.notify_assignment(task, user, actor))
            .collect();
        let results: Vec<bool> = stream::iter(notifications)
            .buffer_unordered(self.notify_concurrency)
            .collect()
            .await;
        summary.emails_sent = results.iter().filter(|ok| **ok).count();
        summary.email_errors = results.len() - summary.emails_sent;

        tracing::info!(
            "Imported {} of {} rows ({} duplicates, {} skipped)",
            summary.inserted,
            summary.total_processed,
            summary.duplicates.len(),
            summary.skipped.len()
        );
        summary.tasks = inserted;
        Ok(summary)
    }

    /// Bulk insert, falling back to one insert per row when the batch write
    /// fails so a single bad row cannot sink the rest.
    async fn insert_accepted(
        &self,
        accepted: Vec<(usize, Task, User)>,
        summary: &mut ImportSummary,
    ) -> (Vec<Task>, Vec<User>) {
        let tasks: Vec<Task> = accepted.iter().map(|(_, t, _)| t.clone()).collect();
        match self.store.insert_tasks(tasks).await {
            Ok(inserted) => {
                let assignees = accepted.into_iter().map(|(_, _, u)| u).collect();
                return (inserted, assignees);
            }
            Err(e) => tracing::warn!("Bulk insert failed, inserting rows one by one: {}", e),
        }

        let mut inserted = Vec::new();
        let mut assignees = Vec::new();
        for (row, task, user) in accepted {
            match self.store.insert_task(task).await {
                Ok(task) => {
                    inserted.push(task);
                    assignees.push(user);
                }
                Err(e) => {
                    tracing::warn!("Import row {} failed to insert: {}", row, e);
                    summary.skipped.push(SkippedRow {
                        row,
                        reason: e.to_string(),
                        fields: Vec::new(),
                    });
                }
            }
        }
        (inserted, assignees)
    }

    async fn is_stored_duplicate(
        &self,
        (name, due_date, entity): &(String, DateTime<Utc>, Option<Reference>),
    ) -> TrackerResult<bool> {
        let filter = TaskFilter {
            name: Some(name.clone()),
            due_date: Some(*due_date),
            ..TaskFilter::default()
        };
        let existing = self.store.find_tasks(&filter).await?;
        Ok(existing.iter().any(|t| &t.entity == entity))
    }

    async fn resolve_changes(&self, proposed: Vec<ProposedChange>) -> TrackerResult<Vec<TaskField>> {
        let mut fields = Vec::with_capacity(proposed.len());
        for change in proposed {
            let field = match change {
                ProposedChange::Field(f) => f,
                ProposedChange::AssignTo(raw) => TaskField::AssignedTo(self.resolve_assignee(&raw).await?.0),
                ProposedChange::SetEntity(None) => TaskField::Entity(None),
                ProposedChange::SetEntity(Some(raw)) => {
                    TaskField::Entity(Some(self.resolve_entity(&raw).await?))
                }
            };
            fields.push(field);
        }
        Ok(fields)
    }

    /// An upcoming task needs a future activation time.
    fn check_schedule(task: &Task, fields: &[TaskField], now: DateTime<Utc>) -> TrackerResult<()> {
        let mut projected = task.clone();
        for field in fields {
            projected.apply(field.clone());
        }
        let becomes_upcoming = projected.status == TaskStatus::Upcoming
            && (task.status != TaskStatus::Upcoming
                || fields.iter().any(|f| matches!(f, TaskField::ScheduledAt(_))));
        if becomes_upcoming && !projected.scheduled_at.is_some_and(|at| at > now) {
            return Err(TrackerError::invalid(
                "scheduled_at",
                "an upcoming task needs a scheduled activation time in the future",
            ));
        }
        Ok(())
    }

    /// Validate, diff and apply an update. Identical values are a no-op: no
    /// write, no history.
    pub async fn update_task(
        &self,
        task_id: Uuid,
        changes: &Map<String, Value>,
        actor: &Actor,
    ) -> TrackerResult<UpdateOutcome> {
        let proposed = validate_update(changes)?;
        let previous = accessible_task(self.store.as_ref(), task_id, actor).await?;
        let fields = self.resolve_changes(proposed).await?;

        let now = self.clock.now();
        Self::check_schedule(&previous, &fields, now)?;

        let changed = diff(&previous, &fields);
        if changed.is_empty() {
            tracing::debug!("No changes for task {}", task_id);
            return Ok(UpdateOutcome::NoChange { task: previous });
        }

        let task = self
            .store
            .update_task(task_id, fields, now)
            .await?
            .ok_or_else(|| TrackerError::not_found("task", task_id))?;
        self.store
            .insert_history(TaskHistoryEntry::new(
                task_id,
                Some(actor.user.id),
                actor.user.name.clone(),
                HistoryAction::Updated,
                changed.clone(),
                changed.describe(),
                now,
            ))
            .await?;
        tracing::info!("{} ({}) by {}", changed.describe(), task_id, actor.user.email);

        let notification_sent = self.notify_update(&previous, &task, &changed, actor).await;
        Ok(UpdateOutcome::Updated {
            task,
            changed_fields: changed,
            notification_sent,
        })
    }

    async fn notify_update(&self, previous: &Task, task: &Task, changed: &ChangedFields, actor: &Actor) -> bool {
        let recipient = match resolve_user(self.store.as_ref(), &task.assigned_to).await {
            Ok(Some(user)) if !user.email.trim().is_empty() => user,
            Ok(_) => return false,
            Err(e) => {
                tracing::warn!("Could not resolve assignee of task {}: {}", task.id, e);
                return false;
            }
        };
        let client = self.entity_display(task).await;

        let message = if changed.contains("assigned_to") {
            let previous_name = match resolve_user(self.store.as_ref(), &previous.assigned_to).await {
                Ok(Some(user)) => Some(user.name),
                _ => match &previous.assigned_to {
                    Reference::Unresolved(display) => Some(display.clone()),
                    Reference::Resolved(_) => None,
                },
            };
            reassignment_message(task, &recipient.name, client.as_deref(), previous_name.as_deref(), &actor.user)
        } else if changed.contains("status") {
            status_change_message(task, &recipient.name, client.as_deref(), previous.status.as_str(), &actor.user)
        } else {
            update_message(task, &recipient.name, client.as_deref(), changed, &actor.user)
        };
        self.notify(&recipient.email, &message, task.id).await
    }

    /// Live assessment of a task's documents.
    pub async fn assessment(&self, task_id: Uuid, actor: &Actor) -> TrackerResult<TaskAssessment> {
        let task = accessible_task(self.store.as_ref(), task_id, actor).await?;
        let documents = self.store.find_documents_by_task(task_id).await?;
        Ok(aggregate_documents(&documents, task.estimated_hours))
    }

    /// Documents of a task sorted into compliance sections.
    pub async fn sections(&self, task_id: Uuid, actor: &Actor) -> TrackerResult<DocumentSections> {
        let task = accessible_task(self.store.as_ref(), task_id, actor).await?;
        let documents = self.store.find_documents_by_task(task_id).await?;
        Ok(self.classifier.classify(&documents, task.category))
    }

    /// Tasks visible to `actor`, newest first.
    pub async fn list_tasks(&self, actor: &Actor, page: usize, limit: usize) -> TrackerResult<Vec<TaskListEntry>> {
        let visible: Vec<Task> = self
            .store
            .find_tasks(&TaskFilter::default())
            .await?
            .into_iter()
            .filter(|t| actor.can_access(t))
            .collect();

        let mut entries = Vec::new();
        for task in paginate(visible, page, limit) {
            let documents = self.store.find_documents_by_task(task.id).await?;
            let (assessment, sections) = if documents.is_empty() {
                (None, None)
            } else {
                (
                    Some(aggregate_documents(&documents, task.estimated_hours)),
                    Some(self.classifier.classify(&documents, task.category)),
                )
            };
            entries.push(TaskListEntry {
                documents_count: documents.len(),
                task,
                assessment,
                sections,
            });
        }
        Ok(entries)
    }

    pub async fn task_details(&self, task_id: Uuid, actor: &Actor) -> TrackerResult<TaskDetails> {
        let task = accessible_task(self.store.as_ref(), task_id, actor).await?;
        let documents: Vec<Document> = self.store.find_documents_by_task(task_id).await?;
        let now = self.clock.now();

        Ok(TaskDetails {
            metrics: TaskMetrics {
                days_until_due: days_until_due(task.due_date, now),
                is_overdue: task.due_date < now && !task.status.is_terminal(),
                documents_count: documents.len(),
            },
            sections: self.classifier.classify(&documents, task.category),
            assessment: aggregate_documents(&documents, task.estimated_hours),
            document_analyses: documents
                .into_iter()
                .map(|d| DocumentAnalysisSummary {
                    document_id: d.id,
                    file_name: d.file_name,
                    analysis: d.analysis,
                })
                .collect(),
            task,
        })
    }

    pub async fn task_history(
        &self,
        task_id: Uuid,
        actor: &Actor,
        page: usize,
        limit: usize,
    ) -> TrackerResult<Vec<TaskHistoryEntry>> {
        accessible_task(self.store.as_ref(), task_id, actor).await?;
        self.store.find_history_by_task(task_id, page, limit).await
    }

    pub async fn create_client(
        &self,
        name: &str,
        since: Option<DateTime<Utc>>,
        actor: &Actor,
    ) -> TrackerResult<Client> {
        actor.ensure_right(Right::ManageClients, "clients")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::missing("name"));
        }
        if self.store.find_client_by_name(name).await?.is_some() {
            return Err(TrackerError::invalid("name", format!("client '{}' already exists", name)));
        }
        let client = Client::new(name.to_string(), since.unwrap_or_else(|| self.clock.now()));
        self.store.insert_client(client).await
    }

    pub async fn list_clients(&self) -> TrackerResult<Vec<Client>> {
        self.store.list_clients().await
    }
}
