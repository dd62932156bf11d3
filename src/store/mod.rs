//! Persistence boundary.
//!
//! Every component reaches shared state through [`Store`]. Implementations
//! must apply each single-record update atomically; nothing here spans more
//! than one record.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::comment::{Comment, CommentFilter};
use crate::document::Document;
use crate::error::TrackerResult;
use crate::task::{Client, Reference, Task, TaskField, TaskHistoryEntry, TaskStatus, User};

/// Conjunctive task query. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub statuses: Option<Vec<TaskStatus>>,
    pub exclude_terminal: bool,
    pub scheduled_at_or_before: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            statuses: Some(vec![status]),
            ..Self::default()
        }
    }

    pub fn active() -> Self {
        Self {
            exclude_terminal: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if self.exclude_terminal && task.status.is_terminal() {
            return false;
        }
        if let Some(cutoff) = self.scheduled_at_or_before {
            if !task.scheduled_at.is_some_and(|at| at <= cutoff) {
                return false;
            }
        }
        if let Some(cutoff) = self.due_before {
            if task.due_date >= cutoff {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &task.name != name {
                return false;
            }
        }
        if let Some(due) = self.due_date {
            if task.due_date != due {
                return false;
            }
        }
        true
    }
}

/// 1-based page window over an already ordered list.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Vec<T> {
    let skip = page.saturating_sub(1).saturating_mul(limit);
    items.into_iter().skip(skip).take(limit).collect()
}

/// The user a task reference points at: by id when resolved, otherwise by
/// name or email.
pub async fn resolve_user(store: &dyn Store, reference: &Reference) -> TrackerResult<Option<User>> {
    match reference {
        Reference::Resolved(id) => store.find_user(*id).await,
        Reference::Unresolved(display) => store.find_user_by_name_or_email(display).await,
    }
}

/// Display name for an entity reference.
pub async fn entity_name(store: &dyn Store, reference: Option<&Reference>) -> TrackerResult<Option<String>> {
    match reference {
        None => Ok(None),
        Some(Reference::Resolved(id)) => Ok(store.find_client(*id).await?.map(|c| c.name)),
        Some(Reference::Unresolved(display)) => Ok(Some(display.clone())),
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Tasks matching `filter`, newest first.
    async fn find_tasks(&self, filter: &TaskFilter) -> TrackerResult<Vec<Task>>;
    async fn find_task(&self, id: Uuid) -> TrackerResult<Option<Task>>;
    async fn insert_task(&self, task: Task) -> TrackerResult<Task>;
    async fn insert_tasks(&self, tasks: Vec<Task>) -> TrackerResult<Vec<Task>>;
    /// Apply `fields` to one task and bump `updated_at`. `None` if unknown.
    async fn update_task(
        &self,
        id: Uuid,
        fields: Vec<TaskField>,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Task>>;
    /// Move a task from `from` to `to` only if it is still in `from`. Moving
    /// to `Open` also stamps `activated_at`. `None` when the predicate fails.
    async fn transition_status(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Task>>;

    async fn insert_document(&self, document: Document) -> TrackerResult<Document>;
    async fn find_document(&self, id: Uuid) -> TrackerResult<Option<Document>>;
    /// Documents of one task, oldest upload first.
    async fn find_documents_by_task(&self, task_id: Uuid) -> TrackerResult<Vec<Document>>;
    async fn update_document(&self, document: Document) -> TrackerResult<Option<Document>>;

    async fn insert_history(&self, entry: TaskHistoryEntry) -> TrackerResult<()>;
    /// History of one task, newest first.
    async fn find_history_by_task(
        &self,
        task_id: Uuid,
        page: usize,
        limit: usize,
    ) -> TrackerResult<Vec<TaskHistoryEntry>>;

    async fn insert_user(&self, user: User) -> TrackerResult<User>;
    async fn find_user(&self, id: Uuid) -> TrackerResult<Option<User>>;
    /// Case-insensitive match on name or email.
    async fn find_user_by_name_or_email(&self, needle: &str) -> TrackerResult<Option<User>>;

    async fn insert_client(&self, client: Client) -> TrackerResult<Client>;
    async fn find_client(&self, id: Uuid) -> TrackerResult<Option<Client>>;
    async fn find_client_by_name(&self, name: &str) -> TrackerResult<Option<Client>>;
    async fn list_clients(&self) -> TrackerResult<Vec<Client>>;

    async fn insert_comment(&self, comment: Comment) -> TrackerResult<Comment>;
    async fn find_comment(&self, id: Uuid) -> TrackerResult<Option<Comment>>;
    /// Comments matching `filter`, newest first.
    async fn find_comments(&self, filter: &CommentFilter) -> TrackerResult<Vec<Comment>>;
    /// Add one like atomically. `None` if unknown.
    async fn like_comment(&self, id: Uuid, now: DateTime<Utc>) -> TrackerResult<Option<Comment>>;
}
