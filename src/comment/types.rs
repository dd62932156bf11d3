//! Discussion comments on tasks and documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comment on a task, optionally about one of its documents. Replies point
/// at their parent and share its task and document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub task_id: Uuid,
    #[serde(default)]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub likes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for a new top-level comment. A document target implies its
/// task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentDraft {
    pub content: Option<String>,
    pub task_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
}

/// Conjunctive comment query. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub task_ids: Option<Vec<Uuid>>,
    pub document_id: Option<Uuid>,
}

impl CommentFilter {
    pub fn matches(&self, comment: &Comment) -> bool {
        if let Some(ids) = &self.task_ids {
            if !ids.contains(&comment.task_id) {
                return false;
            }
        }
        if let Some(document_id) = self.document_id {
            if comment.document_id != Some(document_id) {
                return false;
            }
        }
        true
    }
}
