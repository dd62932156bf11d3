use std::sync::Arc;

use uuid::Uuid;

use crate::access::{accessible_task, Actor, Right};
use crate::error::{TrackerError, TrackerResult};
use crate::lifecycle::Clock;
use crate::store::{Store, TaskFilter};

use super::types::{Comment, CommentDraft, CommentFilter};

const MAX_COMMENT_CHARS: usize = 5000;

pub struct CommentService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CommentService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Commenting needs `CreateComments`; task managers may always comment.
    fn ensure_can_comment(actor: &Actor) -> TrackerResult<()> {
        if actor.user.role.has_right(Right::CreateComments) {
            return Ok(());
        }
        actor.ensure_right(Right::ManageTasks, "comments")
    }

    fn validate_content(raw: Option<&str>) -> TrackerResult<String> {
        let content = raw.map(str::trim).unwrap_or_default();
        if content.is_empty() {
            return Err(TrackerError::missing("content"));
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(TrackerError::invalid(
                "content",
                format!("must be at most {} characters", MAX_COMMENT_CHARS),
            ));
        }
        Ok(content.to_string())
    }

    /// The task (and document) a new comment attaches to, checked against
    /// the actor's entitlement.
    async fn resolve_target(
        &self,
        task_id: Option<Uuid>,
        document_id: Option<Uuid>,
        actor: &Actor,
    ) -> TrackerResult<(Uuid, Option<Uuid>)> {
        match (task_id, document_id) {
            (_, Some(document_id)) => {
                let document = self
                    .store
                    .find_document(document_id)
                    .await?
                    .ok_or_else(|| TrackerError::not_found("document", document_id))?;
                if task_id.is_some_and(|id| id != document.task_id) {
                    return Err(TrackerError::invalid(
                        "document_id",
                        "document belongs to a different task",
                    ));
                }
                accessible_task(self.store.as_ref(), document.task_id, actor).await?;
                Ok((document.task_id, Some(document.id)))
            }
            (Some(task_id), None) => {
                accessible_task(self.store.as_ref(), task_id, actor).await?;
                Ok((task_id, None))
            }
            (None, None) => Err(TrackerError::missing("task_id")),
        }
    }

    async fn insert(
        &self,
        content: String,
        (task_id, document_id): (Uuid, Option<Uuid>),
        parent_id: Option<Uuid>,
        actor: &Actor,
    ) -> TrackerResult<Comment> {
        let now = self.clock.now();
        let comment = self
            .store
            .insert_comment(Comment {
                id: Uuid::new_v4(),
                content,
                author_id: actor.user.id,
                author_name: actor.user.name.clone(),
                task_id,
                document_id,
                parent_id,
                likes: 0,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::debug!("Comment {} added to task {} by {}", comment.id, task_id, actor.user.email);
        Ok(comment)
    }

    async fn load_comment(&self, id: Uuid) -> TrackerResult<Comment> {
        self.store
            .find_comment(id)
            .await?
            .ok_or_else(|| TrackerError::not_found("comment", id))
    }

    pub async fn create_comment(&self, draft: CommentDraft, actor: &Actor) -> TrackerResult<Comment> {
        Self::ensure_can_comment(actor)?;
        let content = Self::validate_content(draft.content.as_deref())?;
        let target = self
            .resolve_target(draft.task_id, draft.document_id, actor)
            .await?;
        self.insert(content, target, None, actor).await
    }

    /// Reply in the parent's thread, on the parent's task and document.
    pub async fn reply_to_comment(
        &self,
        parent_id: Uuid,
        content: Option<&str>,
        actor: &Actor,
    ) -> TrackerResult<Comment> {
        Self::ensure_can_comment(actor)?;
        let content = Self::validate_content(content)?;
        let parent = self.load_comment(parent_id).await?;
        accessible_task(self.store.as_ref(), parent.task_id, actor).await?;
        self.insert(content, (parent.task_id, parent.document_id), Some(parent.id), actor)
            .await
    }

    pub async fn like_comment(&self, id: Uuid, actor: &Actor) -> TrackerResult<Comment> {
        Self::ensure_can_comment(actor)?;
        let comment = self.load_comment(id).await?;
        accessible_task(self.store.as_ref(), comment.task_id, actor).await?;
        self.store
            .like_comment(id, self.clock.now())
            .await?
            .ok_or_else(|| TrackerError::not_found("comment", id))
    }

    /// Comments newest first, narrowed to a task or a document. Without
    /// either, every comment on a task the actor can see.
    pub async fn list_comments(
        &self,
        task_id: Option<Uuid>,
        document_id: Option<Uuid>,
        actor: &Actor,
    ) -> TrackerResult<Vec<Comment>> {
        let task_ids = match (task_id, document_id) {
            (None, None) if actor.sees_all_tasks() => None,
            (None, None) => Some(
                self.store
                    .find_tasks(&TaskFilter::default())
                    .await?
                    .into_iter()
                    .filter(|t| actor.can_access(t))
                    .map(|t| t.id)
                    .collect(),
            ),
            (task_id, document_id) => Some(vec![self.resolve_target(task_id, document_id, actor).await?.0]),
        };
        let filter = CommentFilter {
            task_ids,
            document_id,
        };
        self.store.find_comments(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::lifecycle::ManualClock;
    use crate::store::MemoryStore;
    use crate::task::{Category, Frequency, Priority, Reference, Task, TaskStatus, User};
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        comments: CommentService,
        task: Task,
        owner: Actor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()));
        let owner = store
            .insert_user(User::new("Nisha".into(), "nisha@example.com".into(), Role::User))
            .await
            .unwrap();
        let now = clock.now();
        let task = store
            .insert_task(Task {
                id: Uuid::new_v4(),
                name: "PF ECR April".to_string(),
                description: "Monthly PF return".to_string(),
                priority: Priority::Medium,
                category: Category::Pf,
                due_date: now + Duration::days(5),
                frequency: Frequency::Monthly,
                status: TaskStatus::Open,
                scheduled_at: None,
                activated_at: None,
                assigned_to: Reference::Resolved(owner.id),
                entity: None,
                closure_rights_email: None,
                tags: Vec::new(),
                alert_emails: Vec::new(),
                estimated_hours: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        Fixture {
            comments: CommentService::new(store.clone(), clock.clone()),
            store,
            clock,
            task,
            owner: Actor::new(owner),
        }
    }

    fn draft(content: &str, task_id: Uuid) -> CommentDraft {
        CommentDraft {
            content: Some(content.to_string()),
            task_id: Some(task_id),
            document_id: None,
        }
    }

    #[tokio::test]
    async fn test_thread_listing_newest_first() {
        let f = fixture().await;
        let first = f
            .comments
            .create_comment(draft("Challan uploaded", f.task.id), &f.owner)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        let reply = f
            .comments
            .reply_to_comment(first.id, Some("  Verified amount  "), &f.owner)
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(first.id));
        assert_eq!(reply.task_id, f.task.id);
        assert_eq!(reply.content, "Verified amount");

        let listed = f
            .comments
            .list_comments(Some(f.task.id), None, &f.owner)
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![reply.id, first.id]);

        let everything = f.comments.list_comments(None, None, &f.owner).await.unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn test_like_increments() {
        let f = fixture().await;
        let comment = f
            .comments
            .create_comment(draft("Please review", f.task.id), &f.owner)
            .await
            .unwrap();
        f.comments.like_comment(comment.id, &f.owner).await.unwrap();
        let liked = f.comments.like_comment(comment.id, &f.owner).await.unwrap();
        assert_eq!(liked.likes, 2);

        assert!(matches!(
            f.comments.like_comment(Uuid::new_v4(), &f.owner).await,
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rules_and_entitlement() {
        let f = fixture().await;
        assert!(matches!(
            f.comments.create_comment(draft("   ", f.task.id), &f.owner).await,
            Err(TrackerError::Validation { .. })
        ));
        assert!(matches!(
            f.comments.create_comment(CommentDraft::default(), &f.owner).await,
            Err(TrackerError::Validation { .. })
        ));

        let stranger = f
            .store
            .insert_user(User::new("Omar".into(), "omar@example.com".into(), Role::Member))
            .await
            .unwrap();
        let stranger = Actor::new(stranger);
        assert!(matches!(
            f.comments.create_comment(draft("hi", f.task.id), &stranger).await,
            Err(TrackerError::AccessDenied { .. })
        ));
        assert!(f.comments.list_comments(None, None, &stranger).await.unwrap().is_empty());

        let admin = Actor::new(User::new("Meera".into(), "meera@example.com".into(), Role::Admin));
        assert!(f.comments.create_comment(draft("Approved", f.task.id), &admin).await.is_ok());
    }
}
