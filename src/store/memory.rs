//! In-memory [`Store`] with optional JSON file backing.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::comment::{Comment, CommentFilter};
use crate::document::Document;
use crate::error::{TrackerError, TrackerResult};
use crate::task::{Client, Task, TaskField, TaskHistoryEntry, TaskStatus, User};

use super::{paginate, Store, TaskFilter};

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<Uuid, Task>,
    documents: HashMap<Uuid, Document>,
    history: Vec<TaskHistoryEntry>,
    users: HashMap<Uuid, User>,
    clients: HashMap<Uuid, Client>,
    comments: Vec<Comment>,
}

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    history: Vec<TaskHistoryEntry>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    clients: Vec<Client>,
    #[serde(default)]
    comments: Vec<Comment>,
}

impl From<Snapshot> for Tables {
    fn from(s: Snapshot) -> Self {
        Self {
            tasks: s.tasks.into_iter().map(|t| (t.id, t)).collect(),
            documents: s.documents.into_iter().map(|d| (d.id, d)).collect(),
            history: s.history,
            users: s.users.into_iter().map(|u| (u.id, u)).collect(),
            clients: s.clients.into_iter().map(|c| (c.id, c)).collect(),
            comments: s.comments,
        }
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    storage_path: Option<PathBuf>,
    /// Serializes snapshot writes so an older snapshot never lands last.
    save_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store that lives only in memory.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            storage_path: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Load from `path` (missing file = empty store); every write is saved back.
    pub async fn load(path: PathBuf) -> TrackerResult<Self> {
        let tables = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let snapshot: Snapshot =
                    serde_json::from_str(&contents).map_err(TrackerError::persistence)?;
                tracing::info!(
                    "Loaded store from {}: {} tasks, {} documents, {} users",
                    path.display(),
                    snapshot.tasks.len(),
                    snapshot.documents.len(),
                    snapshot.users.len()
                );
                Tables::from(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(TrackerError::persistence(e)),
        };

        Ok(Self {
            tables: RwLock::new(tables),
            storage_path: Some(path),
            save_lock: Mutex::new(()),
        })
    }

    async fn save_to_disk(&self) -> TrackerResult<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;

        let contents = {
            let tables = self.tables.read().await;
            let snapshot = Snapshot {
                tasks: tables.tasks.values().cloned().collect(),
                documents: tables.documents.values().cloned().collect(),
                history: tables.history.clone(),
                users: tables.users.values().cloned().collect(),
                clients: tables.clients.values().cloned().collect(),
                comments: tables.comments.clone(),
            };
            serde_json::to_string_pretty(&snapshot).map_err(TrackerError::persistence)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(TrackerError::persistence)?;
        }
        tokio::fs::write(path, contents).await.map_err(|e| {
            tracing::error!("Failed to save store to {}: {}", path.display(), e);
            TrackerError::persistence(e)
        })
    }
}

fn newest_first(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
    tasks
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_tasks(&self, filter: &TaskFilter) -> TrackerResult<Vec<Task>> {
        let tables = self.tables.read().await;
        let found = tables
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        Ok(newest_first(found))
    }

    async fn find_task(&self, id: Uuid) -> TrackerResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn insert_task(&self, task: Task) -> TrackerResult<Task> {
        self.tables.write().await.tasks.insert(task.id, task.clone());
        self.save_to_disk().await?;
        Ok(task)
    }

    async fn insert_tasks(&self, tasks: Vec<Task>) -> TrackerResult<Vec<Task>> {
        {
            let mut tables = self.tables.write().await;
            for task in &tasks {
                tables.tasks.insert(task.id, task.clone());
            }
        }
        self.save_to_disk().await?;
        Ok(tasks)
    }

    async fn update_task(
        &self,
        id: Uuid,
        fields: Vec<TaskField>,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Task>> {
        let updated = {
            let mut tables = self.tables.write().await;
            tables.tasks.get_mut(&id).map(|task| {
                for field in fields {
                    task.apply(field);
                }
                task.updated_at = now;
                task.clone()
            })
        };
        if updated.is_some() {
            self.save_to_disk().await?;
        }
        Ok(updated)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Task>> {
        let moved = {
            let mut tables = self.tables.write().await;
            match tables.tasks.get_mut(&id) {
                Some(task) if task.status == from => {
                    task.status = to;
                    if to == TaskStatus::Open {
                        task.activated_at = Some(now);
                    }
                    task.updated_at = now;
                    Some(task.clone())
                }
                _ => None,
            }
        };
        if moved.is_some() {
            self.save_to_disk().await?;
        }
        Ok(moved)
    }

    async fn insert_document(&self, document: Document) -> TrackerResult<Document> {
        self.tables
            .write()
            .await
            .documents
            .insert(document.id, document.clone());
        self.save_to_disk().await?;
        Ok(document)
    }

    async fn find_document(&self, id: Uuid) -> TrackerResult<Option<Document>> {
        Ok(self.tables.read().await.documents.get(&id).cloned())
    }

    async fn find_documents_by_task(&self, task_id: Uuid) -> TrackerResult<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut docs: Vec<_> = tables
            .documents
            .values()
            .filter(|d| d.task_id == task_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn update_document(&self, document: Document) -> TrackerResult<Option<Document>> {
        let updated = {
            let mut tables = self.tables.write().await;
            match tables.documents.get_mut(&document.id) {
                Some(existing) => {
                    *existing = document.clone();
                    true
                }
                None => false,
            }
        };
        if !updated {
            return Ok(None);
        }
        self.save_to_disk().await?;
        Ok(Some(document))
    }

    async fn insert_history(&self, entry: TaskHistoryEntry) -> TrackerResult<()> {
        self.tables.write().await.history.push(entry);
        self.save_to_disk().await
    }

    async fn find_history_by_task(
        &self,
        task_id: Uuid,
        page: usize,
        limit: usize,
    ) -> TrackerResult<Vec<TaskHistoryEntry>> {
        let tables = self.tables.read().await;
        // Entries are appended in creation order; reverse keeps ties stable.
        let mut entries: Vec<_> = tables
            .history
            .iter()
            .rev()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(entries, page, limit))
    }

    async fn insert_user(&self, user: User) -> TrackerResult<User> {
        self.tables.write().await.users.insert(user.id, user.clone());
        self.save_to_disk().await?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> TrackerResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_name_or_email(&self, needle: &str) -> TrackerResult<Option<User>> {
        let needle = needle.trim();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.name.eq_ignore_ascii_case(needle) || u.email.eq_ignore_ascii_case(needle))
            .cloned())
    }

    async fn insert_client(&self, client: Client) -> TrackerResult<Client> {
        self.tables
            .write()
            .await
            .clients
            .insert(client.id, client.clone());
        self.save_to_disk().await?;
        Ok(client)
    }

    async fn find_client(&self, id: Uuid) -> TrackerResult<Option<Client>> {
        Ok(self.tables.read().await.clients.get(&id).cloned())
    }

    async fn find_client_by_name(&self, name: &str) -> TrackerResult<Option<Client>> {
        let name = name.trim();
        let tables = self.tables.read().await;
        Ok(tables
            .clients
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_clients(&self) -> TrackerResult<Vec<Client>> {
        let tables = self.tables.read().await;
        let mut clients: Vec<_> = tables.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn insert_comment(&self, comment: Comment) -> TrackerResult<Comment> {
        self.tables.write().await.comments.push(comment.clone());
        self.save_to_disk().await?;
        Ok(comment)
    }

    async fn find_comment(&self, id: Uuid) -> TrackerResult<Option<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn find_comments(&self, filter: &CommentFilter) -> TrackerResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        // Appended in creation order; reverse keeps ties stable.
        let mut found: Vec<_> = tables
            .comments
            .iter()
            .rev()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn like_comment(&self, id: Uuid, now: DateTime<Utc>) -> TrackerResult<Option<Comment>> {
        let liked = {
            let mut tables = self.tables.write().await;
            tables.comments.iter_mut().find(|c| c.id == id).map(|comment| {
                comment.likes = comment.likes.saturating_add(1);
                comment.updated_at = now;
                comment.clone()
            })
        };
        if liked.is_some() {
            self.save_to_disk().await?;
        }
        Ok(liked)
    }
}
