//! Document upload, re-analysis and status management.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::access::{accessible_task, Actor};
use crate::analysis::{analyze_or_fallback, DocumentAnalyzer};
use crate::choice::parse_choice;
use crate::error::{TrackerError, TrackerResult};
use crate::lifecycle::Clock;
use crate::store::Store;
use crate::task::{Category, Task, TaskStatus};

use super::classifier::DocumentClassifier;
use super::types::{Document, DocumentAnalysisRecord, DocumentStatus};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisChange {
    pub completion_status_changed: bool,
    pub completion_percentage_change: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reanalysis {
    pub document: Document,
    pub previous: Option<DocumentAnalysisRecord>,
    pub current: DocumentAnalysisRecord,
    pub change: AnalysisChange,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub name: String,
    pub category: Category,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            category: task.category,
            status: task.status,
            due_date: task.due_date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysisView {
    pub document: Document,
    pub task: TaskSummary,
    pub section: &'static str,
    pub analysis: Option<DocumentAnalysisRecord>,
    /// How this document moves its task forward.
    pub contribution: Option<String>,
}

pub struct DocumentService {
    store: Arc<dyn Store>,
    analyzer: Arc<dyn DocumentAnalyzer>,
    classifier: Arc<DocumentClassifier>,
    clock: Arc<dyn Clock>,
    upload_dir: PathBuf,
    analyzer_timeout: Duration,
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `<uuid><.ext>`, keeping the lowercased extension of the original name.
fn storage_locator(file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}{}", Uuid::new_v4(), ext)
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn Store>,
        analyzer: Arc<dyn DocumentAnalyzer>,
        classifier: Arc<DocumentClassifier>,
        clock: Arc<dyn Clock>,
        upload_dir: PathBuf,
        analyzer_timeout: Duration,
    ) -> Self {
        Self {
            store,
            analyzer,
            classifier,
            clock,
            upload_dir,
            analyzer_timeout,
        }
    }

    async fn load_document(&self, id: Uuid) -> TrackerResult<Document> {
        self.store
            .find_document(id)
            .await?
            .ok_or_else(|| TrackerError::not_found("document", id))
    }

    /// Store the bytes, analyze them against the task and attach the result.
    /// Analysis failures attach the fallback record instead of failing.
    pub async fn upload_document(
        &self,
        task_id: Uuid,
        actor: &Actor,
        file_name: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> TrackerResult<Document> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(TrackerError::missing("file_name"));
        }
        if bytes.is_empty() {
            return Err(TrackerError::invalid("file", "uploaded file is empty"));
        }
        let task = accessible_task(self.store.as_ref(), task_id, actor).await?;

        let locator = storage_locator(file_name);
        let path = self.upload_dir.join(&locator);
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(TrackerError::persistence)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(TrackerError::persistence)?;

        let context = task.context();
        let analysis = analyze_or_fallback(
            self.analyzer.as_ref(),
            self.clock.as_ref(),
            self.analyzer_timeout,
            bytes,
            media_type,
            Some(&context),
        )
        .await;

        let now = self.clock.now();
        let document = Document {
            id: Uuid::new_v4(),
            task_id,
            uploaded_by: actor.user.id,
            file_name: file_name.to_string(),
            media_type: media_type.to_string(),
            size: bytes.len() as u64,
            content_hash: content_hash(bytes),
            locator,
            status: DocumentStatus::Validated,
            analysis: Some(analysis),
            uploaded_at: now,
            updated_at: now,
        };
        let document = match self.store.insert_document(document).await {
            Ok(document) => document,
            Err(e) => {
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Could not remove orphaned upload {}: {}", path.display(), remove);
                }
                return Err(e);
            }
        };
        tracing::info!(
            "Document {} uploaded for task {} ({} bytes)",
            document.file_name,
            task_id,
            document.size
        );
        Ok(document)
    }

    /// Re-run analysis on the stored bytes and replace the record.
    pub async fn reanalyze_document(&self, document_id: Uuid, actor: &Actor) -> TrackerResult<Reanalysis> {
        let document = self.load_document(document_id).await?;
        let task = accessible_task(self.store.as_ref(), document.task_id, actor).await?;

        let bytes = tokio::fs::read(self.upload_dir.join(&document.locator))
            .await
            .map_err(TrackerError::persistence)?;
        let context = task.context();
        let current = analyze_or_fallback(
            self.analyzer.as_ref(),
            self.clock.as_ref(),
            self.analyzer_timeout,
            &bytes,
            &document.media_type,
            Some(&context),
        )
        .await;

        let previous = document.analysis.clone();
        let change = AnalysisChange {
            completion_status_changed: previous
                .as_ref()
                .map_or(true, |p| p.completion_status != current.completion_status),
            completion_percentage_change: i32::from(current.completion_percentage)
                - previous
                    .as_ref()
                    .map_or(0, |p| i32::from(p.completion_percentage)),
        };

        let updated = Document {
            analysis: Some(current.clone()),
            updated_at: self.clock.now(),
            ..document
        };
        let document = self
            .store
            .update_document(updated)
            .await?
            .ok_or_else(|| TrackerError::not_found("document", document_id))?;
        tracing::info!(
            "Document {} re-analyzed: {} ({:+}%)",
            document_id,
            current.completion_status,
            change.completion_percentage_change
        );

        Ok(Reanalysis {
            document,
            previous,
            current,
            change,
        })
    }

    pub async fn document_analysis(&self, document_id: Uuid, actor: &Actor) -> TrackerResult<DocumentAnalysisView> {
        let document = self.load_document(document_id).await?;
        let task = accessible_task(self.store.as_ref(), document.task_id, actor).await?;
        let section = self.classifier.section_of(&document.file_name, task.category);

        Ok(DocumentAnalysisView {
            task: TaskSummary::from(&task),
            section: section.as_str(),
            contribution: document
                .analysis
                .as_ref()
                .filter(|a| !a.is_fallback())
                .map(|a| a.contribution_to_task.clone()),
            analysis: document.analysis.clone(),
            document,
        })
    }

    pub async fn update_document_status(
        &self,
        document_id: Uuid,
        status: &str,
        actor: &Actor,
    ) -> TrackerResult<Document> {
        let status: DocumentStatus = parse_choice(status)?;
        let document = self.load_document(document_id).await?;
        accessible_task(self.store.as_ref(), document.task_id, actor).await?;

        if document.status == status {
            return Ok(document);
        }
        let updated = Document {
            status,
            updated_at: self.clock.now(),
            ..document
        };
        self.store
            .update_document(updated)
            .await?
            .ok_or_else(|| TrackerError::not_found("document", document_id))
    }

    pub async fn documents_for_task(&self, task_id: Uuid, actor: &Actor) -> TrackerResult<Vec<Document>> {
        accessible_task(self.store.as_ref(), task_id, actor).await?;
        self.store.find_documents_by_task(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_locator_keeps_extension() {
        let locator = storage_locator("Form16.PDF");
        assert!(locator.ends_with(".pdf"));
        assert_eq!(locator.len(), 36 + 4);
        assert_eq!(storage_locator("README").len(), 36);
    }
}
