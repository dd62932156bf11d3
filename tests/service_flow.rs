//! End-to-end flows through the task, document and lifecycle services against
//! the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use compli_tracker::access::{Actor, Role};
use compli_tracker::analysis::{DocumentAnalyzer, TaskReadiness};
use compli_tracker::comment::{Comment, CommentFilter};
use compli_tracker::config::ScheduleSettings;
use compli_tracker::document::{
    CompletionStatus, Document, DocumentAnalysisRecord, DocumentClassifier, DocumentService,
    DocumentStatus, RawAnalysis,
};
use compli_tracker::lifecycle::{Clock, LifecycleEngine, ManualClock};
use compli_tracker::notify::Notifier;
use compli_tracker::store::{MemoryStore, Store, TaskFilter};
use compli_tracker::task::{
    Client, HistoryAction, Task, TaskContext, TaskDraft, TaskField, TaskHistoryEntry, TaskService,
    TaskStatus, UpdateOutcome, User,
};
use compli_tracker::{TrackerError, TrackerResult};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, subject)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, address: &str, subject: &str, _body: &str) -> TrackerResult<()> {
        if self.fail {
            return Err(TrackerError::Delivery("mailbox unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Returns a fixed completion percentage, or fails when `None`.
struct ScriptedAnalyzer {
    percentage: Mutex<Option<f64>>,
}

impl ScriptedAnalyzer {
    fn new(percentage: Option<f64>) -> Self {
        Self {
            percentage: Mutex::new(percentage),
        }
    }

    fn set(&self, percentage: Option<f64>) {
        *self.percentage.lock().unwrap() = percentage;
    }
}

#[async_trait]
impl DocumentAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _bytes: &[u8],
        _media_type: &str,
        context: Option<&TaskContext>,
    ) -> TrackerResult<DocumentAnalysisRecord> {
        assert!(context.is_some());
        let percentage = *self.percentage.lock().unwrap();
        match percentage {
            Some(p) => Ok(DocumentAnalysisRecord::from_raw(
                RawAnalysis {
                    task_completion_status: Some(
                        if p >= 90.0 { "completed" } else { "partially_completed" }.to_string(),
                    ),
                    completion_confidence: Some("high".to_string()),
                    completion_percentage: Some(p),
                    risk_assessment: Some("low".to_string()),
                    recommendations: Some(vec!["File before the due date".to_string()]),
                    ..RawAnalysis::default()
                },
                Utc::now(),
            )),
            None => Err(TrackerError::Analysis("provider returned 503".to_string())),
        }
    }
}

/// Delegates to a [`MemoryStore`], failing user lookups for poisoned keys and
/// document inserts on demand.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    poisoned: Mutex<HashSet<String>>,
    fail_document_inserts: AtomicBool,
}

impl FlakyStore {
    fn poison(&self, key: impl ToString) {
        self.poisoned.lock().unwrap().insert(key.to_string().to_lowercase());
    }

    fn check(&self, key: impl ToString) -> TrackerResult<()> {
        if self.poisoned.lock().unwrap().contains(&key.to_string().to_lowercase()) {
            return Err(TrackerError::Persistence("db timeout".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn find_tasks(&self, filter: &TaskFilter) -> TrackerResult<Vec<Task>> {
        self.inner.find_tasks(filter).await
    }
    async fn find_task(&self, id: Uuid) -> TrackerResult<Option<Task>> {
        self.inner.find_task(id).await
    }
    async fn insert_task(&self, task: Task) -> TrackerResult<Task> {
        self.inner.insert_task(task).await
    }
    async fn insert_tasks(&self, tasks: Vec<Task>) -> TrackerResult<Vec<Task>> {
        self.inner.insert_tasks(tasks).await
    }
    async fn update_task(
        &self,
        id: Uuid,
        fields: Vec<TaskField>,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Task>> {
        self.inner.update_task(id, fields, now).await
    }
    async fn transition_status(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Task>> {
        self.inner.transition_status(id, from, to, now).await
    }
    async fn insert_document(&self, document: Document) -> TrackerResult<Document> {
        if self.fail_document_inserts.load(Ordering::SeqCst) {
            return Err(TrackerError::Persistence("disk full".to_string()));
        }
        self.inner.insert_document(document).await
    }
    async fn find_document(&self, id: Uuid) -> TrackerResult<Option<Document>> {
        self.inner.find_document(id).await
    }
    async fn find_documents_by_task(&self, task_id: Uuid) -> TrackerResult<Vec<Document>> {
        self.inner.find_documents_by_task(task_id).await
    }
    async fn update_document(&self, document: Document) -> TrackerResult<Option<Document>> {
        self.inner.update_document(document).await
    }
    async fn insert_history(&self, entry: TaskHistoryEntry) -> TrackerResult<()> {
        self.inner.insert_history(entry).await
    }
    async fn find_history_by_task(
        &self,
        task_id: Uuid,
        page: usize,
        limit: usize,
    ) -> TrackerResult<Vec<TaskHistoryEntry>> {
        self.inner.find_history_by_task(task_id, page, limit).await
    }
    async fn insert_user(&self, user: User) -> TrackerResult<User> {
        self.inner.insert_user(user).await
    }
    async fn find_user(&self, id: Uuid) -> TrackerResult<Option<User>> {
        self.check(id)?;
        self.inner.find_user(id).await
    }
    async fn find_user_by_name_or_email(&self, needle: &str) -> TrackerResult<Option<User>> {
        self.check(needle.trim())?;
        self.inner.find_user_by_name_or_email(needle).await
    }
    async fn insert_client(&self, client: Client) -> TrackerResult<Client> {
        self.inner.insert_client(client).await
    }
    async fn find_client(&self, id: Uuid) -> TrackerResult<Option<Client>> {
        self.inner.find_client(id).await
    }
    async fn find_client_by_name(&self, name: &str) -> TrackerResult<Option<Client>> {
        self.inner.find_client_by_name(name).await
    }
    async fn list_clients(&self) -> TrackerResult<Vec<Client>> {
        self.inner.list_clients().await
    }
    async fn insert_comment(&self, comment: Comment) -> TrackerResult<Comment> {
        self.inner.insert_comment(comment).await
    }
    async fn find_comment(&self, id: Uuid) -> TrackerResult<Option<Comment>> {
        self.inner.find_comment(id).await
    }
    async fn find_comments(&self, filter: &CommentFilter) -> TrackerResult<Vec<Comment>> {
        self.inner.find_comments(filter).await
    }
    async fn like_comment(&self, id: Uuid, now: DateTime<Utc>) -> TrackerResult<Option<Comment>> {
        self.inner.like_comment(id, now).await
    }
}

struct Harness {
    store: Arc<FlakyStore>,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    analyzer: Arc<ScriptedAnalyzer>,
    tasks: TaskService,
    documents: DocumentService,
    engine: LifecycleEngine,
    admin: Actor,
    assignee: User,
    _uploads: tempfile::TempDir,
}

async fn harness_with(notifier: RecordingNotifier) -> Harness {
    let store = Arc::new(FlakyStore::default());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));
    let notifier = Arc::new(notifier);
    let analyzer = Arc::new(ScriptedAnalyzer::new(Some(100.0)));
    let classifier = Arc::new(DocumentClassifier::new().unwrap());
    let uploads = tempfile::tempdir().unwrap();

    let admin = store
        .insert_user(User::new("Meera".into(), "meera@example.com".into(), Role::Admin))
        .await
        .unwrap();
    let assignee = store
        .insert_user(User::new("Arjun".into(), "arjun@example.com".into(), Role::User))
        .await
        .unwrap();

    let tasks = TaskService::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        classifier.clone(),
        Duration::from_secs(5),
        2,
    );
    let documents = DocumentService::new(
        store.clone(),
        analyzer.clone(),
        classifier,
        clock.clone(),
        uploads.path().to_path_buf(),
        Duration::from_secs(5),
    );
    let engine = LifecycleEngine::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        ScheduleSettings::default(),
    );

    Harness {
        store,
        clock,
        notifier,
        analyzer,
        tasks,
        documents,
        engine,
        admin: Actor::new(admin),
        assignee,
        _uploads: uploads,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingNotifier::default()).await
}

fn draft(h: &Harness, name: &str, due_in_days: i64, priority: &str) -> TaskDraft {
    let due = h.clock.now() + ChronoDuration::days(due_in_days);
    TaskDraft {
        name: Some(name.to_string()),
        description: Some(format!("{} for the quarter", name)),
        priority: Some(priority.to_string()),
        assigned_to: Some(h.assignee.email.clone()),
        category: Some("GST".to_string()),
        due_date: Some(due.to_rfc3339()),
        recurring_frequency: Some("quarterly".to_string()),
        estimated_hours: Some(6.0),
        ..TaskDraft::default()
    }
}

fn changes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[tokio::test]
async fn test_far_task_is_scheduled_then_promoted_once() {
    let h = harness().await;
    let created = h
        .tasks
        .create_task(draft(&h, "GSTR-3B March", 20, "medium"), &h.admin)
        .await
        .unwrap();
    assert!(created.notification_sent);
    let task = created.task;
    assert_eq!(task.status, TaskStatus::Upcoming);
    assert_eq!(
        task.scheduled_at,
        Some(task.due_date - ChronoDuration::days(7))
    );

    assert_eq!(h.engine.run_promotion_sweep().await.promoted, 0);

    h.clock.advance(ChronoDuration::days(14));
    assert_eq!(h.engine.run_promotion_sweep().await.promoted, 1);
    assert_eq!(h.engine.run_promotion_sweep().await.promoted, 0);

    let promoted = h.store.find_task(task.id).await.unwrap().unwrap();
    assert_eq!(promoted.status, TaskStatus::Open);
    assert!(promoted.activated_at.is_some());

    let history = h.tasks.task_history(task.id, &h.admin, 1, 10).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![HistoryAction::Promoted, HistoryAction::Created]);
}

#[tokio::test]
async fn test_update_round_trips_through_the_store() {
    let h = harness().await;
    let task = h
        .tasks
        .create_task(draft(&h, "TDS 26Q", 3, "low"), &h.admin)
        .await
        .unwrap()
        .task;

    let outcome = h
        .tasks
        .update_task(
            task.id,
            &changes(json!({ "priority": "high", "status": "inprogress", "description": task.description })),
            &h.admin,
        )
        .await
        .unwrap();
    let UpdateOutcome::Updated { changed_fields, .. } = outcome else {
        panic!("expected an update");
    };
    assert_eq!(changed_fields.names().collect::<Vec<_>>(), vec!["priority", "status"]);

    let stored = h.store.find_task(task.id).await.unwrap().unwrap();
    let history = h.tasks.task_history(task.id, &h.admin, 1, 1).await.unwrap();
    let recorded = &history[0].changed_fields;
    for (name, change) in recorded.iter() {
        assert_eq!(stored.field_value(name).as_ref(), Some(&change.to), "{}", name);
    }
    assert!(h
        .notifier
        .subjects()
        .iter()
        .any(|s| s.contains("Status")));

    let again = h
        .tasks
        .update_task(task.id, &changes(json!({ "priority": "high" })), &h.admin)
        .await
        .unwrap();
    assert!(matches!(again, UpdateOutcome::NoChange { .. }));
    let history = h.tasks.task_history(task.id, &h.admin, 1, 10).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_unknown_update_field_names_the_allowed_set() {
    let h = harness().await;
    let task = h
        .tasks
        .create_task(draft(&h, "PF ECR", 2, "high"), &h.admin)
        .await
        .unwrap()
        .task;

    let err = h
        .tasks
        .update_task(task.id, &changes(json!({ "colour": "red" })), &h.admin)
        .await
        .unwrap_err();
    match err {
        TrackerError::Validation { field, allowed, .. } => {
            assert_eq!(field, "colour");
            assert!(allowed.iter().any(|a| a == "priority"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = h
        .tasks
        .update_task(Uuid::new_v4(), &changes(json!({ "priority": "low" })), &h.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::NotFound { .. }));
}

#[tokio::test]
async fn test_upload_analysis_and_assessment() {
    let h = harness().await;
    let task = h
        .tasks
        .create_task(draft(&h, "GSTR-1 April", 4, "high"), &h.admin)
        .await
        .unwrap()
        .task;

    let empty = h.tasks.assessment(task.id, &h.admin).await.unwrap();
    assert_eq!(empty.overall_completion_percentage, 0);
    assert_eq!(empty.task_readiness, TaskReadiness::NeedsMoreWork);

    let doc = h
        .documents
        .upload_document(task.id, &h.admin, "gstr1_return_april.txt", "text/plain", b"GSTR-1 filed")
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Validated);
    assert_eq!(doc.content_hash.len(), 64);

    let assessment = h.tasks.assessment(task.id, &h.admin).await.unwrap();
    assert_eq!(assessment.overall_completion_percentage, 100);
    assert_eq!(assessment.task_readiness, TaskReadiness::ReadyForClosure);

    let sections = h.tasks.sections(task.id, &h.admin).await.unwrap();
    assert_eq!(sections.primary.len(), 1);

    h.analyzer.set(Some(40.0));
    let re = h.documents.reanalyze_document(doc.id, &h.admin).await.unwrap();
    assert!(re.change.completion_status_changed);
    assert_eq!(re.change.completion_percentage_change, -60);

    let view = h.documents.document_analysis(doc.id, &h.admin).await.unwrap();
    assert_eq!(view.section, "primary");
    assert_eq!(view.task.id, task.id);
}

#[tokio::test]
async fn test_failed_analysis_attaches_fallback_record() {
    let h = harness().await;
    h.analyzer.set(None);
    let task = h
        .tasks
        .create_task(draft(&h, "ROC AOC-4", 5, "medium"), &h.admin)
        .await
        .unwrap()
        .task;

    let doc = h
        .documents
        .upload_document(task.id, &h.admin, "aoc4.txt", "text/plain", b"draft")
        .await
        .unwrap();
    let analysis = doc.analysis.unwrap();
    assert!(analysis.is_fallback());
    assert_eq!(analysis.completion_status, CompletionStatus::Unclear);
    assert_eq!(analysis.completion_percentage, 0);
    assert_eq!(doc.status, DocumentStatus::Validated);

    let status = h
        .documents
        .update_document_status(doc.id, "failed", &h.admin)
        .await
        .unwrap();
    assert_eq!(status.status, DocumentStatus::Failed);
    let bad = h
        .documents
        .update_document_status(doc.id, "archived", &h.admin)
        .await;
    assert!(matches!(bad, Err(TrackerError::Validation { .. })));
}

#[tokio::test]
async fn test_strangers_are_denied_not_hidden() {
    let h = harness().await;
    let task = h
        .tasks
        .create_task(draft(&h, "ESI March", 3, "low"), &h.admin)
        .await
        .unwrap()
        .task;
    let stranger = h
        .store
        .insert_user(User::new("Kiran".into(), "kiran@example.com".into(), Role::User))
        .await
        .unwrap();
    let stranger = Actor::new(stranger);

    assert!(matches!(
        h.tasks.task_details(task.id, &stranger).await,
        Err(TrackerError::AccessDenied { .. })
    ));
    assert!(h.tasks.list_tasks(&stranger, 1, 20).await.unwrap().is_empty());

    let owner = Actor::new(h.assignee.clone());
    let details = h.tasks.task_details(task.id, &owner).await.unwrap();
    assert_eq!(details.metrics.days_until_due, 3);
    assert!(!details.metrics.is_overdue);
}

#[tokio::test]
async fn test_import_sorts_rows_into_outcomes() {
    let h = harness().await;
    let row = |name: &str, assignee: &str, due: &str| -> HashMap<String, String> {
        [
            ("title", name),
            ("description", "Monthly filing"),
            ("priority", "medium"),
            ("assignedTo", assignee),
            ("bucket", "TDS"),
            ("dueDate", due),
            ("frequency", "monthly"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    };

    let mut missing = row("No due date", "Arjun", "2026-03-05");
    missing.remove("dueDate");

    let summary = h
        .tasks
        .import_tasks(
            vec![
                row("TDS challan", "Arjun", "2026-03-05"),
                row("TDS challan", "Arjun", "2026-03-05"),
                row("TDS return", "arjun@example.com", "2026-04-30"),
                row("Late deposit", "Arjun", "2026-02-20"),
                row("Ghost", "nobody@example.com", "2026-03-10"),
                missing,
            ],
            &h.admin,
        )
        .await
        .unwrap();

    assert_eq!(summary.total_processed, 6);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.duplicates.len(), 1);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.emails_sent, 3);

    let status_of = |name: &str| {
        summary
            .tasks
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.status)
    };
    assert_eq!(status_of("TDS challan"), Some(TaskStatus::Open));
    assert_eq!(status_of("TDS return"), Some(TaskStatus::Upcoming));
    assert_eq!(status_of("Late deposit"), Some(TaskStatus::Escalated));

    let member = Actor::new(h.assignee.clone());
    assert!(matches!(
        h.tasks.import_tasks(Vec::new(), &member).await,
        Err(TrackerError::AccessDenied { .. })
    ));
}

#[tokio::test]
async fn test_overdue_reminder_counts_errors_when_delivery_fails() {
    let h = harness_with(RecordingNotifier::failing()).await;
    let created = h
        .tasks
        .create_task(draft(&h, "PT payment", 1, "low"), &h.admin)
        .await
        .unwrap();
    assert!(!created.notification_sent);

    h.clock.advance(ChronoDuration::days(2));
    let pending = h.engine.pending_reminders().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].days_until_due, -1);

    let summary = h.engine.run_reminder_sweep().await;
    assert_eq!(summary.total_eligible, 1);
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.errors, 1);

    let err = h
        .engine
        .send_single_reminder(created.task.id, compli_tracker::notify::ReminderKind::Overdue)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Delivery(_)));
}

#[tokio::test]
async fn test_import_row_store_failure_is_isolated() {
    let h = harness().await;
    h.store.poison("kiran@example.com");
    let row = |name: &str, assignee: &str| -> HashMap<String, String> {
        [
            ("title", name),
            ("description", "Quarterly filing"),
            ("priority", "high"),
            ("assignedTo", assignee),
            ("bucket", "GST"),
            ("dueDate", "2026-03-04"),
            ("frequency", "quarterly"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    };

    let summary = h
        .tasks
        .import_tasks(
            vec![
                row("GSTR-1", "arjun@example.com"),
                row("GSTR-3B", "kiran@example.com"),
                row("GSTR-9", "Arjun"),
            ],
            &h.admin,
        )
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].row, 2);
    assert!(summary.skipped[0].reason.contains("db timeout"));
    let names: HashSet<_> = summary.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, HashSet::from(["GSTR-1", "GSTR-9"]));
}

#[tokio::test]
async fn test_sweeps_count_recipient_lookup_failures() {
    let h = harness().await;
    let task = h
        .tasks
        .create_task(draft(&h, "LUT renewal", 1, "medium"), &h.admin)
        .await
        .unwrap()
        .task;
    h.store.poison(h.assignee.id);
    h.clock.advance(ChronoDuration::days(3));

    let expected = compli_tracker::lifecycle::SweepSummary {
        total_eligible: 1,
        sent: 0,
        errors: 1,
    };
    assert_eq!(h.engine.run_reminder_sweep().await, expected);
    assert_eq!(h.engine.run_overdue_sweep().await, expected);
    assert!(h.engine.pending_reminders().await.unwrap().is_empty());
    assert!(h.store.find_task(task.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_document_insert_leaves_no_file() {
    let h = harness().await;
    let task = h
        .tasks
        .create_task(draft(&h, "TDS 24Q", 4, "high"), &h.admin)
        .await
        .unwrap()
        .task;
    h.store.fail_document_inserts.store(true, Ordering::SeqCst);

    let err = h
        .documents
        .upload_document(task.id, &h.admin, "form24q.txt", "text/plain", b"24Q data")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Persistence(_)));
    let leftover = std::fs::read_dir(h._uploads.path()).unwrap().count();
    assert_eq!(leftover, 0);
}
