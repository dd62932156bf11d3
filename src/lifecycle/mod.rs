//! Timer-driven task lifecycle: promotion of scheduled tasks and reminder
//! sweeps.
//!
//! Every duty isolates failures per task and returns a summary; nothing
//! raised by one task stops the rest of a sweep.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::ScheduleSettings;
use crate::error::{TrackerError, TrackerResult};
use crate::notify::{deliver, reminder_message, Notifier, ReminderKind};
use crate::store::{entity_name, resolve_user, Store, TaskFilter};
use crate::task::{diff, HistoryAction, Priority, Task, TaskField, TaskHistoryEntry, TaskStatus, User};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Whole days until `due`, rounded up. Negative once `due` has passed.
pub fn days_until_due(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ((due - now).num_milliseconds() as f64 / MILLIS_PER_DAY).ceil() as i64
}

/// Reminder tier for a task, first matching rule wins.
pub fn classify_reminder(priority: Priority, days_until_due: i64) -> Option<ReminderKind> {
    match (days_until_due, priority) {
        (d, _) if d < 0 => Some(ReminderKind::Overdue),
        (0, _) => Some(ReminderKind::DueToday),
        (d, Priority::Critical) if d <= 1 => Some(ReminderKind::DueSoon),
        (d, Priority::High) if d <= 2 => Some(ReminderKind::DueSoon),
        (d, Priority::Medium) if d <= 3 => Some(ReminderKind::DueSoon),
        (d, Priority::Low) if d <= 7 => Some(ReminderKind::Upcoming),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionSummary {
    pub promoted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub total_eligible: usize,
    pub sent: usize,
    pub errors: usize,
}

/// A task due for a reminder, with its resolved recipient.
#[derive(Debug, Clone, Serialize)]
pub struct PendingReminder {
    pub task: Task,
    pub assignee: User,
    pub entity_name: Option<String>,
    pub reminder_type: ReminderKind,
    pub days_until_due: i64,
}

#[derive(Default)]
struct ReminderScan {
    pending: Vec<PendingReminder>,
    failures: usize,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: ScheduleSettings,
    running: Mutex<Option<Running>>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            settings,
            running: Mutex::new(None),
        }
    }

    /// Promote every upcoming task whose scheduled time has arrived.
    pub async fn run_promotion_sweep(&self) -> PromotionSummary {
        let now = self.clock.now();
        let filter = TaskFilter {
            scheduled_at_or_before: Some(now),
            ..TaskFilter::with_status(TaskStatus::Upcoming)
        };
        let due = match self.store.find_tasks(&filter).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("Promotion sweep could not load tasks: {}", e);
                return PromotionSummary { promoted: 0, errors: 1 };
            }
        };

        let mut summary = PromotionSummary::default();
        for task in due {
            match self.promote(&task, now).await {
                Ok(true) => summary.promoted += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!("Failed to promote task {}: {}", task.id, e);
                }
            }
        }

        if summary.promoted > 0 || summary.errors > 0 {
            tracing::info!(
                "Promoted {} task(s) from upcoming to open ({} errors)",
                summary.promoted,
                summary.errors
            );
        }
        summary
    }

    /// `Ok(false)` when another sweep got there first.
    async fn promote(&self, task: &Task, now: DateTime<Utc>) -> TrackerResult<bool> {
        let Some(promoted) = self
            .store
            .transition_status(task.id, TaskStatus::Upcoming, TaskStatus::Open, now)
            .await?
        else {
            return Ok(false);
        };

        tracing::debug!("Task activated: {} ({})", promoted.name, promoted.id);
        let entry = TaskHistoryEntry::new(
            task.id,
            None,
            "system",
            HistoryAction::Promoted,
            diff(task, &[TaskField::Status(TaskStatus::Open)]),
            "Task activated: scheduled time reached",
            now,
        );
        if let Err(e) = self.store.insert_history(entry).await {
            tracing::warn!("Failed to record promotion of task {}: {}", task.id, e);
        }
        Ok(true)
    }

    async fn recipient(&self, task: &Task) -> TrackerResult<Option<User>> {
        let user = resolve_user(self.store.as_ref(), &task.assigned_to).await?;
        Ok(user.filter(|u| !u.email.trim().is_empty()))
    }

    async fn entity_display(&self, task: &Task) -> Option<String> {
        match entity_name(self.store.as_ref(), task.entity.as_ref()).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("Could not resolve entity of task {}: {}", task.id, e);
                None
            }
        }
    }

    /// Pair each task with its recipient. Tasks whose recipient lookup fails
    /// are counted in `failures`; tasks with no reachable recipient are dropped.
    async fn collect_pending(
        &self,
        tasks: Vec<Task>,
        now: DateTime<Utc>,
        kind_for: impl Fn(&Task, i64) -> Option<ReminderKind>,
    ) -> ReminderScan {
        let mut scan = ReminderScan::default();
        for task in tasks {
            let days = days_until_due(task.due_date, now);
            let Some(kind) = kind_for(&task, days) else {
                continue;
            };
            match self.recipient(&task).await {
                Ok(Some(assignee)) => {
                    let entity_name = self.entity_display(&task).await;
                    scan.pending.push(PendingReminder {
                        task,
                        assignee,
                        entity_name,
                        reminder_type: kind,
                        days_until_due: days,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    scan.failures += 1;
                    tracing::warn!("Could not resolve recipient of task {}: {}", task.id, e);
                }
            }
        }
        scan
    }

    async fn scan_reminders(&self) -> TrackerResult<ReminderScan> {
        let now = self.clock.now();
        let tasks = self.store.find_tasks(&TaskFilter::active()).await?;
        Ok(self
            .collect_pending(tasks, now, |task, days| classify_reminder(task.priority, days))
            .await)
    }

    /// Non-terminal tasks with a reachable assignee that are due a reminder.
    pub async fn pending_reminders(&self) -> TrackerResult<Vec<PendingReminder>> {
        Ok(self.scan_reminders().await?.pending)
    }

    /// Send every pending reminder.
    pub async fn run_reminder_sweep(&self) -> SweepSummary {
        match self.scan_reminders().await {
            Ok(scan) => {
                tracing::info!("Found {} tasks needing reminders", scan.pending.len());
                let summary = self.send_all(scan).await;
                tracing::info!(
                    "Reminder sweep: {}/{} sent, {} errors",
                    summary.sent,
                    summary.total_eligible,
                    summary.errors
                );
                summary
            }
            Err(e) => {
                tracing::error!("Reminder sweep could not load tasks: {}", e);
                SweepSummary {
                    errors: 1,
                    ..SweepSummary::default()
                }
            }
        }
    }

    /// Send an overdue reminder for every non-terminal task past its due date.
    pub async fn run_overdue_sweep(&self) -> SweepSummary {
        let now = self.clock.now();
        let filter = TaskFilter {
            due_before: Some(now),
            ..TaskFilter::active()
        };
        let tasks = match self.store.find_tasks(&filter).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("Overdue sweep could not load tasks: {}", e);
                return SweepSummary {
                    errors: 1,
                    ..SweepSummary::default()
                };
            }
        };

        let scan = self
            .collect_pending(tasks, now, |_, _| Some(ReminderKind::Overdue))
            .await;
        if !scan.pending.is_empty() {
            tracing::info!("Found {} overdue tasks, sending urgent reminders", scan.pending.len());
        }
        self.send_all(scan).await
    }

    /// Recipient failures count as eligible tasks that errored.
    async fn send_all(&self, scan: ReminderScan) -> SweepSummary {
        let total_eligible = scan.pending.len() + scan.failures;
        let results: Vec<(Uuid, TrackerResult<()>)> = stream::iter(scan.pending)
            .map(|p| async move {
                let result = self.send_reminder(&p).await;
                (p.task.id, result)
            })
            .buffer_unordered(self.settings.reminder_concurrency.max(1))
            .collect()
            .await;

        let mut summary = SweepSummary {
            total_eligible,
            sent: 0,
            errors: scan.failures,
        };
        for (task_id, result) in results {
            match result {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!("Failed to send reminder for task {}: {}", task_id, e);
                }
            }
        }
        summary
    }

    async fn send_reminder(&self, pending: &PendingReminder) -> TrackerResult<()> {
        let message = reminder_message(
            &pending.task,
            &pending.assignee.name,
            pending.entity_name.as_deref(),
            pending.reminder_type,
            pending.days_until_due,
        );
        deliver(
            self.notifier.as_ref(),
            self.settings.notify_timeout,
            &pending.assignee.email,
            &message,
        )
        .await?;
        tracing::debug!(
            "Reminder sent for task {} ({}, {} days)",
            pending.task.id,
            pending.reminder_type,
            pending.days_until_due
        );
        Ok(())
    }

    /// Send one reminder of the given kind immediately.
    pub async fn send_single_reminder(&self, task_id: Uuid, kind: ReminderKind) -> TrackerResult<()> {
        let task = self
            .store
            .find_task(task_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("task", task_id))?;
        let assignee = self.recipient(&task).await?.ok_or_else(|| {
            TrackerError::invalid("assigned_to", "task has no assignee with an email address")
        })?;
        let entity_name = self.entity_display(&task).await;
        let pending = PendingReminder {
            days_until_due: days_until_due(task.due_date, self.clock.now()),
            task,
            assignee,
            entity_name,
            reminder_type: kind,
        };
        self.send_reminder(&pending).await?;
        tracing::info!("Immediate {} reminder sent for task {}", kind, task_id);
        Ok(())
    }

    /// Start the periodic duties. A second call while running is ignored.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("Lifecycle engine already running");
            return;
        }

        let (shutdown, rx) = watch::channel(false);
        let settings = &self.settings;
        let handles = vec![
            self.spawn_duty("promotion", settings.promotion_interval, true, rx.clone(), |engine| async move {
                engine.run_promotion_sweep().await;
            }),
            self.spawn_duty("reminder", settings.reminder_interval, false, rx.clone(), |engine| async move {
                engine.run_reminder_sweep().await;
            }),
            self.spawn_duty("overdue", settings.overdue_interval, false, rx.clone(), |engine| async move {
                engine.run_overdue_sweep().await;
            }),
            self.spawn_startup_reminders(rx),
        ];

        tracing::info!(
            "Lifecycle engine started (promotion every {:?}, reminders every {:?}, overdue every {:?})",
            settings.promotion_interval,
            settings.reminder_interval,
            settings.overdue_interval
        );
        *running = Some(Running { shutdown, handles });
    }

    /// Stop the periodic duties and wait for in-flight sweeps to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        for handle in running.handles {
            if let Err(e) = handle.await {
                tracing::error!("Lifecycle duty ended abnormally: {}", e);
            }
        }
        tracing::info!("Lifecycle engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    fn spawn_duty<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        period: Duration,
        run_immediately: bool,
        mut shutdown: watch::Receiver<bool>,
        duty: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !run_immediately {
                ticker.tick().await;
            }
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::debug!("Running {} duty", name);
                        duty(Arc::clone(&engine)).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }

    fn spawn_startup_reminders(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let delay = self.settings.startup_reminder_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    tracing::info!("Sending initial task reminders");
                    engine.run_reminder_sweep().await;
                }
                _ = shutdown.changed() => {}
            }
        })
    }
}
