//! Tasks: data model, validation, audit history and the task service.

mod history;
mod service;
mod types;
mod validation;

pub use history::{diff, ChangedFields, FieldDiff, HistoryAction, TaskHistoryEntry};
pub use service::{
    DocumentAnalysisSummary, DuplicateRow, ImportSummary, SkippedRow, TaskCreated, TaskDetails,
    TaskListEntry, TaskMetrics, TaskService, UpdateOutcome,
};
pub use types::{
    Category, Client, Frequency, Priority, Reference, Task, TaskContext, TaskField, TaskStatus,
    User,
};
pub use validation::{
    parse_due_date, validate_draft, validate_update, ProposedChange, StringList, TaskDraft,
    ValidatedDraft,
};
