//! Task data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::choice::choice_enum;

choice_enum! {
    /// Task priority.
    pub enum Priority ("priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

choice_enum! {
    /// Compliance bucket a task belongs to.
    pub enum Category ("category") {
        Gst => "GST",
        It => "IT",
        Tds => "TDS",
        Pf => "PF",
        Esi => "ESI",
        Roc => "ROC",
        Other => "other",
    }
}

choice_enum! {
    /// How often the obligation recurs.
    pub enum Frequency ("recurring_frequency") {
        OneTime => "one time" | "one-time" | "one_time",
        Monthly => "monthly",
        Quarterly => "quarterly",
        HalfYearly => "half yearly" | "half-yearly" | "half_yearly",
        Yearly => "yearly",
    }
}

choice_enum! {
    /// Lifecycle status.
    pub enum TaskStatus ("status") {
        /// Scheduled for the future; promoted to `Open` by the lifecycle engine.
        Upcoming => "upcoming",
        Open => "open",
        InProgress => "inprogress" | "in-progress" | "in_progress",
        Escalated => "escalated",
        OnHold => "on hold" | "on-hold" | "on_hold",
        Completed => "completed",
    }
}

impl TaskStatus {
    /// Terminal tasks never receive reminders.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A reference that was either resolved to a known record at write time or
/// kept as the raw display string the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reference {
    Resolved(Uuid),
    Unresolved(String),
}

impl Reference {
    pub fn resolved_id(&self) -> Option<Uuid> {
        match self {
            Self::Resolved(id) => Some(*id),
            Self::Unresolved(_) => None,
        }
    }
}

/// A compliance task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub due_date: DateTime<Utc>,
    pub frequency: Frequency,
    pub status: TaskStatus,
    /// Activation time; only meaningful while `status` is `Upcoming`.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Set once when the lifecycle engine promotes the task.
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    pub assigned_to: Reference,
    #[serde(default)]
    pub entity: Option<Reference>,
    #[serde(default)]
    pub closure_rights_email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub alert_emails: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One proposed value for one mutable task field.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskField {
    Name(String),
    Description(String),
    Priority(Priority),
    Category(Category),
    DueDate(DateTime<Utc>),
    Frequency(Frequency),
    Status(TaskStatus),
    ScheduledAt(Option<DateTime<Utc>>),
    AssignedTo(Reference),
    Entity(Option<Reference>),
    ClosureRightsEmail(Option<String>),
    Tags(Vec<String>),
    AlertEmails(Vec<String>),
    EstimatedHours(Option<f64>),
}

impl TaskField {
    /// Names of every field an update may touch.
    pub const NAMES: &'static [&'static str] = &[
        "name",
        "description",
        "priority",
        "category",
        "due_date",
        "recurring_frequency",
        "status",
        "scheduled_at",
        "assigned_to",
        "entity",
        "closure_rights_email",
        "tags",
        "alert_emails",
        "estimated_hours",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Description(_) => "description",
            Self::Priority(_) => "priority",
            Self::Category(_) => "category",
            Self::DueDate(_) => "due_date",
            Self::Frequency(_) => "recurring_frequency",
            Self::Status(_) => "status",
            Self::ScheduledAt(_) => "scheduled_at",
            Self::AssignedTo(_) => "assigned_to",
            Self::Entity(_) => "entity",
            Self::ClosureRightsEmail(_) => "closure_rights_email",
            Self::Tags(_) => "tags",
            Self::AlertEmails(_) => "alert_emails",
            Self::EstimatedHours(_) => "estimated_hours",
        }
    }

    /// The proposed value in its serialized form.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Name(v) | Self::Description(v) => Value::from(v.as_str()),
            Self::Priority(v) => json(v),
            Self::Category(v) => json(v),
            Self::DueDate(v) => json(v),
            Self::Frequency(v) => json(v),
            Self::Status(v) => json(v),
            Self::ScheduledAt(v) => json(v),
            Self::AssignedTo(v) => json(v),
            Self::Entity(v) => json(v),
            Self::ClosureRightsEmail(v) => json(v),
            Self::Tags(v) | Self::AlertEmails(v) => json(v),
            Self::EstimatedHours(v) => json(v),
        }
    }
}

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Task {
    /// Current value of a mutable field in serialized form, `None` for an
    /// unknown field name.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        let value = match name {
            "name" => Value::from(self.name.as_str()),
            "description" => Value::from(self.description.as_str()),
            "priority" => json(&self.priority),
            "category" => json(&self.category),
            "due_date" => json(&self.due_date),
            "recurring_frequency" => json(&self.frequency),
            "status" => json(&self.status),
            "scheduled_at" => json(&self.scheduled_at),
            "assigned_to" => json(&self.assigned_to),
            "entity" => json(&self.entity),
            "closure_rights_email" => json(&self.closure_rights_email),
            "tags" => json(&self.tags),
            "alert_emails" => json(&self.alert_emails),
            "estimated_hours" => json(&self.estimated_hours),
            _ => return None,
        };
        Some(value)
    }

    /// Overwrite one field with a proposed value.
    pub fn apply(&mut self, field: TaskField) {
        match field {
            TaskField::Name(v) => self.name = v,
            TaskField::Description(v) => self.description = v,
            TaskField::Priority(v) => self.priority = v,
            TaskField::Category(v) => self.category = v,
            TaskField::DueDate(v) => self.due_date = v,
            TaskField::Frequency(v) => self.frequency = v,
            TaskField::Status(v) => self.status = v,
            TaskField::ScheduledAt(v) => self.scheduled_at = v,
            TaskField::AssignedTo(v) => self.assigned_to = v,
            TaskField::Entity(v) => self.entity = v,
            TaskField::ClosureRightsEmail(v) => self.closure_rights_email = v,
            TaskField::Tags(v) => self.tags = v,
            TaskField::AlertEmails(v) => self.alert_emails = v,
            TaskField::EstimatedHours(v) => self.estimated_hours = v,
        }
    }

    /// The subset of task data handed to the document analyzer.
    pub fn context(&self) -> TaskContext {
        TaskContext {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            priority: self.priority,
            due_date: self.due_date,
        }
    }
}

/// Task details given to the document analyzer as prompt context.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
}

/// A person tasks can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: crate::access::Role,
}

/// A client/entity the task is carried out for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub since: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, role: crate::access::Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            role,
        }
    }
}

impl Client {
    pub fn new(name: String, since: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            since,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_task() -> Task {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Task {
            id: Uuid::new_v4(),
            name: "GSTR-3B March".to_string(),
            description: "Monthly GST return".to_string(),
            priority: Priority::Low,
            category: Category::Gst,
            due_date: Utc.with_ymd_and_hms(2026, 4, 20, 0, 0, 0).unwrap(),
            frequency: Frequency::Monthly,
            status: TaskStatus::Open,
            scheduled_at: None,
            activated_at: None,
            assigned_to: Reference::Unresolved("Asha".to_string()),
            entity: None,
            closure_rights_email: None,
            tags: vec!["gst".to_string()],
            alert_emails: Vec::new(),
            estimated_hours: Some(4.0),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_wire_spellings() {
        assert_eq!(serde_json::to_value(TaskStatus::OnHold).unwrap(), "on hold");
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("gst".parse::<Category>().unwrap(), Category::Gst);
        assert_eq!("half-yearly".parse::<Frequency>().unwrap(), Frequency::HalfYearly);
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_apply_then_read_back_matches_proposed_value() {
        let mut task = sample_task();
        let fields = vec![
            TaskField::Status(TaskStatus::Escalated),
            TaskField::Tags(vec!["urgent".to_string()]),
            TaskField::AssignedTo(Reference::Resolved(Uuid::new_v4())),
            TaskField::EstimatedHours(None),
        ];
        for field in fields {
            let expected = field.to_value();
            let name = field.name();
            task.apply(field);
            assert_eq!(task.field_value(name), Some(expected), "field {}", name);
        }
    }

    #[test]
    fn test_every_field_name_is_readable() {
        let task = sample_task();
        for name in TaskField::NAMES {
            assert!(task.field_value(name).is_some(), "missing {}", name);
        }
        assert!(task.field_value("id").is_none());
    }
}
