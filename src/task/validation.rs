//! Centralized task validation.
//!
//! Creation, bulk import and updates all go through this module, so every
//! rejected value surfaces as the same [`TrackerError::Validation`] carrying
//! the offending field and, for enumerations, the allowed set.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::choice::parse_choice;
use crate::error::{TrackerError, TrackerResult};

use super::types::{Category, Frequency, Priority, TaskField, TaskStatus};

/// A list given either as an array or as a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    List(Vec<String>),
    Csv(String),
}

impl StringList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(items) => clean_list(items),
            Self::Csv(raw) => split_csv(&raw),
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unvalidated task creation input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, alias = "assignedToName", alias = "assigned_to")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default, alias = "bucket")]
    pub category: Option<String>,
    #[serde(default, alias = "due_date")]
    pub due_date: Option<String>,
    #[serde(default, alias = "frequency", alias = "recurring_frequency")]
    pub recurring_frequency: Option<String>,
    #[serde(default)]
    pub tags: Option<StringList>,
    #[serde(default, alias = "estimated_hours")]
    pub estimated_hours: Option<f64>,
    #[serde(default, alias = "closure_rights_email")]
    pub closure_rights_email: Option<String>,
    #[serde(default, alias = "alert_emails")]
    pub alert_emails: Option<StringList>,
}

impl TaskDraft {
    /// Build a draft from an imported spreadsheet row. Accepts both the
    /// camelCase and snake_case column spellings.
    pub fn from_row(row: &HashMap<String, String>) -> Self {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| row.get(*k))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            name: get(&["name", "title"]),
            description: get(&["description"]),
            priority: get(&["priority"]),
            assigned_to: get(&["assignedTo", "assigned_to", "assignedToName"]),
            entity: get(&["entity"]),
            category: get(&["bucket", "category"]),
            due_date: get(&["dueDate", "due_date"]),
            recurring_frequency: get(&["recurringFrequency", "recurring_frequency", "frequency"]),
            tags: get(&["tags"]).map(StringList::Csv),
            estimated_hours: get(&["estimatedHours", "estimated_hours"])
                .and_then(|h| h.parse::<f64>().ok()),
            closure_rights_email: get(&["closureRightsEmail", "closure_rights_email"]),
            alert_emails: get(&["alertEmails", "alert_emails"]).map(StringList::Csv),
        }
    }

    /// Required fields that are absent or blank, in a stable order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.name) {
            missing.push("name");
        }
        if blank(&self.description) {
            missing.push("description");
        }
        if blank(&self.priority) {
            missing.push("priority");
        }
        if blank(&self.assigned_to) {
            missing.push("assigned_to");
        }
        if blank(&self.category) {
            missing.push("category");
        }
        if blank(&self.due_date) {
            missing.push("due_date");
        }
        if blank(&self.recurring_frequency) {
            missing.push("recurring_frequency");
        }
        missing
    }
}

/// A draft whose values have been checked; references are still raw strings.
#[derive(Debug, Clone)]
pub struct ValidatedDraft {
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub due_date: DateTime<Utc>,
    pub frequency: Frequency,
    pub assigned_to: String,
    pub entity: Option<String>,
    pub tags: Vec<String>,
    pub alert_emails: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub closure_rights_email: Option<String>,
}

/// Validate a creation draft, reporting the first problem found.
pub fn validate_draft(draft: TaskDraft) -> TrackerResult<ValidatedDraft> {
    if let Some(field) = draft.missing_fields().first() {
        return Err(TrackerError::missing(*field));
    }

    let required = |v: Option<String>, field: &str| {
        v.map(|s| s.trim().to_string())
            .ok_or_else(|| TrackerError::missing(field))
    };

    let priority = required(draft.priority, "priority")?;
    let category = required(draft.category, "category")?;
    let frequency = required(draft.recurring_frequency, "recurring_frequency")?;
    let due_date = required(draft.due_date, "due_date")?;

    let estimated_hours = draft.estimated_hours;
    if let Some(hours) = estimated_hours {
        check_hours(hours)?;
    }

    Ok(ValidatedDraft {
        name: required(draft.name, "name")?,
        description: required(draft.description, "description")?,
        priority: parse_choice(&priority)?,
        category: parse_choice(&category)?,
        due_date: parse_due_date(&due_date)?,
        frequency: parse_choice(&frequency)?,
        assigned_to: required(draft.assigned_to, "assigned_to")?,
        entity: draft
            .entity
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()),
        tags: draft.tags.map(StringList::into_vec).unwrap_or_default(),
        alert_emails: draft.alert_emails.map(StringList::into_vec).unwrap_or_default(),
        estimated_hours,
        closure_rights_email: draft
            .closure_rights_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()),
    })
}

/// Parse an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_due_date(raw: &str) -> TrackerResult<DateTime<Utc>> {
    parse_timestamp("due_date", raw)
}

fn parse_timestamp(field: &str, raw: &str) -> TrackerResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            TrackerError::invalid(field, format!("'{}' is not a date (YYYY-MM-DD or RFC 3339)", raw))
        })
}

fn check_hours(hours: f64) -> TrackerResult<()> {
    if hours.is_finite() && hours >= 0.0 {
        Ok(())
    } else {
        Err(TrackerError::invalid(
            "estimated_hours",
            "must be a non-negative number",
        ))
    }
}

/// A validated update entry. Assignee and entity changes still need to be
/// resolved against the store before they become [`TaskField`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposedChange {
    Field(TaskField),
    AssignTo(String),
    SetEntity(Option<String>),
}

impl ProposedChange {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Field(f) => f.name(),
            Self::AssignTo(_) => "assigned_to",
            Self::SetEntity(_) => "entity",
        }
    }
}

/// Validate an update payload, preserving the key order of `changes`.
pub fn validate_update(changes: &Map<String, Value>) -> TrackerResult<Vec<ProposedChange>> {
    if changes.is_empty() {
        return Err(TrackerError::invalid("changes", "No update data provided"));
    }

    let mut proposed = Vec::with_capacity(changes.len());
    for (key, value) in changes {
        let field = canonical_field(key).ok_or_else(|| TrackerError::Validation {
            field: key.clone(),
            message: format!("'{}' is not an updatable task field", key),
            allowed: TaskField::NAMES.iter().map(|s| s.to_string()).collect(),
        })?;
        proposed.push(parse_change(field, value)?);
    }
    Ok(proposed)
}

/// Map accepted key spellings to canonical field names.
fn canonical_field(key: &str) -> Option<&'static str> {
    let name = match key {
        "title" => "name",
        "bucket" => "category",
        "dueDate" => "due_date",
        "frequency" | "recurringFrequency" => "recurring_frequency",
        "scheduledAt" => "scheduled_at",
        "assignedTo" => "assigned_to",
        "closureRightsEmail" => "closure_rights_email",
        "alertEmails" => "alert_emails",
        "estimatedHours" => "estimated_hours",
        other => other,
    };
    TaskField::NAMES.iter().copied().find(|n| *n == name)
}

fn parse_change(field: &'static str, value: &Value) -> TrackerResult<ProposedChange> {
    let change = match field {
        "name" => ProposedChange::Field(TaskField::Name(non_empty(field, value)?)),
        "description" => ProposedChange::Field(TaskField::Description(non_empty(field, value)?)),
        "priority" => ProposedChange::Field(TaskField::Priority(parse_choice::<Priority>(
            &string(field, value)?,
        )?)),
        "category" => ProposedChange::Field(TaskField::Category(parse_choice::<Category>(
            &string(field, value)?,
        )?)),
        "recurring_frequency" => ProposedChange::Field(TaskField::Frequency(parse_choice::<
            Frequency,
        >(
            &string(field, value)?
        )?)),
        "status" => ProposedChange::Field(TaskField::Status(parse_choice::<TaskStatus>(
            &string(field, value)?,
        )?)),
        "due_date" => ProposedChange::Field(TaskField::DueDate(parse_timestamp(
            field,
            &string(field, value)?,
        )?)),
        "scheduled_at" => ProposedChange::Field(TaskField::ScheduledAt(
            match optional_string(field, value)? {
                Some(raw) => Some(parse_timestamp(field, &raw)?),
                None => None,
            },
        )),
        "assigned_to" => ProposedChange::AssignTo(non_empty(field, value)?),
        "entity" => ProposedChange::SetEntity(optional_string(field, value)?),
        "closure_rights_email" => {
            ProposedChange::Field(TaskField::ClosureRightsEmail(optional_string(field, value)?))
        }
        "tags" => ProposedChange::Field(TaskField::Tags(string_list(field, value)?)),
        "alert_emails" => ProposedChange::Field(TaskField::AlertEmails(string_list(field, value)?)),
        "estimated_hours" => ProposedChange::Field(TaskField::EstimatedHours(match value {
            Value::Null => None,
            Value::Number(n) => {
                let hours = n.as_f64().unwrap_or(-1.0);
                check_hours(hours)?;
                Some(hours)
            }
            _ => return Err(TrackerError::invalid(field, "must be a number")),
        })),
        _ => return Err(TrackerError::invalid(field, "is not updatable")),
    };
    Ok(change)
}

fn string(field: &str, value: &Value) -> TrackerResult<String> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| TrackerError::invalid(field, "must be a string"))
}

fn non_empty(field: &str, value: &Value) -> TrackerResult<String> {
    let s = string(field, value)?;
    if s.is_empty() {
        return Err(TrackerError::missing(field));
    }
    Ok(s)
}

fn optional_string(field: &str, value: &Value) -> TrackerResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        _ => Ok(Some(string(field, value)?).filter(|s| !s.is_empty())),
    }
}

fn string_list(field: &str, value: &Value) -> TrackerResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(raw) => Ok(split_csv(raw)),
        Value::Array(items) => items
            .iter()
            .map(|item| string(field, item))
            .collect::<TrackerResult<Vec<_>>>()
            .map(clean_list),
        _ => Err(TrackerError::invalid(
            field,
            "must be a list or a comma-separated string",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_draft() -> TaskDraft {
        serde_json::from_value(json!({
            "title": "PF ECR upload",
            "description": "Monthly provident fund return",
            "priority": "high",
            "assignedToName": "Meera",
            "bucket": "PF",
            "dueDate": "2026-11-15",
            "frequency": "monthly",
            "tags": "pf, payroll, ",
            "alertEmails": ["ops@example.com", " "],
            "estimatedHours": 3.5
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_draft_accepts_flexible_spellings() {
        let draft = validate_draft(full_draft()).unwrap();
        assert_eq!(draft.name, "PF ECR upload");
        assert_eq!(draft.category, Category::Pf);
        assert_eq!(draft.frequency, Frequency::Monthly);
        assert_eq!(draft.tags, vec!["pf", "payroll"]);
        assert_eq!(draft.alert_emails, vec!["ops@example.com"]);
        assert_eq!(draft.due_date.to_rfc3339(), "2026-11-15T00:00:00+00:00");
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut draft = full_draft();
        draft.description = Some("  ".to_string());
        match validate_draft(draft) {
            Err(TrackerError::Validation { field, .. }) => assert_eq!(field, "description"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bad_enum_reports_allowed_set() {
        let mut draft = full_draft();
        draft.category = Some("VAT".to_string());
        match validate_draft(draft) {
            Err(TrackerError::Validation { field, allowed, .. }) => {
                assert_eq!(field, "category");
                assert_eq!(allowed, vec!["GST", "IT", "TDS", "PF", "ESI", "ROC", "other"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_from_row_lists_missing_columns() {
        let row: HashMap<String, String> = [("name", "ROC annual filing"), ("priority", "low")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let draft = TaskDraft::from_row(&row);
        assert_eq!(
            draft.missing_fields(),
            vec!["description", "assigned_to", "category", "due_date", "recurring_frequency"]
        );
    }

    #[test]
    fn test_validate_update_preserves_key_order() {
        let payload = json!({
            "status": "completed",
            "bucket": "IT",
            "tags": "a,b",
            "assignedTo": "meera@example.com"
        });
        let changes = validate_update(payload.as_object().unwrap()).unwrap();
        let names: Vec<_> = changes.iter().map(ProposedChange::field_name).collect();
        assert_eq!(names, vec!["status", "category", "tags", "assigned_to"]);
        assert_eq!(
            changes[0],
            ProposedChange::Field(TaskField::Status(TaskStatus::Completed))
        );
    }

    #[test]
    fn test_validate_update_rejects_unknown_and_empty() {
        let unknown = json!({ "created_at": "2026-01-01" });
        assert!(matches!(
            validate_update(unknown.as_object().unwrap()),
            Err(TrackerError::Validation { .. })
        ));
        assert!(validate_update(&Map::new()).is_err());

        let bad_status = json!({ "status": "cancelled" });
        match validate_update(bad_status.as_object().unwrap()) {
            Err(TrackerError::Validation { field, allowed, .. }) => {
                assert_eq!(field, "status");
                assert!(allowed.contains(&"on hold".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
