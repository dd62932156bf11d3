//! Field-level diffs and the immutable audit trail.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::choice::choice_enum;

use super::types::{Task, TaskField};

choice_enum! {
    /// What kind of change a history entry records.
    pub enum HistoryAction ("action") {
        Created => "created",
        Updated => "updated",
        StatusChanged => "status_changed",
        Promoted => "promoted",
    }
}

/// Previous and new value of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub from: Value,
    pub to: Value,
}

/// Changed fields in first-encountered order. Serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangedFields(Vec<(String, FieldDiff)>);

impl ChangedFields {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldDiff> {
        self.0.iter().find(|(name, _)| name == field).map(|(_, d)| d)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDiff)> {
        self.0.iter().map(|(name, d)| (name.as_str(), d))
    }

    fn push(&mut self, name: &str, diff: FieldDiff) {
        match self.0.iter_mut().find(|(n, _)| n == name) {
            // A repeated key keeps its first position but the latest target.
            Some((_, existing)) => existing.to = diff.to,
            None => self.0.push((name.to_string(), diff)),
        }
    }

    /// "Task updated: a, b" style summary.
    pub fn describe(&self) -> String {
        format!("Task updated: {}", self.names().collect::<Vec<_>>().join(", "))
    }
}

impl Serialize for ChangedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, diff) in &self.0 {
            map.serialize_entry(name, diff)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChangedFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        map.into_iter()
            .map(|(name, value)| {
                serde_json::from_value::<FieldDiff>(value)
                    .map(|diff| (name, diff))
                    .map_err(serde::de::Error::custom)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ChangedFields)
    }
}

/// Compare proposed values with the task's current ones. Only fields whose
/// serialized value differs are kept.
pub fn diff(previous: &Task, proposed: &[TaskField]) -> ChangedFields {
    let mut changed = ChangedFields::default();
    for field in proposed {
        let name = field.name();
        let from = previous.field_value(name).unwrap_or(Value::Null);
        let to = field.to_value();
        if from != to {
            changed.push(name, FieldDiff { from, to });
        } else if changed.contains(name) {
            // A later duplicate restoring the original value cancels the change.
            changed.0.retain(|(n, _)| n != name);
        }
    }
    changed
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    /// `None` for changes made by the lifecycle engine.
    pub actor_id: Option<Uuid>,
    pub actor_name: String,
    pub action: HistoryAction,
    pub changed_fields: ChangedFields,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl TaskHistoryEntry {
    pub fn new(
        task_id: Uuid,
        actor_id: Option<Uuid>,
        actor_name: impl Into<String>,
        action: HistoryAction,
        changed_fields: ChangedFields,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            actor_id,
            actor_name: actor_name.into(),
            action,
            changed_fields,
            description: description.into(),
            created_at,
        }
    }
}
