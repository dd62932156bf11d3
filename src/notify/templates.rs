//! Plain-text message rendering.

use crate::task::{ChangedFields, Task, TaskStatus, User};

use super::ReminderKind;

const SIGNATURE: &str = "Best regards,\nCompliance Tracker";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

fn hours(task: &Task) -> String {
    task.estimated_hours
        .map_or_else(|| "Not specified".to_string(), |h| h.to_string())
}

/// Common task details block.
fn details(task: &Task, client: Option<&str>) -> String {
    format!(
        "Task: {}\nDescription: {}\nClient/Entity: {}\nPriority: {}\nDue Date: {}\nFrequency: {}\nCategory: {}\nEstimated Hours: {}",
        task.name,
        task.description,
        client.unwrap_or("N/A"),
        task.priority,
        task.due_date.format("%B %-d, %Y"),
        task.frequency,
        task.category,
        hours(task),
    )
}

pub fn reminder_message(
    task: &Task,
    recipient: &str,
    client: Option<&str>,
    kind: ReminderKind,
    days_until_due: i64,
) -> Message {
    let (subject, urgency, action, closing) = match kind {
        ReminderKind::Overdue => (
            "URGENT: Task Overdue",
            "CRITICAL",
            "IMMEDIATE ACTION REQUIRED".to_string(),
            "This task is OVERDUE and requires immediate attention. Overdue tasks may result in compliance violations and penalties.",
        ),
        ReminderKind::DueToday => (
            "Task Due Today",
            "HIGH",
            "DUE TODAY".to_string(),
            "This task is due today. Please complete it or update it with current progress.",
        ),
        ReminderKind::DueSoon => (
            "Task Due Soon",
            "MEDIUM",
            format!("Due in {} days", days_until_due),
            "This task is due soon. Please review and update the status accordingly.",
        ),
        ReminderKind::Upcoming => (
            "Task Reminder",
            "LOW",
            format!("Due in {} days", days_until_due),
            "This is a reminder about your upcoming task. Please plan accordingly.",
        ),
    };

    Message {
        subject: format!("{} - {}", subject, task.name),
        body: format!(
            "Dear {},\n\n{} - {}\n\n{}\nCurrent Status: {}\n\n{}\n\n{}\n\n---\nThis is an automated reminder.",
            recipient,
            urgency,
            action,
            details(task, client),
            task.status,
            closing,
            SIGNATURE,
        ),
    }
}

pub fn assignment_message(task: &Task, recipient: &str, client: Option<&str>, assigned_by: &User) -> Message {
    Message {
        subject: format!("New Task Assigned: {}", task.name),
        body: format!(
            "Dear {},\n\nA new task has been assigned to you:\n\n{}\nStatus: {}\n\nAssigned by: {} ({})\n\n{}",
            recipient,
            details(task, client),
            task.status,
            assigned_by.name,
            assigned_by.email,
            SIGNATURE,
        ),
    }
}

pub fn update_message(
    task: &Task,
    recipient: &str,
    client: Option<&str>,
    changes: &ChangedFields,
    updated_by: &User,
) -> Message {
    let lines: Vec<String> = changes
        .iter()
        .map(|(field, diff)| format!("- {}: {} -> {}", field, plain(&diff.from), plain(&diff.to)))
        .collect();
    Message {
        subject: format!("Task Updated: {}", task.name),
        body: format!(
            "Dear {},\n\nYour assigned task has been updated:\n\n{}\n\nChanges:\n{}\n\nUpdated by: {} ({})\n\n{}",
            recipient,
            details(task, client),
            lines.join("\n"),
            updated_by.name,
            updated_by.email,
            SIGNATURE,
        ),
    }
}

pub fn status_change_message(
    task: &Task,
    recipient: &str,
    client: Option<&str>,
    old_status: &str,
    updated_by: &User,
) -> Message {
    let note = match task.status {
        TaskStatus::Completed => "Congratulations on completing this task!",
        TaskStatus::Escalated => "This task has been escalated and may require immediate attention.",
        TaskStatus::OnHold => "This task has been put on hold. Please check with your manager for details.",
        _ => "Please review the task and take any necessary action.",
    };
    Message {
        subject: format!("Task Status Changed: {} - {}", task.name, task.status),
        body: format!(
            "Dear {},\n\nThe status of your assigned task has been changed:\n\n{}\n\nStatus Change: {} -> {}\n\nChanged by: {} ({})\n\n{}\n\n{}",
            recipient,
            details(task, client),
            old_status,
            task.status,
            updated_by.name,
            updated_by.email,
            note,
            SIGNATURE,
        ),
    }
}

pub fn reassignment_message(
    task: &Task,
    recipient: &str,
    client: Option<&str>,
    previous: Option<&str>,
    reassigned_by: &User,
) -> Message {
    Message {
        subject: format!("Task Reassigned: {}", task.name),
        body: format!(
            "Dear {},\n\nA task has been reassigned to you:\n\n{}\n\nPreviously assigned to: {}\nReassigned by: {} ({})\n\nPlease review the task details and update the status accordingly.\n\n{}",
            recipient,
            details(task, client),
            previous.unwrap_or("Unassigned"),
            reassigned_by.name,
            reassigned_by.email,
            SIGNATURE,
        ),
    }
}

/// Render a JSON value without quotes around strings.
fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}
