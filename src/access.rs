//! Roles, rights and per-task entitlement checks.

use crate::choice::choice_enum;
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};
use crate::store::Store;
use crate::task::{Reference, Task, User};

choice_enum! {
    /// Account role.
    pub enum Role ("role") {
        Member => "member",
        User => "user",
        Admin => "admin",
        SuperAdmin => "superadmin",
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

/// A capability granted to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    ViewTasks,
    CreateComments,
    ManageOwnTasks,
    ViewOwnReports,
    GetUsers,
    ManageUsers,
    ManageTasks,
    ManageClients,
    ViewReports,
    ManageSystem,
    ManageRoles,
    ViewAuditLogs,
}

impl Role {
    pub fn rights(&self) -> &'static [Right] {
        use Right::*;
        match self {
            Self::Member => &[ViewTasks, CreateComments],
            Self::User => &[ViewTasks, CreateComments, ManageOwnTasks, ViewOwnReports],
            Self::Admin => &[GetUsers, ManageUsers, ManageTasks, ManageClients, ViewReports],
            Self::SuperAdmin => &[
                GetUsers,
                ManageUsers,
                ManageTasks,
                ManageClients,
                ViewReports,
                ManageSystem,
                ManageRoles,
                ViewAuditLogs,
            ],
        }
    }

    pub fn has_right(&self, right: Right) -> bool {
        self.rights().contains(&right)
    }
}

/// The user performing an operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
}

impl Actor {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    /// Roles holding `ManageTasks` see and touch every task.
    pub fn sees_all_tasks(&self) -> bool {
        self.user.role.has_right(Right::ManageTasks)
    }

    /// Whether the actor is the assignee (by id, name or email) or holds
    /// closure rights on the task.
    pub fn owns(&self, task: &Task) -> bool {
        let assigned = match &task.assigned_to {
            Reference::Resolved(id) => *id == self.user.id,
            Reference::Unresolved(display) => {
                let display = display.trim();
                display.eq_ignore_ascii_case(&self.user.name)
                    || display.eq_ignore_ascii_case(&self.user.email)
            }
        };
        assigned
            || task
                .closure_rights_email
                .as_deref()
                .is_some_and(|email| email.eq_ignore_ascii_case(&self.user.email))
    }

    pub fn can_access(&self, task: &Task) -> bool {
        self.sees_all_tasks() || self.owns(task)
    }

    pub fn ensure_right(&self, right: Right, resource: &str) -> TrackerResult<()> {
        if self.user.role.has_right(right) {
            Ok(())
        } else {
            Err(self.denied(resource.to_string()))
        }
    }

    fn denied(&self, resource: String) -> TrackerError {
        TrackerError::AccessDenied {
            actor: self.user.email.clone(),
            resource,
        }
    }

    /// Fail with `AccessDenied` unless [`Actor::can_access`] holds.
    pub fn ensure_access(&self, task: &Task) -> TrackerResult<()> {
        if self.can_access(task) {
            Ok(())
        } else {
            Err(self.denied(format!("task {}", task.id)))
        }
    }
}

/// Load a task the actor may see. Unknown ids are `NotFound`, foreign tasks
/// `AccessDenied`.
pub async fn accessible_task(store: &dyn Store, id: Uuid, actor: &Actor) -> TrackerResult<Task> {
    let task = store
        .find_task(id)
        .await?
        .ok_or_else(|| TrackerError::not_found("task", id))?;
    actor.ensure_access(&task)?;
    Ok(task)
}

/// Register a user account. Emails are unique, compared case-insensitively.
pub async fn register_user(
    store: &dyn Store,
    name: &str,
    email: &str,
    role: Role,
    actor: &Actor,
) -> TrackerResult<User> {
    actor.ensure_right(Right::ManageUsers, "users")?;
    if role == Role::SuperAdmin {
        actor.ensure_right(Right::ManageRoles, "roles")?;
    }
    let (name, email) = (name.trim(), email.trim());
    if name.is_empty() {
        return Err(TrackerError::missing("name"));
    }
    if !email.contains('@') {
        return Err(TrackerError::invalid("email", "must be an email address"));
    }
    if store.find_user_by_name_or_email(email).await?.is_some() {
        return Err(TrackerError::invalid("email", format!("{} is already registered", email)));
    }
    store
        .insert_user(User::new(name.to_string(), email.to_string(), role))
        .await
}
