//! HTTP API.

mod auth;
mod comments;
mod documents;
mod error;
mod reminders;
mod routes;
mod tasks;

pub use auth::{CurrentActor, USER_HEADER};
pub use routes::{router, serve, AppState};
