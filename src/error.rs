//! Error taxonomy shared by every service in the tracker.
//!
//! Validation, not-found and access-denied failures are surfaced to the caller
//! immediately. Analysis and delivery failures are normally absorbed where they
//! happen (fallback records, error counters) and only escape from single-item
//! operations such as [`crate::lifecycle::LifecycleEngine::send_single_reminder`].

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid value for '{field}': {message}")]
    Validation {
        field: String,
        message: String,
        /// Accepted values when the field is an enumeration; empty otherwise.
        allowed: Vec<String>,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{actor} is not allowed to access {resource}")]
    AccessDenied { actor: String, resource: String },

    #[error("Document analysis failed: {0}")]
    Analysis(String),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Store operation failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    /// Validation failure for a missing required field.
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::Validation {
            message: format!("{} is required", field),
            field,
            allowed: Vec::new(),
        }
    }

    /// Validation failure for a value outside an enumeration.
    pub fn invalid_choice(field: impl Into<String>, provided: &str, allowed: &[&str]) -> Self {
        Self::Validation {
            field: field.into(),
            message: format!(
                "'{}' is not one of: {}",
                provided,
                allowed.join(", ")
            ),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Validation failure with a free-form message.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
            allowed: Vec::new(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
