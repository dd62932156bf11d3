//! # Compli Tracker
//!
//! Backend for tracking statutory compliance work (GST, TDS, PF, ROC filings
//! and the like) across clients.
//!
//! ## Modules
//! - `task`: task model, validation, audit history and the task service
//! - `comment`: threaded comments on tasks and documents
//! - `document`: uploads, analysis records and section classification
//! - `analysis`: LLM-backed document analysis and task-level roll-up
//! - `lifecycle`: background promotion and reminder sweeps
//! - `notify`: notification delivery and message templates
//! - `store`: persistence trait and the JSON-backed in-memory store
//! - `access`: roles, rights and per-task entitlement
//! - `api`: axum HTTP surface

pub mod access;
pub mod analysis;
pub mod api;
pub mod choice;
pub mod comment;
pub mod config;
pub mod document;
pub mod error;
pub mod lifecycle;
pub mod llm;
pub mod notify;
pub mod store;
pub mod task;

pub use config::Config;
pub use error::{TrackerError, TrackerResult};
