//! Threaded discussion on tasks and their documents.

mod service;
mod types;

pub use service::CommentService;
pub use types::{Comment, CommentDraft, CommentFilter};
