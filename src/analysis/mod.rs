//! Document analysis and task-level aggregation.

mod aggregate;
mod analyzer;
mod extract;

pub use aggregate::{
    aggregate, aggregate_documents, TaskAssessment, TaskReadiness, FULLY_COMPLETED_THRESHOLD,
    MAX_RECOMMENDATIONS, PARTIAL_COMPLETION_THRESHOLD,
};
pub use analyzer::{analyze_or_fallback, parse_analysis, DisabledAnalyzer, DocumentAnalyzer, LlmAnalyzer};
pub use extract::extract_text;
