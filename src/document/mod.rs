//! Uploaded documents, their analysis records and compliance sections.

mod classifier;
mod service;
mod types;

pub use classifier::{DocumentClassifier, DocumentSections, Section, SectionEntry};
pub use service::{AnalysisChange, DocumentAnalysisView, DocumentService, Reanalysis, TaskSummary};
pub use types::{
    ComplianceMetrics, CompletionStatus, Confidence, Document, DocumentAnalysisRecord,
    DocumentStatus, PerformanceRating, RawAnalysis, RawComplianceMetrics, RegulatoryCompliance,
    Relevance, RiskLevel,
};
