//! Uploaded documents and their analysis records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::choice::{choice_enum, parse_choice, Choice};

choice_enum! {
    pub enum DocumentStatus ("status") {
        Pending => "pending",
        Validated => "validated",
        Failed => "failed",
    }
}

choice_enum! {
    /// How relevant the document is to its task.
    pub enum Relevance ("task_relevance") {
        High => "high",
        Medium => "medium",
        Low => "low",
        Irrelevant => "irrelevant",
    }
}

choice_enum! {
    pub enum CompletionStatus ("completion_status") {
        Completed => "completed",
        PartiallyCompleted => "partially_completed",
        NotCompleted => "not_completed",
        Unclear => "unclear",
    }
}

choice_enum! {
    pub enum Confidence ("completion_confidence") {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

choice_enum! {
    /// Declared lowest to highest so `>=` compares severity.
    pub enum RiskLevel ("risk_level") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

choice_enum! {
    pub enum PerformanceRating ("performance_rating") {
        Excellent => "excellent",
        Good => "good",
        Satisfactory => "satisfactory",
        NeedsImprovement => "needs_improvement",
        Poor => "poor",
    }
}

choice_enum! {
    pub enum RegulatoryCompliance ("regulatory_compliance") {
        Compliant => "compliant",
        PartiallyCompliant => "partially_compliant",
        NonCompliant => "non_compliant",
        Unclear => "unclear",
    }
}

/// Quality measures of the document itself, independent of task progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceMetrics {
    pub documentation_quality: PerformanceRating,
    /// 0..=100
    pub completeness_score: u8,
    pub accuracy_assessment: Confidence,
    pub timely_submission: bool,
    pub regulatory_compliance: RegulatoryCompliance,
}

impl Default for ComplianceMetrics {
    fn default() -> Self {
        Self {
            documentation_quality: PerformanceRating::Satisfactory,
            completeness_score: 50,
            accuracy_assessment: Confidence::Medium,
            timely_submission: false,
            regulatory_compliance: RegulatoryCompliance::Unclear,
        }
    }
}

impl ComplianceMetrics {
    fn from_raw(raw: Option<RawComplianceMetrics>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let defaults = Self::default();
        Self {
            documentation_quality: choice_or(
                raw.documentation_quality.as_deref(),
                defaults.documentation_quality,
            ),
            completeness_score: raw
                .completeness_score
                .map_or(defaults.completeness_score, |s| clamp_percentage(Some(s))),
            accuracy_assessment: choice_or(
                raw.accuracy_assessment.as_deref(),
                defaults.accuracy_assessment,
            ),
            timely_submission: raw.timely_submission.unwrap_or(defaults.timely_submission),
            regulatory_compliance: choice_or(
                raw.regulatory_compliance.as_deref(),
                defaults.regulatory_compliance,
            ),
        }
    }
}

/// Structured result of analyzing one document. Every field carries a value;
/// defaults are applied when the analyzer output is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysisRecord {
    pub summary: String,
    pub relevance: Relevance,
    pub completion_status: CompletionStatus,
    pub confidence: Confidence,
    /// 0..=100
    pub completion_percentage: u8,
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub compliance_metrics: ComplianceMetrics,
    pub missing_elements: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub risk_level: RiskLevel,
    pub performance_rating: PerformanceRating,
    pub contribution_to_task: String,
    pub validation_notes: String,
    pub requires_additional_docs: bool,
    pub additional_docs_needed: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
    /// Set when this is a fallback record standing in for a failed analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

/// Analyzer output as received, before defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnalysis {
    pub summary: Option<String>,
    pub task_relevance: Option<String>,
    pub task_completion_status: Option<String>,
    pub completion_confidence: Option<String>,
    pub completion_percentage: Option<f64>,
    pub key_findings: Option<Vec<String>>,
    pub compliance_metrics: Option<RawComplianceMetrics>,
    pub missing_elements: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
    pub next_steps: Option<Vec<String>>,
    pub risk_assessment: Option<String>,
    pub performance_rating: Option<String>,
    pub contribution_to_task: Option<String>,
    pub validation_notes: Option<String>,
    pub requires_additional_docs: Option<bool>,
    pub additional_docs_needed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComplianceMetrics {
    pub documentation_quality: Option<String>,
    pub completeness_score: Option<f64>,
    pub accuracy_assessment: Option<String>,
    pub timely_submission: Option<bool>,
    pub regulatory_compliance: Option<String>,
}

/// Unknown or missing spellings fall back to `default`.
fn choice_or<T: Choice>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|r| parse_choice(r).ok()).unwrap_or(default)
}

fn clamp_percentage(raw: Option<f64>) -> u8 {
    match raw {
        Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

impl DocumentAnalysisRecord {
    /// Apply boundary defaults to raw analyzer output.
    pub fn from_raw(raw: RawAnalysis, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            summary: raw
                .summary
                .unwrap_or_else(|| "Document analysis completed".to_string()),
            relevance: choice_or(raw.task_relevance.as_deref(), Relevance::Medium),
            completion_status: choice_or(
                raw.task_completion_status.as_deref(),
                CompletionStatus::Unclear,
            ),
            confidence: choice_or(raw.completion_confidence.as_deref(), Confidence::Medium),
            completion_percentage: clamp_percentage(raw.completion_percentage),
            key_findings: raw.key_findings.unwrap_or_default(),
            compliance_metrics: ComplianceMetrics::from_raw(raw.compliance_metrics),
            missing_elements: raw.missing_elements.unwrap_or_default(),
            recommendations: raw.recommendations.unwrap_or_default(),
            next_steps: raw.next_steps.unwrap_or_default(),
            risk_level: choice_or(raw.risk_assessment.as_deref(), RiskLevel::Medium),
            performance_rating: choice_or(
                raw.performance_rating.as_deref(),
                PerformanceRating::Satisfactory,
            ),
            contribution_to_task: raw
                .contribution_to_task
                .unwrap_or_else(|| "Document contributes to task completion".to_string()),
            validation_notes: raw
                .validation_notes
                .unwrap_or_else(|| "Document analyzed for task relevance".to_string()),
            requires_additional_docs: raw.requires_additional_docs.unwrap_or(false),
            additional_docs_needed: raw.additional_docs_needed.unwrap_or_default(),
            analyzed_at,
            analysis_error: None,
        }
    }

    /// Stand-in for a failed analysis. Never reports a favourable result.
    pub fn fallback(error: impl Into<String>, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            summary: "Document analysis failed".to_string(),
            relevance: Relevance::Medium,
            completion_status: CompletionStatus::Unclear,
            confidence: Confidence::Low,
            completion_percentage: 0,
            key_findings: Vec::new(),
            compliance_metrics: ComplianceMetrics {
                documentation_quality: PerformanceRating::NeedsImprovement,
                completeness_score: 0,
                accuracy_assessment: Confidence::Low,
                timely_submission: false,
                regulatory_compliance: RegulatoryCompliance::Unclear,
            },
            missing_elements: Vec::new(),
            recommendations: vec!["Verify document format".to_string()],
            next_steps: Vec::new(),
            risk_level: RiskLevel::Medium,
            performance_rating: PerformanceRating::NeedsImprovement,
            contribution_to_task: "Unable to determine contribution".to_string(),
            validation_notes: "Analysis unavailable".to_string(),
            requires_additional_docs: false,
            additional_docs_needed: Vec::new(),
            analyzed_at,
            analysis_error: Some(error.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.analysis_error.is_some()
    }
}

/// An uploaded file attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub media_type: String,
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub content_hash: String,
    /// File name inside the upload directory.
    pub locator: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub analysis: Option<DocumentAnalysisRecord>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
