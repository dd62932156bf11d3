//! Task-level assessment computed from per-document analysis records.
//!
//! Pure and deterministic: no I/O, no clock. Callers pass whatever snapshot of
//! documents they hold.

use serde::Serialize;

use crate::choice::choice_enum;
use crate::document::{CompletionStatus, Confidence, Document, DocumentAnalysisRecord, RiskLevel};

/// Percentage at or above which a document or task counts as complete.
pub const FULLY_COMPLETED_THRESHOLD: u8 = 90;
/// Percentage at or above which a task counts as partially complete.
pub const PARTIAL_COMPLETION_THRESHOLD: u8 = 50;
pub const MAX_RECOMMENDATIONS: usize = 5;

const NO_DOCUMENTS_HINT: &str = "Upload documents to begin task analysis";

choice_enum! {
    pub enum TaskReadiness ("task_readiness") {
        ReadyForClosure => "ready_for_closure",
        NeedsMoreWork => "needs_more_work",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskAssessment {
    pub overall_completion_status: CompletionStatus,
    pub overall_completion_percentage: u8,
    pub documents_analyzed: usize,
    pub fully_completed_documents: usize,
    pub high_confidence_documents: usize,
    pub task_readiness: TaskReadiness,
    pub overall_risk_level: RiskLevel,
    pub consolidated_recommendations: Vec<String>,
    pub estimated_completion_time: String,
}

/// Aggregate analysis records into one assessment.
pub fn aggregate(records: &[DocumentAnalysisRecord], estimated_hours: Option<f64>) -> TaskAssessment {
    let slots: Vec<_> = records.iter().map(Some).collect();
    aggregate_slots(&slots, estimated_hours)
}

/// Aggregate over documents. A document without an analysis record still
/// counts, contributing 0% and no risk or recommendations.
pub fn aggregate_documents(documents: &[Document], estimated_hours: Option<f64>) -> TaskAssessment {
    let slots: Vec<_> = documents.iter().map(|d| d.analysis.as_ref()).collect();
    aggregate_slots(&slots, estimated_hours)
}

fn estimated_time(estimated_hours: Option<f64>) -> String {
    match estimated_hours {
        Some(hours) => format!("{} hours estimated", hours),
        None => "Time estimation unavailable".to_string(),
    }
}

fn aggregate_slots(
    slots: &[Option<&DocumentAnalysisRecord>],
    estimated_hours: Option<f64>,
) -> TaskAssessment {
    if slots.is_empty() {
        return TaskAssessment {
            overall_completion_status: CompletionStatus::NotCompleted,
            overall_completion_percentage: 0,
            documents_analyzed: 0,
            fully_completed_documents: 0,
            high_confidence_documents: 0,
            task_readiness: TaskReadiness::NeedsMoreWork,
            overall_risk_level: RiskLevel::Medium,
            consolidated_recommendations: vec![NO_DOCUMENTS_HINT.to_string()],
            estimated_completion_time: estimated_time(estimated_hours),
        };
    }

    let records: Vec<&DocumentAnalysisRecord> = slots.iter().flatten().copied().collect();

    let total: u32 = records.iter().map(|r| u32::from(r.completion_percentage)).sum();
    let mean = f64::from(total) / slots.len() as f64;
    let percentage = mean.round().clamp(0.0, 100.0) as u8;

    let fully_completed = records
        .iter()
        .filter(|r| r.completion_percentage >= FULLY_COMPLETED_THRESHOLD)
        .count();
    let high_confidence = records
        .iter()
        .filter(|r| r.confidence == Confidence::High)
        .count();

    let status = if percentage >= FULLY_COMPLETED_THRESHOLD {
        CompletionStatus::Completed
    } else if percentage >= PARTIAL_COMPLETION_THRESHOLD {
        CompletionStatus::PartiallyCompleted
    } else {
        CompletionStatus::NotCompleted
    };
    let readiness = if percentage >= FULLY_COMPLETED_THRESHOLD {
        TaskReadiness::ReadyForClosure
    } else {
        TaskReadiness::NeedsMoreWork
    };

    TaskAssessment {
        overall_completion_status: status,
        overall_completion_percentage: percentage,
        documents_analyzed: slots.len(),
        fully_completed_documents: fully_completed,
        high_confidence_documents: high_confidence,
        task_readiness: readiness,
        overall_risk_level: roll_up_risk(&records, slots.len()),
        consolidated_recommendations: consolidate_recommendations(&records),
        estimated_completion_time: estimated_time(estimated_hours),
    }
}

/// Any high record wins; otherwise medium needs a strict majority of all
/// slots. Critical counts toward neither.
fn roll_up_risk(records: &[&DocumentAnalysisRecord], slot_count: usize) -> RiskLevel {
    if records.iter().any(|r| r.risk_level == RiskLevel::High) {
        return RiskLevel::High;
    }
    let medium = records
        .iter()
        .filter(|r| r.risk_level == RiskLevel::Medium)
        .count();
    if medium * 2 > slot_count {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn consolidate_recommendations(records: &[&DocumentAnalysisRecord]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(MAX_RECOMMENDATIONS);
    for rec in records.iter().flat_map(|r| r.recommendations.iter()) {
        if out.len() == MAX_RECOMMENDATIONS {
            break;
        }
        if !out.contains(rec) {
            out.push(rec.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawAnalysis;
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(pct: u8, risk: RiskLevel, recs: &[&str]) -> DocumentAnalysisRecord {
        let mut r = DocumentAnalysisRecord::from_raw(RawAnalysis::default(), Utc::now());
        r.completion_percentage = pct;
        r.risk_level = risk;
        r.recommendations = recs.iter().map(|s| s.to_string()).collect();
        r
    }

    #[test]
    fn test_empty_list() {
        let a = aggregate(&[], None);
        assert_eq!(a.overall_completion_percentage, 0);
        assert_eq!(a.overall_completion_status, CompletionStatus::NotCompleted);
        assert_eq!(a.task_readiness, TaskReadiness::NeedsMoreWork);
        assert_eq!(a.overall_risk_level, RiskLevel::Medium);
        assert_eq!(a.consolidated_recommendations, vec![NO_DOCUMENTS_HINT]);
        assert_eq!(a.estimated_completion_time, "Time estimation unavailable");
        assert_eq!(aggregate(&[], Some(6.0)).estimated_completion_time, "6 hours estimated");
    }

    #[test]
    fn test_all_complete() {
        for n in 1..5 {
            let records: Vec<_> = (0..n).map(|_| record(100, RiskLevel::Low, &[])).collect();
            let a = aggregate(&records, Some(2.5));
            assert_eq!(a.overall_completion_percentage, 100);
            assert_eq!(a.overall_completion_status, CompletionStatus::Completed);
            assert_eq!(a.task_readiness, TaskReadiness::ReadyForClosure);
            assert_eq!(a.fully_completed_documents, n);
            assert_eq!(a.estimated_completion_time, "2.5 hours estimated");
        }
    }

    #[test]
    fn test_thresholds_and_rounding() {
        let a = aggregate(
            &[record(50, RiskLevel::Low, &[]), record(51, RiskLevel::Low, &[])],
            None,
        );
        // 50.5 rounds half away from zero.
        assert_eq!(a.overall_completion_percentage, 51);
        assert_eq!(a.overall_completion_status, CompletionStatus::PartiallyCompleted);

        let a = aggregate(&[record(49, RiskLevel::Low, &[])], None);
        assert_eq!(a.overall_completion_status, CompletionStatus::NotCompleted);

        let a = aggregate(&[record(90, RiskLevel::Low, &[])], None);
        assert_eq!(a.task_readiness, TaskReadiness::ReadyForClosure);
    }

    #[test]
    fn test_any_high_risk_wins() {
        let a = aggregate(
            &[
                record(100, RiskLevel::Low, &[]),
                record(100, RiskLevel::Low, &[]),
                record(100, RiskLevel::High, &[]),
            ],
            None,
        );
        assert_eq!(a.overall_risk_level, RiskLevel::High);
    }

    #[test]
    fn test_critical_is_not_high() {
        let a = aggregate(&[record(10, RiskLevel::Critical, &[])], None);
        assert_eq!(a.overall_risk_level, RiskLevel::Low);

        let a = aggregate(
            &[record(10, RiskLevel::Critical, &[]), record(10, RiskLevel::Medium, &[])],
            None,
        );
        assert_eq!(a.overall_risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_medium_needs_strict_majority() {
        let half = aggregate(
            &[record(0, RiskLevel::Medium, &[]), record(0, RiskLevel::Low, &[])],
            None,
        );
        assert_eq!(half.overall_risk_level, RiskLevel::Low);

        let majority = aggregate(
            &[
                record(0, RiskLevel::Medium, &[]),
                record(0, RiskLevel::Medium, &[]),
                record(0, RiskLevel::Low, &[]),
            ],
            None,
        );
        assert_eq!(majority.overall_risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_recommendations_deduped_in_order_and_capped() {
        let a = aggregate(
            &[
                record(0, RiskLevel::Low, &["file GSTR-1", "attach challan", "file GSTR-1"]),
                record(0, RiskLevel::Low, &["attach challan", "sign", "reconcile", "pay", "extra"]),
            ],
            None,
        );
        assert_eq!(
            a.consolidated_recommendations,
            vec!["file GSTR-1", "attach challan", "sign", "reconcile", "pay"]
        );
    }

    #[test]
    fn test_unanalyzed_document_counts_as_zero() {
        use crate::document::DocumentStatus;
        use uuid::Uuid;
        let now = Utc::now();
        let base = Document {
            id: Uuid::new_v4(),
            task_id: Uuid::nil(),
            uploaded_by: Uuid::nil(),
            file_name: "a.pdf".to_string(),
            media_type: "application/pdf".to_string(),
            size: 1,
            content_hash: String::new(),
            locator: String::new(),
            status: DocumentStatus::Pending,
            analysis: None,
            uploaded_at: now,
            updated_at: now,
        };
        let analyzed = Document {
            id: Uuid::new_v4(),
            analysis: Some(record(100, RiskLevel::Low, &[])),
            ..base.clone()
        };
        let a = aggregate_documents(&[analyzed, base], None);
        assert_eq!(a.documents_analyzed, 2);
        assert_eq!(a.overall_completion_percentage, 50);
        assert_eq!(a.overall_risk_level, RiskLevel::Low);
    }

    // === Property tests =====================================================

    fn risk_strategy() -> impl Strategy<Value = RiskLevel> {
        prop_oneof![
            Just(RiskLevel::Low),
            Just(RiskLevel::Medium),
            Just(RiskLevel::High),
            Just(RiskLevel::Critical),
        ]
    }

    fn record_strategy() -> impl Strategy<Value = DocumentAnalysisRecord> {
        (
            0u8..=100,
            risk_strategy(),
            prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "e", "f", "g"]), 0..5),
        )
            .prop_map(|(pct, risk, recs)| record(pct, risk, &recs))
    }

    proptest! {
        #[test]
        fn prop_empty_input_is_fixed(hours in prop::option::of(0.5f64..200.0)) {
            let a = aggregate(&[], hours);
            prop_assert_eq!(a.overall_completion_percentage, 0);
            prop_assert_eq!(a.task_readiness, TaskReadiness::NeedsMoreWork);
            prop_assert_eq!(a.overall_risk_level, RiskLevel::Medium);
            prop_assert_eq!(a.consolidated_recommendations, vec![NO_DOCUMENTS_HINT.to_string()]);
        }

        #[test]
        fn prop_all_complete_is_ready(n in 1usize..12, risk in risk_strategy()) {
            let records: Vec<_> = (0..n).map(|_| record(100, risk, &[])).collect();
            let a = aggregate(&records, None);
            prop_assert_eq!(a.overall_completion_percentage, 100);
            prop_assert_eq!(a.overall_completion_status, CompletionStatus::Completed);
            prop_assert_eq!(a.task_readiness, TaskReadiness::ReadyForClosure);
            prop_assert_eq!(a.fully_completed_documents, n);
        }

        #[test]
        fn prop_any_high_risk_wins(
            mut records in prop::collection::vec(record_strategy(), 0..10),
            at in any::<prop::sample::Index>(),
            pct in 0u8..=100,
        ) {
            let position = at.index(records.len() + 1);
            records.insert(position, record(pct, RiskLevel::High, &[]));
            prop_assert_eq!(aggregate(&records, None).overall_risk_level, RiskLevel::High);
        }

        #[test]
        fn prop_percentage_in_range_and_status_consistent(
            records in prop::collection::vec(record_strategy(), 1..12),
        ) {
            let a = aggregate(&records, None);
            prop_assert!(a.overall_completion_percentage <= 100);
            prop_assert_eq!(a.documents_analyzed, records.len());
            let ready = a.overall_completion_percentage >= FULLY_COMPLETED_THRESHOLD;
            prop_assert_eq!(a.task_readiness == TaskReadiness::ReadyForClosure, ready);
        }

        #[test]
        fn prop_recommendations_unique_capped_first_seen(
            records in prop::collection::vec(record_strategy(), 1..8),
        ) {
            let a = aggregate(&records, None);
            let recs = &a.consolidated_recommendations;
            prop_assert!(recs.len() <= MAX_RECOMMENDATIONS);

            let mut expected: Vec<String> = Vec::new();
            for rec in records.iter().flat_map(|r| r.recommendations.iter()) {
                if !expected.contains(rec) {
                    expected.push(rec.clone());
                }
            }
            expected.truncate(MAX_RECOMMENDATIONS);
            prop_assert_eq!(recs, &expected);
        }

        #[test]
        fn prop_deterministic(
            records in prop::collection::vec(record_strategy(), 0..10),
            hours in prop::option::of(0.5f64..200.0),
        ) {
            prop_assert_eq!(aggregate(&records, hours), aggregate(&records, hours));
        }
    }
}
