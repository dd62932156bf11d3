//! Per-document analysis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::document::{DocumentAnalysisRecord, RawAnalysis};
use crate::error::{TrackerError, TrackerResult};
use crate::lifecycle::Clock;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::task::TaskContext;

use super::extract::extract_text;

/// Characters of extracted text sent to the model.
const MAX_PROMPT_TEXT: usize = 4000;

#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze one document. Fails with [`TrackerError::Analysis`].
    async fn analyze(
        &self,
        bytes: &[u8],
        media_type: &str,
        context: Option<&TaskContext>,
    ) -> TrackerResult<DocumentAnalysisRecord>;
}

/// Run `analyzer` under `timeout`, substituting the fallback record on any
/// failure. Fallback records are stamped with `clock`.
pub async fn analyze_or_fallback(
    analyzer: &dyn DocumentAnalyzer,
    clock: &dyn Clock,
    timeout: Duration,
    bytes: &[u8],
    media_type: &str,
    context: Option<&TaskContext>,
) -> DocumentAnalysisRecord {
    let outcome = match tokio::time::timeout(timeout, analyzer.analyze(bytes, media_type, context)).await {
        Ok(result) => result,
        Err(_) => Err(TrackerError::Analysis(format!(
            "analysis timed out after {:?}",
            timeout
        ))),
    };
    match outcome {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Using fallback analysis record: {}", e);
            DocumentAnalysisRecord::fallback(e.to_string(), clock.now())
        }
    }
}

/// Analyzer used when no LLM provider is configured.
pub struct DisabledAnalyzer;

#[async_trait]
impl DocumentAnalyzer for DisabledAnalyzer {
    async fn analyze(
        &self,
        _bytes: &[u8],
        _media_type: &str,
        _context: Option<&TaskContext>,
    ) -> TrackerResult<DocumentAnalysisRecord> {
        Err(TrackerError::Analysis("no LLM provider configured".to_string()))
    }
}

pub struct LlmAnalyzer {
    client: Arc<dyn LlmClient>,
    model: String,
    clock: Arc<dyn Clock>,
}

impl LlmAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            model: model.into(),
            clock,
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for LlmAnalyzer {
    async fn analyze(
        &self,
        bytes: &[u8],
        media_type: &str,
        context: Option<&TaskContext>,
    ) -> TrackerResult<DocumentAnalysisRecord> {
        let text = {
            let (bytes, media_type) = (bytes.to_vec(), media_type.to_string());
            tokio::task::spawn_blocking(move || extract_text(&bytes, &media_type))
                .await
                .map_err(|e| TrackerError::Analysis(format!("text extraction aborted: {}", e)))?
        };
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(context, &text)),
        ];
        let options = ChatOptions {
            temperature: Some(0.1),
            max_tokens: None,
            json_response: true,
        };

        let response = self
            .client
            .chat_completion(&self.model, &messages, options)
            .await
            .map_err(|e| TrackerError::Analysis(e.to_string()))?;
        let content = response
            .content
            .ok_or_else(|| TrackerError::Analysis("empty model response".to_string()))?;

        parse_analysis(&content, self.clock.now())
    }
}

/// Parse the model's JSON reply, tolerating a fenced code block.
pub fn parse_analysis(content: &str, analyzed_at: DateTime<Utc>) -> TrackerResult<DocumentAnalysisRecord> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    let raw: RawAnalysis = serde_json::from_str(body.trim())
        .map_err(|e| TrackerError::Analysis(format!("unparseable analysis: {}", e)))?;
    Ok(DocumentAnalysisRecord::from_raw(raw, analyzed_at))
}

const SYSTEM_PROMPT: &str = "You are a compliance expert assessing whether an uploaded document \
shows progress on a compliance task. Reply with a single JSON object only.";

fn build_prompt(context: Option<&TaskContext>, text: &str) -> String {
    let mut prompt = String::new();
    if let Some(ctx) = context {
        prompt.push_str(&format!(
            "TASK CONTEXT:\n- Task Name: {}\n- Description: {}\n- Bucket: {}\n- Priority: {}\n- Due Date: {}\n\n",
            ctx.name,
            ctx.description,
            ctx.category,
            ctx.priority,
            ctx.due_date.format("%Y-%m-%d"),
        ));
    }
    prompt.push_str(RESPONSE_SHAPE);
    prompt.push_str("\n\nDocument Content:\n");
    prompt.extend(text.chars().take(MAX_PROMPT_TEXT));
    prompt
}

const RESPONSE_SHAPE: &str = r#"Validate that the document is relevant to the task and bucket, assess its contribution to completion, identify missing elements and give actionable recommendations. Respond with:
{
  "summary": "2-3 sentence summary",
  "taskRelevance": "high|medium|low|irrelevant",
  "taskCompletionStatus": "completed|partially_completed|not_completed|unclear",
  "completionConfidence": "high|medium|low",
  "completionPercentage": 0-100,
  "keyFindings": ["..."],
  "complianceMetrics": {
    "documentationQuality": "excellent|good|satisfactory|needs_improvement|poor",
    "completenessScore": 0-100,
    "accuracyAssessment": "high|medium|low",
    "timelySubmission": true|false,
    "regulatoryCompliance": "compliant|partially_compliant|non_compliant|unclear"
  },
  "missingElements": ["..."],
  "recommendations": ["..."],
  "riskAssessment": "low|medium|high|critical",
  "nextSteps": ["..."],
  "contributionToTask": "how this document moves the task forward",
  "performanceRating": "excellent|good|satisfactory|needs_improvement|poor",
  "validationNotes": "notes on validity for this task",
  "requiresAdditionalDocs": true|false,
  "additionalDocsNeeded": ["..."]
}"#;
